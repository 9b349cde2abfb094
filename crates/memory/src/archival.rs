//! Per-conversation, per-user-scoped semantic long-term memory: chunk, embed,
//! and index free text; query by embedding nearest-neighbour.
//!
//! The backing index here is an in-process `Vec<ArchivalNote>` scanned with
//! cosine similarity, mirroring the teacher's `ArchivalMemory` shape before
//! it talks to a real vector store. In production this would swap in the
//! teacher's `qdrant-client` dependency behind the same `insert`/`search`
//! shape; the in-process index is adequate for a single conversation's
//! archival scope.

use md5::{Digest, Md5};
use memos_core::{EmbeddingModel, HostError};
use text_splitter::{ChunkConfig, TextSplitter};
use tokenizers::Tokenizer;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArchivalNote {
    pub id: String,
    pub user_id: i64,
    pub content: String,
    pub timestamp: chrono::NaiveDate,
    pub embedding: Vec<f32>,
}

/// How many nearest neighbours the index itself considers before paging
/// (`SPEC_FULL.md` §4.4, K=100 by default).
pub struct ArchivalStore {
    notes: Vec<ArchivalNote>,
    chunk_max_tokens: usize,
    top_k: usize,
}

impl ArchivalStore {
    pub fn new(notes: Vec<ArchivalNote>, chunk_max_tokens: usize, top_k: usize) -> Self {
        Self {
            notes,
            chunk_max_tokens,
            top_k,
        }
    }

    pub fn notes(&self) -> &[ArchivalNote] {
        &self.notes
    }

    /// Chunks `content` with a tokenizer-aware splitter (max
    /// `chunk_max_tokens` tokens per chunk), embeds each chunk, and inserts
    /// it tagged with `user_id` and today's date. A chunk whose md5-derived
    /// id already exists is silently skipped (idempotent re-insert).
    pub async fn insert(
        &mut self,
        user_id: i64,
        content: &str,
        embedding_tokenizer: &Tokenizer,
        embedder: &dyn EmbeddingModel,
        embedding_model_name: &str,
    ) -> Result<(), HostError> {
        let config = ChunkConfig::new(self.chunk_max_tokens).with_sizer(embedding_tokenizer.clone());
        let splitter = TextSplitter::new(config);
        let chunks: Vec<String> = splitter.chunks(content).map(str::to_string).collect();

        let fresh: Vec<(String, String)> = chunks
            .into_iter()
            .map(|chunk| (chunk_id(&chunk), chunk))
            .filter(|(id, _)| !self.notes.iter().any(|n| &n.id == id))
            .collect();

        if fresh.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = fresh.iter().map(|(_, chunk)| chunk.clone()).collect();
        let embeddings = embedder.embed(embedding_model_name, &texts).await?;

        let today = chrono::Utc::now().date_naive();
        for ((id, chunk), embedding) in fresh.into_iter().zip(embeddings) {
            self.notes.push(ArchivalNote {
                id,
                user_id,
                content: chunk,
                timestamp: today,
                embedding,
            });
        }
        Ok(())
    }

    /// Embeds `query`, ranks notes scoped to `user_id` by cosine similarity,
    /// truncates to the top-K nearest neighbours, then pages. Returns the
    /// page and the total number of candidates the index returned (after
    /// the top-K cutoff, before paging), matching `spec.md`'s
    /// `(results, total_returned_by_index)`.
    pub async fn search(
        &self,
        query: &str,
        user_id: i64,
        count: usize,
        offset: usize,
        embedder: &dyn EmbeddingModel,
        embedding_model_name: &str,
    ) -> Result<(Vec<ArchivalNote>, usize), HostError> {
        let query_embedding = embedder
            .embed(embedding_model_name, &[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HostError::MalformedResponse("embedding response was empty".into()))?;

        let mut scored: Vec<(f32, &ArchivalNote)> = self
            .notes
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| (cosine_similarity(&query_embedding, &n.embedding), n))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        let total = scored.len();
        let page = scored
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(_, n)| n.clone())
            .collect();
        Ok((page, total))
    }
}

fn chunk_id(chunk: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(chunk.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
            // A toy embedding: presence of "blue" vs "red" on two axes, so
            // unrelated content scores near zero similarity.
            Ok(inputs
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    vec![
                        if lower.contains("blue") { 1.0 } else { 0.0 },
                        if lower.contains("red") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(tokenizers::models::bpe::BPE::default())
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_chunk_id() {
        let mut store = ArchivalStore::new(Vec::new(), 8192, 100);
        let tok = tokenizer();
        store
            .insert(1, "favourite colour is blue", &tok, &FakeEmbedder, "embed")
            .await
            .unwrap();
        store
            .insert(1, "favourite colour is blue", &tok, &FakeEmbedder, "embed")
            .await
            .unwrap();
        assert_eq!(store.notes().len(), 1);
    }

    #[tokio::test]
    async fn search_is_scoped_to_user_id() {
        let mut store = ArchivalStore::new(Vec::new(), 8192, 100);
        let tok = tokenizer();
        store
            .insert(1, "favourite colour is blue", &tok, &FakeEmbedder, "embed")
            .await
            .unwrap();

        let (results, total) = store
            .search("blue", 1, 10, 0, &FakeEmbedder, "embed")
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(results[0].content.contains("blue"));

        let (results, total) = store
            .search("blue", 2, 10, 0, &FakeEmbedder, "embed")
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(results.is_empty());
    }
}
