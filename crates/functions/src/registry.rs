//! Declared tool schemas: the language-neutral type table, the builder that
//! assembles one tool's JSON schema, and the registry that loads a tool set
//! and enforces the "names are globally unique" invariant.
//!
//! Per Design Notes §9 ("Tool introspection"): the source derives JSON
//! schemas from function signatures via Python's `inspect.signature`. Rust
//! has no equivalent generic reflection, so schemas are declared explicitly
//! alongside each tool with this builder rather than derived at runtime.

use std::collections::HashMap;

use memos_core::{EmbeddingModel, HostError};
use serde::Serialize;
use thiserror::Error;

/// The fixed language-neutral type table `spec.md` §4.5 names.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Integer,
    String,
    Boolean,
    Number,
    Array(Box<ParamType>),
    Object,
}

impl ParamType {
    /// The JSON schema type name, also used by `memos-agent::dispatch`'s
    /// per-argument type-mismatch error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Number => "number",
            ParamType::Array(_) => "array",
            ParamType::Object => "object",
        }
    }

    fn to_json_schema(&self) -> serde_json::Value {
        match self {
            ParamType::Array(inner) => serde_json::json!({
                "type": "array",
                "items": inner.to_json_schema(),
            }),
            other => serde_json::json!({ "type": other.type_name() }),
        }
    }

    /// Whether `value` matches this type, recursing into array element
    /// types. Used by `memos-agent::dispatch`'s per-parameter type check.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::String => value.is_string(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Number => value.is_number(),
            ParamType::Object => value.is_object(),
            ParamType::Array(inner) => value
                .as_array()
                .map(|items| items.iter().all(|item| inner.matches(item)))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// One tool's full declaration: name, description, parameter schema,
/// whether it's always shown to the model (`in_context`), and which set it
/// belongs to. Mirrors `spec.md`'s "Function record" shape minus
/// `python_callable` — execution is wired by name in `builtin::execute`
/// rather than stored as a callable here.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub in_context: bool,
    pub set_name: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, set_name: impl Into<String>, in_context: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            in_context,
            set_name: set_name.into(),
        }
    }

    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            param_type,
            description: description.into(),
            required,
        });
        self
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.required)
    }

    pub fn param_named(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The `{name, description, parameters: {properties, required}}` JSON
    /// schema shown to the model.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for param in &self.params {
            let mut schema = param.param_type.to_json_schema();
            if let serde_json::Value::Object(ref mut map) = schema {
                map.insert(
                    "description".to_string(),
                    serde_json::Value::String(param.description.clone()),
                );
            }
            properties.insert(param.name.clone(), schema);
        }
        let required: Vec<serde_json::Value> = self
            .required_params()
            .map(|p| serde_json::Value::String(p.name.clone()))
            .collect();

        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        })
    }
}

#[derive(Debug, Error, Serialize)]
pub enum RegistryError {
    #[error("duplicate function name across tool sets: {0}")]
    DuplicateName(String),
}

/// Loads a tool set and enforces global name uniqueness (a fatal
/// configuration error at load time per `spec.md` §4.5's Function record
/// invariant).
pub struct FunctionRegistry {
    tools: HashMap<String, ToolSpec>,
}

impl FunctionRegistry {
    pub fn load(specs: Vec<ToolSpec>) -> Result<Self, RegistryError> {
        let mut tools = HashMap::with_capacity(specs.len());
        for spec in specs {
            if tools.contains_key(&spec.name) {
                return Err(RegistryError::DuplicateName(spec.name));
            }
            tools.insert(spec.name.clone(), spec);
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn in_context_schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .values()
            .filter(|t| t.in_context)
            .map(ToolSpec::to_json_schema)
            .collect()
    }

    pub fn out_of_context(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values().filter(|t| !t.in_context)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Embeds every out-of-context tool's description and the query
    /// on demand (the out-of-context index is ephemeral per agent, per
    /// `spec.md` §4.5), ranks by cosine similarity, dedupes by name, and
    /// pages. Adequate for a handful of out-of-context tools; a registry
    /// with many more would cache the description embeddings instead of
    /// recomputing them per search.
    pub async fn search_out_of_context(
        &self,
        query: &str,
        count: usize,
        offset: usize,
        embedder: &dyn EmbeddingModel,
        embedding_model_name: &str,
    ) -> Result<Vec<serde_json::Value>, HostError> {
        let candidates: Vec<&ToolSpec> = self.out_of_context().collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut texts: Vec<String> = candidates.iter().map(|t| t.description.clone()).collect();
        texts.push(query.to_string());
        let mut embeddings = embedder.embed(embedding_model_name, &texts).await?;
        let query_embedding = embeddings.pop().ok_or_else(|| {
            HostError::MalformedResponse("embedding response was empty".to_string())
        })?;

        let mut scored: Vec<(f32, &ToolSpec)> = candidates
            .into_iter()
            .zip(embeddings)
            .map(|(tool, embedding)| (cosine_similarity(&query_embedding, &embedding), tool))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(_, tool)| tool.to_json_schema())
            .collect())
    }
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

    #[test]
    fn duplicate_names_across_sets_fail_to_load() {
        let a = ToolSpec::new("send_message", "d", "base", true);
        let b = ToolSpec::new("send_message", "d2", "other", true);
        let err = FunctionRegistry::load(vec![a, b]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "send_message"));
    }

    #[test]
    fn json_schema_includes_required_and_nested_array_items() {
        let tool = ToolSpec::new("f", "desc", "base", true)
            .param("label", ParamType::String, "a label", true)
            .param("tags", ParamType::Array(Box::new(ParamType::String)), "tags", false);
        let schema = tool.to_json_schema();
        assert_eq!(schema["name"], "f");
        assert_eq!(schema["parameters"]["required"][0], "label");
        assert_eq!(schema["parameters"]["properties"]["tags"]["type"], "array");
        assert_eq!(schema["parameters"]["properties"]["tags"]["items"]["type"], "string");
    }

    #[test]
    fn param_type_matches_validates_array_element_types() {
        let array_of_strings = ParamType::Array(Box::new(ParamType::String));
        assert!(array_of_strings.matches(&serde_json::json!(["a", "b"])));
        assert!(!array_of_strings.matches(&serde_json::json!(["a", 1])));
        assert!(!array_of_strings.matches(&serde_json::json!("not an array")));
    }

    #[tokio::test]
    async fn search_out_of_context_ranks_and_pages_by_similarity() {
        use async_trait::async_trait;
        use memos_core::HostError;

        struct FakeEmbedder;
        #[async_trait]
        impl EmbeddingModel for FakeEmbedder {
            async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
                Ok(inputs
                    .iter()
                    .map(|t| vec![if t.to_lowercase().contains("web") { 1.0 } else { 0.0 }])
                    .collect())
            }
        }

        let registry = FunctionRegistry::load(vec![
            ToolSpec::new("web_search", "search the web", "web", false),
            ToolSpec::new("run_code", "execute code", "interpreter", false),
        ])
        .unwrap();

        let results = registry
            .search_out_of_context("web lookup", 1, 0, &FakeEmbedder, "embed")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["name"], "web_search");
    }

    #[test]
    fn in_context_schemas_excludes_out_of_context_tools() {
        let registry = FunctionRegistry::load(vec![
            ToolSpec::new("a", "d", "base", true),
            ToolSpec::new("b", "d", "web", false),
        ])
        .unwrap();
        assert_eq!(registry.in_context_schemas().len(), 1);
        assert_eq!(registry.out_of_context().count(), 1);
    }
}
