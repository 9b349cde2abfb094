//! Append-only, per-user-filterable history of every message ever emitted or
//! received, with text and date search.
//!
//! `text_search` is plain case-insensitive substring containment — not
//! fuzzy or full-text — matching `original_source`'s
//! `query.lower() in content.lower()` filter; no full-text engine is pulled
//! in for this (`SPEC_FULL.md` §4.3).

use chrono::NaiveDate;
use memos_core::{MessageKind, MessageRecord};

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecallLog {
    records: Vec<MessageRecord>,
}

impl RecallLog {
    pub fn from_records(records: Vec<MessageRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Appends `record` as-is; the caller (Memory) is responsible for
    /// stamping the timestamp before this is called.
    pub fn insert(&mut self, record: MessageRecord) {
        self.records.push(record);
    }

    /// Filters to `kind` being neither `System` nor `Tool`, `user_id ==
    /// for_user_id`, and `content` containing `query` case-insensitively.
    /// Returns a page of `count` results starting at `offset`, plus the
    /// total number of matches before paging.
    pub fn text_search(
        &self,
        query: &str,
        for_user_id: i64,
        count: usize,
        offset: usize,
    ) -> (Vec<MessageRecord>, usize) {
        let needle = query.to_lowercase();
        let matches: Vec<&MessageRecord> = self
            .records
            .iter()
            .filter(|r| self.is_searchable(r, for_user_id))
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .collect();
        self.page(matches, count, offset)
    }

    /// Inclusive date range search, same `kind`/`user_id` filter as
    /// [`Self::text_search`].
    pub fn date_search(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        for_user_id: i64,
        count: usize,
        offset: usize,
    ) -> (Vec<MessageRecord>, usize) {
        let matches: Vec<&MessageRecord> = self
            .records
            .iter()
            .filter(|r| self.is_searchable(r, for_user_id))
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .collect();
        self.page(matches, count, offset)
    }

    fn is_searchable(&self, record: &MessageRecord, for_user_id: i64) -> bool {
        !matches!(record.kind, MessageKind::System | MessageKind::Tool) && record.user_id == for_user_id
    }

    fn page(
        &self,
        matches: Vec<&MessageRecord>,
        count: usize,
        offset: usize,
    ) -> (Vec<MessageRecord>, usize) {
        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect();
        (page, total)
    }
}
