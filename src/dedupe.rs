//! Per-run duplicate suppression.
//!
//! Nothing here persists: every set lives for one crawl and is dropped with
//! the spider.

use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, info};

use crate::models::FeedRecord;

/// A set of keys already handled during this run.
#[derive(Debug)]
pub struct SeenSet<K> {
    seen: HashSet<K>,
}

impl<K: Eq + Hash> Default for SeenSet<K> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash> SeenSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; returns `true` the first time it is seen.
    pub fn insert(&mut self, key: K) -> bool {
        self.seen.insert(key)
    }
}

/// Final pipeline stage: drops records whose de-dup key was already emitted.
///
/// Records that carry no key are always passed through.
#[derive(Debug, Default)]
pub struct DedupePipeline {
    seen: SeenSet<String>,
    dropped: usize,
}

impl DedupePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record if it should be emitted, `None` if it is a duplicate.
    pub fn process<R: FeedRecord>(&mut self, record: R) -> Option<R> {
        let Some(key) = record.dedupe_key() else {
            return Some(record);
        };
        if self.seen.insert(key.to_string()) {
            Some(record)
        } else {
            self.dropped += 1;
            debug!(key, "Dropping duplicate record");
            None
        }
    }

    /// Run `records` through the pipeline, preserving order.
    pub fn filter<R: FeedRecord>(&mut self, records: Vec<R>) -> Vec<R> {
        let before = records.len();
        let kept: Vec<R> = records.into_iter().filter_map(|r| self.process(r)).collect();
        if kept.len() != before {
            info!(
                dropped = before - kept.len(),
                kept = kept.len(),
                "Removed duplicate records"
            );
        }
        kept
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportRecord;

    fn report(original_id: Option<&str>, title: &str) -> ReportRecord {
        ReportRecord {
            title: Some(title.to_string()),
            original_id: original_id.map(str::to_string),
            ..ReportRecord::default()
        }
    }

    #[test]
    fn test_same_key_emitted_once() {
        let mut pipeline = DedupePipeline::new();
        let out = pipeline.filter(vec![report(Some("87001"), "first"), report(Some("87001"), "second")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title.as_deref(), Some("first"));
        assert_eq!(pipeline.dropped(), 1);
    }

    #[test]
    fn test_distinct_and_missing_keys_pass() {
        let mut pipeline = DedupePipeline::new();
        let out = pipeline.filter(vec![
            report(Some("1"), "a"),
            report(Some("2"), "b"),
            report(None, "c"),
            report(None, "d"),
        ]);
        assert_eq!(out.len(), 4);
        assert_eq!(pipeline.dropped(), 0);
    }

    #[test]
    fn test_seen_set() {
        let mut seen = SeenSet::new();
        assert!(seen.insert("https://news.naver.com/article/1/2"));
        assert!(!seen.insert("https://news.naver.com/article/1/2"));
        assert!(seen.insert("https://news.naver.com/article/1/3"));
    }
}
