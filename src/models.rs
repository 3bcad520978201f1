//! Record types emitted by the spiders.
//!
//! Each spider produces one flat record type. Field order in the structs is
//! the column order of the CSV feed and the key order of the JSON feed, so do
//! not reorder fields casually.
//!
//! - [`ItemNewsRecord`]: news attached to a single stock code
//! - [`SectionNewsRecord`]: general news from a portal section
//! - [`ReportRecord`]: analyst research report
//! - [`BoardPostRecord`]: discussion-board post for a stock code

use serde::{Deserialize, Serialize};

/// Behaviour shared by every record written to a feed.
pub trait FeedRecord: Serialize {
    /// Key used by [`crate::dedupe::DedupePipeline`]; `None` disables
    /// de-duplication for that record.
    fn dedupe_key(&self) -> Option<&str>;
}

/// A news article listed under a stock code.
///
/// `uuid` is derived from `link` alone, see [`crate::links::stable_id`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemNewsRecord {
    pub uuid: String,
    /// Press (source) name.
    pub press: Option<String>,
    /// Numeric article id (`aid`).
    pub article_id: Option<String>,
    pub title: Option<String>,
    /// Six-digit stock code the listing belonged to.
    pub code: String,
    /// Canonical article link.
    pub link: String,
    /// Body text with line breaks preserved.
    pub texts: Option<String>,
    /// `YY.MM.DD`.
    pub article_published_at: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` (KST).
    pub created_at: String,
    pub latest_scraped_at: String,
}

impl FeedRecord for ItemNewsRecord {
    fn dedupe_key(&self) -> Option<&str> {
        Some(&self.uuid)
    }
}

/// Which list on the section page an article came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Archive,
    Headline,
    Latest,
}

/// A news article collected from a portal section (politics, economy, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionNewsRecord {
    pub uuid: String,
    pub article_id: Option<String>,
    /// Section id, e.g. `101`.
    pub section: String,
    pub list_type: ListType,
    pub press: Option<String>,
    pub link: String,
    pub title: Option<String>,
    /// Body text flattened to a single line.
    pub texts: Option<String>,
    pub article_published_at: Option<String>,
    pub created_at: String,
    pub latest_scraped_at: String,
}

impl FeedRecord for SectionNewsRecord {
    fn dedupe_key(&self) -> Option<&str> {
        Some(&self.uuid)
    }
}

/// An analyst research report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Research section the report was listed under (e.g. `종목분석`).
    pub report_name: Option<String>,
    /// Industry category, for industry reports.
    pub category: Option<String>,
    /// Stock name, for company reports.
    pub stock_name: Option<String>,
    pub title: Option<String>,
    /// Issuing brokerage.
    pub firm_name: Option<String>,
    pub link: Option<String>,
    pub texts: Option<String>,
    /// Date as printed on the listing (`YY.MM.DD`).
    pub article_published_at: Option<String>,
    pub created_at: String,
    pub latest_scraped_at: String,
    /// The listing's `nid`.
    pub original_id: Option<String>,
}

impl FeedRecord for ReportRecord {
    fn dedupe_key(&self) -> Option<&str> {
        self.original_id.as_deref()
    }
}

/// A discussion-board post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardPostRecord {
    pub id: String,
    pub code: String,
    pub title: Option<String>,
    pub link: String,
    /// `YY.MM.DD`.
    pub uploaded_at: Option<String>,
    pub latest_scraped_at: String,
    pub texts: Option<String>,
}

impl FeedRecord for BoardPostRecord {
    fn dedupe_key(&self) -> Option<&str> {
        Some(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_news_serialization_field_order() {
        let record = ItemNewsRecord {
            uuid: "u".to_string(),
            code: "005930".to_string(),
            link: "https://news.naver.com/article/1/2".to_string(),
            ..ItemNewsRecord::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        let uuid_at = json.find("\"uuid\"").unwrap();
        let press_at = json.find("\"press\"").unwrap();
        let latest_at = json.find("\"latest_scraped_at\"").unwrap();
        assert!(uuid_at < press_at && press_at < latest_at);
        assert!(json.contains("\"texts\":null"));
    }

    #[test]
    fn test_list_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ListType::Headline).unwrap(), "\"headline\"");
        let back: ListType = serde_json::from_str("\"archive\"").unwrap();
        assert_eq!(back, ListType::Archive);
    }

    #[test]
    fn test_dedupe_keys() {
        let report = ReportRecord::default();
        assert_eq!(report.dedupe_key(), None);
        let post = BoardPostRecord {
            id: "abc".to_string(),
            ..BoardPostRecord::default()
        };
        assert_eq!(post.dedupe_key(), Some("abc"));
    }
}
