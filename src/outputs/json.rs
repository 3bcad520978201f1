//! JSON feed encoding: one pretty-printed array, non-ASCII kept as-is.

use std::error::Error;

use crate::models::FeedRecord;

pub fn to_json_bytes<R: FeedRecord>(records: &[R]) -> Result<Vec<u8>, Box<dyn Error>> {
    Ok(serde_json::to_vec_pretty(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoardPostRecord;

    #[test]
    fn test_json_is_pretty_array() {
        let records = vec![BoardPostRecord {
            id: "abc".to_string(),
            code: "005930".to_string(),
            title: Some("오늘 주가".to_string()),
            ..BoardPostRecord::default()
        }];
        let text = String::from_utf8(to_json_bytes(&records).unwrap()).unwrap();
        assert!(text.starts_with("[\n  {"));
        assert!(text.contains("\"title\": \"오늘 주가\""));
        let back: Vec<BoardPostRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_empty_array() {
        let records: Vec<BoardPostRecord> = Vec::new();
        assert_eq!(to_json_bytes(&records).unwrap(), b"[]");
    }
}
