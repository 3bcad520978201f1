//! CSV feed encoding.
//!
//! The header row comes from the record's field names, so column order is the
//! struct's field order. `None` fields are written as empty cells.

use std::error::Error;

use crate::models::FeedRecord;

const UTF8_BOM: &[u8] = "\u{feff}".as_bytes();

pub fn to_csv_bytes<R: FeedRecord>(records: &[R], bom: bool) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut buf = Vec::new();
    if bom {
        buf.extend_from_slice(UTF8_BOM);
    }
    let mut writer = csv::Writer::from_writer(buf);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    let buf = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(buf)
}
