//! Frame formatting
//!
//! A frame is the text of every record in a batch, each terminated by CRLF.

use crate::upstream::EventRecord;

/// Record terminator on the wire
pub const RECORD_TERMINATOR: &str = "\r\n";

/// Reduce a batch of records into one frame
///
/// Bodies appear in input order, each followed by CRLF. An empty batch
/// yields an empty frame.
pub fn format_batch(records: &[EventRecord]) -> String {
    let capacity = records
        .iter()
        .map(|r| r.body.len() + RECORD_TERMINATOR.len())
        .sum();

    let mut frame = String::with_capacity(capacity);
    for record in records {
        frame.push_str(&record.body_text());
        frame.push_str(RECORD_TERMINATOR);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        assert_eq!(format_batch(&[]), "");
    }

    #[test]
    fn test_single_record() {
        assert_eq!(format_batch(&[EventRecord::from("hello")]), "hello\r\n");
    }

    #[test]
    fn test_order_preserved() {
        let batch: Vec<EventRecord> = vec!["world".into(), "!".into()];
        assert_eq!(format_batch(&batch), "world\r\n!\r\n");
    }

    #[test]
    fn test_empty_body_still_terminated() {
        let batch: Vec<EventRecord> = vec!["".into(), "x".into()];
        assert_eq!(format_batch(&batch), "\r\nx\r\n");
    }

    #[test]
    fn test_deterministic() {
        let batch: Vec<EventRecord> = vec!["{\"t\":1}".into(), "{\"t\":2}".into()];
        assert_eq!(format_batch(&batch), format_batch(&batch));
        assert_eq!(format_batch(&batch), "{\"t\":1}\r\n{\"t\":2}\r\n");
    }
}
