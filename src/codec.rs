//! JSON codec for job records.
//!
//! Every record entering the fake queue or the inline pipeline passes through
//! [`normalize`], which encodes it to JSON text and decodes it back. That
//! yields a deep copy that shares nothing with the caller's value and reduces
//! every argument to a plain JSON type.

use crate::{Result, job::JobRecord};

pub fn encode(job: &JobRecord) -> Result<String> {
    Ok(serde_json::to_string(job)?)
}

pub fn decode(text: &str) -> Result<JobRecord> {
    Ok(serde_json::from_str(text)?)
}

pub fn normalize(job: &JobRecord) -> Result<JobRecord> {
    decode(&encode(job)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> JobRecord {
        JobRecord::new(
            "HardWorker",
            "default",
            vec![
                json!(1),
                json!(2.5),
                json!("text"),
                json!(false),
                json!([1, [2, 3]]),
                json!({"nested": {"deep": null}}),
            ],
        )
        .with_jid("abc123")
        .with_bid("batch-1")
        .with_retry(5)
        .with_extra("custom", json!({"k": "v"}))
    }

    #[test]
    fn test_normalize_is_structurally_equal() {
        let job = sample();
        assert_eq!(normalize(&job).unwrap(), job);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(&sample()).unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(encode(&once).unwrap(), encode(&twice).unwrap());
    }

    #[test]
    fn test_extra_keys_never_duplicate_typed_fields() {
        let job = sample().with_extra("jid", "other").with_extra("queue", "low");

        let text = encode(&job).unwrap();
        assert_eq!(text.matches("\"jid\"").count(), 1);
        assert_eq!(text.matches("\"queue\"").count(), 1);

        let back = normalize(&job).unwrap();
        assert_eq!(back.jid(), Some("abc123"));
        assert_eq!(back.queue, "default");
    }

    #[test]
    fn test_decode_rejects_missing_class() {
        let result = decode(r#"{"queue": "default", "args": []}"#);
        assert!(matches!(result, Err(crate::HarnessError::Serialization(_))));
    }

    #[test]
    fn test_decode_integer_timestamp() {
        let job = decode(r#"{"class": "W", "queue": "q", "created_at": 1700000000}"#).unwrap();
        assert_eq!(job.created_at, Some(1_700_000_000.0));
    }
}
