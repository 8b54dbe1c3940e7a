use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Job identifiers are 24 lowercase hex characters.
pub type JobId = String;

const JID_LENGTH: usize = 24;

const RECOGNIZED_KEYS: [&str; 8] = [
    "class",
    "args",
    "queue",
    "jid",
    "retry",
    "created_at",
    "at",
    "bid",
];

/// Generate a fresh job identifier.
pub fn generate_jid() -> JobId {
    let mut jid = Uuid::new_v4().simple().to_string();
    jid.truncate(JID_LENGTH);
    jid
}

/// Convert a timestamp to the fractional epoch seconds stored in job records.
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// One unit of work as the client hands it to the queue.
///
/// The record is a string-keyed mapping on the wire. The keys the harness
/// understands are typed fields; anything else rides along in `extra` and
/// survives the encode/decode round trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub class: String,
    #[serde(default)]
    pub args: Vec<Value>,
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    /// Epoch seconds at which a scheduled job becomes due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl JobRecord {
    pub fn new(class: impl Into<String>, queue: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args,
            queue: queue.into(),
            jid: None,
            retry: None,
            created_at: None,
            at: None,
            bid: None,
            extra: Map::new(),
        }
    }

    pub fn with_jid(mut self, jid: impl Into<JobId>) -> Self {
        self.jid = Some(jid.into());
        self
    }

    pub fn with_bid(mut self, bid: impl Into<String>) -> Self {
        self.bid = Some(bid.into());
        self
    }

    pub fn with_retry(mut self, retry: impl Into<Value>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(epoch_seconds(created_at));
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(epoch_seconds(at));
        self
    }

    /// Attach an extra key. Keys that collide with a typed field are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            self.extra.insert(key, value.into());
        }
        self
    }

    /// Keys outside the typed fields, as attached by [`with_extra`](Self::with_extra)
    /// or read off the wire.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn extra_value(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn remove_extra(&mut self, key: &str) -> Option<Value> {
        self.extra.remove(key)
    }

    pub fn jid(&self) -> Option<&str> {
        self.jid.as_deref()
    }

    /// Return the job id, generating one first if the record has none.
    pub fn ensure_jid(&mut self) -> &str {
        self.jid.get_or_insert_with(generate_jid)
    }

    pub fn is_scheduled(&self) -> bool {
        self.at.is_some()
    }

    pub fn is_class(&self, class: &str) -> bool {
        self.class == class
    }
}
