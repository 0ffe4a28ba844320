//! Liveness marker for a participant node.
//!
//! The session id is the fencing token: it changes every time the node
//! re-establishes presence, and every observed-state read and message target
//! is checked against it. It is always threaded explicitly through calls,
//! never held as a process-wide constant.

use crate::record::Record;

const SESSION_ID: &str = "SESSION_ID";

/// View over a live-instance record.
#[derive(Debug, Clone)]
pub struct LiveInstance {
    record: Record,
}

impl LiveInstance {
    pub fn new(node: impl Into<String>, session_id: impl Into<String>) -> Self {
        let mut record = Record::new(node);
        record.set_simple_field(SESSION_ID, session_id);
        LiveInstance { record }
    }

    pub fn from_record(record: Record) -> Self {
        LiveInstance { record }
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn node(&self) -> &str {
        self.record.id()
    }

    /// The current fencing token for this node, empty if the record is
    /// malformed.
    pub fn session_id(&self) -> &str {
        self.record.simple_field(SESSION_ID).unwrap_or("")
    }
}
