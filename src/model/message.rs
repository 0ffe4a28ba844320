//! Transition messages.
//!
//! A message is a transition instruction written to the target node's queue
//! at `/{cluster}/messages/{node}/{id}`. Deleting it from the queue is the
//! acknowledgment; a message still present is "pending" and suppresses
//! duplicate generation in the pipeline.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::record::Record;

const MSG_TYPE: &str = "MSG_TYPE";
const SRC_NAME: &str = "SRC_NAME";
const TGT_NAME: &str = "TGT_NAME";
const TGT_SESSION_ID: &str = "TGT_SESSION_ID";
const RESOURCE_NAME: &str = "RESOURCE_NAME";
const PARTITION_NAME: &str = "PARTITION_NAME";
const FROM_STATE: &str = "FROM_STATE";
const TO_STATE: &str = "TO_STATE";
const STATE_MODEL_DEF: &str = "STATE_MODEL_DEF";
const STATE_MODEL_FACTORY_NAME: &str = "STATE_MODEL_FACTORY_NAME";
const BATCH_MODE: &str = "BATCH_MODE";
const BATCH_PARTITIONS: &str = "BATCH_PARTITIONS";
const CREATE_TIMESTAMP: &str = "CREATE_TIMESTAMP";
const READ_TIMESTAMP: &str = "READ_TIMESTAMP";
const EXECUTE_START_TIMESTAMP: &str = "EXECUTE_START_TIMESTAMP";

/// Kind of message delivered through a node's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Instructs one partition (or a batch) to move one state hop.
    StateTransition,
    /// Wakes the controller without carrying a transition.
    NoOp,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::StateTransition => "STATE_TRANSITION",
            MessageType::NoOp => "NO_OP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "STATE_TRANSITION" => Some(MessageType::StateTransition),
            "NO_OP" => Some(MessageType::NoOp),
            _ => None,
        }
    }
}

/// View over a message record.
#[derive(Debug, Clone)]
pub struct Message {
    record: Record,
}

impl Message {
    /// Create a state-transition message with a fresh id and creation
    /// timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn state_transition(
        source: &str,
        target: &str,
        target_session: &str,
        resource: &str,
        partition: &str,
        from_state: &str,
        to_state: &str,
        state_model_def: &str,
    ) -> Self {
        let mut record = Record::new(Uuid::new_v4().to_string());
        record.set_simple_field(MSG_TYPE, MessageType::StateTransition.as_str());
        record.set_simple_field(SRC_NAME, source);
        record.set_simple_field(TGT_NAME, target);
        record.set_simple_field(TGT_SESSION_ID, target_session);
        record.set_simple_field(RESOURCE_NAME, resource);
        record.set_simple_field(PARTITION_NAME, partition);
        record.set_simple_field(FROM_STATE, from_state);
        record.set_simple_field(TO_STATE, to_state);
        record.set_simple_field(STATE_MODEL_DEF, state_model_def);
        record.set_simple_field(CREATE_TIMESTAMP, Utc::now().timestamp_millis().to_string());
        Message { record }
    }

    /// Create a no-op wake-up message.
    pub fn no_op(source: &str, target: &str, target_session: &str) -> Self {
        let mut record = Record::new(Uuid::new_v4().to_string());
        record.set_simple_field(MSG_TYPE, MessageType::NoOp.as_str());
        record.set_simple_field(SRC_NAME, source);
        record.set_simple_field(TGT_NAME, target);
        record.set_simple_field(TGT_SESSION_ID, target_session);
        record.set_simple_field(CREATE_TIMESTAMP, Utc::now().timestamp_millis().to_string());
        Message { record }
    }

    pub fn from_record(record: Record) -> Self {
        Message { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.record.simple_field(MSG_TYPE).and_then(MessageType::parse)
    }

    pub fn source(&self) -> Option<&str> {
        self.record.simple_field(SRC_NAME)
    }

    pub fn target(&self) -> Option<&str> {
        self.record.simple_field(TGT_NAME)
    }

    pub fn target_session(&self) -> Option<&str> {
        self.record.simple_field(TGT_SESSION_ID)
    }

    /// Re-address this message to a different node. Used when fanning a
    /// template out to many targets.
    pub fn set_target(&mut self, target: &str) {
        self.record.set_simple_field(TGT_NAME, target);
    }

    pub fn set_target_session(&mut self, session: &str) {
        self.record.set_simple_field(TGT_SESSION_ID, session);
    }

    pub fn resource(&self) -> Option<&str> {
        self.record.simple_field(RESOURCE_NAME)
    }

    pub fn partition(&self) -> Option<&str> {
        self.record.simple_field(PARTITION_NAME)
    }

    pub fn from_state(&self) -> Option<&str> {
        self.record.simple_field(FROM_STATE)
    }

    pub fn to_state(&self) -> Option<&str> {
        self.record.simple_field(TO_STATE)
    }

    pub fn state_model_def(&self) -> Option<&str> {
        self.record.simple_field(STATE_MODEL_DEF)
    }

    pub fn factory_name(&self) -> Option<&str> {
        self.record.simple_field(STATE_MODEL_FACTORY_NAME)
    }

    pub fn set_factory_name(&mut self, name: &str) {
        self.record.set_simple_field(STATE_MODEL_FACTORY_NAME, name);
    }

    /// True when this message groups many partitions of one resource.
    pub fn is_batch(&self) -> bool {
        self.record.simple_field(BATCH_MODE) == Some("true")
    }

    /// Partitions covered by a batch message.
    pub fn batch_partitions(&self) -> &[String] {
        self.record.list_field(BATCH_PARTITIONS).unwrap_or(&[])
    }

    /// Convert this message into a batch over the given partitions.
    pub fn set_batch_partitions(&mut self, partitions: Vec<String>) {
        self.record.set_simple_field(BATCH_MODE, "true");
        self.record.set_list_field(BATCH_PARTITIONS, partitions);
    }

    pub fn create_timestamp(&self) -> Option<i64> {
        self.timestamp(CREATE_TIMESTAMP)
    }

    pub fn read_timestamp(&self) -> Option<i64> {
        self.timestamp(READ_TIMESTAMP)
    }

    pub fn execute_start_timestamp(&self) -> Option<i64> {
        self.timestamp(EXECUTE_START_TIMESTAMP)
    }

    /// Stamp the moment the participant picked the message off its queue.
    pub fn mark_read(&mut self) {
        self.record
            .set_simple_field(READ_TIMESTAMP, Utc::now().timestamp_millis().to_string());
    }

    /// Stamp the moment execution actually started.
    pub fn mark_execute_start(&mut self) {
        self.record.set_simple_field(
            EXECUTE_START_TIMESTAMP,
            Utc::now().timestamp_millis().to_string(),
        );
    }

    fn timestamp(&self, field: &str) -> Option<i64> {
        self.record.simple_field(field).and_then(|raw| raw.parse().ok())
    }

    /// Structural validation used by the transition executor: a transition
    /// message must carry non-empty fromState, toState, and partition.
    pub fn validate_transition(&self) -> Result<()> {
        for (field, value) in [
            ("FROM_STATE", self.from_state()),
            ("TO_STATE", self.to_state()),
            ("PARTITION_NAME", self.partition()),
            ("RESOURCE_NAME", self.resource()),
        ] {
            match value {
                Some(v) if !v.is_empty() => {}
                _ => {
                    return Err(OrchestratorError::Validation(format!(
                        "message {} missing {field}",
                        self.id()
                    )));
                }
            }
        }
        Ok(())
    }
}
