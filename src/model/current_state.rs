//! Observed state of one resource on one node under one session.
//!
//! Record id is the resource name; it lives at
//! `/{cluster}/observed/{node}/{session}/{resource}` and is mutated only by
//! the transition executor on the owning node. The controller treats it as
//! read-only and ignores records under stale sessions.

use crate::record::Record;

const SESSION_ID: &str = "SESSION_ID";
const STATE_MODEL_DEF: &str = "STATE_MODEL_DEF";
const BUCKET_SIZE: &str = "BUCKET_SIZE";
const CURRENT_STATE: &str = "CURRENT_STATE";

/// View over an observed-state record.
#[derive(Debug, Clone)]
pub struct CurrentState {
    record: Record,
}

impl CurrentState {
    pub fn new(
        resource: impl Into<String>,
        session_id: impl Into<String>,
        state_model_def: impl Into<String>,
    ) -> Self {
        let mut record = Record::new(resource);
        record.set_simple_field(SESSION_ID, session_id);
        record.set_simple_field(STATE_MODEL_DEF, state_model_def);
        record.set_simple_field(BUCKET_SIZE, "0");
        CurrentState { record }
    }

    pub fn from_record(record: Record) -> Self {
        CurrentState { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn resource(&self) -> &str {
        self.record.id()
    }

    pub fn session_id(&self) -> &str {
        self.record.simple_field(SESSION_ID).unwrap_or("")
    }

    pub fn state_model_def(&self) -> Option<&str> {
        self.record.simple_field(STATE_MODEL_DEF)
    }

    pub fn bucket_size(&self) -> usize {
        self.record
            .simple_field(BUCKET_SIZE)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    /// Observed state for one partition, if the node has reported any.
    pub fn state(&self, partition: &str) -> Option<&str> {
        self.record
            .map_field(partition)
            .and_then(|entry| entry.get(CURRENT_STATE))
            .map(String::as_str)
    }

    /// Update one partition's entry in place.
    pub fn set_state(&mut self, partition: &str, state: impl Into<String>) {
        self.record
            .map_field_mut(partition)
            .insert(CURRENT_STATE.to_string(), state.into());
    }

    /// All (partition, state) pairs present in this record.
    pub fn partition_states(&self) -> impl Iterator<Item = (&str, &str)> {
        let record = &self.record;
        record.map_field_names().filter_map(move |partition| {
            record
                .map_field(partition)
                .and_then(|entry| entry.get(CURRENT_STATE))
                .map(|state| (partition, state.as_str()))
        })
    }
}
