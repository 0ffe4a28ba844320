//! Per-node configuration.

use crate::record::Record;

const ENABLED: &str = "ENABLED";
const HOST: &str = "HOST";
const PORT: &str = "PORT";

/// View over an instance-config record. A node with no config record is
/// treated as enabled.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    record: Record,
}

impl InstanceConfig {
    pub fn new(node: impl Into<String>) -> Self {
        let mut record = Record::new(node);
        record.set_simple_field(ENABLED, "true");
        InstanceConfig { record }
    }

    pub fn from_record(record: Record) -> Self {
        InstanceConfig { record }
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn node(&self) -> &str {
        self.record.id()
    }

    /// Disabled nodes keep their liveness but receive no new assignments.
    pub fn enabled(&self) -> bool {
        self.record.simple_field(ENABLED) != Some("false")
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.record
            .set_simple_field(ENABLED, if enabled { "true" } else { "false" });
    }

    pub fn host(&self) -> Option<&str> {
        self.record.simple_field(HOST)
    }

    pub fn port(&self) -> Option<u16> {
        self.record.simple_field(PORT).and_then(|p| p.parse().ok())
    }
}
