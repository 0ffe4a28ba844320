//! Placement policy for one resource (the "ideal state").

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::constants::REPLICAS_ANY;
use crate::error::{OrchestratorError, Result};
use crate::record::Record;

/// Field names scoped to the placement-policy record.
enum Field {
    NumPartitions,
    Replicas,
    StateModelDefRef,
    RebalanceMode,
}

impl Field {
    fn as_str(&self) -> &'static str {
        match self {
            Field::NumPartitions => "NUM_PARTITIONS",
            Field::Replicas => "REPLICAS",
            Field::StateModelDefRef => "STATE_MODEL_DEF_REF",
            Field::RebalanceMode => "REBALANCE_MODE",
        }
    }
}

/// How partition placement is decided for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceMode {
    /// Controller derives node→state from per-partition preference lists.
    Auto,
    /// Like `Auto`, but the preference lists themselves are recomputed as
    /// membership changes.
    AutoRebalance,
    /// Explicit per-partition node→state maps, taken as-is.
    Customized,
    /// Explicit node lists with states still derived from the state model.
    SemiCustomized,
}

impl RebalanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceMode::Auto => "AUTO",
            RebalanceMode::AutoRebalance => "AUTO_REBALANCE",
            RebalanceMode::Customized => "CUSTOMIZED",
            RebalanceMode::SemiCustomized => "SEMI_CUSTOMIZED",
        }
    }

    /// True when placement comes from preference lists.
    pub fn is_auto(&self) -> bool {
        matches!(self, RebalanceMode::Auto | RebalanceMode::AutoRebalance)
    }
}

impl FromStr for RebalanceMode {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AUTO" => Ok(RebalanceMode::Auto),
            "AUTO_REBALANCE" => Ok(RebalanceMode::AutoRebalance),
            "CUSTOMIZED" => Ok(RebalanceMode::Customized),
            "SEMI_CUSTOMIZED" => Ok(RebalanceMode::SemiCustomized),
            other => Err(OrchestratorError::Config(format!(
                "unknown rebalance mode: {other}"
            ))),
        }
    }
}

/// View over a placement-policy record.
#[derive(Debug, Clone)]
pub struct IdealState {
    record: Record,
}

impl IdealState {
    pub fn new(
        resource: impl Into<String>,
        partitions: usize,
        replicas: usize,
        state_model_ref: impl Into<String>,
        mode: RebalanceMode,
    ) -> Self {
        let mut record = Record::new(resource);
        record.set_simple_field(Field::NumPartitions.as_str(), partitions.to_string());
        record.set_simple_field(Field::Replicas.as_str(), replicas.to_string());
        record.set_simple_field(Field::StateModelDefRef.as_str(), state_model_ref);
        record.set_simple_field(Field::RebalanceMode.as_str(), mode.as_str());
        IdealState { record }
    }

    pub fn from_record(record: Record) -> Self {
        IdealState { record }
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

    pub fn partition_count(&self) -> Result<usize> {
        self.record
            .simple_field(Field::NumPartitions.as_str())
            .ok_or_else(|| self.config_err("missing NUM_PARTITIONS"))?
            .parse()
            .map_err(|_| self.config_err("NUM_PARTITIONS is not a number"))
    }

    /// Replica count; `"ANY"` resolves to the current live-node count.
    pub fn replica_count(&self, live_nodes: usize) -> Result<usize> {
        let raw = self
            .record
            .simple_field(Field::Replicas.as_str())
            .ok_or_else(|| self.config_err("missing REPLICAS"))?;
        if raw == REPLICAS_ANY {
            return Ok(live_nodes.saturating_sub(1));
        }
        raw.parse()
            .map_err(|_| self.config_err("REPLICAS is not a number"))
    }

    pub fn state_model_def_ref(&self) -> Result<&str> {
        self.record
            .simple_field(Field::StateModelDefRef.as_str())
            .ok_or_else(|| self.config_err("missing STATE_MODEL_DEF_REF"))
    }

    pub fn rebalance_mode(&self) -> Result<RebalanceMode> {
        self.record
            .simple_field(Field::RebalanceMode.as_str())
            .unwrap_or("AUTO")
            .parse()
    }

    /// Partition names, `{resource}_{index}`.
    pub fn partition_names(&self) -> Result<Vec<String>> {
        let count = self.partition_count()?;
        let resource = self.resource();
        Ok((0..count).map(|i| format!("{resource}_{i}")).collect())
    }

    /// Ordered node preference for one partition (AUTO modes).
    pub fn preference_list(&self, partition: &str) -> Option<&[String]> {
        self.record.list_field(partition)
    }

    pub fn set_preference_list(&mut self, partition: impl Into<String>, nodes: Vec<String>) {
        self.record.set_list_field(partition, nodes);
    }

    /// Explicit node→state map for one partition (CUSTOMIZED modes).
    pub fn instance_state_map(&self, partition: &str) -> Option<&BTreeMap<String, String>> {
        self.record.map_field(partition)
    }

    pub fn set_instance_state_map(
        &mut self,
        partition: impl Into<String>,
        states: BTreeMap<String, String>,
    ) {
        self.record.set_map_field(partition, states);
    }

    fn config_err(&self, what: &str) -> OrchestratorError {
        OrchestratorError::Config(format!("placement policy {}: {what}", self.resource()))
    }
}
