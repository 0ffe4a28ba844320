//! Configuration for controller and participant instances.
//!
//! Defaults are validated and safe for local clusters; builder-style
//! `with_*` methods override individual knobs.

use std::time::Duration;

use crate::constants::{DEFAULT_DEBOUNCE_MS, DEFAULT_WORKER_POOL_SIZE};
use crate::error::{OrchestratorError, Result};

/// Configuration for one controller instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cluster this controller manages.
    pub cluster: String,
    /// Name the controller uses as message source.
    pub controller_name: String,
    /// Window over which trigger events are coalesced into one pipeline run.
    pub debounce: Duration,
}

impl ControllerConfig {
    pub fn new(cluster: impl Into<String>) -> Self {
        ControllerConfig {
            cluster: cluster.into(),
            controller_name: "controller".to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    pub fn with_controller_name(mut self, name: impl Into<String>) -> Self {
        self.controller_name = name.into();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.is_empty() {
            return Err(OrchestratorError::Config("cluster name is empty".into()));
        }
        Ok(())
    }
}

/// Configuration for one participant instance.
#[derive(Debug, Clone)]
pub struct ParticipantConfig {
    /// Cluster this participant joins.
    pub cluster: String,
    /// This node's name.
    pub node: String,
    /// Upper bound of concurrently executing transition tasks.
    pub worker_pool_size: usize,
}

impl ParticipantConfig {
    pub fn new(cluster: impl Into<String>, node: impl Into<String>) -> Self {
        ParticipantConfig {
            cluster: cluster.into(),
            node: node.into(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.is_empty() || self.node.is_empty() {
            return Err(OrchestratorError::Config(
                "cluster and node names must be non-empty".into(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(OrchestratorError::Config(
                "worker pool size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ControllerConfig::new("c").validate().is_ok());
        assert!(ParticipantConfig::new("c", "n1").validate().is_ok());
    }

    #[test]
    fn zero_pool_rejected() {
        let config = ParticipantConfig::new("c", "n1").with_worker_pool_size(0);
        assert!(config.validate().is_err());
    }
}
