//! Administrative operations exposed to CLI/web collaborators.
//!
//! Everything here is a thin composition of the store contract, the
//! criteria evaluator, and the placement calculator; no admin operation
//! bypasses the normal message/executor path, so rollback and statistics
//! semantics apply to operator actions too.

use std::collections::BTreeMap;

use std::sync::Arc;

use tracing::info;

use crate::constants::ERROR_STATE;
use crate::controller::cache::ClusterSnapshot;
use crate::controller::criteria::{self, Criteria};
use crate::controller::placement;
use crate::error::{OrchestratorError, Result};
use crate::model::{
    CurrentState, IdealState, InstanceConfig, Message, RebalanceMode, StateModelDefinition,
};
use crate::store::{ClusterStore, paths};

/// Handle for cluster administration.
pub struct ClusterAdmin {
    cluster: String,
    store: Arc<dyn ClusterStore>,
}

impl ClusterAdmin {
    pub fn new(cluster: impl Into<String>, store: Arc<dyn ClusterStore>) -> Self {
        ClusterAdmin {
            cluster: cluster.into(),
            store,
        }
    }

    /// Store a state-model definition.
    pub async fn add_state_model_def(&self, def: &StateModelDefinition) -> Result<()> {
        self.store
            .write(
                &paths::state_model_def(&self.cluster, def.name()),
                def.to_record(),
                None,
            )
            .await?;
        Ok(())
    }

    /// Store a per-node configuration record.
    pub async fn add_instance_config(&self, config: InstanceConfig) -> Result<()> {
        let node = config.node().to_string();
        self.store
            .write(
                &paths::instance_config(&self.cluster, &node),
                config.into_record(),
                None,
            )
            .await?;
        Ok(())
    }

    /// Create a resource: computes a seeded placement over `nodes` and
    /// writes the resulting policy.
    pub async fn add_resource(
        &self,
        resource: &str,
        nodes: &[String],
        partitions: usize,
        replicas: usize,
        state_model: &str,
        seed: u64,
    ) -> Result<()> {
        let placements =
            placement::compute_placement(nodes, partitions, replicas, resource, seed)?;

        let mut ideal = IdealState::new(
            resource,
            partitions,
            replicas,
            state_model,
            RebalanceMode::Auto,
        );
        for (partition, assignment) in placements {
            ideal.set_preference_list(partition, assignment.preference_list);
        }
        self.store
            .write(
                &paths::placement(&self.cluster, resource),
                ideal.into_record(),
                None,
            )
            .await?;
        info!(resource, partitions, replicas, "resource added");
        Ok(())
    }

    /// Write a customized-mode placement policy as-is.
    pub async fn add_customized_resource(
        &self,
        resource: &str,
        state_model: &str,
        partition_maps: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<()> {
        let mut ideal = IdealState::new(
            resource,
            partition_maps.len(),
            0,
            state_model,
            RebalanceMode::Customized,
        );
        for (partition, map) in partition_maps {
            ideal.set_instance_state_map(partition, map);
        }
        self.store
            .write(
                &paths::placement(&self.cluster, resource),
                ideal.into_record(),
                None,
            )
            .await?;
        Ok(())
    }

    /// Broadcast a message to every instance matched by `criteria`. The
    /// `template` supplies everything but the target fields; one copy per
    /// matched instance lands on that instance's queue. Returns the number
    /// of messages sent.
    pub async fn add_message(&self, criteria: &Criteria, template: &Message) -> Result<usize> {
        let mut snapshot = ClusterSnapshot::new(&self.cluster);
        snapshot.refresh(self.store.as_ref()).await?;

        let rows = criteria::evaluate(criteria, &snapshot);
        let mut sent = 0;
        for row in &rows {
            let Some(live) = snapshot.live_instance(&row.instance) else {
                continue;
            };
            // Fresh id per copy; the template's id is never reused.
            let mut record = template.record().clone();
            record.set_id(uuid::Uuid::new_v4().to_string());
            let mut message = Message::from_record(record);
            message.set_target(&row.instance);
            message.set_target_session(live.session_id());
            self.store
                .write(
                    &paths::message(&self.cluster, &row.instance, message.id()),
                    message.into_record(),
                    None,
                )
                .await?;
            sent += 1;
        }
        info!(sent, "broadcast messages delivered");
        Ok(sent)
    }

    /// Read-only projection of a node's observed state under its current
    /// session, keyed by resource.
    pub async fn observed_state(&self, node: &str) -> Result<Vec<CurrentState>> {
        let live = self
            .store
            .read(&paths::live_instance(&self.cluster, node))
            .await?
            .ok_or_else(|| OrchestratorError::Config(format!("node {node} is not live")))?;
        let live = crate::model::LiveInstance::from_record(live.record);
        let session = live.session_id();

        let mut states = Vec::new();
        for resource in self
            .store
            .list_children(&paths::observed_session_root(&self.cluster, node, session))
            .await?
        {
            if let Some(read) = self
                .store
                .read(&paths::observed_state(&self.cluster, node, session, &resource))
                .await?
            {
                states.push(CurrentState::from_record(read.record));
            }
        }
        Ok(states)
    }

    /// Force a partition that sits in the error state back toward its
    /// initial state.
    ///
    /// Routed through the normal transition-message path, so the owning
    /// node's executor applies it with full rollback and statistics
    /// semantics; this is not a store-level overwrite.
    pub async fn reset_partition(&self, resource: &str, partition: &str) -> Result<usize> {
        let mut snapshot = ClusterSnapshot::new(&self.cluster);
        snapshot.refresh(self.store.as_ref()).await?;

        let ideal = snapshot.placement_for(resource).ok_or_else(|| {
            OrchestratorError::Config(format!("unknown resource {resource}"))
        })?;
        let model_name = ideal.state_model_def_ref()?.to_string();
        let def = snapshot.state_model_def(&model_name).ok_or_else(|| {
            OrchestratorError::Config(format!("no state model definition for {model_name}"))
        })?;
        let initial = def.initial_state().to_string();

        // Find live replicas reporting ERROR for this partition.
        let rows = criteria::evaluate(
            &Criteria {
                instance: String::new(),
                resource: resource.to_string(),
                partition: partition.to_string(),
                state: ERROR_STATE.to_string(),
                scope: Default::default(),
            },
            &snapshot,
        );

        let mut sent = 0;
        for row in rows {
            let Some(live) = snapshot.live_instance(&row.instance) else {
                continue;
            };
            let message = Message::state_transition(
                "admin",
                &row.instance,
                live.session_id(),
                resource,
                partition,
                ERROR_STATE,
                &initial,
                &model_name,
            );
            self.store
                .write(
                    &paths::message(&self.cluster, &row.instance, message.id()),
                    message.into_record(),
                    None,
                )
                .await?;
            sent += 1;
        }
        info!(resource, partition, sent, "partition reset requested");
        Ok(sent)
    }
}
