//! Read-once snapshot of cluster facts.
//!
//! One pipeline run performs exactly one coherent read of the coordination
//! store, and every later stage reads exclusively from the resulting
//! [`ClusterSnapshot`]. The store is mutated concurrently by participants
//! and peers, but a run never observes a mix of old and new facts beyond
//! what one read pass can see.
//!
//! Lookups return empty/absent rather than failing when data is missing: a
//! node with no pending messages is an empty queue, not an error. Only an
//! unreachable store fails [`ClusterSnapshot::refresh`].

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{
    CurrentState, IdealState, InstanceConfig, LiveInstance, Message, StateModelDefinition,
};
use crate::store::{ClusterStore, paths};

/// Per-pipeline-run snapshot of all relevant cluster facts.
#[derive(Default)]
pub struct ClusterSnapshot {
    cluster: String,
    ideal_states: HashMap<String, IdealState>,
    live_instances: HashMap<String, LiveInstance>,
    instance_configs: HashMap<String, InstanceConfig>,
    state_model_defs: HashMap<String, StateModelDefinition>,
    /// node -> pending (undeleted) messages.
    messages: HashMap<String, Vec<Message>>,
    /// (node, session) -> resource -> observed state.
    current_states: HashMap<(String, String), HashMap<String, CurrentState>>,
}

impl ClusterSnapshot {
    pub fn new(cluster: impl Into<String>) -> Self {
        ClusterSnapshot {
            cluster: cluster.into(),
            ..Default::default()
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// One coherent read of placement policies, live membership, state-model
    /// definitions, instance configs, pending messages, and observed state.
    ///
    /// Fails only when the store itself is unreachable; individually missing
    /// or malformed records are logged and skipped.
    pub async fn refresh(&mut self, store: &dyn ClusterStore) -> Result<()> {
        let cluster = self.cluster.clone();

        self.ideal_states.clear();
        for resource in store.list_children(&paths::placement_root(&cluster)).await? {
            if let Some(read) = store.read(&paths::placement(&cluster, &resource)).await? {
                self.ideal_states
                    .insert(resource, IdealState::from_record(read.record));
            }
        }

        self.live_instances.clear();
        for node in store.list_children(&paths::live_root(&cluster)).await? {
            if let Some(read) = store.read(&paths::live_instance(&cluster, &node)).await? {
                self.live_instances
                    .insert(node, LiveInstance::from_record(read.record));
            }
        }

        self.instance_configs.clear();
        for node in store
            .list_children(&paths::instance_config_root(&cluster))
            .await?
        {
            if let Some(read) = store.read(&paths::instance_config(&cluster, &node)).await? {
                self.instance_configs
                    .insert(node, InstanceConfig::from_record(read.record));
            }
        }

        self.state_model_defs.clear();
        for name in store
            .list_children(&paths::state_model_def_root(&cluster))
            .await?
        {
            if let Some(read) = store.read(&paths::state_model_def(&cluster, &name)).await? {
                match StateModelDefinition::from_record(&read.record) {
                    Ok(def) => {
                        self.state_model_defs.insert(name, def);
                    }
                    Err(e) => warn!(name, error = %e, "skipping malformed state model definition"),
                }
            }
        }

        self.messages.clear();
        self.current_states.clear();
        let nodes: Vec<String> = self.live_instances.keys().cloned().collect();
        for node in nodes {
            let mut pending = Vec::new();
            for id in store
                .list_children(&paths::message_queue(&cluster, &node))
                .await?
            {
                if let Some(read) = store.read(&paths::message(&cluster, &node, &id)).await? {
                    pending.push(Message::from_record(read.record));
                }
            }
            self.messages.insert(node.clone(), pending);

            for session in store
                .list_children(&paths::observed_node_root(&cluster, &node))
                .await?
            {
                let mut per_resource = HashMap::new();
                for resource in store
                    .list_children(&paths::observed_session_root(&cluster, &node, &session))
                    .await?
                {
                    if let Some(read) = store
                        .read(&paths::observed_state(&cluster, &node, &session, &resource))
                        .await?
                    {
                        per_resource.insert(resource, CurrentState::from_record(read.record));
                    }
                }
                self.current_states
                    .insert((node.clone(), session), per_resource);
            }
        }

        debug!(
            cluster = %self.cluster,
            resources = self.ideal_states.len(),
            live = self.live_instances.len(),
            "snapshot refreshed"
        );
        Ok(())
    }

    pub fn placement_for(&self, resource: &str) -> Option<&IdealState> {
        self.ideal_states.get(resource)
    }

    pub fn ideal_states(&self) -> impl Iterator<Item = (&str, &IdealState)> {
        self.ideal_states.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn live_instance(&self, node: &str) -> Option<&LiveInstance> {
        self.live_instances.get(node)
    }

    pub fn live_instances(&self) -> impl Iterator<Item = &LiveInstance> {
        self.live_instances.values()
    }

    pub fn live_node_count(&self) -> usize {
        self.live_instances.len()
    }

    /// Whether a node is live and not administratively disabled.
    pub fn is_node_assignable(&self, node: &str) -> bool {
        self.live_instances.contains_key(node)
            && self
                .instance_configs
                .get(node)
                .map(InstanceConfig::enabled)
                .unwrap_or(true)
    }

    pub fn state_model_def(&self, name: &str) -> Option<&StateModelDefinition> {
        self.state_model_defs.get(name)
    }

    /// Pending messages for a node; empty when none.
    pub fn messages_for(&self, node: &str) -> &[Message] {
        self.messages.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Observed state for (node, session), keyed by resource. Empty when the
    /// node has written nothing under that session.
    pub fn observed_state_for(
        &self,
        node: &str,
        session: &str,
    ) -> impl Iterator<Item = (&str, &CurrentState)> {
        self.current_states
            .get(&(node.to_string(), session.to_string()))
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }
}
