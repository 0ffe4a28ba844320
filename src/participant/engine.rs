//! State machine engine.
//!
//! Maintains the factory registry (state-model name → factory name →
//! factory), materializes one state-machine instance per (resource,
//! partition), caches state-model definitions read from the store, and
//! turns each inbound transition message into the task(s) the executor
//! runs. Registries are concurrent maps with insert-if-absent semantics
//! behind explicit register/lookup operations.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::state_model::{StateMachine, StateModelFactory, TransitionContext};
use crate::constants::DEFAULT_FACTORY_NAME;
use crate::error::{OrchestratorError, Result};
use crate::model::{Message, StateModelDefinition};
use crate::store::{ClusterStore, paths};

/// A state machine behind its per-partition execution lock.
pub type SharedMachine = Arc<Mutex<Box<dyn StateMachine>>>;

/// One unit of transition work, produced by the engine and consumed by the
/// executor. Batch messages expand into one task per partition.
pub struct TransitionTask {
    pub context: TransitionContext,
    pub machine: SharedMachine,
    pub def: Arc<StateModelDefinition>,
}

pub struct StateMachineEngine {
    cluster: String,
    node: String,
    store: Arc<dyn ClusterStore>,
    /// (model name, factory name) -> factory.
    factories: DashMap<(String, String), Arc<dyn StateModelFactory>>,
    /// Cached state-model definitions, fetched once per model.
    defs: DashMap<String, Arc<StateModelDefinition>>,
    /// (resource, partition) -> live state machine.
    machines: DashMap<(String, String), SharedMachine>,
}

impl StateMachineEngine {
    pub fn new(
        cluster: impl Into<String>,
        node: impl Into<String>,
        store: Arc<dyn ClusterStore>,
    ) -> Self {
        StateMachineEngine {
            cluster: cluster.into(),
            node: node.into(),
            store,
            factories: DashMap::new(),
            defs: DashMap::new(),
            machines: DashMap::new(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Register a factory for (model, factory name).
    ///
    /// Fails if the pair is already registered, if the model has no
    /// definition in the store, or if the factory's dispatch table contains
    /// a transition the definition does not allow. On success a NO_OP
    /// message is enqueued to this node's own queue, waking any pipeline
    /// waiting on state-model availability.
    pub async fn register_factory(
        &self,
        factory_name: &str,
        factory: Arc<dyn StateModelFactory>,
        session: &str,
    ) -> Result<()> {
        let model = factory.model_name().to_string();
        let def = self.resolve_def(&model).await?;

        for (from, to) in factory.transition_ids() {
            if !def.is_legal_transition(&from, &to) {
                return Err(OrchestratorError::Config(format!(
                    "factory {factory_name} for model {model} handles illegal transition {from}->{to}"
                )));
            }
        }

        let key = (model.clone(), factory_name.to_string());
        match self.factories.entry(key) {
            Entry::Occupied(_) => {
                return Err(OrchestratorError::Config(format!(
                    "factory {factory_name} already registered for model {model}"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(factory);
            }
        }

        // Wake the controller: a resource waiting on this model can now be
        // rebalanced onto this node.
        let wake = Message::no_op(&self.node, &self.node, session);
        self.store
            .write(
                &paths::message(&self.cluster, &self.node, wake.id()),
                wake.into_record(),
                None,
            )
            .await?;

        info!(model, factory = factory_name, "state model factory registered");
        Ok(())
    }

    /// Turn a STATE_TRANSITION message into executor tasks: one for a
    /// single-partition message, one per partition for a batch message.
    pub fn create_handler(&self, message: &Message) -> Result<Vec<TransitionTask>> {
        let model = message
            .state_model_def()
            .ok_or_else(|| {
                OrchestratorError::Validation(format!(
                    "message {} carries no state model reference",
                    message.id()
                ))
            })?
            .to_string();

        // Fail fast on a missing definition: configuration error, not
        // retryable. The definition was cached when the factory registered.
        let def = self.defs.get(&model).map(|d| Arc::clone(&d)).ok_or_else(|| {
            OrchestratorError::Config(format!("no state model definition cached for {model}"))
        })?;

        let factory_name = message.factory_name().unwrap_or(DEFAULT_FACTORY_NAME);
        let factory = self
            .factories
            .get(&(model.clone(), factory_name.to_string()))
            .map(|f| Arc::clone(&f))
            .ok_or_else(|| {
                OrchestratorError::Config(format!(
                    "no factory {factory_name} registered for model {model}"
                ))
            })?;

        let resource = message
            .resource()
            .ok_or_else(|| {
                OrchestratorError::Validation(format!("message {} has no resource", message.id()))
            })?
            .to_string();
        let from = message.from_state().unwrap_or("").to_string();
        let to = message.to_state().unwrap_or("").to_string();

        let partitions: Vec<String> = if message.is_batch() {
            message.batch_partitions().to_vec()
        } else {
            message.partition().map(str::to_string).into_iter().collect()
        };

        let mut tasks = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let machine =
                self.machine_for(&resource, &partition, factory.as_ref(), def.initial_state());
            tasks.push(TransitionTask {
                context: TransitionContext {
                    resource: resource.clone(),
                    partition,
                    from_state: from.clone(),
                    to_state: to.clone(),
                },
                machine,
                def: Arc::clone(&def),
            });
        }
        Ok(tasks)
    }

    /// Get or create the machine for (resource, partition), initialized to
    /// the model's initial state.
    fn machine_for(
        &self,
        resource: &str,
        partition: &str,
        factory: &dyn StateModelFactory,
        initial_state: &str,
    ) -> SharedMachine {
        let key = (resource.to_string(), partition.to_string());
        if let Some(existing) = self.machines.get(&key) {
            return Arc::clone(&existing);
        }
        let created: SharedMachine =
            Arc::new(Mutex::new(factory.create(resource, partition, initial_state)));
        match self.machines.entry(key) {
            Entry::Occupied(slot) => Arc::clone(slot.get()),
            Entry::Vacant(slot) => {
                debug!(resource, partition, "created state machine instance");
                slot.insert(Arc::clone(&created));
                created
            }
        }
    }

    /// Definition lookup with read-through caching.
    async fn resolve_def(&self, model: &str) -> Result<Arc<StateModelDefinition>> {
        if let Some(cached) = self.defs.get(model) {
            return Ok(Arc::clone(&cached));
        }
        let read = self
            .store
            .read(&paths::state_model_def(&self.cluster, model))
            .await?
            .ok_or_else(|| {
                OrchestratorError::Config(format!("no state model definition stored for {model}"))
            })?;
        let def = Arc::new(StateModelDefinition::from_record(&read.record)?);
        let entry = self
            .defs
            .entry(model.to_string())
            .or_insert_with(|| Arc::clone(&def));
        Ok(Arc::clone(&entry))
    }

    /// Reset every managed state machine back to its initial state in
    /// memory. Persisted observed state is untouched; the next pipeline run
    /// corrects it through regular transitions.
    pub async fn reset(&self) {
        for entry in self.machines.iter() {
            let mut machine = entry.value().lock().await;
            machine.reset();
        }
        info!(node = %self.node, "all state machines reset to initial state");
    }

    /// Drop the machine for a partition (the partition was dropped from the
    /// resource).
    pub fn remove_machine(&self, resource: &str, partition: &str) {
        self.machines
            .remove(&(resource.to_string(), partition.to_string()));
    }
}
