//! Participant side: liveness registration, message-queue watching, and the
//! state-machine execution engine driving partition transitions.

pub mod engine;
pub mod executor;
pub mod state_model;

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ParticipantConfig;
use crate::error::Result;
use crate::model::{LiveInstance, Message};
use crate::store::{ChangeKind, ClusterStore, paths};
use engine::StateMachineEngine;
use executor::TransitionExecutor;
use state_model::StateModelFactory;

/// A participant node: hosts partition replicas and executes the transition
/// messages addressed to it.
pub struct Participant {
    config: ParticipantConfig,
    store: Arc<dyn ClusterStore>,
    engine: Arc<StateMachineEngine>,
    executor: Arc<TransitionExecutor>,
    session: String,
    /// Message ids currently being executed, so a watch event racing the
    /// initial queue scan cannot double-run a message.
    in_flight: Arc<DashSet<String>>,
}

impl Participant {
    /// Announce presence under a fresh session and build the execution
    /// engine for it. Reconnecting after a session loss means calling this
    /// again, which mints a new session token.
    pub async fn connect(
        config: ParticipantConfig,
        store: Arc<dyn ClusterStore>,
    ) -> Result<Participant> {
        config.validate()?;
        let session = Uuid::new_v4().to_string();

        let live = LiveInstance::new(&config.node, &session);
        store
            .write(
                &paths::live_instance(&config.cluster, &config.node),
                live.into_record(),
                None,
            )
            .await?;

        let engine = Arc::new(StateMachineEngine::new(
            &config.cluster,
            &config.node,
            Arc::clone(&store),
        ));
        let executor = Arc::new(TransitionExecutor::new(
            &config.cluster,
            &config.node,
            &session,
            Arc::clone(&store),
            Arc::clone(&engine),
            config.worker_pool_size,
        ));

        info!(node = %config.node, session = %session, "participant connected");
        Ok(Participant {
            config,
            store,
            engine,
            executor,
            session,
            in_flight: Arc::new(DashSet::new()),
        })
    }

    pub fn node(&self) -> &str {
        &self.config.node
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn engine(&self) -> &Arc<StateMachineEngine> {
        &self.engine
    }

    pub fn executor(&self) -> &Arc<TransitionExecutor> {
        &self.executor
    }

    /// Register a state-model factory under the default factory name.
    pub async fn register_factory(&self, factory: Arc<dyn StateModelFactory>) -> Result<()> {
        self.engine
            .register_factory(crate::constants::DEFAULT_FACTORY_NAME, factory, &self.session)
            .await
    }

    /// Register a state-model factory under an explicit factory name.
    pub async fn register_named_factory(
        &self,
        factory_name: &str,
        factory: Arc<dyn StateModelFactory>,
    ) -> Result<()> {
        self.engine
            .register_factory(factory_name, factory, &self.session)
            .await
    }

    /// Watch this node's message queue and execute everything that arrives.
    /// Runs until the store's event channel closes.
    pub async fn run(&self) {
        let queue_prefix = format!(
            "{}/",
            paths::message_queue(&self.config.cluster, &self.config.node)
        );
        let mut events = self.store.subscribe();

        // Messages may already be waiting from before we subscribed.
        self.drain_queue().await;

        loop {
            match events.recv().await {
                Ok(event)
                    if event.kind != ChangeKind::Deleted
                        && event.path.starts_with(&queue_prefix) =>
                {
                    self.drain_queue().await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, re-scanning message queue");
                    self.drain_queue().await;
                }
                Err(RecvError::Closed) => {
                    info!(node = %self.config.node, "store event stream closed, participant stopping");
                    return;
                }
            }
        }
    }

    /// Read every pending message and hand the new ones to the executor.
    pub async fn drain_queue(&self) {
        let queue = paths::message_queue(&self.config.cluster, &self.config.node);
        let ids = match self.store.list_children(&queue).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list message queue");
                return;
            }
        };

        for id in ids {
            if !self.in_flight.insert(id.clone()) {
                continue;
            }
            let path = paths::message(&self.config.cluster, &self.config.node, &id);
            let read = match self.store.read(&path).await {
                Ok(Some(read)) => read,
                Ok(None) => {
                    self.in_flight.remove(&id);
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read message");
                    self.in_flight.remove(&id);
                    continue;
                }
            };

            let mut message = Message::from_record(read.record);
            message.mark_read();

            // Messages addressed to a previous incarnation of this node are
            // acked without execution; their transitions belong to a session
            // whose replicas no longer exist.
            if let Some(target_session) = message.target_session() {
                if !target_session.is_empty() && target_session != self.session {
                    warn!(
                        message = message.id(),
                        target_session,
                        "dropping message addressed to stale session"
                    );
                    let _ = self.store.delete(&path).await;
                    self.in_flight.remove(&id);
                    continue;
                }
            }

            let in_flight = Arc::clone(&self.in_flight);
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                // The executor claims a pool slot and deletes the message
                // as its acknowledgment; only then may the id re-enter a
                // queue scan (it won't, because it is gone).
                if let Err(e) = executor.run_on_pool(message).await {
                    if e.is_expected() {
                        tracing::debug!(error = %e, "transition task rejected");
                    } else {
                        tracing::error!(error = %e, "transition task failed");
                    }
                }
                in_flight.remove(&id);
            });
        }
    }

    /// Remove this node's liveness record and reset all in-memory state
    /// machines. Persisted observed state is left for the controller to
    /// fence out by session.
    pub async fn disconnect(&self) -> Result<()> {
        self.store
            .delete(&paths::live_instance(&self.config.cluster, &self.config.node))
            .await?;
        self.engine.reset().await;
        info!(node = %self.config.node, "participant disconnected");
        Ok(())
    }
}
