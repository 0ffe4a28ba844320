//! # Helmsman
//! Cluster orchestration for partitioned, replicated distributed resources.
//!
//! Helmsman runs partitioned resources (database shards, queue partitions,
//! task groups) across a fleet of nodes by driving every partition replica
//! through a declarative state machine. A controller continuously compares
//! the declared placement policy against what live nodes actually report and
//! closes the gap one legal state hop at a time; participant nodes execute
//! those hops through pluggable state-machine callbacks. All coordination
//! flows through a versioned, watchable [`store::ClusterStore`]; components
//! never talk to each other directly.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/)
//! - A storage-agnostic coordination seam, testable fully in memory
//! - Be a building block for self-managing partitioned services
//!
//! ## Getting started
//!
//! A cluster needs three roles: an admin to declare resources, a controller
//! to rebalance them, and participants to host replicas.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use helmsman::prelude::*;
//!
//! struct Replica;
//!
//! #[tokio::main]
//! async fn main() -> helmsman::error::Result<()> {
//!     let store: Arc<dyn ClusterStore> = Arc::new(MemoryStore::new());
//!
//!     // Declare the state model and a resource placed over two nodes.
//!     let admin = ClusterAdmin::new("demo", Arc::clone(&store));
//!     admin
//!         .add_state_model_def(&StateModelDefinition::primary_secondary())
//!         .await?;
//!     admin
//!         .add_resource(
//!             "db",
//!             &["n1".to_string(), "n2".to_string()],
//!             4,
//!             1,
//!             "PrimarySecondary",
//!             42,
//!         )
//!         .await?;
//!
//!     // Host replicas: transition logic is a dispatch table over (from, to).
//!     let spec = StateModelSpec::new("PrimarySecondary")
//!         .on("OFFLINE", "SECONDARY", |_m: &mut Replica, _ctx| Ok(()))
//!         .on("SECONDARY", "PRIMARY", |_m, _ctx| Ok(()))
//!         .on("PRIMARY", "SECONDARY", |_m, _ctx| Ok(()))
//!         .on("SECONDARY", "OFFLINE", |_m, _ctx| Ok(()))
//!         .on("OFFLINE", "DROPPED", |_m, _ctx| Ok(()));
//!     let factory = Arc::new(SpecFactory::new(spec, |_resource, _partition| Replica));
//!
//!     let participant = Participant::connect(
//!         ParticipantConfig::new("demo", "n1"),
//!         Arc::clone(&store),
//!     )
//!     .await?;
//!     participant.register_factory(factory).await?;
//!
//!     // Rebalance: the controller watches the store and reacts to change.
//!     let controller = Controller::new(ControllerConfig::new("demo"), Arc::clone(&store))?;
//!     tokio::spawn(async move { controller.run().await });
//!     participant.run().await;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod model;
pub mod participant;
pub mod record;
pub mod retry;
pub mod store;
pub mod telemetry;

pub mod prelude {
    //! Main export of orchestration structures.
    //!
    //! Pulls in the three cluster roles ([`ClusterAdmin`],
    //! [`Controller`](crate::controller::Controller),
    //! [`Participant`](crate::participant::Participant)), the store seam,
    //! and the state-model building blocks.
    pub use crate::admin::ClusterAdmin;
    pub use crate::config::{ControllerConfig, ParticipantConfig};
    pub use crate::controller::Controller;
    pub use crate::controller::criteria::{Criteria, CriteriaRow};
    pub use crate::error::{OrchestratorError, Result};
    pub use crate::model::{
        CurrentState, IdealState, InstanceConfig, LiveInstance, Message, MessageType,
        RebalanceMode, StateModelDefinition,
    };
    pub use crate::participant::Participant;
    pub use crate::participant::state_model::{
        SpecFactory, StateMachine, StateModelFactory, StateModelSpec, TransitionContext,
        TransitionResult,
    };
    pub use crate::record::Record;
    pub use crate::store::{ClusterStore, MemoryStore, paths};
}
