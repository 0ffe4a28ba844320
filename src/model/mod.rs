//! Typed views over [`Record`](crate::record::Record).
//!
//! Each persisted entity gets a thin wrapper that owns a `Record` and
//! exposes typed accessors keyed by a field-name enum. The wrappers never
//! validate eagerly; readers get `Option`s and decide per call site whether
//! absence is an error.

mod current_state;
mod ideal_state;
mod instance_config;
mod live_instance;
mod message;
mod state_model_def;

pub use current_state::CurrentState;
pub use ideal_state::{IdealState, RebalanceMode};
pub use instance_config::InstanceConfig;
pub use live_instance::LiveInstance;
pub use message::{Message, MessageType};
pub use state_model_def::{StateBound, StateModelDefinition, StateModelDefinitionBuilder};
