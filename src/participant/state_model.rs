//! State-model dispatch tables and factories.
//!
//! A state model type registers an explicit mapping from (fromState,
//! toState) to a transition function, a tagged dispatch table rather than
//! name-convention lookup. The table is validated against the
//! [`StateModelDefinition`](crate::model::StateModelDefinition)'s legal
//! transitions when the factory is registered with the engine.
//!
//! One [`StateMachine`] instance exists per (resource, partition); the
//! engine wraps each in a `tokio::sync::Mutex`, which is the per-partition
//! execution lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};

/// Error type transition logic may return; wrapped into
/// [`OrchestratorError::TransitionExecution`] by the machine.
pub type TransitionResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Context handed to every transition and rollback invocation.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub resource: String,
    pub partition: String,
    pub from_state: String,
    pub to_state: String,
}

type TransitionFn<M> = Box<dyn Fn(&mut M, &TransitionContext) -> TransitionResult + Send + Sync>;
type RollbackFn<M> = Box<dyn Fn(&mut M, &TransitionContext, &OrchestratorError) + Send + Sync>;

/// Dispatch table for one state-model type `M`.
pub struct StateModelSpec<M> {
    model_name: String,
    transitions: HashMap<(String, String), TransitionFn<M>>,
    rollback: Option<RollbackFn<M>>,
}

impl<M> StateModelSpec<M> {
    pub fn new(model_name: impl Into<String>) -> Self {
        StateModelSpec {
            model_name: model_name.into(),
            transitions: HashMap::new(),
            rollback: None,
        }
    }

    /// Register the transition function for (from, to).
    pub fn on(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        f: impl Fn(&mut M, &TransitionContext) -> TransitionResult + Send + Sync + 'static,
    ) -> Self {
        self.transitions
            .insert((from.into(), to.into()), Box::new(f));
        self
    }

    /// Register the rollback hook, invoked with the error that failed a
    /// transition.
    pub fn on_rollback(
        mut self,
        f: impl Fn(&mut M, &TransitionContext, &OrchestratorError) + Send + Sync + 'static,
    ) -> Self {
        self.rollback = Some(Box::new(f));
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The (from, to) pairs this table handles.
    pub fn transition_ids(&self) -> Vec<(String, String)> {
        let mut ids: Vec<_> = self.transitions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Object-safe view of one partition's state machine.
///
/// The machine tracks the current state string; `fire` only runs the
/// transition logic; advancing the state afterwards is the executor's
/// decision, so a failed transition never half-advances.
pub trait StateMachine: Send {
    fn current_state(&self) -> &str;

    fn set_current_state(&mut self, state: &str);

    /// Run the registered transition function for (from, to).
    fn fire(&mut self, ctx: &TransitionContext) -> Result<()>;

    /// Invoke the rollback hook with the error that failed the transition.
    fn rollback(&mut self, ctx: &TransitionContext, error: &OrchestratorError);

    /// Return the machine to its initial state in memory only.
    fn reset(&mut self);
}

struct TypedStateMachine<M> {
    inner: M,
    state: String,
    initial_state: String,
    spec: Arc<StateModelSpec<M>>,
}

impl<M: Send> StateMachine for TypedStateMachine<M> {
    fn current_state(&self) -> &str {
        &self.state
    }

    fn set_current_state(&mut self, state: &str) {
        self.state = state.to_string();
    }

    fn fire(&mut self, ctx: &TransitionContext) -> Result<()> {
        let key = (ctx.from_state.clone(), ctx.to_state.clone());
        let f = self.spec.transitions.get(&key).ok_or_else(|| {
            OrchestratorError::Config(format!(
                "state model {}: no transition registered for {}->{}",
                self.spec.model_name, ctx.from_state, ctx.to_state
            ))
        })?;
        f(&mut self.inner, ctx)
            .map_err(|e| OrchestratorError::TransitionExecution(e.to_string()))
    }

    fn rollback(&mut self, ctx: &TransitionContext, error: &OrchestratorError) {
        if let Some(rollback) = &self.spec.rollback {
            rollback(&mut self.inner, ctx, error);
        }
    }

    fn reset(&mut self) {
        self.state = self.initial_state.clone();
    }
}

/// Creates one state machine per (resource, partition).
pub trait StateModelFactory: Send + Sync {
    /// The state-model name this factory serves.
    fn model_name(&self) -> &str;

    /// Transition pairs the produced machines handle; validated against the
    /// state-model definition at registration.
    fn transition_ids(&self) -> Vec<(String, String)>;

    fn create(&self, resource: &str, partition: &str, initial_state: &str)
    -> Box<dyn StateMachine>;
}

/// Factory backed by a dispatch table and a per-partition constructor
/// closure.
pub struct SpecFactory<M, F> {
    spec: Arc<StateModelSpec<M>>,
    new_model: F,
}

impl<M, F> SpecFactory<M, F>
where
    F: Fn(&str, &str) -> M,
{
    pub fn new(spec: StateModelSpec<M>, new_model: F) -> Self {
        SpecFactory {
            spec: Arc::new(spec),
            new_model,
        }
    }
}

impl<M, F> StateModelFactory for SpecFactory<M, F>
where
    M: Send + 'static,
    F: Fn(&str, &str) -> M + Send + Sync,
{
    fn model_name(&self) -> &str {
        self.spec.model_name()
    }

    fn transition_ids(&self) -> Vec<(String, String)> {
        self.spec.transition_ids()
    }

    fn create(
        &self,
        resource: &str,
        partition: &str,
        initial_state: &str,
    ) -> Box<dyn StateMachine> {
        Box::new(TypedStateMachine {
            inner: (self.new_model)(resource, partition),
            state: initial_state.to_string(),
            initial_state: initial_state.to_string(),
            spec: Arc::clone(&self.spec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        ups: usize,
    }

    fn factory() -> SpecFactory<Counter, impl Fn(&str, &str) -> Counter> {
        let spec = StateModelSpec::new("OnlineOffline")
            .on("OFFLINE", "ONLINE", |m: &mut Counter, _ctx| {
                m.ups += 1;
                Ok(())
            })
            .on("ONLINE", "OFFLINE", |_m, _ctx| Ok(()));
        SpecFactory::new(spec, |_resource, _partition| Counter { ups: 0 })
    }

    fn ctx(from: &str, to: &str) -> TransitionContext {
        TransitionContext {
            resource: "db".to_string(),
            partition: "db_0".to_string(),
            from_state: from.to_string(),
            to_state: to.to_string(),
        }
    }

    #[test]
    fn fire_runs_registered_transition() {
        let factory = factory();
        let mut machine = factory.create("db", "db_0", "OFFLINE");
        assert_eq!(machine.current_state(), "OFFLINE");
        machine.fire(&ctx("OFFLINE", "ONLINE")).unwrap();
    }

    #[test]
    fn unregistered_transition_is_config_error() {
        let factory = factory();
        let mut machine = factory.create("db", "db_0", "OFFLINE");
        let err = machine.fire(&ctx("OFFLINE", "DROPPED")).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn reset_returns_to_initial() {
        let factory = factory();
        let mut machine = factory.create("db", "db_0", "OFFLINE");
        machine.set_current_state("ONLINE");
        machine.reset();
        assert_eq!(machine.current_state(), "OFFLINE");
    }
}
