//! The rebalance pipeline.
//!
//! Ordered stages transform a [`ClusterSnapshot`] into a minimal, safe set
//! of transition messages. Each stage consumes and augments the shared
//! run-scoped [`PipelineContext`]; no stage re-reads the coordination store.
//!
//! 1. [`ResourceComputationStage`]: which resources need rebalancing.
//! 2. [`CurrentStateComputationStage`]: observed-state table, fenced by
//!    session, plus pending-message projection.
//! 3. [`BestPossibleStateStage`]: target node→state per partition.
//! 4. [`MessageGenerationStage`]: single-hop candidate messages.
//! 5. [`MessageSelectionStage`]: suppress duplicates and unsafe
//!    promotions.
//! 6. [`TaskAssignmentStage`]: persist survivors to node queues.
//!
//! A stage failure aborts the remaining stages for that run only; the next
//! trigger re-runs the whole pipeline from a fresh snapshot, so no partial
//! state is ever carried between runs.

mod best_possible;
mod current_state_computation;
mod message_generation;
mod message_selection;
mod resource_computation;
mod task_assignment;

pub use best_possible::BestPossibleStateStage;
pub use current_state_computation::CurrentStateComputationStage;
pub use message_generation::MessageGenerationStage;
pub use message_selection::MessageSelectionStage;
pub use resource_computation::ResourceComputationStage;
pub use task_assignment::TaskAssignmentStage;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::controller::cache::ClusterSnapshot;
use crate::error::Result;
use crate::model::{IdealState, Message};

/// node → state for one partition.
pub type StateMap = BTreeMap<String, String>;
/// partition → node → state for one resource.
pub type PartitionStateMap = BTreeMap<String, StateMap>;

/// Run-scoped context shared by all stages of one pipeline run.
pub struct PipelineContext<'a> {
    pub snapshot: &'a ClusterSnapshot,
    /// Name the controller writes as message source.
    pub controller: String,
    /// Resources requiring rebalancing (stage 1).
    pub resources: BTreeMap<String, IdealState>,
    /// resource → partition → node → observed state, session-fenced
    /// (stage 2).
    pub current_states: BTreeMap<String, PartitionStateMap>,
    /// (resource, partition, node) → pending message (stage 2).
    pub pending: BTreeMap<(String, String, String), Message>,
    /// resource → partition → node → target state (stage 3).
    pub best_possible: BTreeMap<String, PartitionStateMap>,
    /// Candidate messages (stage 4).
    pub candidates: Vec<Message>,
    /// Surviving messages (stage 5), persisted by stage 6.
    pub selected: Vec<Message>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(snapshot: &'a ClusterSnapshot, controller: impl Into<String>) -> Self {
        PipelineContext {
            snapshot,
            controller: controller.into(),
            resources: BTreeMap::new(),
            current_states: BTreeMap::new(),
            pending: BTreeMap::new(),
            best_possible: BTreeMap::new(),
            candidates: Vec::new(),
            selected: Vec::new(),
        }
    }
}

/// One stage of the rebalance pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()>;
}

/// Run `stages` in order against `ctx`, aborting on the first failure.
pub async fn run_stages(stages: &[Box<dyn Stage>], ctx: &mut PipelineContext<'_>) -> Result<()> {
    for stage in stages {
        debug!(stage = stage.name(), "running pipeline stage");
        if let Err(e) = stage.process(ctx).await {
            error!(stage = stage.name(), error = %e, "pipeline stage failed, aborting run");
            return Err(e);
        }
    }
    Ok(())
}

/// The standard six-stage pipeline.
pub fn default_stages(store: std::sync::Arc<dyn crate::store::ClusterStore>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ResourceComputationStage),
        Box::new(CurrentStateComputationStage),
        Box::new(BestPossibleStateStage),
        Box::new(MessageGenerationStage),
        Box::new(MessageSelectionStage),
        Box::new(TaskAssignmentStage::new(store)),
    ]
}
