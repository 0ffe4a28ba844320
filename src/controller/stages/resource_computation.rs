//! Stage 1: enumerate resources requiring rebalancing.

use async_trait::async_trait;
use tracing::warn;

use super::{PipelineContext, Stage};
use crate::error::Result;

pub struct ResourceComputationStage;

#[async_trait]
impl Stage for ResourceComputationStage {
    fn name(&self) -> &'static str {
        "resource_computation"
    }

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()> {
        for (resource, ideal) in ctx.snapshot.ideal_states() {
            // A malformed policy only skips its own resource; other
            // resources keep rebalancing.
            if let Err(e) = ideal.partition_count() {
                warn!(resource, error = %e, "skipping resource with malformed placement policy");
                continue;
            }
            if ideal.state_model_def_ref().is_err() {
                warn!(resource, "skipping resource without state model reference");
                continue;
            }
            ctx.resources.insert(resource.to_string(), ideal.clone());
        }
        Ok(())
    }
}
