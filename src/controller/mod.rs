//! Controller side: snapshot cache, placement calculator, rebalance
//! pipeline, criteria evaluator, and the trigger loop tying them together.
//!
//! One controller instance manages one cluster; multiple clusters run as
//! independent instances with no shared memory. The controller listens for
//! relevant coordination-store changes (membership, placement, observed
//! state, message completion), coalesces bursts over a debounce window, and
//! re-runs the pipeline against a fresh snapshot on each trigger.

pub mod cache;
pub mod criteria;
pub mod placement;
pub mod stages;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::metrics::PIPELINE_RUNS_TOTAL;
use crate::store::{ChangeEvent, ClusterStore};
use cache::ClusterSnapshot;
use stages::{PipelineContext, Stage};

/// The controller: computes placement policy vs. observed state and emits
/// transition messages.
pub struct Controller {
    config: ControllerConfig,
    store: Arc<dyn ClusterStore>,
    stages: Vec<Box<dyn Stage>>,
}

impl Controller {
    /// Create a controller with the standard six-stage pipeline.
    pub fn new(config: ControllerConfig, store: Arc<dyn ClusterStore>) -> Result<Self> {
        config.validate()?;
        let stages = stages::default_stages(Arc::clone(&store));
        Ok(Controller {
            config,
            store,
            stages,
        })
    }

    /// Run one full pipeline pass against a fresh snapshot.
    pub async fn run_once(&self) -> Result<()> {
        let mut snapshot = ClusterSnapshot::new(&self.config.cluster);
        if let Err(e) = snapshot.refresh(self.store.as_ref()).await {
            PIPELINE_RUNS_TOTAL
                .with_label_values(&[&self.config.cluster, "store_unavailable"])
                .inc();
            return Err(e);
        }

        let mut ctx = PipelineContext::new(&snapshot, &self.config.controller_name);
        match stages::run_stages(&self.stages, &mut ctx).await {
            Ok(()) => {
                PIPELINE_RUNS_TOTAL
                    .with_label_values(&[&self.config.cluster, "ok"])
                    .inc();
                Ok(())
            }
            Err(e) => {
                PIPELINE_RUNS_TOTAL
                    .with_label_values(&[&self.config.cluster, "failed"])
                    .inc();
                Err(e)
            }
        }
    }

    /// Event loop: run once at startup, then once per debounced batch of
    /// relevant store changes. Runs until the store's event channel closes.
    pub async fn run(&self) {
        info!(cluster = %self.config.cluster, "controller starting");
        let mut events = self.store.subscribe();

        if let Err(e) = self.run_once().await {
            error!(error = %e, "initial pipeline run failed, awaiting next trigger");
        }

        loop {
            match events.recv().await {
                Ok(event) if self.is_relevant(&event) => {
                    // Coalesce the burst: wait out the debounce window and
                    // drain whatever else arrived.
                    tokio::time::sleep(self.config.debounce).await;
                    while let Ok(more) = events.try_recv() {
                        let _ = more;
                    }
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "pipeline run failed, awaiting next trigger");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // Missed events are equivalent to a trigger: re-read
                    // everything from a fresh snapshot.
                    warn!(skipped, "event stream lagged, forcing pipeline run");
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "pipeline run failed, awaiting next trigger");
                    }
                }
                Err(RecvError::Closed) => {
                    info!("store event stream closed, controller stopping");
                    return;
                }
            }
        }
    }

    /// Membership, placement, observed-state, and message-queue changes
    /// trigger a run; everything else (config edits, other clusters) is
    /// ignored.
    fn is_relevant(&self, event: &ChangeEvent) -> bool {
        let cluster = &self.config.cluster;
        [
            format!("/{cluster}/live/"),
            format!("/{cluster}/placement/"),
            format!("/{cluster}/observed/"),
            format!("/{cluster}/messages/"),
        ]
        .iter()
        .any(|prefix| event.path.starts_with(prefix.as_str()))
    }
}
