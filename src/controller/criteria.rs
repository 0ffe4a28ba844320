//! Message addressing via criteria matching.
//!
//! A [`Criteria`] names an instance/resource/partition/state pattern, where
//! an empty component matches everything and a non-empty component matches
//! by exact string comparison, deliberately not regular expressions and not
//! a query language. Evaluation is restricted to currently live instances.
//!
//! Used by the pipeline's task-assignment stage and by ad-hoc operator
//! broadcasts ([`crate::admin::ClusterAdmin::add_message`]).

use std::collections::BTreeSet;

use crate::controller::cache::ClusterSnapshot;

/// Which records the evaluator scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CriteriaScope {
    /// All currently live instances and their observed state.
    #[default]
    LiveInstances,
}

/// A targeting criterion. Empty string = wildcard.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub instance: String,
    pub resource: String,
    pub partition: String,
    pub state: String,
    pub scope: CriteriaScope,
}

impl Criteria {
    pub fn for_instance(instance: impl Into<String>) -> Self {
        Criteria {
            instance: instance.into(),
            ..Default::default()
        }
    }
}

/// One concrete match produced by evaluation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CriteriaRow {
    pub instance: String,
    pub resource: String,
    pub partition: String,
    pub state: String,
}

fn matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == value
}

/// Resolve a criterion to the distinct, sorted set of matching rows.
pub fn evaluate(criteria: &Criteria, snapshot: &ClusterSnapshot) -> Vec<CriteriaRow> {
    let CriteriaScope::LiveInstances = criteria.scope;

    let mut rows = BTreeSet::new();
    for live in snapshot.live_instances() {
        if !matches(&criteria.instance, live.node()) {
            continue;
        }

        let wants_replicas = !criteria.resource.is_empty()
            || !criteria.partition.is_empty()
            || !criteria.state.is_empty();
        if !wants_replicas {
            // Instance-level addressing: one row per live instance.
            rows.insert(CriteriaRow {
                instance: live.node().to_string(),
                resource: String::new(),
                partition: String::new(),
                state: String::new(),
            });
            continue;
        }

        for (resource, current) in snapshot.observed_state_for(live.node(), live.session_id()) {
            if !matches(&criteria.resource, resource) {
                continue;
            }
            for (partition, state) in current.partition_states() {
                if matches(&criteria.partition, partition) && matches(&criteria.state, state) {
                    rows.insert(CriteriaRow {
                        instance: live.node().to_string(),
                        resource: resource.to_string(),
                        partition: partition.to_string(),
                        state: state.to_string(),
                    });
                }
            }
        }
    }
    rows.into_iter().collect()
}
