//! State-model definitions.
//!
//! A definition names the states a partition replica can be in (in priority
//! order, each with an occupancy bound), the initial state, and the legal
//! single-hop transitions (in priority order). From the transition set a
//! next-hop table is precomputed at build time: for any (from, target) pair
//! it yields the single next state on the shortest legal path, which is what
//! the pipeline's message generation uses; a message never jumps more than
//! one hop.
//!
//! Transition priority matters twice: it breaks ties between equal-length
//! paths in the next-hop table, and it orders candidate selection per
//! partition so that demotions are considered before the promotions they
//! unblock.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::constants::{BOUND_REPLICA_COUNT, BOUND_UNBOUNDED, ERROR_STATE};
use crate::error::{OrchestratorError, Result};
use crate::record::Record;

const INITIAL_STATE: &str = "INITIAL_STATE";
const STATE_PRIORITY_LIST: &str = "STATE_PRIORITY_LIST";
const TRANSITION_PRIORITY_LIST: &str = "TRANSITION_PRIORITY_LIST";
const STATE_COUNT: &str = "count";

/// Upper bound on how many replicas of one partition may hold a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBound {
    /// At most this many holders (e.g. exactly one primary).
    Exact(usize),
    /// As many holders as the resource's replica count.
    ReplicaCount,
    /// No bound.
    Unbounded,
}

impl StateBound {
    pub fn as_str(&self) -> String {
        match self {
            StateBound::Exact(n) => n.to_string(),
            StateBound::ReplicaCount => BOUND_REPLICA_COUNT.to_string(),
            StateBound::Unbounded => BOUND_UNBOUNDED.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            BOUND_REPLICA_COUNT => Ok(StateBound::ReplicaCount),
            BOUND_UNBOUNDED | "-1" => Ok(StateBound::Unbounded),
            n => n
                .parse()
                .map(StateBound::Exact)
                .map_err(|_| OrchestratorError::Config(format!("invalid state bound: {n}"))),
        }
    }

    /// Concrete holder limit for a partition with `replica_count` replicas.
    pub fn resolve(&self, replica_count: usize) -> usize {
        match self {
            StateBound::Exact(n) => *n,
            StateBound::ReplicaCount => replica_count,
            StateBound::Unbounded => usize::MAX,
        }
    }
}

/// A named finite state machine governing a partition replica's lifecycle.
#[derive(Debug, Clone)]
pub struct StateModelDefinition {
    name: String,
    /// Priority-ordered (highest first) states with their bounds.
    states: Vec<(String, StateBound)>,
    initial_state: String,
    /// Priority-ordered legal transitions.
    transitions: Vec<(String, String)>,
    /// (from, target) -> next state on the shortest legal path.
    next_hop: HashMap<(String, String), String>,
}

impl StateModelDefinition {
    pub fn builder(name: impl Into<String>) -> StateModelDefinitionBuilder {
        StateModelDefinitionBuilder {
            name: name.into(),
            states: Vec::new(),
            initial_state: None,
            transitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// States in priority order, highest first.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|(s, _)| s.as_str())
    }

    pub fn has_state(&self, state: &str) -> bool {
        state == ERROR_STATE || self.states.iter().any(|(s, _)| s == state)
    }

    pub fn state_bound(&self, state: &str) -> StateBound {
        self.states
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, b)| *b)
            .unwrap_or(StateBound::Unbounded)
    }

    /// Position of a state in the priority list; lower is higher priority.
    pub fn state_priority(&self, state: &str) -> usize {
        self.states
            .iter()
            .position(|(s, _)| s == state)
            .unwrap_or(usize::MAX)
    }

    pub fn is_legal_transition(&self, from: &str, to: &str) -> bool {
        self.transitions.iter().any(|(f, t)| f == from && t == to)
    }

    /// All legal transitions in priority order.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.transitions.iter().map(|(f, t)| (f.as_str(), t.as_str()))
    }

    /// Position of a transition in the priority list; lower is higher
    /// priority. Unknown transitions sort last.
    pub fn transition_priority(&self, from: &str, to: &str) -> usize {
        self.transitions
            .iter()
            .position(|(f, t)| f == from && t == to)
            .unwrap_or(usize::MAX)
    }

    /// The single next state on the path from `from` toward `target`, if
    /// `target` is reachable.
    pub fn next_state(&self, from: &str, target: &str) -> Option<&str> {
        if from == target {
            return None;
        }
        self.next_hop
            .get(&(from.to_string(), target.to_string()))
            .map(String::as_str)
    }

    /// Serialize for storage at `/{cluster}/stateModelDefs/{name}`.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(&self.name);
        record.set_simple_field(INITIAL_STATE, &self.initial_state);
        record.set_list_field(
            STATE_PRIORITY_LIST,
            self.states.iter().map(|(s, _)| s.clone()).collect(),
        );
        // Transitions flatten to alternating from/to entries; any single
        // delimiter could collide with a state name that contains it.
        let mut transition_entries = Vec::with_capacity(self.transitions.len() * 2);
        for (from, to) in &self.transitions {
            transition_entries.push(from.clone());
            transition_entries.push(to.clone());
        }
        record.set_list_field(TRANSITION_PRIORITY_LIST, transition_entries);
        for (state, bound) in &self.states {
            let mut meta = BTreeMap::new();
            meta.insert(STATE_COUNT.to_string(), bound.as_str());
            record.set_map_field(state.clone(), meta);
        }
        record
    }

    pub fn from_record(record: &Record) -> Result<Self> {
        let name = record.id().to_string();
        let initial = record
            .simple_field(INITIAL_STATE)
            .ok_or_else(|| {
                OrchestratorError::Config(format!("state model {name}: missing initial state"))
            })?
            .to_string();

        let mut builder = StateModelDefinition::builder(&name).initial_state(&initial);
        for state in record.list_field(STATE_PRIORITY_LIST).unwrap_or(&[]) {
            let bound = record
                .map_field(state)
                .and_then(|meta| meta.get(STATE_COUNT))
                .map(|raw| StateBound::parse(raw))
                .transpose()?
                .unwrap_or(StateBound::Unbounded);
            builder = builder.add_state(state, bound);
        }
        let transition_entries = record.list_field(TRANSITION_PRIORITY_LIST).unwrap_or(&[]);
        if transition_entries.len() % 2 != 0 {
            return Err(OrchestratorError::Config(format!(
                "state model {name}: transition list has a dangling entry"
            )));
        }
        for pair in transition_entries.chunks_exact(2) {
            builder = builder.add_transition(&pair[0], &pair[1]);
        }
        builder.build()
    }

    /// Primary/secondary replication model: one primary per partition,
    /// replica-count secondaries, recovery path out of ERROR.
    pub fn primary_secondary() -> Self {
        StateModelDefinition::builder("PrimarySecondary")
            .add_state("PRIMARY", StateBound::Exact(1))
            .add_state("SECONDARY", StateBound::ReplicaCount)
            .add_state("OFFLINE", StateBound::Unbounded)
            .add_state("DROPPED", StateBound::Unbounded)
            .initial_state("OFFLINE")
            .add_transition("PRIMARY", "SECONDARY")
            .add_transition("SECONDARY", "PRIMARY")
            .add_transition("OFFLINE", "SECONDARY")
            .add_transition("SECONDARY", "OFFLINE")
            .add_transition("OFFLINE", "DROPPED")
            .add_transition(ERROR_STATE, "OFFLINE")
            .build()
            .expect("built-in definition is valid")
    }

    /// Two-state model for unreplicated resources.
    pub fn online_offline() -> Self {
        StateModelDefinition::builder("OnlineOffline")
            .add_state("ONLINE", StateBound::ReplicaCount)
            .add_state("OFFLINE", StateBound::Unbounded)
            .add_state("DROPPED", StateBound::Unbounded)
            .initial_state("OFFLINE")
            .add_transition("OFFLINE", "ONLINE")
            .add_transition("ONLINE", "OFFLINE")
            .add_transition("OFFLINE", "DROPPED")
            .add_transition(ERROR_STATE, "OFFLINE")
            .build()
            .expect("built-in definition is valid")
    }
}

/// Builder for [`StateModelDefinition`].
pub struct StateModelDefinitionBuilder {
    name: String,
    states: Vec<(String, StateBound)>,
    initial_state: Option<String>,
    transitions: Vec<(String, String)>,
}

impl StateModelDefinitionBuilder {
    /// Add a state. Call order defines priority, highest first.
    pub fn add_state(mut self, state: impl Into<String>, bound: StateBound) -> Self {
        self.states.push((state.into(), bound));
        self
    }

    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Add a legal transition. Call order defines transition priority.
    pub fn add_transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions.push((from.into(), to.into()));
        self
    }

    pub fn build(self) -> Result<StateModelDefinition> {
        let initial = self.initial_state.ok_or_else(|| {
            OrchestratorError::Config(format!("state model {}: no initial state", self.name))
        })?;
        let known = |s: &str| s == ERROR_STATE || self.states.iter().any(|(st, _)| st == s);
        if !known(&initial) {
            return Err(OrchestratorError::Config(format!(
                "state model {}: initial state {initial} is not declared",
                self.name
            )));
        }
        for (from, to) in &self.transitions {
            if !known(from) || !known(to) {
                return Err(OrchestratorError::Config(format!(
                    "state model {}: transition {from}->{to} references undeclared state",
                    self.name
                )));
            }
        }

        let next_hop = compute_next_hops(&self.states, &self.transitions);
        Ok(StateModelDefinition {
            name: self.name,
            states: self.states,
            initial_state: initial,
            transitions: self.transitions,
            next_hop,
        })
    }
}

/// Breadth-first search over the legal-transition graph, producing the first
/// hop of a shortest path for every reachable (from, target) pair. Neighbor
/// order follows transition priority, so ties resolve deterministically.
fn compute_next_hops(
    states: &[(String, StateBound)],
    transitions: &[(String, String)],
) -> HashMap<(String, String), String> {
    let mut all_states: Vec<&str> = states.iter().map(|(s, _)| s.as_str()).collect();
    if !all_states.contains(&ERROR_STATE) {
        all_states.push(ERROR_STATE);
    }

    let mut table = HashMap::new();
    for &from in &all_states {
        // BFS from `from`; record predecessor edges.
        let mut prev: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for (f, t) in transitions {
                if f == current && t != from && !prev.contains_key(t.as_str()) {
                    prev.insert(t, current);
                    queue.push_back(t);
                }
            }
        }
        for (&target, _) in &prev {
            // Walk back from target to the hop adjacent to `from`.
            let mut hop = target;
            while prev[hop] != from {
                hop = prev[hop];
            }
            table.insert((from.to_string(), target.to_string()), hop.to_string());
        }
    }
    table
}
