//! Centralized configuration constants.
//!
//! Consolidates magic values used across the controller and participant so
//! they can be updated consistently and their rationale documented in one
//! place.

/// Name used to look up a factory when a message does not specify one.
pub const DEFAULT_FACTORY_NAME: &str = "DEFAULT";

/// Distinguished state a partition replica is forced into when its
/// transition logic fails. Every state model accepts it implicitly.
pub const ERROR_STATE: &str = "ERROR";

/// Terminal state for replicas removed from a resource; reaching it frees
/// the replica's in-memory state machine.
pub const DROPPED_STATE: &str = "DROPPED";

/// Upper bound of concurrently executing transition tasks per participant.
///
/// Tasks for distinct partitions run in parallel up to this cap; tasks for
/// the same partition serialize on the partition lock regardless.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 40;

/// Window over which controller trigger events are coalesced before a
/// pipeline run. Bursts of store changes (e.g. a node joining and writing
/// several records) produce a single run.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Replica count marker meaning "one replica per live node".
pub const REPLICAS_ANY: &str = "ANY";

/// Per-state bound marker meaning "exactly the resource's replica count".
pub const BOUND_REPLICA_COUNT: &str = "R";

/// Per-state bound marker meaning "unbounded" (every remaining node).
pub const BOUND_UNBOUNDED: &str = "N";

/// Maximum attempts for a coordination-store write before the operation is
/// reported as a persistence failure.
pub const DEFAULT_STORE_WRITE_ATTEMPTS: usize = 3;
