//! Preflight gateway: pushes run readiness checklists derived from a Redis
//! hash to WebSocket subscribers, re-reading the hash on every keyspace
//! event for the run's key.

pub mod checklist;
pub mod push;
