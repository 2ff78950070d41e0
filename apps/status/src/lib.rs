//! Status gateway: forwards every message published on a run's
//! `<run_id>:<channel>` Redis topic to WebSocket subscribers, verbatim,
//! wrapped in a small JSON envelope.

pub mod push;
