//! Audit trail for the TremorSense session agent.
//!
//! Counts what the agent ingested, rejected, summarized and sent for
//! analysis, so a user can check what happened to their recordings.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditEvent, AuditLog, AuditStats,
    SharedAuditLog,
};
