//! Transparency module for the safety sensor agent.
//!
//! Tracks what the agent has done on this device so the person being
//! monitored, or their guardian, can inspect it.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
