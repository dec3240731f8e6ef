// Meet Commit Pipeline - Core Library
// Exposes all modules for use in the CLI and tests

pub mod audit;
pub mod cache;
pub mod category;
pub mod committers;
pub mod diff;
pub mod errors;
pub mod orchestrator;
pub mod payload;
pub mod progress;
pub mod store;
pub mod timing;

// Re-export commonly used types
pub use audit::{AuditLog, AuditScript, RunStats, ScriptOutcome};
pub use cache::KeyCache;
pub use category::{
    resolve_relay_category, resolve_relay_gender, CategoryBand, CategoryIndex, Gender,
    RELAY_TEAM_SIZE,
};
pub use committers::{Caches, CommitContext, OrdinalTracker, Ordinals};
pub use diff::{ChangeSet, Row, SqlValue};
pub use errors::{CommitError, ErrorLog, FieldError};
pub use orchestrator::{
    CommitOrchestrator, RunError, RunFailure, RunOptions, RunReport, RunState,
};
pub use payload::{Envelope, PayloadFingerprint, Phase, PhaseSet, SwimmerKey};
pub use progress::{ConsoleProgress, NullProgress, ProgressListener, ProgressUpdate};
pub use timing::Timing;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
