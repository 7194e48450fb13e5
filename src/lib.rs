//! Safe application of automated CI fixes
//!
//! Every fix is snapshotted before it touches the working tree, applied step
//! by step, rolled back automatically on the first failure, and verified
//! afterwards. The CLI in `main.rs` is a thin layer over `fix::Orchestrator`.

pub mod apply;
pub mod approval;
pub mod backup;
pub mod config;
pub mod error;
pub mod fix;
pub mod logging;
pub mod project;
pub mod rollback;
pub mod suggest;
pub mod util;
pub mod verify;

pub use error::{FixError, Result};
pub use fix::{FixResult, FixState, Orchestrator};
pub use project::ProjectRoot;
pub use suggest::FixSuggestion;
