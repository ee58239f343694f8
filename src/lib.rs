//! # playdash
//!
//! A small web dashboard for automation playbooks.
//!
//! playdash lists the playbooks in a directory, runs them with an external
//! runner (`ansible-playbook` by default), and keeps the last result of every
//! playbook across restarts.
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve the dashboard on :8080
//! playdash --dir ./playbooks
//!
//! # Run one playbook in the foreground
//! playdash run deploy.yml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod core;
pub mod server;

// Re-export commonly used types
pub use crate::core::{
    Config, PlaybookEntry, PlaybookService, PlaybookStatus, RunResult, ServiceError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "playdash";
