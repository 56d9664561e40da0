//! # Courier
//!
//! At-least-once delivery of module registry notifications.
//!
//! When a build finishes it may have queued notifications for a module
//! registry: post a module descriptor, or promote a module version. Courier
//! delivers them and makes sure none is lost when the registry is down or a
//! call fails.
//!
//! ## Features
//!
//! - **Best-effort delivery**: A notification problem never fails the build.
//!   Each record is processed on its own; one failure does not stop the batch.
//! - **Durable resends**: Every notification that could not be delivered
//!   leaves a pending-resend entry on its build, together with a durable copy
//!   of the module descriptor.
//! - **Reconciliation**: A successful post resolves every older pending entry
//!   of the same module version, across the whole build history.
//! - **Audit trail**: Entries are never deleted, only resolved, and every
//!   outcome is written to the build's event log.
//!
//! ## Pipeline
//!
//! 1. [`coordinator::run_delivery`] loads a build's queued records, checks the
//!    build outcome, picks a registry profile and delivers record by record.
//! 2. [`aggregator::collect_outstanding`] lists every unresolved entry of a
//!    project, most recent build first.
//! 3. [`resend::resend`] replays one entry; [`resend::resend_all`] replays all.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use courier::coordinator::run_delivery;
//! use courier::Reporter;
//! use courier_store::ProjectStore;
//!
//! struct Stderr;
//!
//! impl Reporter for Stderr {
//!     fn info(&mut self, msg: &str) { eprintln!("[info] {msg}"); }
//!     fn warn(&mut self, msg: &str) { eprintln!("[warn] {msg}"); }
//!     fn error(&mut self, msg: &str) { eprintln!("[error] {msg}"); }
//! }
//!
//! let dir = PathBuf::from("project");
//! let config = courier_config::load_config(&dir)?;
//! let project = ProjectStore::new(dir);
//!
//! let summary = run_delivery(&config, None, &project, 42, &mut Stderr);
//! println!("{} delivered, {} postponed", summary.delivered(), summary.postponed());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: Delivery of one build's queued notifications
//! - [`aggregator`]: Project-wide outstanding view and reconciliation
//! - [`resend`]: Operator-triggered replay of pending entries
//! - [`attempt`]: Attempt state machine and outcomes
//! - [`endpoint`]: Registry profile selection
//! - [`descriptor`]: Module descriptor parsing
//! - [`error`]: Error taxonomy

pub mod aggregator;
pub mod attempt;
pub mod coordinator;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod resend;

mod reporter;

pub use reporter::{Reporter, diagnostic};


#[cfg(test)]
mod test_support;
