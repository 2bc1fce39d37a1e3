//! Structured logging facility for relmodel
//!
//! Every public boundary operation (resolve, delete, undelete, clone, merge)
//! emits a `start` event and exactly one of `end` / `end_error`. Lower layers
//! log through plain `tracing::debug!` / `tracing::trace!` only.
//!
//! # Usage
//!
//! ```rust
//! use relmodel_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```
//!
//! # Logging Macros
//!
//! - `log_op_start!(op, ...)` - Log operation start
//! - `log_op_end!(op, duration_ms = ...)` - Log operation end
//! - `log_op_error!(op, err, duration_ms = ...)` - Log operation error

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, init_with_filter, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
