//! Integration tests for the Kubernetes provider
//!
//! Tests are organized by the story they tell:
//!
//! - `workspace_lifecycle`: creating, stopping, starting and deleting a
//!   workspace through the real API server
//!
//! - `exec_and_logs`: running commands in a workspace and reading its logs
//!
//! - `architecture`: detecting the node architecture before a run
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//!
//! # one story at a time, with provider logs
//! RUST_LOG=debug cargo test --test kind workspace_lifecycle -- --ignored --nocapture
//! ```

mod architecture;
mod exec_and_logs;
mod helpers;
mod workspace_lifecycle;
