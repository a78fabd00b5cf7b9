//! Behavioural plans for the jobtrack workspace.
//!
//! Each plan file under `integration/` and `system_plans/` is its own test
//! target; run them with `cargo test -p jobtrack-integration-tests`.
