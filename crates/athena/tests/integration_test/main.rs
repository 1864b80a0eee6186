//! Integration tests for athena-adapter crate.
//!
//! These tests drive the connection manager end to end against the in-memory
//! Athena API, so they run without AWS credentials. Tests marked with
//! `#[ignore]` require AWS credentials and must be run explicitly.

mod common;
mod cursor;
mod escape;
mod manager;
