//! Shared test utilities for s3restore integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a database, blob directory, catalog and applier
//! - Builders for archives, configurations and scripted appliers

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ManualExecutor, TestHarness, UnreachableBlobStore};
