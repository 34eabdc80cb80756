//! Test utilities for integration testing.
//!
//! This module provides:
//! - Test data factories for creating valid subscription records
//! - In-memory store, scripted gateway and recording event publisher
//! - A builder for `AppState` wired to those mocks for HTTP-level tests

mod app_state_builder;
mod factories;
mod lifecycle_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use lifecycle_mocks::*;
