//! Testing utilities for Dealflow.
//!
//! Fakes for both collaborators of the orchestrator, plus seeded fixtures
//! for driving the pipelines end to end without a network or database.

pub mod fakes;
pub mod fixtures;

pub use fakes::{CrmOp, FailableLocalStore, FakeCrm, RecordedCall, StoreOp};
pub use fixtures::{credential, init_tracing, offering, price_list, TestWorld, TEST_TOKEN};
