/// Local-to-external reference resolution
pub mod resolver;

/// Correlation id pinning
pub mod pinner;

/// Remote-then-local step execution
pub mod step_executor;

/// Fan-out over independent items
pub mod fan_out;

/// The workflow pipelines
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod mocks;
