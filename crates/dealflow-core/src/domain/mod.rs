/// Entity field views and pipeline inputs
pub mod entities;

/// Local store port
pub mod repository;

/// External system port
pub mod external;

/// Workflow results
pub mod result;
