//! Supervisor integration tests
//!
//! Lifecycle, reconciliation, health monitoring and base URL handling
//! against a mock transport with a paused clock.

mod lifecycle;
mod reconciliation;
