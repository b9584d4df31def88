// Shared utilities for integration tests
//
// TestSetup wires the real services together the way the server does,
// with in-memory repositories and a mock assistant client.

pub mod mocks;
pub mod setup;

pub use mocks::MockAssistantClient;
pub use setup::{TestClient, TestSetup};
