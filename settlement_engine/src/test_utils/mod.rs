//! Fixtures for tests in this crate and in crates that depend on it (behind the `test_utils` feature).
pub mod mock_gateway;
pub mod prepare_env;
pub mod webhooks;
