//! PromptRelay library
//!
//! Exposes the CLI, configuration and page fixtures for integration testing

pub mod cli;
pub mod config;
pub mod fixture;

pub use config::Config;
pub use fixture::PageFixture;
