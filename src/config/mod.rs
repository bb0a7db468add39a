//! Configuration module for long-form text-to-speech.
//!
//! Provides CLI argument parsing, request validation and the preset voice catalog.

#[allow(clippy::module_inception)]
mod config;
pub mod voices;

pub use config::{AppConfig, Backend, Provider};
