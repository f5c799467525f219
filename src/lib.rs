//! Makefile generation and target running for small C++ projects.
//!
//! Targets are read from an existing Makefile with [`makefile_parser`] and
//! run through `make` with the output streamed to an [`runner::OutputSink`].
//! New Makefiles are generated from a flat [`config::Settings`] record.

pub mod config;
mod contexts;
pub mod error;
pub mod generator;
pub mod project;
mod render;
pub mod runner;
mod templates;

pub use makefile_parser;
