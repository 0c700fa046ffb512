//! Core primitives for computer-use agents: tool-call recovery parsing, parser
//! configuration, and the seam between an LLM client and the parser.
//!
//! Binaries (the runner, host agents) share the same parser contract through
//! this crate.

pub mod agent;
pub mod config;
pub mod text_utils;
