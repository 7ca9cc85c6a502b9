//! Snapscribe Core Library
//!
//! Capture mode control, session handling, continuous analysis and
//! configuration for the `snapscribe` binary.

pub mod analyzer;
pub mod colored_logger;
pub mod config;
pub mod mode;
pub mod session;
