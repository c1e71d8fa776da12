//! Core types shared across the Tether peer bridge.
//!
//! This crate defines the configuration, error taxonomy and caller-visible
//! tool outcomes used by the wire layer, runtime, kernel and API server. It
//! contains no business logic.

pub mod config;
pub mod error;
pub mod tool;
