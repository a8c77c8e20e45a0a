//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and bounding geometry
//! - Collections and data structures
//! - Signals and scoped connections
//! - Spatial nodes
//! - Background worker thread
//! - Logging utilities

pub mod math;
pub mod geometry;
pub mod collections;
pub mod signal;
pub mod node;
pub mod worker;
pub mod logging;
