//! Core module: terminal communication and process-data decoding
//!
//! This module provides:
//! - Register transport seam (function codes, exceptions, transport trait)
//! - PDO codec for the supported terminal models
//! - Terminal descriptors, model catalogue and process-image allocation
//! - Address resolution per terminal family
//! - Coupler bus arbitration, identity checks and error accounting
//! - Channel bindings and the channel table
//! - Simulated coupler for tests and dry runs

pub mod address;
pub mod binding;
pub mod coupler;
pub mod error;
pub mod family;
pub mod pdo;
pub mod simulator;
pub mod terminal;
pub mod transport;
