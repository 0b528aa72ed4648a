//! # Sandbox interface crate.
//!
//! Provides the command and telemetry definitions shared between the SlipBot engine and the layers
//! around it (gesture input, scripts, display).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommands accepted by the sandbox
pub mod tc;

/// Telemetry produced by the sandbox each tick
pub mod tm;
