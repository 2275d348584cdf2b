// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! GIM Diagnostic Library
//!
//! This library diagnoses a GIM6010 motor controller speaking the ODrive
//! CAN protocol: it reads the heartbeat and error registers, queries the
//! encoder, drives the motor and encoder calibrations to completion and
//! finally saves the configuration and reboots the node.
//!
//! # Features
//!
//! - **CAN Interface** - Blocking SocketCAN transport with bounded receives
//! - **Protocol** - Arbitration id addressing and payload codecs
//! - **Calibration** - Deadline-bounded polling of the axis state machine
//! - **Diagnostic** - Full ordered run aggregated into a report
//!
//! All waiting is plain blocking I/O against explicit deadlines. The
//! `gimdiag` binary wires the library to a CAN interface.

#![warn(missing_docs)]

/// Calibration state polling
pub mod calibration;

/// CAN frames, the transport capability and the SocketCAN adapter
pub mod can;

/// Command primitives and timing configuration
pub mod client;

/// Full diagnostic run and report
pub mod diagnostic;

/// Error types
pub mod error;

/// Protocol identifiers and payload codecs
pub mod protocol;

/// Timeout-bounded response correlation
pub mod waiter;

#[cfg(test)]
mod mock;

pub use client::{Client, ClientConfig};
pub use diagnostic::{full_diagnostic, DiagnosticReport, Reading};
pub use error::Error;
