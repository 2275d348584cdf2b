// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    calibration::{CalibrationKind, CalibrationPoller, CalibrationState},
    can::Transport,
    client::Client,
    error::Error,
    protocol::{EncoderEstimate, ErrorCode, ErrorType, Heartbeat},
};
use log::{error, info};
use std::fmt;

/// Outcome of one diagnostic step.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading<T> {
    /// The node answered with a decodable value
    Received(T),
    /// Nothing arrived before the deadline
    NoResponse,
    /// A reply arrived but could not be decoded
    Malformed(String),
}

impl<T> Reading<T> {
    /// Folds a step result into a reading. Only transport failures remain
    /// errors, they abort the run.
    pub fn from_step(step: Result<Option<T>, Error>) -> Result<Reading<T>, Error> {
        match step {
            Ok(Some(value)) => Ok(Reading::Received(value)),
            Ok(None) => Ok(Reading::NoResponse),
            Err(err @ Error::MalformedPayload { .. }) => {
                error!("{}", err);
                Ok(Reading::Malformed(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Received value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Received(value) => Some(value),
            _ => None,
        }
    }

    /// True when a value was received and satisfies `f`.
    pub fn is_ok_and(&self, f: impl FnOnce(&T) -> bool) -> bool {
        self.value().is_some_and(f)
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reading::Received(value) => write!(f, "{}", value),
            Reading::NoResponse => write!(f, "no response"),
            Reading::Malformed(err) => write!(f, "{}", err),
        }
    }
}

/// Aggregated result of one full diagnostic run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    /// First heartbeat observed
    pub heartbeat: Reading<Heartbeat>,
    /// System error register
    pub system_error: Reading<ErrorCode>,
    /// Motor error register
    pub motor_error: Reading<ErrorCode>,
    /// Encoder error register
    pub encoder_error: Reading<ErrorCode>,
    /// Encoder position and velocity
    pub encoder_estimate: Reading<EncoderEstimate>,
    /// Motor calibration verdict
    pub motor_calibration: Reading<CalibrationState>,
    /// Encoder offset calibration verdict
    pub encoder_calibration: Reading<CalibrationState>,
}

fn clear(reading: &Reading<ErrorCode>) -> bool {
    reading.is_ok_and(ErrorCode::is_clear)
}

fn calibrated(reading: &Reading<CalibrationState>) -> bool {
    reading.is_ok_and(|state| *state == CalibrationState::Success)
}

impl DiagnosticReport {
    /// The node was heard on the bus.
    pub fn communication_ok(&self) -> bool {
        matches!(self.heartbeat, Reading::Received(_))
    }

    /// System error register read back as zero.
    pub fn system_ok(&self) -> bool {
        clear(&self.system_error)
    }

    /// Motor error register read back as zero.
    pub fn motor_ok(&self) -> bool {
        clear(&self.motor_error)
    }

    /// Encoder error register read back as zero.
    pub fn encoder_ok(&self) -> bool {
        clear(&self.encoder_error)
    }

    /// Motor calibration returned to idle in time.
    pub fn motor_calibration_ok(&self) -> bool {
        calibrated(&self.motor_calibration)
    }

    /// Encoder offset calibration returned to idle in time.
    pub fn encoder_calibration_ok(&self) -> bool {
        calibrated(&self.encoder_calibration)
    }

    /// Overall verdict. A register that could not be read does not pass.
    pub fn passed(&self) -> bool {
        self.communication_ok()
            && self.system_ok()
            && self.motor_ok()
            && self.encoder_ok()
            && self.motor_calibration_ok()
            && self.encoder_calibration_ok()
    }
}

fn mark(ok: bool) -> &'static str {
    match ok {
        true => "OK",
        false => "FAIL",
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Communication:        {:4} {}",
            mark(self.communication_ok()),
            self.heartbeat
        )?;
        writeln!(
            f,
            "System errors:        {:4} {}",
            mark(self.system_ok()),
            self.system_error
        )?;
        writeln!(
            f,
            "Motor errors:         {:4} {}",
            mark(self.motor_ok()),
            self.motor_error
        )?;
        writeln!(
            f,
            "Encoder errors:       {:4} {}",
            mark(self.encoder_ok()),
            self.encoder_error
        )?;
        writeln!(f, "Encoder estimate:          {}", self.encoder_estimate)?;
        writeln!(
            f,
            "Motor calibration:    {:4} {}",
            mark(self.motor_calibration_ok()),
            self.motor_calibration
        )?;
        writeln!(
            f,
            "Encoder calibration:  {:4} {}",
            mark(self.encoder_calibration_ok()),
            self.encoder_calibration
        )?;
        match self.passed() {
            true => write!(f, "Diagnostic passed, the motor is ready"),
            false => write!(f, "Diagnostic failed, corrective action is required"),
        }
    }
}

fn calibrate<T: Transport>(
    client: &mut Client<T>,
    kind: CalibrationKind,
) -> Result<Reading<CalibrationState>, Error> {
    Reading::from_step(CalibrationPoller::new(kind).run(client).map(Some))
}

/// Runs every diagnostic step in order and aggregates the report.
///
/// No step is skipped because an earlier one failed, including a missing
/// heartbeat. Transport failures are the only early exit.
pub fn full_diagnostic<T: Transport>(client: &mut Client<T>) -> Result<DiagnosticReport, Error> {
    info!("starting diagnostic of node {}", client.node());

    info!("1. communication");
    let heartbeat = Reading::from_step(client.heartbeat())?;
    if !matches!(heartbeat, Reading::Received(_)) {
        error!("unable to communicate with node {}", client.node());
    }

    info!("2. error registers");
    let system_error = Reading::from_step(client.errors(ErrorType::System))?;
    let motor_error = Reading::from_step(client.errors(ErrorType::Motor))?;
    let encoder_error = Reading::from_step(client.errors(ErrorType::Encoder))?;

    info!("3. encoder estimates");
    let encoder_estimate = Reading::from_step(client.encoder_estimates())?;

    info!("4. motor calibration");
    let motor_calibration = calibrate(client, CalibrationKind::Motor)?;

    info!("5. encoder calibration");
    let encoder_calibration = calibrate(client, CalibrationKind::EncoderOffset)?;

    info!("6. save and reboot");
    client.save_and_reboot()?;

    let report = DiagnosticReport {
        heartbeat,
        system_error,
        motor_error,
        encoder_error,
        encoder_estimate,
        motor_calibration,
        encoder_calibration,
    };
    info!("diagnostic passed: {}", report.passed());

    Ok(report)
}
