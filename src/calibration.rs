// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    can::Transport,
    client::Client,
    error::Error,
    protocol::{decode_heartbeat, AxisState, Command},
};
use log::{debug, error, info, warn};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// Calibration procedures driven through the axis state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CalibrationKind {
    /// Motor resistance and inductance measurement
    Motor,
    /// Encoder offset calibration
    EncoderOffset,
}

impl CalibrationKind {
    /// State requested to start the procedure, reported while it runs.
    pub fn state(&self) -> AxisState {
        match self {
            CalibrationKind::Motor => AxisState::MotorCalibration,
            CalibrationKind::EncoderOffset => AxisState::EncoderOffsetCalibration,
        }
    }

    fn deadline(&self, client: &Client<impl Transport>) -> Duration {
        match self {
            CalibrationKind::Motor => client.config().motor_calibration_deadline,
            CalibrationKind::EncoderOffset => client.config().encoder_calibration_deadline,
        }
    }
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CalibrationKind::Motor => write!(f, "motor"),
            CalibrationKind::EncoderOffset => write!(f, "encoder offset"),
        }
    }
}

/// Progress of one calibration run. `Success` and `Failed` are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    /// Calibration has not been requested yet
    NotStarted,
    /// Waiting for the axis to return to idle
    Polling,
    /// Axis returned to idle before the deadline
    Success,
    /// Deadline passed or the status stream was unreadable
    Failed,
}

impl CalibrationState {
    /// True once the run has reached a verdict.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CalibrationState::Success | CalibrationState::Failed)
    }
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CalibrationState::NotStarted => write!(f, "not started"),
            CalibrationState::Polling => write!(f, "in progress"),
            CalibrationState::Success => write!(f, "complete"),
            CalibrationState::Failed => write!(f, "failed"),
        }
    }
}

/// Drives one calibration: request the calibration state, watch heartbeats
/// until the axis returns to idle, and force idle if the deadline passes.
#[derive(Debug)]
pub struct CalibrationPoller {
    kind: CalibrationKind,
    state: CalibrationState,
}

impl CalibrationPoller {
    /// Creates a poller in the `NotStarted` state.
    pub fn new(kind: CalibrationKind) -> Self {
        CalibrationPoller {
            kind,
            state: CalibrationState::NotStarted,
        }
    }

    /// Procedure driven by this poller.
    pub fn kind(&self) -> CalibrationKind {
        self.kind
    }

    /// Current progress.
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Runs the calibration to a terminal state.
    ///
    /// Any axis state other than idle keeps the poll going; only the
    /// deadline ends it without success. On failure a corrective
    /// set-axis-state(Idle) is sent once and not verified. A malformed
    /// heartbeat also forces idle and is returned as an error.
    pub fn run<T: Transport>(&mut self, client: &mut Client<T>) -> Result<CalibrationState, Error> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }

        info!("starting {} calibration", self.kind);
        client.set_axis_state(self.kind.state())?;
        self.state = CalibrationState::Polling;

        let deadline = Instant::now() + self.kind.deadline(client);
        let poll_interval = client.config().poll_interval;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let wait = poll_interval.min(deadline - now);
            let frame = match client.wait_for(Command::Heartbeat, wait) {
                Ok(frame) => frame,
                Err(Error::Timeout { .. }) => continue,
                Err(err) => return Err(err),
            };

            let heartbeat = match decode_heartbeat(&frame) {
                Ok(heartbeat) => heartbeat,
                Err(err) => {
                    error!("{} calibration: {}", self.kind, err);
                    self.fail(client)?;
                    return Err(err);
                }
            };

            match heartbeat.axis_state {
                AxisState::Idle => {
                    info!("{} calibration complete", self.kind);
                    self.state = CalibrationState::Success;
                    return Ok(self.state);
                }
                state if state == self.kind.state() => {
                    debug!("{} calibration in progress", self.kind);
                }
                state => warn!("{} calibration: unexpected axis state {}", self.kind, state),
            }
        }

        error!("{} calibration timed out", self.kind);
        self.fail(client)?;
        Ok(self.state)
    }

    fn fail<T: Transport>(&mut self, client: &mut Client<T>) -> Result<(), Error> {
        self.state = CalibrationState::Failed;
        client.set_axis_state(AxisState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        can::Frame,
        client::test_config,
        mock::{ScriptedBus, SimulatedNode},
        protocol::{encode_command, split_arbitration_id, NodeId},
    };

    fn node() -> NodeId {
        NodeId::new(1).unwrap()
    }

    fn heartbeat(state: u8) -> Frame {
        encode_command(node(), Command::Heartbeat, Some(&[0, 0, 0, 0, state, 0, 0, 0]))
    }

    fn axis_commands(sent: &[Frame]) -> Vec<u8> {
        sent.iter()
            .filter(|frame| split_arbitration_id(frame.id).1 == Command::SetAxisState as u8)
            .map(|frame| frame.data()[0])
            .collect()
    }

    #[test]
    fn test_motor_success_without_corrective() {
        let mut bus = ScriptedBus::default();
        bus.push(heartbeat(4));
        bus.push(heartbeat(4));
        bus.push(heartbeat(1));

        let mut client = Client::new(bus, node(), test_config());
        let mut poller = CalibrationPoller::new(CalibrationKind::Motor);
        assert_eq!(poller.state(), CalibrationState::NotStarted);
        assert_eq!(poller.run(&mut client).unwrap(), CalibrationState::Success);
        assert!(poller.state().is_terminal());

        let bus = client.into_inner();
        assert_eq!(axis_commands(bus.sent()), vec![4]);
    }

    #[test]
    fn test_motor_timeout_sends_one_corrective() {
        let mut bus = ScriptedBus::default();
        bus.repeat(heartbeat(4));

        let mut client = Client::new(bus, node(), test_config());
        let start = Instant::now();
        let mut poller = CalibrationPoller::new(CalibrationKind::Motor);
        assert_eq!(poller.run(&mut client).unwrap(), CalibrationState::Failed);
        assert!(start.elapsed() >= test_config().motor_calibration_deadline);

        let bus = client.into_inner();
        assert_eq!(axis_commands(bus.sent()), vec![4, 1]);
    }

    #[test]
    fn test_timeout_on_silent_bus() {
        let mut client = Client::new(ScriptedBus::default(), node(), test_config());
        let mut poller = CalibrationPoller::new(CalibrationKind::EncoderOffset);
        assert_eq!(poller.run(&mut client).unwrap(), CalibrationState::Failed);
        assert_eq!(axis_commands(client.into_inner().sent()), vec![7, 1]);
    }

    #[test]
    fn test_unexpected_state_keeps_polling() {
        let mut bus = ScriptedBus::default();
        bus.push(heartbeat(7));
        bus.push(heartbeat(8));
        bus.push(heartbeat(0x42));
        bus.push(heartbeat(1));

        let mut client = Client::new(bus, node(), test_config());
        let mut poller = CalibrationPoller::new(CalibrationKind::EncoderOffset);
        assert_eq!(poller.run(&mut client).unwrap(), CalibrationState::Success);
        assert_eq!(axis_commands(client.into_inner().sent()), vec![7]);
    }

    #[test]
    fn test_other_node_idle_ignored() {
        let mut bus = ScriptedBus::default();
        let other = NodeId::new(3).unwrap();
        bus.push(encode_command(
            other,
            Command::Heartbeat,
            Some(&[0, 0, 0, 0, 1, 0, 0, 0]),
        ));
        bus.repeat(heartbeat(4));

        let mut client = Client::new(bus, node(), test_config());
        let mut poller = CalibrationPoller::new(CalibrationKind::Motor);
        assert_eq!(poller.run(&mut client).unwrap(), CalibrationState::Failed);
    }

    #[test]
    fn test_malformed_heartbeat_forces_idle() {
        let mut bus = ScriptedBus::default();
        bus.push(heartbeat(4));
        bus.push(
            Frame::new(
                crate::protocol::arbitration_id(node(), Command::Heartbeat),
                false,
                &[0, 0, 0, 0],
            )
            .unwrap(),
        );

        let mut client = Client::new(bus, node(), test_config());
        let mut poller = CalibrationPoller::new(CalibrationKind::Motor);
        let err = poller.run(&mut client).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
        assert_eq!(poller.state(), CalibrationState::Failed);
        assert_eq!(axis_commands(client.into_inner().sent()), vec![4, 1]);
    }

    #[test]
    fn test_simulated_node_calibrates() {
        let sim = SimulatedNode::new(node());
        let mut client = Client::new(sim, node(), test_config());

        let mut motor = CalibrationPoller::new(CalibrationKind::Motor);
        assert_eq!(motor.run(&mut client).unwrap(), CalibrationState::Success);
        let mut encoder = CalibrationPoller::new(CalibrationKind::EncoderOffset);
        assert_eq!(encoder.run(&mut client).unwrap(), CalibrationState::Success);

        // A finished poller does not restart the procedure.
        assert_eq!(motor.run(&mut client).unwrap(), CalibrationState::Success);
        assert_eq!(axis_commands(client.into_inner().sent()), vec![4, 7]);
    }
}
