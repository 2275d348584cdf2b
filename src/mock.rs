// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! In-memory transports for exercising the client without a bus.

use crate::{
    can::{Frame, Transport},
    error::Error,
    protocol::{
        arbitration_id, encode_command, split_arbitration_id, AxisState, Command, EncoderEstimate,
        NodeId,
    },
};
use std::{
    collections::{HashMap, VecDeque},
    io, thread,
    time::Duration,
};

const BEAT: Duration = Duration::from_millis(1);

/// Replays queued frames, then optionally one frame forever, then silence.
#[derive(Default)]
pub struct ScriptedBus {
    inbound: VecDeque<Frame>,
    repeat: Option<Frame>,
    sent: Vec<Frame>,
    received: usize,
    fail: bool,
    fail_when_drained: bool,
}

impl ScriptedBus {
    pub fn push(&mut self, frame: Frame) {
        self.inbound.push_back(frame);
    }

    pub fn repeat(&mut self, frame: Frame) {
        self.repeat = Some(frame);
    }

    pub fn fail_receive(&mut self) {
        self.fail = true;
    }

    /// Fails every receive once the queued frames are consumed.
    pub fn fail_after_queue(&mut self) {
        self.fail_when_drained = true;
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }
}

impl Transport for ScriptedBus {
    fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        self.sent.push(*frame);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, Error> {
        if self.fail {
            return Err(Error::Io(io::Error::other("bus off")));
        }

        if let Some(frame) = self.inbound.pop_front() {
            self.received += 1;
            return Ok(Some(frame));
        }

        if self.fail_when_drained {
            return Err(Error::Io(io::Error::other("bus off")));
        }

        match self.repeat {
            Some(frame) => {
                thread::sleep(BEAT);
                self.received += 1;
                Ok(Some(frame))
            }
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Behaves like a motor controller: answers requests, follows axis state
/// commands and broadcasts a heartbeat on every idle receive.
pub struct SimulatedNode {
    node: NodeId,
    pub heartbeat: bool,
    pub answers: bool,
    pub axis_state: AxisState,
    /// Heartbeats spent in motor calibration before returning to idle,
    /// `None` never finishes.
    pub motor_calibration_beats: Option<usize>,
    pub encoder_calibration_beats: Option<usize>,
    pub errors: HashMap<u8, Vec<u8>>,
    pub estimate: EncoderEstimate,
    remaining: Option<usize>,
    inbound: VecDeque<Frame>,
    sent: Vec<Frame>,
}

impl SimulatedNode {
    pub fn new(node: NodeId) -> Self {
        SimulatedNode {
            node,
            heartbeat: true,
            answers: true,
            axis_state: AxisState::Idle,
            motor_calibration_beats: Some(3),
            encoder_calibration_beats: Some(5),
            errors: HashMap::new(),
            estimate: EncoderEstimate {
                position: 0.0,
                velocity: 0.0,
            },
            remaining: None,
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }

    /// Commands received, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.sent
            .iter()
            .filter_map(|frame| Command::try_from(split_arbitration_id(frame.id).1).ok())
            .collect()
    }

    fn reply(&mut self, command: Command, data: &[u8]) {
        let frame = Frame::new(arbitration_id(self.node, command), false, data)
            .expect("reply fits a frame");
        self.inbound.push_back(frame);
    }
}

impl Transport for SimulatedNode {
    fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        self.sent.push(*frame);

        let (node, command) = split_arbitration_id(frame.id);
        if node != self.node.get() {
            return Ok(());
        }

        match Command::try_from(command) {
            Ok(Command::GetError) if self.answers => {
                let data = self
                    .errors
                    .get(&frame.data()[0])
                    .cloned()
                    .unwrap_or_else(|| vec![0; 8]);
                self.reply(Command::GetError, &data);
            }
            Ok(Command::GetEncoderEstimates) if self.answers => {
                let mut data = [0u8; 8];
                data[..4].copy_from_slice(&self.estimate.position.to_le_bytes());
                data[4..].copy_from_slice(&self.estimate.velocity.to_le_bytes());
                self.reply(Command::GetEncoderEstimates, &data);
            }
            Ok(Command::SetAxisState) => {
                self.axis_state = AxisState::from(frame.data()[0]);
                self.remaining = match self.axis_state {
                    AxisState::MotorCalibration => self.motor_calibration_beats,
                    AxisState::EncoderOffsetCalibration => self.encoder_calibration_beats,
                    _ => None,
                };
            }
            _ => {}
        }

        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, Error> {
        if let Some(frame) = self.inbound.pop_front() {
            return Ok(Some(frame));
        }

        if !self.heartbeat {
            thread::sleep(timeout);
            return Ok(None);
        }

        thread::sleep(BEAT);
        match self.remaining {
            Some(0) => {
                self.axis_state = AxisState::Idle;
                self.remaining = None;
            }
            Some(n) => self.remaining = Some(n - 1),
            None => {}
        }

        let data = [0, 0, 0, 0, u8::from(self.axis_state), 0, 0, 0];
        Ok(Some(encode_command(self.node, Command::Heartbeat, Some(&data))))
    }
}
