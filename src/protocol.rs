// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! ODrive-style CAN protocol as spoken by the GIM6010 motor controller.
//!
//! Every frame uses an 11-bit standard identifier built from the node id in
//! the upper six bits and the command id in the lower five bits. Numeric
//! fields are little-endian.

use crate::{
    can::{Frame, MAX_DATA_LEN},
    error::Error,
};
use std::fmt;

/// Width of the command field in the arbitration identifier.
pub const COMMAND_BITS: u32 = 5;

/// Largest node id that fits an 11-bit standard identifier.
pub const MAX_NODE_ID: u8 = (1 << (11 - COMMAND_BITS)) - 1;

/// Address of the motor controller on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u8);

impl NodeId {
    /// Validates that `id` fits the node field of the arbitration id.
    pub fn new(id: u8) -> Result<NodeId, Error> {
        match id <= MAX_NODE_ID {
            true => Ok(NodeId(id)),
            false => Err(Error::InvalidNodeId(id)),
        }
    }

    /// Raw node id.
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote operations addressed through the command field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Periodic status broadcast from the node
    Heartbeat = 0x001,
    /// Request an error register, byte 0 selects the category
    GetError = 0x003,
    /// Request an axis state transition, byte 0 holds the target state
    SetAxisState = 0x007,
    /// Request position and velocity estimates
    GetEncoderEstimates = 0x009,
    /// Restart the controller
    Reboot = 0x016,
    /// Persist the active configuration
    SaveConfiguration = 0x01F,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x001 => Ok(Command::Heartbeat),
            0x003 => Ok(Command::GetError),
            0x007 => Ok(Command::SetAxisState),
            0x009 => Ok(Command::GetEncoderEstimates),
            0x016 => Ok(Command::Reboot),
            0x01F => Ok(Command::SaveConfiguration),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

/// Arbitration id addressing `command` on `node`.
pub fn arbitration_id(node: NodeId, command: Command) -> u32 {
    ((node.get() as u32) << COMMAND_BITS) | command as u32
}

/// Splits an arbitration id back into its raw node and command fields.
pub fn split_arbitration_id(id: u32) -> (u8, u8) {
    let node = (id >> COMMAND_BITS) as u8;
    let command = (id & ((1 << COMMAND_BITS) - 1)) as u8;
    (node, command)
}

/// Builds an outbound command frame. A missing payload becomes eight zero
/// bytes and shorter payloads are zero padded; bytes beyond the frame width
/// are dropped.
pub fn encode_command(node: NodeId, command: Command, payload: Option<&[u8]>) -> Frame {
    let mut data = [0u8; MAX_DATA_LEN];
    if let Some(payload) = payload {
        let len = payload.len().min(MAX_DATA_LEN);
        data[..len].copy_from_slice(&payload[..len]);
    }

    Frame::from_bytes(arbitration_id(node, command), false, data)
}

/// True when the frame carries `command` for `node`.
pub fn matches(frame: &Frame, node: NodeId, command: Command) -> bool {
    frame.id == arbitration_id(node, command)
}

fn require(frame: &Frame, command: Command, expected: usize) -> Result<&[u8], Error> {
    let data = frame.data();
    if data.len() < expected {
        return Err(Error::MalformedPayload {
            command,
            expected,
            actual: data.len(),
        });
    }
    Ok(data)
}

/// Error register categories understood by the get-error request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ErrorType {
    /// Axis and system level errors
    System = 0,
    /// Motor errors, reported as a 64-bit register
    Motor = 1,
    /// Controller errors
    Controller = 3,
    /// Encoder errors
    Encoder = 4,
}

impl ErrorType {
    /// Bytes occupied by the error register in the reply.
    pub fn width(&self) -> usize {
        match self {
            ErrorType::Motor => 8,
            _ => 4,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorType::System => write!(f, "system"),
            ErrorType::Motor => write!(f, "motor"),
            ErrorType::Controller => write!(f, "controller"),
            ErrorType::Encoder => write!(f, "encoder"),
        }
    }
}

/// Error register decoded from a get-error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// System error bits
    System(u32),
    /// Motor error bits
    Motor(u64),
    /// Controller error bits
    Controller(u32),
    /// Encoder error bits
    Encoder(u32),
}

impl ErrorCode {
    /// Category the register belongs to.
    pub fn error_type(&self) -> ErrorType {
        match self {
            ErrorCode::System(_) => ErrorType::System,
            ErrorCode::Motor(_) => ErrorType::Motor,
            ErrorCode::Controller(_) => ErrorType::Controller,
            ErrorCode::Encoder(_) => ErrorType::Encoder,
        }
    }

    /// Register value widened to 64 bits.
    pub fn value(&self) -> u64 {
        match *self {
            ErrorCode::System(v) | ErrorCode::Controller(v) | ErrorCode::Encoder(v) => v as u64,
            ErrorCode::Motor(v) => v,
        }
    }

    /// True when no error bit is set.
    pub fn is_clear(&self) -> bool {
        self.value() == 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorCode::Motor(v) => write!(f, "0x{:016X}", v),
            _ => write!(f, "0x{:08X}", self.value()),
        }
    }
}

/// Decodes a get-error reply. Motor registers are 64-bit, all others 32-bit.
pub fn decode_error_payload(frame: &Frame, error_type: ErrorType) -> Result<ErrorCode, Error> {
    let data = require(frame, Command::GetError, error_type.width())?;

    let code = match error_type {
        ErrorType::Motor => ErrorCode::Motor(u64::from_le_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ])),
        ty => {
            let value = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            match ty {
                ErrorType::Controller => ErrorCode::Controller(value),
                ErrorType::Encoder => ErrorCode::Encoder(value),
                _ => ErrorCode::System(value),
            }
        }
    };

    Ok(code)
}

/// Axis state machine of the remote controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    /// Undefined state
    Undefined, // 0x0
    /// Idle, the terminal state of every calibration
    Idle, // 0x1
    /// Startup sequence
    StartupSequence, // 0x2
    /// Full calibration sequence
    FullCalibrationSequence, // 0x3
    /// Motor resistance and inductance measurement
    MotorCalibration, // 0x4
    /// Encoder index search
    EncoderIndexSearch, // 0x6
    /// Encoder offset calibration
    EncoderOffsetCalibration, // 0x7
    /// Closed loop control
    ClosedLoopControl, // 0x8
    /// Lockin spin
    LockinSpin, // 0x9
    /// Encoder direction find
    EncoderDirFind, // 0xA
    /// Homing
    Homing, // 0xB
    /// Encoder hall polarity calibration
    EncoderHallPolarityCalibration, // 0xC
    /// Encoder hall phase calibration
    EncoderHallPhaseCalibration, // 0xD
    /// Anticogging calibration
    AnticoggingCalibration, // 0xE
    /// State value outside the known catalogue
    Other(u8),
}

impl From<u8> for AxisState {
    fn from(value: u8) -> Self {
        match value {
            0x0 => AxisState::Undefined,
            0x1 => AxisState::Idle,
            0x2 => AxisState::StartupSequence,
            0x3 => AxisState::FullCalibrationSequence,
            0x4 => AxisState::MotorCalibration,
            0x6 => AxisState::EncoderIndexSearch,
            0x7 => AxisState::EncoderOffsetCalibration,
            0x8 => AxisState::ClosedLoopControl,
            0x9 => AxisState::LockinSpin,
            0xA => AxisState::EncoderDirFind,
            0xB => AxisState::Homing,
            0xC => AxisState::EncoderHallPolarityCalibration,
            0xD => AxisState::EncoderHallPhaseCalibration,
            0xE => AxisState::AnticoggingCalibration,
            other => AxisState::Other(other),
        }
    }
}

impl From<AxisState> for u8 {
    fn from(state: AxisState) -> Self {
        match state {
            AxisState::Undefined => 0x0,
            AxisState::Idle => 0x1,
            AxisState::StartupSequence => 0x2,
            AxisState::FullCalibrationSequence => 0x3,
            AxisState::MotorCalibration => 0x4,
            AxisState::EncoderIndexSearch => 0x6,
            AxisState::EncoderOffsetCalibration => 0x7,
            AxisState::ClosedLoopControl => 0x8,
            AxisState::LockinSpin => 0x9,
            AxisState::EncoderDirFind => 0xA,
            AxisState::Homing => 0xB,
            AxisState::EncoderHallPolarityCalibration => 0xC,
            AxisState::EncoderHallPhaseCalibration => 0xD,
            AxisState::AnticoggingCalibration => 0xE,
            AxisState::Other(value) => value,
        }
    }
}

impl fmt::Display for AxisState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AxisState::Other(value) => write!(f, "unknown({})", value),
            state => write!(f, "{:?}({})", state, u8::from(*state)),
        }
    }
}

/// One periodic status sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// System error bits, bytes 0..4
    pub system_error: u32,
    /// Axis state, byte 4
    pub axis_state: AxisState,
    /// Bit-significant status flags, byte 5
    pub flags: u8,
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "state: {}, flags: {:08b}, error: 0x{:08X}",
            self.axis_state, self.flags, self.system_error
        )
    }
}

/// Decodes a heartbeat frame.
pub fn decode_heartbeat(frame: &Frame) -> Result<Heartbeat, Error> {
    let data = require(frame, Command::Heartbeat, 6)?;

    Ok(Heartbeat {
        system_error: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        axis_state: AxisState::from(data[4]),
        flags: data[5],
    })
}

/// Position and velocity estimate reported by the encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderEstimate {
    /// Position in turns
    pub position: f32,
    /// Velocity in turns per second
    pub velocity: f32,
}

impl fmt::Display for EncoderEstimate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "position: {:.2} turns, velocity: {:.2} turns/s",
            self.position, self.velocity
        )
    }
}

/// Decodes a get-encoder-estimates reply.
pub fn decode_encoder_estimate(frame: &Frame) -> Result<EncoderEstimate, Error> {
    let data = require(frame, Command::GetEncoderEstimates, 8)?;

    Ok(EncoderEstimate {
        position: f32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        velocity: f32::from_le_bytes([data[4], data[5], data[6], data[7]]),
    })
}
