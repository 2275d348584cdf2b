// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use gimdiag::{
    calibration::CalibrationKind, protocol::ErrorType, protocol::MAX_NODE_ID, ClientConfig,
};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|err| format!("invalid seconds '{}': {}", value, err))?;
    Duration::try_from_secs_f64(secs).map_err(|err| format!("invalid seconds '{}': {}", value, err))
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// CAN device connected to the motor controller
    #[arg(short, long, env, default_value = "can0")]
    pub device: String,

    /// Node id of the motor controller
    #[arg(
        short,
        long,
        env,
        default_value = "1",
        value_parser = clap::value_parser!(u8).range(0..=MAX_NODE_ID as i64)
    )]
    pub node_id: u8,

    /// Wait for one heartbeat and print it.
    #[arg(long)]
    pub heartbeat: bool,

    /// Read one error register.
    #[arg(long, value_enum)]
    pub errors: Option<ErrorType>,

    /// Read the encoder position and velocity estimates.
    #[arg(long)]
    pub estimates: bool,

    /// Run one calibration procedure.
    #[arg(long, value_enum)]
    pub calibrate: Option<CalibrationKind>,

    /// Save the configuration and reboot the node.
    #[arg(long)]
    pub save_reboot: bool,

    /// Monitor the heartbeat until interrupted.
    #[arg(short, long)]
    pub monitor: bool,

    /// Print the diagnostic report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Response timeout in seconds
    #[arg(long, env, default_value = "3", value_parser = parse_seconds)]
    pub response_timeout: Duration,

    /// Upper bound on a single bus receive in seconds
    #[arg(long, env, default_value = "1", value_parser = parse_seconds)]
    pub receive_slice: Duration,

    /// Delay after save and after reboot in seconds
    #[arg(long, env, default_value = "3", value_parser = parse_seconds)]
    pub settle_delay: Duration,

    /// Heartbeat wait per calibration poll in seconds
    #[arg(long, env, default_value = "1", value_parser = parse_seconds)]
    pub poll_interval: Duration,

    /// Motor calibration deadline in seconds
    #[arg(long, env, default_value = "15", value_parser = parse_seconds)]
    pub motor_calibration_deadline: Duration,

    /// Encoder offset calibration deadline in seconds
    #[arg(long, env, default_value = "20", value_parser = parse_seconds)]
    pub encoder_calibration_deadline: Duration,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,
}

impl Args {
    /// True when a single operation was requested instead of the full run.
    pub fn single_operation(&self) -> bool {
        self.heartbeat
            || self.errors.is_some()
            || self.estimates
            || self.calibrate.is_some()
            || self.save_reboot
            || self.monitor
    }
}

impl From<&Args> for ClientConfig {
    fn from(args: &Args) -> Self {
        ClientConfig {
            response_timeout: args.response_timeout,
            receive_slice: args.receive_slice,
            settle_delay: args.settle_delay,
            poll_interval: args.poll_interval,
            motor_calibration_deadline: args.motor_calibration_deadline,
            encoder_calibration_deadline: args.encoder_calibration_deadline,
        }
    }
}
