// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use gimdiag::{
    calibration::{CalibrationPoller, CalibrationState},
    can::SocketCanTransport,
    full_diagnostic,
    protocol::NodeId,
    Client, ClientConfig, DiagnosticReport, Error, Reading,
};
use serde_json::{json, Value};
use std::{
    fmt::Display,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};

fn reading_json<T: Display>(reading: &Reading<T>, ok: bool) -> Value {
    match reading {
        Reading::Received(value) => json!({ "ok": ok, "value": value.to_string() }),
        Reading::NoResponse => json!({ "ok": false, "error": "no response" }),
        Reading::Malformed(err) => json!({ "ok": false, "error": err }),
    }
}

fn report_json(report: &DiagnosticReport) -> Value {
    let estimate = match &report.encoder_estimate {
        Reading::Received(estimate) => json!({
            "position": estimate.position,
            "velocity": estimate.velocity,
        }),
        _ => Value::Null,
    };

    json!({
        "communication": reading_json(&report.heartbeat, report.communication_ok()),
        "system_error": reading_json(&report.system_error, report.system_ok()),
        "motor_error": reading_json(&report.motor_error, report.motor_ok()),
        "encoder_error": reading_json(&report.encoder_error, report.encoder_ok()),
        "encoder_estimate": estimate,
        "motor_calibration": reading_json(&report.motor_calibration, report.motor_calibration_ok()),
        "encoder_calibration": reading_json(
            &report.encoder_calibration,
            report.encoder_calibration_ok()
        ),
        "passed": report.passed(),
    })
}

fn print_reading<T: Display>(label: &str, reading: Option<T>) -> bool {
    match reading {
        Some(value) => {
            println!("{}: {}", label, value);
            true
        }
        None => {
            println!("{}: no response", label);
            false
        }
    }
}

/// Runs the requested operations to completion on the calling thread.
fn run(args: &Args, client: &mut Client<SocketCanTransport>) -> Result<bool, Error> {
    if !args.single_operation() {
        let report = full_diagnostic(client)?;
        match args.json {
            true => println!("{}", report_json(&report)),
            false => println!("{}", report),
        }
        return Ok(report.passed());
    }

    let mut ok = true;

    if args.heartbeat {
        ok &= print_reading("Heartbeat", client.heartbeat()?);
    }

    if let Some(error_type) = args.errors {
        let code = client.errors(error_type)?;
        ok &= code.is_some_and(|code| code.is_clear());
        print_reading(&format!("{} error", error_type), code);
    }

    if args.estimates {
        ok &= print_reading("Encoder", client.encoder_estimates()?);
    }

    if let Some(kind) = args.calibrate {
        let state = CalibrationPoller::new(kind).run(client)?;
        println!("{} calibration: {}", kind, state);
        ok &= state == CalibrationState::Success;
    }

    if args.save_reboot {
        client.save_and_reboot()?;
        println!("Configuration saved, node rebooted");
    }

    if args.monitor {
        match client.monitor(|hb| println!("{}", hb)) {
            Err(Error::Interrupted) => {}
            Err(err) => return Err(err),
            Ok(()) => {}
        }
    }

    Ok(ok)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    tracing_log::LogTracer::init()?;

    let node = NodeId::new(args.node_id)?;
    let interrupted = Arc::new(AtomicBool::new(false));
    let transport = SocketCanTransport::open(&args.device, interrupted.clone())?;
    let config = ClientConfig::from(&args);

    // The client, and with it the socket, is dropped at the end of the
    // blocking task whichever way the run ends.
    let mut task = tokio::task::spawn_blocking(move || {
        let _span = info_span!("diagnostic", node = node.get(), device = %args.device).entered();
        let mut client = Client::new(transport, node, config);
        run(&args, &mut client)
    });

    let result = tokio::select! {
        result = &mut task => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, waiting for the current bus operation to finish");
            interrupted.store(true, Ordering::Relaxed);
            task.await?
        }
    };

    match result {
        Ok(true) => {
            info!("motor ready");
            Ok(ExitCode::SUCCESS)
        }
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(Error::Interrupted) => {
            warn!("interrupted by user");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}
