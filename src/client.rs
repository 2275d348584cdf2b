// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    can::{Frame, Transport},
    error::Error,
    protocol::{
        decode_encoder_estimate, decode_error_payload, decode_heartbeat, encode_command,
        AxisState, Command, EncoderEstimate, ErrorCode, ErrorType, Heartbeat, NodeId,
    },
    waiter,
};
use log::{debug, info, warn};
use std::{thread, time::Duration};

/// Timing of every blocking operation performed by the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientConfig {
    /// Budget for a single request/response exchange or heartbeat wait
    pub response_timeout: Duration,
    /// Upper bound on each individual receive from the bus
    pub receive_slice: Duration,
    /// Pause after save-configuration and after reboot
    pub settle_delay: Duration,
    /// Heartbeat wait per calibration poll iteration
    pub poll_interval: Duration,
    /// Deadline for motor calibration to return to idle
    pub motor_calibration_deadline: Duration,
    /// Deadline for encoder offset calibration to return to idle
    pub encoder_calibration_deadline: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            response_timeout: Duration::from_secs(3),
            receive_slice: Duration::from_secs(1),
            settle_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            motor_calibration_deadline: Duration::from_secs(15),
            encoder_calibration_deadline: Duration::from_secs(20),
        }
    }
}

/// Diagnostic client bound to one node.
///
/// Commands are strictly sequential: every primitive sends at most one
/// request and consumes its reply before returning.
pub struct Client<T: Transport> {
    transport: T,
    node: NodeId,
    config: ClientConfig,
}

impl<T: Transport> Client<T> {
    /// Creates a client which owns `transport` for its lifetime.
    pub fn new(transport: T, node: NodeId, config: ClientConfig) -> Self {
        Client {
            transport,
            node,
            config,
        }
    }

    /// Node addressed by this client.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Timing configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Releases the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Sends `command` to the node, zero padding the payload to eight bytes.
    pub fn send_command(&mut self, command: Command, payload: Option<&[u8]>) -> Result<(), Error> {
        let frame = encode_command(self.node, command, payload);
        debug!("send {:?} {:?}", command, frame);
        self.transport.send(&frame)
    }

    /// Waits for the next frame carrying `command` from the node.
    pub fn wait_for(&mut self, command: Command, timeout: Duration) -> Result<Frame, Error> {
        waiter::wait_for(
            &mut self.transport,
            self.node,
            command,
            timeout,
            self.config.receive_slice,
        )
    }

    /// Waits up to `timeout` for an unsolicited heartbeat.
    pub fn heartbeat_within(&mut self, timeout: Duration) -> Result<Option<Heartbeat>, Error> {
        match self.wait_for(Command::Heartbeat, timeout) {
            Ok(frame) => decode_heartbeat(&frame).map(Some),
            Err(Error::Timeout { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Waits for the next heartbeat; no request is sent since the node
    /// broadcasts it periodically. `Ok(None)` means nothing arrived.
    pub fn heartbeat(&mut self) -> Result<Option<Heartbeat>, Error> {
        let heartbeat = self.heartbeat_within(self.config.response_timeout)?;
        match &heartbeat {
            Some(hb) => info!("heartbeat {}", hb),
            None => warn!("no heartbeat from node {}", self.node),
        }
        Ok(heartbeat)
    }

    /// Reads one error register. `Ok(None)` means the node did not answer,
    /// which is distinct from a cleared register.
    pub fn errors(&mut self, error_type: ErrorType) -> Result<Option<ErrorCode>, Error> {
        self.send_command(Command::GetError, Some(&[error_type as u8][..]))?;

        match self.wait_for(Command::GetError, self.config.response_timeout) {
            Ok(frame) => {
                let code = decode_error_payload(&frame, error_type)?;
                info!("{} error: {}", error_type, code);
                Ok(Some(code))
            }
            Err(Error::Timeout { .. }) => {
                warn!("no {} error response", error_type);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Reads the encoder position and velocity estimate.
    pub fn encoder_estimates(&mut self) -> Result<Option<EncoderEstimate>, Error> {
        self.send_command(Command::GetEncoderEstimates, None)?;

        match self.wait_for(Command::GetEncoderEstimates, self.config.response_timeout) {
            Ok(frame) => {
                let estimate = decode_encoder_estimate(&frame)?;
                info!("encoder {}", estimate);
                Ok(Some(estimate))
            }
            Err(Error::Timeout { .. }) => {
                warn!("no encoder estimate response");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Requests an axis state transition. The node does not acknowledge it.
    pub fn set_axis_state(&mut self, state: AxisState) -> Result<(), Error> {
        self.send_command(Command::SetAxisState, Some(&[u8::from(state)][..]))
    }

    /// Persists the configuration and reboots the node. Neither command is
    /// acknowledged, the node is given the settle delay after each.
    pub fn save_and_reboot(&mut self) -> Result<(), Error> {
        info!("saving configuration");
        self.send_command(Command::SaveConfiguration, None)?;
        thread::sleep(self.config.settle_delay);

        info!("rebooting node {}", self.node);
        self.send_command(Command::Reboot, None)?;
        thread::sleep(self.config.settle_delay);

        Ok(())
    }

    /// Streams heartbeats to `on_sample` until the transport fails, e.g.
    /// because the run was interrupted.
    pub fn monitor<F: FnMut(Heartbeat)>(&mut self, mut on_sample: F) -> Result<(), Error> {
        loop {
            if let Some(hb) = self.heartbeat_within(self.config.response_timeout)? {
                on_sample(hb);
            } else {
                warn!("no heartbeat from node {}", self.node);
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ClientConfig {
    ClientConfig {
        response_timeout: Duration::from_millis(40),
        receive_slice: Duration::from_millis(5),
        settle_delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(10),
        motor_calibration_deadline: Duration::from_millis(80),
        encoder_calibration_deadline: Duration::from_millis(100),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{ScriptedBus, SimulatedNode},
        protocol::{arbitration_id, split_arbitration_id},
    };

    fn node() -> NodeId {
        NodeId::new(1).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.response_timeout, Duration::from_secs(3));
        assert_eq!(config.motor_calibration_deadline, Duration::from_secs(15));
        assert_eq!(config.encoder_calibration_deadline, Duration::from_secs(20));
    }

    #[test]
    fn test_heartbeat_sends_nothing() {
        let mut client = Client::new(SimulatedNode::new(node()), node(), test_config());
        let hb = client.heartbeat().unwrap().unwrap();
        assert_eq!(hb.axis_state, AxisState::Idle);
        assert!(client.into_inner().sent().is_empty());
    }

    #[test]
    fn test_heartbeat_no_response() {
        let mut client = Client::new(ScriptedBus::default(), node(), test_config());
        assert_eq!(client.heartbeat().unwrap(), None);
    }

    #[test]
    fn test_errors_request_layout() {
        let mut sim = SimulatedNode::new(node());
        sim.errors.insert(1, vec![0x01, 0, 0, 0, 0, 0, 0, 0]);
        sim.errors.insert(4, vec![0x00, 0x02, 0, 0]);

        let mut client = Client::new(sim, node(), test_config());
        assert_eq!(
            client.errors(ErrorType::Motor).unwrap(),
            Some(ErrorCode::Motor(1))
        );
        assert_eq!(
            client.errors(ErrorType::Encoder).unwrap(),
            Some(ErrorCode::Encoder(0x200))
        );
        assert_eq!(
            client.errors(ErrorType::System).unwrap(),
            Some(ErrorCode::System(0))
        );

        let sim = client.into_inner();
        let sent = sim.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].id, arbitration_id(node(), Command::GetError));
        assert_eq!(sent[0].data(), &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(sent[1].data(), &[4, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(sent[2].data(), &[0; 8]);
    }

    #[test]
    fn test_errors_no_response_is_not_zero() {
        let mut sim = SimulatedNode::new(node());
        sim.answers = false;

        let mut client = Client::new(sim, node(), test_config());
        assert_eq!(client.errors(ErrorType::System).unwrap(), None);
    }

    #[test]
    fn test_errors_malformed_is_loud() {
        let mut sim = SimulatedNode::new(node());
        sim.errors.insert(1, vec![0, 0, 0, 0]);

        let mut client = Client::new(sim, node(), test_config());
        let err = client.errors(ErrorType::Motor).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedPayload {
                command: Command::GetError,
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_encoder_estimates() {
        let mut sim = SimulatedNode::new(node());
        sim.estimate = EncoderEstimate {
            position: 12.5,
            velocity: -3.0,
        };

        let mut client = Client::new(sim, node(), test_config());
        let estimate = client.encoder_estimates().unwrap().unwrap();
        assert_eq!(estimate.position, 12.5);
        assert_eq!(estimate.velocity, -3.0);

        let sim = client.into_inner();
        assert_eq!(sim.commands(), vec![Command::GetEncoderEstimates]);
        assert_eq!(sim.sent()[0].data(), &[0; 8]);
    }

    #[test]
    fn test_encoder_estimates_no_response() {
        let mut client = Client::new(ScriptedBus::default(), node(), test_config());
        assert_eq!(client.encoder_estimates().unwrap(), None);
    }

    #[test]
    fn test_save_and_reboot() {
        let mut client = Client::new(ScriptedBus::default(), node(), test_config());
        client.save_and_reboot().unwrap();

        let bus = client.into_inner();
        let commands: Vec<u8> = bus
            .sent()
            .iter()
            .map(|frame| split_arbitration_id(frame.id).1)
            .collect();
        assert_eq!(
            commands,
            vec![Command::SaveConfiguration as u8, Command::Reboot as u8]
        );
    }

    #[test]
    fn test_monitor_stops_on_transport_error() {
        let mut bus = ScriptedBus::default();
        let idle = [0, 0, 0, 0, 1, 0, 0, 0];
        bus.push(encode_command(node(), Command::Heartbeat, Some(&idle)));
        bus.push(encode_command(node(), Command::Heartbeat, Some(&idle)));
        bus.fail_after_queue();

        let mut client = Client::new(bus, node(), test_config());
        let mut samples = Vec::new();
        let err = client.monitor(|hb| samples.push(hb)).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(samples.len(), 2);
    }
}
