//! USB to TCP/IP wireless-pairing state machine.
//!
//! Drives a cable-attached device through IP discovery, TCP/IP mode
//! switch, reconnect-over-network, and registry verification. `Done`
//! and `Failed` are terminal; retrying means creating a new session.
//! The machine never mutates the USB device's liveness: the cable can
//! be unplugged any time after `Done` without affecting the network
//! session.

use std::time::Duration;

use mircast_protocol::{Device, DeviceState};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::error::{Error, PairingFailure, Result};
use crate::registry::DeviceRegistry;

/// Phases of one pairing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPhase {
    DiscoverIp,
    EnableTcpip,
    AwaitReconnect,
    Verify,
    Done,
    Failed,
}

/// Tunables for the pairing machine. The defaults are conservative:
/// three reconnect attempts at 2 s spacing cover the window in which
/// the device restarts its bridge daemon in TCP mode.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    pub port: u16,
    pub connect_retries: u32,
    pub connect_backoff: Duration,
    pub verify_timeout: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            port: 5555,
            connect_retries: 3,
            connect_backoff: Duration::from_secs(2),
            verify_timeout: Duration::from_secs(5),
        }
    }
}

/// Progress snapshot published on every phase transition and failed
/// connect attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PairingUpdate {
    pub serial: String,
    pub phase: PairingPhase,
    pub target_ip: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// One pairing session for one device. Construct, optionally take the
/// update stream, then consume with [`PairingSession::run`].
pub struct PairingSession {
    serial: String,
    config: PairingConfig,
    phase: PairingPhase,
    target_ip: Option<String>,
    attempts: u32,
    last_error: Option<String>,
    updates: Option<mpsc::UnboundedSender<PairingUpdate>>,
}

impl PairingSession {
    pub fn new(serial: impl Into<String>, config: PairingConfig) -> Self {
        Self {
            serial: serial.into(),
            config,
            phase: PairingPhase::DiscoverIp,
            target_ip: None,
            attempts: 0,
            last_error: None,
            updates: None,
        }
    }

    /// Installs and returns the progress stream.
    pub fn updates(&mut self) -> mpsc::UnboundedReceiver<PairingUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.updates = Some(tx);
        rx
    }

    pub fn phase(&self) -> PairingPhase {
        self.phase
    }

    /// Runs the machine to a terminal phase. On success the verified
    /// network-transport device is returned; the registry will have
    /// observed it independently through its poll loop.
    pub async fn run(
        mut self,
        bridge: &dyn Bridge,
        registry: &DeviceRegistry,
    ) -> Result<Device> {
        self.enter(PairingPhase::DiscoverIp);
        let ip = match bridge.device_ip(&self.serial).await {
            Ok(Some(ip)) => ip,
            Ok(None) => {
                return Err(self.fail(
                    PairingFailure::NoNetwork,
                    "device reported no Wi-Fi address; is it on the same network?".to_owned(),
                ));
            }
            Err(e) => return Err(self.fail(PairingFailure::NoNetwork, e.to_string())),
        };
        self.target_ip = Some(ip.clone());

        self.enter(PairingPhase::EnableTcpip);
        if let Err(e) = bridge.set_tcpip(&self.serial, self.config.port).await {
            return Err(self.fail(PairingFailure::EnableFailed, e.to_string()));
        }

        self.enter(PairingPhase::AwaitReconnect);
        let mut connected = None;
        for attempt in 1..=self.config.connect_retries {
            self.attempts = attempt;
            // The device needs a moment to restart its daemon in TCP
            // mode before it accepts the first connect.
            tokio::time::sleep(self.config.connect_backoff).await;
            match bridge.connect_tcp(&ip, self.config.port).await {
                Ok(device) => {
                    connected = Some(device);
                    break;
                }
                Err(e) => {
                    debug!(
                        target = "mircast.pairing",
                        serial = %self.serial,
                        attempt,
                        error = %e,
                        "reconnect attempt failed"
                    );
                    self.last_error = Some(e.to_string());
                    self.emit();
                }
            }
        }
        let Some(device) = connected else {
            return Err(self.fail(
                PairingFailure::ConnectTimeout,
                format!(
                    "no response from {ip}:{} after {} attempts",
                    self.config.port, self.config.connect_retries
                ),
            ));
        };

        self.enter(PairingPhase::Verify);
        match registry
            .wait_for_state(&device.serial, DeviceState::Ready, self.config.verify_timeout)
            .await
        {
            Some(verified) => {
                self.enter(PairingPhase::Done);
                Ok(verified)
            }
            None => Err(self.fail(
                PairingFailure::VerifyTimeout,
                format!(
                    "{} did not appear ready within {}ms",
                    device.serial,
                    self.config.verify_timeout.as_millis()
                ),
            )),
        }
    }

    fn enter(&mut self, phase: PairingPhase) {
        self.phase = phase;
        info!(
            target = "mircast.pairing",
            serial = %self.serial,
            phase = ?phase,
            "pairing phase"
        );
        self.emit();
    }

    fn fail(&mut self, reason: PairingFailure, detail: String) -> Error {
        warn!(
            target = "mircast.pairing",
            serial = %self.serial,
            reason = %reason,
            detail = %detail,
            "pairing failed"
        );
        self.last_error = Some(detail.clone());
        self.phase = PairingPhase::Failed;
        self.emit();
        Error::PairingFailed { reason, detail }
    }

    fn emit(&self) {
        if let Some(tx) = &self.updates {
            let _ = tx.send(PairingUpdate {
                serial: self.serial.clone(),
                phase: self.phase,
                target_ip: self.target_ip.clone(),
                attempts: self.attempts,
                last_error: self.last_error.clone(),
            });
        }
    }
}
