//! Scripted bridge fake shared by registry and pairing tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use mircast_protocol::{Device, DeviceState};
use parking_lot::Mutex;

use crate::bridge::Bridge;
use crate::error::{Error, Result};

pub(crate) struct FakeBridge {
    state: Mutex<FakeState>,
}

struct FakeState {
    devices: Vec<Device>,
    ip: Option<String>,
    tcpip_ok: bool,
    /// Scripted per-attempt connect outcomes; empty means succeed.
    connect_script: VecDeque<Result<()>>,
    connect_attempts: u32,
    /// When false, a successful connect never shows up in enumeration.
    connect_enumerates: bool,
}

impl FakeBridge {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                devices,
                ip: Some("192.168.1.23".to_owned()),
                tcpip_ok: true,
                connect_script: VecDeque::new(),
                connect_attempts: 0,
                connect_enumerates: true,
            }),
        }
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        self.state.lock().devices = devices;
    }

    pub fn set_ip(&self, ip: Option<&str>) {
        self.state.lock().ip = ip.map(str::to_owned);
    }

    pub fn deny_tcpip(&self) {
        self.state.lock().tcpip_ok = false;
    }

    pub fn script_connect(&self, outcomes: Vec<Result<()>>) {
        self.state.lock().connect_script = outcomes.into();
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    /// Connects succeed but the device never enumerates afterwards.
    pub fn connect_without_enumeration(&self) {
        self.state.lock().connect_enumerates = false;
    }

    pub fn network_device_count(&self) -> usize {
        self.state
            .lock()
            .devices
            .iter()
            .filter(|d| d.transport == mircast_protocol::Transport::Network)
            .count()
    }
}

#[async_trait]
impl Bridge for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(self.state.lock().devices.clone())
    }

    async fn get_prop(&self, _serial: &str, _key: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn set_tcpip(&self, serial: &str, port: u16) -> Result<()> {
        if self.state.lock().tcpip_ok {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: format!("-s {serial} tcpip {port}"),
                detail: "error: closed".to_owned(),
            })
        }
    }

    async fn connect_tcp(&self, ip: &str, port: u16) -> Result<Device> {
        let target = format!("{ip}:{port}");
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        match state.connect_script.pop_front() {
            Some(Err(e)) => Err(e),
            Some(Ok(())) | None => {
                let device = Device::network(target, DeviceState::Ready);
                if state.connect_enumerates {
                    state.devices.push(device.clone());
                }
                Ok(device)
            }
        }
    }

    async fn disconnect(&self, serial: &str) -> Result<()> {
        self.state.lock().devices.retain(|d| d.serial != serial);
        Ok(())
    }

    async fn device_ip(&self, _serial: &str) -> Result<Option<String>> {
        Ok(self.state.lock().ip.clone())
    }
}
