//! Wi-Fi station link adapter.
//!
//! Implements [`LinkPort`] — the boundary to network association, which
//! is otherwise the platform's business. The MQTT supervisor only runs
//! while this link reports up.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` STA
//!   association, handles threaded in from the entry point.
//! - **all other targets**: simulation for host-side tests.
//!
//! ## Reconnection policy
//!
//! On a lost link the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) before re-associating, counted down in control
//! ticks like the broker supervisor's delay.

use log::{info, warn};

use crate::app::ports::{LinkError, LinkPort};

const MIN_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Down,
    Up,
    /// Waiting out a backoff delay before the next association attempt.
    Retrying,
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_credentials(ssid: &str, password: &str) -> Result<(), LinkError> {
    if ssid.is_empty() {
        return Err(LinkError::NoCredentials);
    }
    if ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidSsid);
    }
    if !password.is_empty() && !(8..=64).contains(&password.len()) {
        return Err(LinkError::InvalidPassword);
    }
    Ok(())
}

pub struct WifiLink {
    state: LinkState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u32,
    wait_remaining: f32,

    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,

    /// Simulation: counts association attempts for deterministic tests.
    #[cfg(not(target_os = "espidf"))]
    sim_connect_counter: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next: bool,
}

impl WifiLink {
    pub fn new(
        ssid: &str,
        password: &str,
        #[cfg(target_os = "espidf")] wifi: esp_idf_svc::wifi::BlockingWifi<
            esp_idf_svc::wifi::EspWifi<'static>,
        >,
    ) -> Result<Self, LinkError> {
        validate_credentials(ssid, password)?;
        let mut ssid_buf = heapless::String::new();
        ssid_buf.push_str(ssid).map_err(|()| LinkError::InvalidSsid)?;
        let mut password_buf = heapless::String::new();
        password_buf
            .push_str(password)
            .map_err(|()| LinkError::InvalidPassword)?;
        Ok(Self {
            state: LinkState::Down,
            ssid: ssid_buf,
            password: password_buf,
            backoff_secs: MIN_BACKOFF_SECS,
            wait_remaining: 0.0,
            #[cfg(target_os = "espidf")]
            wifi,
            #[cfg(not(target_os = "espidf"))]
            sim_connect_counter: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_fail_next: false,
        })
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), LinkError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| LinkError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| LinkError::InvalidPassword)?,
            auth_method: if self.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        self.wifi
            .set_configuration(&conf)
            .map_err(|_| LinkError::ConnectFailed)?;
        self.wifi.start().map_err(|_| LinkError::ConnectFailed)?;
        self.wifi.connect().map_err(|_| LinkError::ConnectFailed)?;
        self.wifi
            .wait_netif_up()
            .map_err(|_| LinkError::ConnectFailed)?;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_up(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), LinkError> {
        self.sim_connect_counter = self.sim_connect_counter.wrapping_add(1);
        if self.sim_fail_next {
            self.sim_fail_next = false;
            return Err(LinkError::ConnectFailed);
        }
        info!(
            "wifi(sim): associated with '{}' (attempt {})",
            self.ssid, self.sim_connect_counter
        );
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_up(&self) -> bool {
        self.state == LinkState::Up
    }

    // ── Test hooks (host only) ────────────────────────────────

    /// Make the next association attempt fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn fail_next_connect(&mut self) {
        self.sim_fail_next = true;
    }

    /// Simulate the access point going away.
    #[cfg(not(target_os = "espidf"))]
    pub fn drop_link(&mut self) {
        self.state = LinkState::Down;
    }
}

impl LinkPort for WifiLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        info!("wifi: associating with '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.state = LinkState::Up;
                self.backoff_secs = MIN_BACKOFF_SECS;
                info!("wifi: link up");
                Ok(())
            }
            Err(e) => {
                warn!("wifi: association failed — {e}");
                self.state = LinkState::Retrying;
                self.wait_remaining = self.backoff_secs as f32;
                self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                Err(e)
            }
        }
    }

    fn is_up(&self) -> bool {
        self.platform_is_up()
    }

    fn poll(&mut self, elapsed_secs: f32) {
        match self.state {
            LinkState::Up => {
                if !self.platform_is_up() {
                    warn!("wifi: link lost, scheduling re-association");
                    self.state = LinkState::Retrying;
                    self.wait_remaining = self.backoff_secs as f32;
                }
            }
            LinkState::Retrying => {
                if self.wait_remaining > 0.0 {
                    self.wait_remaining -= elapsed_secs;
                    return;
                }
                let _ = self.connect();
            }
            LinkState::Down => {
                let _ = self.connect();
            }
        }
    }
}
