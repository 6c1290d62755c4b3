//! 配网流程总控
//!
//! 1. 读取保存的凭据
//! 2. 有 SSID 就先在限定时间内尝试 STA 连接
//! 3. 连上直接返回成功，不启动门户
//! 4. 否则启动配网门户，返回门户的结果

use std::sync::{Arc, Mutex};

use crate::attempt::{AttemptState, ConnectionAttempt};
use crate::captive_portal::{
    DnsResponder, DnsSocket, PortalConfig, PortalSession, RouteHost, SessionResult,
};
use crate::clock::{Clock, SystemClock};
use crate::radio::{RadioControl, RadioMode};
use crate::storage::{CredentialStore, KeyValueStore, StationCredentials};
use crate::{lock, Shared, PORTAL_POLL_INTERVAL_MS, STATION_POLL_INTERVAL_MS};

/// 对外可见的流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    /// 还没开始
    Idle,
    /// 正在用保存的凭据连接 STA
    Station,
    /// 配网门户运行中
    Portal,
    Connected,
    NotConnected,
}

enum Phase<R, S> {
    Idle,
    Station(ConnectionAttempt),
    Portal(PortalSession<R, S>),
    Finished(bool),
}

pub struct ProvisioningController<R, S, H, D, C = SystemClock> {
    radio: Shared<R>,
    store: Shared<CredentialStore<S>>,
    host: H,
    dns: DnsResponder<D>,
    clock: C,
    config: PortalConfig,
    credentials: StationCredentials,
    phase: Phase<R, S>,
}

impl<R, S, H, D, C> ProvisioningController<R, S, H, D, C>
where
    R: RadioControl + Send + 'static,
    S: KeyValueStore + Send + 'static,
    H: RouteHost,
    D: DnsSocket,
    C: Clock,
{
    pub fn new(radio: R, kv: S, host: H, dns_socket: D, clock: C) -> Self {
        Self {
            radio: Arc::new(Mutex::new(radio)),
            store: Arc::new(Mutex::new(CredentialStore::new(kv))),
            host,
            dns: DnsResponder::new(dns_socket),
            clock,
            config: PortalConfig::default(),
            credentials: StationCredentials::default(),
            phase: Phase::Idle,
        }
    }

    /// 设置配网 AP 名称、密码和门户超时
    pub fn auto_connect(&mut self, ap_ssid: &str, ap_password: &str, portal_timeout_ms: u32) -> bool {
        let config = PortalConfig {
            ap_ssid: ap_ssid.to_string(),
            ap_password: ap_password.to_string(),
            portal_timeout_ms,
            ..self.config.clone()
        };
        self.set_portal_config(config)
    }

    /// 流程运行中调用无效，返回 `false`
    pub fn set_portal_config(&mut self, config: PortalConfig) -> bool {
        if self.is_running() {
            log::warn!("[ESPConnect] Portal config ignored while provisioning is running");
            return false;
        }
        self.config = config;
        true
    }

    /// 开始一次配网流程，之后由 [`Self::tick`] 推进
    pub fn start(&mut self, station_timeout_ms: u32) -> bool {
        if self.is_running() {
            log::warn!("[ESPConnect] Provisioning already running");
            return false;
        }

        self.credentials = lock(&self.store).load();
        let now = self.clock.now_ms();

        if self.credentials.is_configured() {
            log::info!(
                "[ESPConnect] STA pre-configured: ssid={:?} password={}",
                self.credentials.ssid,
                self.credentials.masked_password()
            );
            let mut radio = lock(&self.radio);
            if let Err(e) = radio.set_mode(RadioMode::Station) {
                log::warn!("[ESPConnect] {}", e);
            }
            let attempt =
                ConnectionAttempt::start(&mut *radio, &self.credentials, station_timeout_ms, now);
            drop(radio);
            self.phase = Phase::Station(attempt);
        } else {
            log::info!("[ESPConnect] No stored credentials");
            self.open_portal(now);
        }
        true
    }

    /// 推进一步，流程结束后返回 `Some(是否已连接)`
    pub fn tick(&mut self) -> Option<bool> {
        let now = self.clock.now_ms();
        match &mut self.phase {
            Phase::Idle => None,
            Phase::Finished(connected) => Some(*connected),
            Phase::Station(attempt) => {
                let state = attempt.poll(&*lock(&self.radio), now);
                match state {
                    AttemptState::Connecting => None,
                    AttemptState::Connected => {
                        log::info!("[ESPConnect] Connected to STA");
                        self.phase = Phase::Finished(true);
                        Some(true)
                    }
                    AttemptState::Idle | AttemptState::TimedOut => {
                        log::warn!("[ESPConnect] Connection to STA failed");
                        self.open_portal(now);
                        None
                    }
                }
            }
            Phase::Portal(session) => {
                if !session.tick(&mut self.dns, now) {
                    return None;
                }
                Some(self.close_portal())
            }
        }
    }

    /// 阻塞直到连上或门户超时
    pub fn begin(&mut self, station_timeout_ms: u32) -> bool {
        if !self.start(station_timeout_ms) {
            return false;
        }
        loop {
            if let Some(connected) = self.tick() {
                return connected;
            }
            let interval = match self.phase {
                Phase::Station(_) => STATION_POLL_INTERVAL_MS,
                _ => PORTAL_POLL_INTERVAL_MS,
            };
            self.clock.idle(interval);
        }
    }

    /// 清除保存的凭据并断开 STA
    pub fn erase(&mut self) -> bool {
        let erased = lock(&self.store).erase();
        if let Err(e) = lock(&self.radio).disconnect() {
            log::warn!("[ESPConnect] {}", e);
        }
        match erased {
            Ok(()) => {
                self.credentials = StationCredentials::default();
                log::info!("[ESPConnect] Credentials erased");
                true
            }
            Err(e) => {
                log::error!("[ESPConnect] Failed to erase credentials: {}", e);
                false
            }
        }
    }

    /// 重新读取存储里的凭据，之后 [`Self::ssid`] 返回读到的值
    pub fn is_configured(&mut self) -> bool {
        self.credentials = lock(&self.store).load();
        self.credentials.is_configured()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.radio).is_connected()
    }

    pub fn ssid(&self) -> &str {
        &self.credentials.ssid
    }

    pub fn password(&self) -> &str {
        &self.credentials.password
    }

    pub fn state(&self) -> ProvisioningState {
        match self.phase {
            Phase::Idle => ProvisioningState::Idle,
            Phase::Station(_) => ProvisioningState::Station,
            Phase::Portal(_) => ProvisioningState::Portal,
            Phase::Finished(true) => ProvisioningState::Connected,
            Phase::Finished(false) => ProvisioningState::NotConnected,
        }
    }

    /// 门户运行中时返回 AP 地址
    pub fn access_point_ip(&self) -> Option<std::net::Ipv4Addr> {
        match &self.phase {
            Phase::Portal(session) => session.access_point_ip(),
            _ => None,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn radio(&self) -> &Shared<R> {
        &self.radio
    }

    pub fn store(&self) -> &Shared<CredentialStore<S>> {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn dns(&self) -> &DnsResponder<D> {
        &self.dns
    }

    pub fn dns_mut(&mut self) -> &mut DnsResponder<D> {
        &mut self.dns
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Station(_) | Phase::Portal(_))
    }

    fn open_portal(&mut self, now: u32) {
        let session = PortalSession::open(
            self.config.clone(),
            self.radio.clone(),
            self.store.clone(),
            &self.credentials,
            &mut self.host,
            &mut self.dns,
            now,
        );
        self.phase = Phase::Portal(session);
    }

    fn close_portal(&mut self) -> bool {
        let Phase::Portal(session) = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return false;
        };
        let connected = session.close(&mut self.host, &mut self.dns) == SessionResult::Connected;
        if connected {
            // 提交的凭据已经写入存储
            self.credentials = lock(&self.store).load();
        }
        self.phase = Phase::Finished(connected);
        connected
    }
}
