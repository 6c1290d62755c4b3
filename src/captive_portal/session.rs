//! 配网会话：SoftAP + DNS 重定向 + HTTP 路由
//!
//! 会话由 [`PortalSession::open`] 建立，调用方按节奏调用 [`PortalSession::tick`]，
//! 直到返回 `true` 后调用 [`PortalSession::close`] 拆除。

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use super::dns::{DnsResponder, DnsSocket};
use super::handlers::{PortalRoutes, RouteHost};
use super::html::PortalPage;
use crate::attempt::ConnectionAttempt;
use crate::clock::elapsed_ms;
use crate::radio::{RadioControl, RadioMode};
use crate::storage::{CredentialStore, KeyValueStore, StationCredentials};
use crate::{lock, Shared, DEFAULT_PORTAL_TIMEOUT_MS};

/// 每个 tick 最多处理的 DNS 查询数
const MAX_DNS_PER_TICK: usize = 8;

/// 配网 AP 的配置，会话开始后不再变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub ap_ssid: String,
    pub ap_password: String,
    pub portal_timeout_ms: u32,
    pub page: PortalPage,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            ap_ssid: "ESPConnect".to_string(),
            ap_password: String::new(),
            portal_timeout_ms: DEFAULT_PORTAL_TIMEOUT_MS,
            page: PortalPage::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResult {
    Connected,
    TimedOut,
}

pub struct PortalSession<R, S> {
    config: PortalConfig,
    radio: Shared<R>,
    routes: Arc<PortalRoutes<R, S>>,
    submitted: Shared<Option<StationCredentials>>,
    background: Option<ConnectionAttempt>,
    ap_ip: Option<Ipv4Addr>,
    opened_at: u32,
}

impl<R, S> PortalSession<R, S>
where
    R: RadioControl + Send + 'static,
    S: KeyValueStore + Send + 'static,
{
    /// 建立会话
    ///
    /// AP、DNS 或路由任何一步失败都只记录日志，会话照常运行到超时。
    pub fn open<H: RouteHost, D: DnsSocket>(
        config: PortalConfig,
        radio: Shared<R>,
        store: Shared<CredentialStore<S>>,
        stored: &StationCredentials,
        host: &mut H,
        dns: &mut DnsResponder<D>,
        now: u32,
    ) -> Self {
        log::info!("[Portal] Starting captive portal {:?}", config.ap_ssid);

        let (ap_ip, background) = {
            let mut radio = lock(&radio);
            if let Err(e) = radio.set_mode(RadioMode::AccessPointStation) {
                log::error!("[Portal] {}", e);
            }

            let ap_ip = match radio.start_access_point(&config.ap_ssid, &config.ap_password) {
                Ok(ip) => {
                    log::info!("[Portal] SoftAP started on {}", ip);
                    Some(ip)
                }
                Err(e) => {
                    log::error!("[Portal] {}", e);
                    None
                }
            };

            // 有旧凭据就在后台继续尝试 STA
            let background = stored.is_configured().then(|| {
                ConnectionAttempt::start(&mut *radio, stored, config.portal_timeout_ms, now)
            });
            (ap_ip, background)
        };

        if let Some(ip) = ap_ip {
            if let Err(e) = dns.start(ip) {
                log::error!("[Portal] DNS responder failed: {}", e);
            }
        }

        let submitted = Arc::new(Mutex::new(None));
        let routes = Arc::new(PortalRoutes::new(
            radio.clone(),
            store,
            submitted.clone(),
            config.page,
        ));
        if let Err(e) = host.mount(routes.clone()) {
            log::error!("[Portal] {}", e);
        }

        Self {
            config,
            radio,
            routes,
            submitted,
            background,
            ap_ip,
            opened_at: now,
        }
    }

    /// 推进一步，STA 已连接或门户超时返回 `true`
    pub fn tick<D: DnsSocket>(&mut self, dns: &mut DnsResponder<D>, now: u32) -> bool {
        let connected = {
            let radio = lock(&self.radio);
            if let Some(attempt) = &mut self.background {
                attempt.poll(&*radio, now);
            }
            radio.is_connected()
        };

        if connected {
            log::info!("[Portal] Connected to STA");
            return true;
        }
        if elapsed_ms(now, self.opened_at) >= self.config.portal_timeout_ms {
            log::info!("[Portal] Portal timed out");
            return true;
        }

        for _ in 0..MAX_DNS_PER_TICK {
            if !dns.process_next_request() {
                break;
            }
        }
        false
    }

    /// 拆除会话：先卸载路由，再停 DNS 和 AP
    ///
    /// 只有会话期间提交过凭据才返回 [`SessionResult::Connected`]。
    pub fn close<H: RouteHost, D: DnsSocket>(
        self,
        host: &mut H,
        dns: &mut DnsResponder<D>,
    ) -> SessionResult {
        host.unmount();
        let submitted = {
            let mut slot = lock(&self.submitted);
            self.routes.close();
            slot.take()
        };
        dns.stop();

        let mut radio = lock(&self.radio);
        if let Err(e) = radio.stop_access_point() {
            log::warn!("[Portal] {}", e);
        }
        log::info!("[Portal] Closed portal");

        let result = match submitted {
            Some(credentials) => {
                if let Err(e) = radio.set_mode(RadioMode::Station) {
                    log::warn!("[Portal] {}", e);
                }
                if let Err(e) = radio.join(&credentials.ssid, &credentials.password) {
                    log::warn!("[Portal] {}", e);
                }
                SessionResult::Connected
            }
            None => {
                // 旧凭据在后台连上了，保留链路但不算配网成功
                if radio.is_connected() {
                    if let Err(e) = radio.set_mode(RadioMode::Station) {
                        log::warn!("[Portal] {}", e);
                    }
                }
                SessionResult::TimedOut
            }
        };
        drop(radio);
        drop(self.routes);
        result
    }

    /// 会话期间提交并保存成功的凭据
    pub fn submitted(&self) -> Option<StationCredentials> {
        lock(&self.submitted).clone()
    }

    pub fn access_point_ip(&self) -> Option<Ipv4Addr> {
        self.ap_ip
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }
}
