//! WiFi 驱动封装
//!
//! AP 使用固定地址 192.168.4.1，DHCP 把 DNS 也指向这个地址，
//! 客户端的所有查询都会落到 captive DNS 上。

use std::net::Ipv4Addr;

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    ipv4::{self, Mask, Subnet},
    netif::{EspNetif, NetifConfiguration, NetifStack},
    nvs::EspDefaultNvsPartition,
    sys::EspError,
    wifi::{
        config::ScanConfig, AccessPointConfiguration, AuthMethod, ClientConfiguration,
        Configuration as WifiConfig, EspWifi, WifiDriver,
    },
};

use crate::error::RadioError;
use crate::radio::{NetworkInfo, RadioControl, RadioMode, ScanState};

/// AP 模式的固定 IP 地址
pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const AP_NETMASK: Mask = Mask(24);

pub struct EspRadio {
    wifi: EspWifi<'static>,
    mode: RadioMode,
    client: ClientConfiguration,
    access_point: Option<AccessPointConfiguration>,
    scanning: bool,
    scan_result: Option<Vec<NetworkInfo>>,
}

impl EspRadio {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        let ap_netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway: AP_IP,
                    mask: AP_NETMASK,
                },
                dhcp_enabled: true,
                dns: Some(AP_IP),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        let ap_netif = EspNetif::new_with_conf(&ap_netif_config)?;

        let driver = WifiDriver::new(modem, sysloop, nvs)?;
        let sta_netif = EspNetif::new(NetifStack::Sta)?;
        let wifi = EspWifi::wrap_all(driver, sta_netif, ap_netif)?;

        Ok(Self {
            wifi,
            mode: RadioMode::Station,
            client: ClientConfiguration::default(),
            access_point: None,
            scanning: false,
            scan_result: None,
        })
    }

    /// STA MAC 的后 3 字节，用作 AP 名称后缀
    pub fn mac_suffix(&self) -> anyhow::Result<String> {
        let mac = self.wifi.sta_netif().get_mac()?;
        Ok(format!("{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]))
    }

    pub fn wifi(&self) -> &EspWifi<'static> {
        &self.wifi
    }

    fn apply(&mut self) -> Result<(), EspError> {
        let conf = match (&self.access_point, self.mode) {
            (Some(ap), RadioMode::AccessPointStation) => {
                WifiConfig::Mixed(self.client.clone(), ap.clone())
            }
            _ => WifiConfig::Client(self.client.clone()),
        };
        self.wifi.set_configuration(&conf)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }
}

fn auth_for(password: &str) -> AuthMethod {
    if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    }
}

impl RadioControl for EspRadio {
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        self.mode = mode;
        if mode == RadioMode::Station {
            self.access_point = None;
        }
        // AP 配置到位后才切 Mixed
        if mode == RadioMode::AccessPointStation && self.access_point.is_none() {
            return Ok(());
        }
        self.apply().map_err(|e| RadioError::Mode(e.to_string()))
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError> {
        let ap = AccessPointConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::AccessPoint("ap ssid too long".to_string()))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::AccessPoint("ap password too long".to_string()))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ssid_hidden: false,
            channel: 1,
            max_connections: 4,
            ..Default::default()
        };
        self.access_point = Some(ap);
        self.mode = RadioMode::AccessPointStation;
        self.apply()
            .map_err(|e| RadioError::AccessPoint(e.to_string()))?;

        let ip = self
            .wifi
            .ap_netif()
            .get_ip_info()
            .map(|info| info.ip)
            .unwrap_or(AP_IP);
        Ok(ip)
    }

    fn stop_access_point(&mut self) -> Result<(), RadioError> {
        self.access_point = None;
        self.mode = RadioMode::Station;
        self.apply()
            .map_err(|e| RadioError::AccessPoint(e.to_string()))
    }

    fn join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::Join("wifi ssid too long".to_string()))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::Join("wifi password too long".to_string()))?,
            auth_method: auth_for(password),
            ..Default::default()
        };
        self.apply().map_err(|e| RadioError::Join(e.to_string()))?;

        // 上一次连接可能还在进行
        let _ = self.wifi.disconnect();
        self.wifi
            .connect()
            .map_err(|e| RadioError::Join(e.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        let disconnected = self
            .wifi
            .disconnect()
            .map_err(|e| RadioError::Disconnect(e.to_string()));
        self.client = ClientConfiguration::default();
        self.apply()
            .map_err(|e| RadioError::Disconnect(e.to_string()))?;
        disconnected
    }

    /// 已关联并且 STA 网卡拿到了地址
    fn is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn scan_state(&mut self) -> ScanState {
        if let Some(networks) = &self.scan_result {
            return ScanState::Ready(networks.clone());
        }
        if !self.scanning {
            return ScanState::NotStarted;
        }

        match self.wifi.is_scan_done() {
            Ok(false) => ScanState::Running,
            Ok(true) => {
                self.scanning = false;
                match self.wifi.get_scan_result() {
                    Ok(aps) => {
                        let networks: Vec<NetworkInfo> = aps
                            .iter()
                            .map(|ap| {
                                NetworkInfo::new(
                                    ap.ssid.as_str(),
                                    ap.auth_method == Some(AuthMethod::None),
                                )
                            })
                            .collect();
                        log::info!("[Radio] Scan found {} networks", networks.len());
                        self.scan_result = Some(networks.clone());
                        ScanState::Ready(networks)
                    }
                    Err(e) => {
                        log::warn!("[Radio] Failed to read scan result: {:?}", e);
                        ScanState::NotStarted
                    }
                }
            }
            Err(e) => {
                log::warn!("[Radio] Scan status failed: {:?}", e);
                self.scanning = false;
                ScanState::NotStarted
            }
        }
    }

    fn start_scan(&mut self) -> Result<(), RadioError> {
        if !self.wifi.is_started().unwrap_or(false) {
            self.apply().map_err(|e| RadioError::Scan(e.to_string()))?;
        }
        self.wifi
            .start_scan(&ScanConfig::default(), false)
            .map_err(|e| RadioError::Scan(e.to_string()))?;
        self.scanning = true;
        Ok(())
    }

    fn clear_scan(&mut self) {
        self.scanning = false;
        self.scan_result = None;
    }
}
