//! WiFi 射频控制接口
//!
//! 状态机只通过 [`RadioControl`] 操作 WiFi，设备上由 `esp::EspRadio` 实现。

use std::net::Ipv4Addr;

use crate::error::RadioError;

/// 射频工作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// 仅 STA
    Station,
    /// AP + STA 同时工作
    AccessPointStation,
}

/// 扫描到的一个网络
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub name: String,
    pub is_open: bool,
}

impl NetworkInfo {
    pub fn new(name: impl Into<String>, is_open: bool) -> Self {
        Self {
            name: name.into(),
            is_open,
        }
    }
}

/// 扫描状态，每次请求重新观察
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    Running,
    Ready(Vec<NetworkInfo>),
}

pub trait RadioControl {
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError>;

    /// 启动 AP，返回 AP 的 IP 地址
    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError>;

    fn stop_access_point(&mut self) -> Result<(), RadioError>;

    /// 发起 STA 连接，不等待结果
    fn join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// 断开 STA 并清掉驱动里保存的配置
    fn disconnect(&mut self) -> Result<(), RadioError>;

    /// STA 链路是否已建立
    fn is_connected(&self) -> bool;

    fn scan_state(&mut self) -> ScanState;

    /// 发起一次异步扫描
    fn start_scan(&mut self) -> Result<(), RadioError>;

    /// 丢弃扫描结果，之后 `scan_state` 回到 `NotStarted`
    fn clear_scan(&mut self);
}
