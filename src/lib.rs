//! 无屏设备的 WiFi 配网
//!
//! 启动时先用保存的凭据连接 STA；连不上就开一个配网 AP，
//! 所有 DNS 查询都指向设备自己，手机打开网页提交 SSID 和密码，
//! 保存后重新连接。
//!
//! 状态机只依赖 [`RadioControl`]、[`KeyValueStore`]、[`RouteHost`]、
//! [`DnsSocket`] 和 [`Clock`]，设备上的实现在 `esp` feature 下。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod attempt;
pub mod captive_portal;
pub mod clock;
pub mod controller;
pub mod error;
pub mod radio;
pub mod storage;

#[cfg(feature = "esp")]
pub mod esp;

pub use attempt::{AttemptState, ConnectionAttempt};
pub use captive_portal::{
    DnsResponder, DnsSocket, PortalConfig, PortalHandler, PortalPage, PortalRequest,
    PortalResponse, PortalSession, RouteHost, SessionResult, UdpDnsSocket,
};
pub use clock::{Clock, SystemClock};
pub use controller::{ProvisioningController, ProvisioningState};
pub use error::{CredentialError, HostError, RadioError, StorageError};
pub use radio::{NetworkInfo, RadioControl, RadioMode, ScanState};
pub use storage::{CredentialStore, KeyValueStore, MemoryStore, StationCredentials};

/// STA 连接默认超时
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u32 = 30_000;
/// 配网门户默认超时
pub const DEFAULT_PORTAL_TIMEOUT_MS: u32 = 180_000;

/// `begin` 等待 STA 时的轮询间隔
pub const STATION_POLL_INTERVAL_MS: u32 = 500;
/// `begin` 运行门户时的 tick 间隔
pub const PORTAL_POLL_INTERVAL_MS: u32 = 10;

/// 控制器和 HTTP 处理线程共享的状态
pub type Shared<T> = Arc<Mutex<T>>;

/// 锁中毒时继续使用内部数据
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
