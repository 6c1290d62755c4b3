//! SoftAP + Web 配网模块
//!
//! 提供基于 WiFi AP 模式、DNS 重定向和 HTTP 路由的配网会话。

pub mod dns;
pub mod handlers;
pub mod html;
mod session;

pub use dns::{DnsResponder, DnsSocket, UdpDnsSocket};
pub use handlers::{
    dispatch, PortalHandler, PortalRequest, PortalResponse, PortalRoutes, RouteHost,
};
pub use html::PortalPage;
pub use session::{PortalConfig, PortalSession, SessionResult};
