//! 错误类型
//!
//! 每个协作方一个错误枚举，`Display` 给日志和 HTTP 响应使用。

/// 持久化存储错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 读取键失败
    Read { key: String, reason: String },
    /// 写入键失败
    Write { key: String, reason: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Read { key, reason } => write!(f, "read `{}` failed: {}", key, reason),
            StorageError::Write { key, reason } => {
                write!(f, "write `{}` failed: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// 射频（WiFi 驱动）错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// 切换工作模式失败
    Mode(String),
    /// AP 启动或关闭失败
    AccessPoint(String),
    /// STA 连接请求失败
    Join(String),
    /// 扫描失败
    Scan(String),
    /// 断开失败
    Disconnect(String),
}

impl std::fmt::Display for RadioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioError::Mode(msg) => write!(f, "mode switch failed: {}", msg),
            RadioError::AccessPoint(msg) => write!(f, "access point failed: {}", msg),
            RadioError::Join(msg) => write!(f, "join failed: {}", msg),
            RadioError::Scan(msg) => write!(f, "scan failed: {}", msg),
            RadioError::Disconnect(msg) => write!(f, "disconnect failed: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}

/// HTTP 路由挂载错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError(pub String);

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route host failed: {}", self.0)
    }
}

impl std::error::Error for HostError {}

/// 提交的凭据不合法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// SSID 为空
    EmptySsid,
    /// SSID 超过 32 字节或密码超过 64 字节
    TooLong,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::EmptySsid => write!(f, "Invalid SSID"),
            CredentialError::TooLong => {
                write!(f, "Credentials exceed character limit of 32 & 64 respectively.")
            }
        }
    }
}

impl std::error::Error for CredentialError {}
