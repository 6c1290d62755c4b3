//! STA 凭据的持久化
//!
//! 凭据保存在一个命名空间下的两个字符串键里：`ssid` 和 `password`。
//! 没写过的键读出来是空字符串。

use std::collections::HashMap;

use crate::error::{CredentialError, StorageError};

/// 存储命名空间
pub const NAMESPACE: &str = "espconnect";
pub const SSID_KEY: &str = "ssid";
pub const PASSWORD_KEY: &str = "password";

/// SSID 最大字节数
pub const MAX_SSID_LEN: usize = 32;
/// 密码最大字节数
pub const MAX_PASSWORD_LEN: usize = 64;

/// 一组 STA 凭据
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StationCredentials {
    pub ssid: String,
    pub password: String,
}

impl StationCredentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    /// SSID 非空即视为已配置，密码可以为空（开放网络）
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// 校验表单提交的凭据，长度按字节计算
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.ssid.is_empty() {
            return Err(CredentialError::EmptySsid);
        }
        if self.ssid.len() > MAX_SSID_LEN || self.password.len() > MAX_PASSWORD_LEN {
            return Err(CredentialError::TooLong);
        }
        Ok(())
    }

    /// 日志里用的密码掩码
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.len().min(8))
    }
}

impl std::fmt::Debug for StationCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationCredentials")
            .field("ssid", &self.ssid)
            .field("password", &self.masked_password())
            .finish()
    }
}

/// 键值存储引擎，命名空间由实现方在构造时打开
pub trait KeyValueStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// 内存实现，主机端运行和测试用
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// 凭据存储，每次调用都直接读写底层存储，不做缓存
#[derive(Debug)]
pub struct CredentialStore<S> {
    kv: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn inner(&self) -> &S {
        &self.kv
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    /// 读取凭据，读失败的字段按空字符串处理
    pub fn load(&self) -> StationCredentials {
        StationCredentials {
            ssid: self.read(SSID_KEY),
            password: self.read(PASSWORD_KEY),
        }
    }

    /// 覆盖保存两个字段
    ///
    /// 第二个键写失败时把第一个键恢复成旧值，调用方不会读到只写了一半的凭据。
    pub fn save(&mut self, credentials: &StationCredentials) -> Result<(), StorageError> {
        let previous_ssid = self.kv.get_str(SSID_KEY)?.unwrap_or_default();

        self.kv.set_str(SSID_KEY, &credentials.ssid)?;

        if let Err(e) = self.kv.set_str(PASSWORD_KEY, &credentials.password) {
            log::error!("[Store] Failed to save password: {}", e);
            if let Err(rollback) = self.kv.set_str(SSID_KEY, &previous_ssid) {
                log::error!("[Store] Failed to restore ssid: {}", rollback);
            }
            return Err(e);
        }

        log::info!(
            "[Store] Saved credentials: ssid={:?} password={}",
            credentials.ssid,
            credentials.masked_password()
        );
        Ok(())
    }

    /// 清空凭据，重复调用结果相同
    pub fn erase(&mut self) -> Result<(), StorageError> {
        self.save(&StationCredentials::default())
    }

    fn read(&self, key: &str) -> String {
        self.kv
            .get_str(key)
            .map_err(|e| log::error!("[Store] Failed to get {}: {}", key, e))
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 指定键写入失败的存储
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_key: Option<&'static str>,
        fail_reads: bool,
    }

    impl KeyValueStore for FailingStore {
        fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_reads {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    reason: "flash busy".to_string(),
                });
            }
            self.inner.get_str(key)
        }

        fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_key == Some(key) {
                return Err(StorageError::Write {
                    key: key.to_string(),
                    reason: "no space".to_string(),
                });
            }
            self.inner.set_str(key, value)
        }
    }

    #[test]
    fn load_unwritten_is_empty() {
        let store = CredentialStore::new(MemoryStore::new());
        let creds = store.load();
        assert_eq!(creds, StationCredentials::default());
        assert!(!creds.is_configured());
    }

    #[test]
    fn save_then_load() {
        let mut store = CredentialStore::new(MemoryStore::new());
        let creds = StationCredentials::new("home", "hunter22");
        store.save(&creds).unwrap();
        assert_eq!(store.load(), creds);
    }

    #[test]
    fn erase_is_idempotent() {
        let mut store = CredentialStore::new(MemoryStore::new());
        store.save(&StationCredentials::new("home", "hunter22")).unwrap();

        store.erase().unwrap();
        let once = store.load();
        store.erase().unwrap();
        let twice = store.load();

        assert_eq!(once, StationCredentials::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn failed_password_write_restores_ssid() {
        let mut store = CredentialStore::new(FailingStore::default());
        store.save(&StationCredentials::new("old", "oldpass")).unwrap();

        store.inner_mut().fail_key = Some(PASSWORD_KEY);
        let err = store
            .save(&StationCredentials::new("new", "newpass"))
            .unwrap_err();

        assert!(matches!(err, StorageError::Write { .. }));
        assert_eq!(store.load(), StationCredentials::new("old", "oldpass"));
    }

    #[test]
    fn read_errors_load_as_empty() {
        let mut store = CredentialStore::new(FailingStore::default());
        store.save(&StationCredentials::new("home", "pw")).unwrap();
        store.inner_mut().fail_reads = true;
        assert_eq!(store.load(), StationCredentials::default());
    }

    #[test]
    fn validate_lengths_in_bytes() {
        assert_eq!(
            StationCredentials::new("", "x").validate(),
            Err(CredentialError::EmptySsid)
        );
        assert_eq!(
            StationCredentials::new("a".repeat(33), "").validate(),
            Err(CredentialError::TooLong)
        );
        assert_eq!(
            StationCredentials::new("a", "p".repeat(65)).validate(),
            Err(CredentialError::TooLong)
        );
        assert!(StationCredentials::new("a".repeat(32), "p".repeat(64))
            .validate()
            .is_ok());
        // 11 个三字节字符 = 33 字节
        assert_eq!(
            StationCredentials::new("网".repeat(11), "").validate(),
            Err(CredentialError::TooLong)
        );
    }

    #[test]
    fn debug_masks_password() {
        let creds = StationCredentials::new("home", "secret");
        let text = format!("{:?}", creds);
        assert!(text.contains("home"));
        assert!(!text.contains("secret"));
    }
}
