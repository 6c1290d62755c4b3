//! NVS 存储

use esp_idf_svc::nvs::{EspDefaultNvs, EspDefaultNvsPartition};

use crate::error::StorageError;
use crate::storage::{KeyValueStore, NAMESPACE};

pub struct NvsStore {
    nvs: EspDefaultNvs,
}

impl NvsStore {
    /// 打开（必要时创建）`espconnect` 命名空间
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspDefaultNvs::new(partition, NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl KeyValueStore for NvsStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
        // 64 字节密码加结尾的 \0
        let mut str_buf = [0; 128];
        self.nvs
            .get_str(key, &mut str_buf)
            .map(|v| v.map(str::to_string))
            .map_err(|e| StorageError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.nvs
            .set_str(key, value)
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}
