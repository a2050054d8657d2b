//! Identity Store：逻辑 key -> 系统闹钟句柄 的持久映射
//!
//! 进程内只加载一次，对账期间在内存中修改，每轮结束统一落盘。
//! 缺失或损坏的数据视为空映射，只记日志，不向上抛错。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::alarm::request::parse_native_id;
use crate::core::EngineError;
use crate::model::AlarmMapEntry;
use crate::store::kv::KeyValueStore;

/// 默认持久化 key
pub const ALARM_MAP_STORAGE_KEY: &str = "reminders:local:alarms:v1";

pub struct IdentityStore {
    kv: Arc<dyn KeyValueStore>,
    storage_key: String,
    entries: BTreeMap<String, AlarmMapEntry>,
    loaded: bool,
}

impl IdentityStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, storage_key: impl Into<String>) -> Self {
        Self {
            kv,
            storage_key: storage_key.into(),
            entries: BTreeMap::new(),
            loaded: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// 首次调用时从存储加载；之后直接使用内存缓存
    pub async fn load_if_needed(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        let raw = match self.kv.get_item(&self.storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.entries.clear();
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to load alarm map: {}", e);
                self.entries.clear();
                return;
            }
        };

        match parse_alarm_map(&raw) {
            Ok(entries) => {
                tracing::debug!("Loaded {} alarm map entries", entries.len());
                self.entries = entries;
            }
            Err(e) => {
                tracing::warn!("{}; starting from an empty alarm map", e);
                self.entries.clear();
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<AlarmMapEntry> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: &str, entry: AlarmMapEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<AlarmMapEntry> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 丢弃内存缓存，下次 `load_if_needed` 重新读存储
    pub fn reset(&mut self) {
        self.entries.clear();
        self.loaded = false;
    }

    /// 写回存储；失败只记日志
    pub async fn flush(&self) {
        let raw = match serde_json::to_string(&self.entries) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize alarm map: {}", e);
                return;
            }
        };
        if let Err(e) = self.kv.set_item(&self.storage_key, &raw).await {
            tracing::warn!("Failed to persist alarm map: {}", e);
        }
    }
}

/// 解析持久化的 `{ key: { id } }`；顶层不是对象时报 PersistenceCorrupt，单条不合法只跳过该条
pub fn parse_alarm_map(raw: &str) -> Result<BTreeMap<String, AlarmMapEntry>, EngineError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::PersistenceCorrupt(e.to_string()))?;
    let object = value.as_object().ok_or_else(|| {
        EngineError::PersistenceCorrupt("alarm map is not a JSON object".to_string())
    })?;

    Ok(object
        .iter()
        .filter_map(|(key, entry)| {
            let id = entry.get("id").and_then(parse_native_id)?;
            Some((key.clone(), AlarmMapEntry { id }))
        })
        .collect())
}
