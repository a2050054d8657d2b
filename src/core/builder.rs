//! 引擎构建器：统一的引擎初始化逻辑
//!
//! 必需的只有适配器与快照来源；其余协作者都有默认值，可按需替换。

use std::sync::Arc;
use std::time::Duration;

use crate::alarm::{
    AlarmAdapter, ChannelConfig, PermissionGate, Platform, ANDROID_RUNTIME_PERMISSION_API,
};
use crate::config::AppConfig;
use crate::core::engine::{Clock, EngineInner, EngineTiming, ReminderEngine, SystemClock};
use crate::planner::{DefaultNextOccurrence, NextOccurrence, ReminderStrings, StringCatalog};
use crate::reconcile::Reconciler;
use crate::snapshot::SnapshotSource;
use crate::store::{
    FileKeyValueStore, IdentityStore, KeyValueStore, MemoryKeyValueStore, ALARM_MAP_STORAGE_KEY,
};

pub struct EngineBuilder {
    adapter: Arc<dyn AlarmAdapter>,
    source: Arc<dyn SnapshotSource>,
    strings: Arc<dyn StringCatalog>,
    occurrence: Arc<dyn NextOccurrence>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    permission: PermissionGate,
    channel: ChannelConfig,
    timing: EngineTiming,
}

impl EngineBuilder {
    /// 默认：内存存储、英文文案、系统时钟、iOS 权限流程
    pub fn new(adapter: Arc<dyn AlarmAdapter>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            adapter,
            source,
            strings: Arc::new(ReminderStrings::default()),
            occurrence: Arc::new(DefaultNextOccurrence::new()),
            clock: Arc::new(SystemClock),
            store: Arc::new(MemoryKeyValueStore::new()),
            storage_key: ALARM_MAP_STORAGE_KEY.to_string(),
            permission: PermissionGate::new(Platform::Ios, ANDROID_RUNTIME_PERMISSION_API),
            channel: ChannelConfig::default(),
            timing: EngineTiming::default(),
        }
    }

    /// 按配置设置防抖、渠道、平台与文件存储
    pub fn with_config(mut self, cfg: &AppConfig) -> Self {
        self.timing = EngineTiming {
            debounce: cfg.engine.debounce(),
            immediate_delay: cfg.engine.immediate_delay(),
        };
        self.channel = cfg.alarm.channel_config();
        self.permission = PermissionGate::new(cfg.alarm.platform, cfg.alarm.android_api_level);
        self.store = Arc::new(FileKeyValueStore::new(&cfg.storage.dir));
        self.storage_key = cfg.storage.alarm_map_key.clone();
        self
    }

    pub fn with_strings(mut self, strings: Arc<dyn StringCatalog>) -> Self {
        self.strings = strings;
        self
    }

    pub fn with_next_occurrence(mut self, occurrence: Arc<dyn NextOccurrence>) -> Self {
        self.occurrence = occurrence;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_permission_gate(mut self, permission: PermissionGate) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.timing.debounce = debounce;
        self
    }

    pub fn with_immediate_delay(mut self, delay: Duration) -> Self {
        self.timing.immediate_delay = delay;
        self
    }

    pub fn build(self) -> ReminderEngine {
        let identity = IdentityStore::new(self.store, self.storage_key);
        let reconciler = Reconciler::new(Arc::clone(&self.adapter), identity, self.channel.clone());
        ReminderEngine::from_inner(EngineInner::new(
            self.adapter,
            self.source,
            self.strings,
            self.occurrence,
            self.clock,
            self.permission,
            self.channel,
            self.timing,
            reconciler,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::RecordingAlarmAdapter;
    use crate::config::StorageSection;
    use crate::model::{Settings, Snapshot};
    use crate::snapshot::InMemorySnapshotSource;
    use crate::store::parse_alarm_map;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_wires_file_store_and_channel() {
        let dir = TempDir::new().unwrap();
        let mut cfg = AppConfig::default();
        cfg.storage = StorageSection {
            dir: dir.path().to_path_buf(),
            alarm_map_key: "custom:alarms".to_string(),
        };
        cfg.alarm.channel = "focus".to_string();

        let adapter = Arc::new(RecordingAlarmAdapter::new());
        let source = InMemorySnapshotSource::new(Snapshot {
            settings: Settings {
                daily_digest_evening_enabled: Some(true),
                ..Settings::default()
            },
            ..Snapshot::default()
        });
        let engine = EngineBuilder::new(adapter.clone(), Arc::new(source))
            .with_config(&cfg)
            .build();

        let report = engine.reconcile_now().await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(adapter.scheduled_requests()[0].channel, "focus");

        let store = FileKeyValueStore::new(dir.path());
        let raw = store.get_item("custom:alarms").await.unwrap().unwrap();
        let map = parse_alarm_map(&raw).unwrap();
        assert!(map.contains_key("digest:evening"));
    }
}
