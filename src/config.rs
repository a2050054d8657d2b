//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REMINDERS__*` 覆盖（双下划线表示嵌套，如 `REMINDERS__ENGINE__DEBOUNCE_MS=800`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::alarm::{ChannelConfig, Platform, ANDROID_RUNTIME_PERMISSION_API};
use crate::store::ALARM_MAP_STORAGE_KEY;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub alarm: AlarmSection,
    pub storage: StorageSection,
}

/// [engine] 段：防抖与即时通知延迟
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// 数据变化后等待多久再对账（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 即时通知的触发延迟（秒）
    #[serde(default = "default_immediate_delay_secs")]
    pub immediate_delay_secs: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_immediate_delay_secs() -> u64 {
    2
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            immediate_delay_secs: default_immediate_delay_secs(),
        }
    }
}

impl EngineSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn immediate_delay(&self) -> Duration {
        Duration::from_secs(self.immediate_delay_secs)
    }
}

/// [alarm] 段：通知渠道外观与平台
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmSection {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_small_icon")]
    pub small_icon: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub platform: Platform,
    /// 仅 Android 使用：低于 33 时无需运行时通知权限
    #[serde(default = "default_android_api_level")]
    pub android_api_level: u32,
}

fn default_channel() -> String {
    ChannelConfig::default().channel
}

fn default_small_icon() -> String {
    ChannelConfig::default().small_icon
}

fn default_color() -> String {
    ChannelConfig::default().color
}

fn default_android_api_level() -> u32 {
    ANDROID_RUNTIME_PERMISSION_API
}

impl Default for AlarmSection {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            small_icon: default_small_icon(),
            color: default_color(),
            platform: Platform::default(),
            android_api_level: default_android_api_level(),
        }
    }
}

impl AlarmSection {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            channel: self.channel.clone(),
            small_icon: self.small_icon.clone(),
            color: self.color.clone(),
        }
    }
}

/// [storage] 段：映射持久化位置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_alarm_map_key")]
    pub alarm_map_key: String,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_alarm_map_key() -> String {
    ALARM_MAP_STORAGE_KEY.to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            alarm_map_key: default_alarm_map_key(),
        }
    }
}

/// 加载配置：config/default.toml（可选）→ 指定文件（可选）→ `REMINDERS__*` 环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REMINDERS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时回退默认配置并记日志
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.engine.immediate_delay(), Duration::from_secs(2));
        assert_eq!(cfg.alarm.channel_config(), ChannelConfig::default());
        assert_eq!(cfg.alarm.platform, Platform::Ios);
        assert_eq!(cfg.storage.alarm_map_key, "reminders:local:alarms:v1");
    }

    #[test]
    fn test_load_explicit_file_with_partial_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[engine]\ndebounce_ms = 800\n\n[alarm]\nplatform = \"android\"\nandroid_api_level = 31\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.engine.debounce_ms, 800);
        assert_eq!(cfg.engine.immediate_delay_secs, 2);
        assert_eq!(cfg.alarm.platform, Platform::Android);
        assert_eq!(cfg.alarm.android_api_level, 31);
        assert_eq!(cfg.alarm.color, "#3b82f6");
    }
}
