//! ReminderSpec -> 平台调度参数 的转换，以及调度结果中的句柄解析

use std::collections::BTreeMap;

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AlarmId, ReminderSpec, RepeatInterval};

/// 通知渠道外观（Android channel / 图标 / 强调色）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: String,
    pub small_icon: String,
    pub color: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: "reminders".to_string(),
            small_icon: "ic_launcher".to_string(),
            color: "#3b82f6".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Once,
    Repeat,
}

/// 平台调度参数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmRequest {
    pub title: String,
    pub message: String,
    pub channel: String,
    pub small_icon: String,
    pub color: String,
    /// 本地时间 `dd-MM-yyyy HH:mm:ss`，秒归零
    pub fire_date: String,
    #[serde(skip)]
    pub fire_at: DateTime<Utc>,
    pub schedule_type: ScheduleType,
    /// 单次闹钟平台仍要求该字段，填 "hourly" 占位
    pub repeat_interval: String,
    pub interval_value: u32,
    pub has_button: bool,
    pub data: BTreeMap<String, String>,
}

/// data 中回传逻辑 key 的字段名
pub const ALARM_KEY_FIELD: &str = "alarmKey";

impl AlarmRequest {
    pub fn from_spec(spec: &ReminderSpec, channel: &ChannelConfig) -> Self {
        let fire_at = truncate_to_minute(spec.fire_at);
        let mut data = spec.data.clone();
        data.insert(ALARM_KEY_FIELD.to_string(), spec.key.clone());

        Self {
            title: spec.title.clone(),
            message: spec.message.clone(),
            channel: channel.channel.clone(),
            small_icon: channel.small_icon.clone(),
            color: channel.color.clone(),
            fire_date: format_fire_date(fire_at, &Local),
            fire_at,
            schedule_type: if spec.repeat.is_some() {
                ScheduleType::Repeat
            } else {
                ScheduleType::Once
            },
            repeat_interval: spec
                .repeat
                .map(|r| r.as_str())
                .unwrap_or("hourly")
                .to_string(),
            interval_value: 1,
            has_button: spec.has_buttons,
            data,
        }
    }

    /// 即时通知：不参与对账，不写 alarmKey
    pub fn immediate(
        title: &str,
        message: &str,
        data: BTreeMap<String, String>,
        fire_at: DateTime<Utc>,
        channel: &ChannelConfig,
    ) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            channel: channel.channel.clone(),
            small_icon: channel.small_icon.clone(),
            color: channel.color.clone(),
            fire_date: format_fire_date(fire_at, &Local),
            fire_at,
            schedule_type: ScheduleType::Once,
            repeat_interval: "hourly".to_string(),
            interval_value: 1,
            has_button: true,
            data,
        }
    }

    pub fn alarm_key(&self) -> Option<&str> {
        self.data.get(ALARM_KEY_FIELD).map(String::as_str)
    }

    pub fn repeat(&self) -> Option<RepeatInterval> {
        match (self.schedule_type, self.repeat_interval.as_str()) {
            (ScheduleType::Repeat, "daily") => Some(RepeatInterval::Daily),
            (ScheduleType::Repeat, "weekly") => Some(RepeatInterval::Weekly),
            _ => None,
        }
    }
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

pub fn format_fire_date<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%d-%m-%Y %H:%M:00").to_string()
}

/// 平台 `scheduleAlarm` 的返回；id 可能是数字或数字字符串
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReceipt {
    pub id: Option<serde_json::Value>,
}

impl ScheduleReceipt {
    pub fn with_id(id: AlarmId) -> Self {
        Self {
            id: Some(serde_json::Value::from(id)),
        }
    }

    /// 解析出整数句柄；非有限数或无法解析时返回 None
    pub fn native_id(&self) -> Option<AlarmId> {
        self.id.as_ref().and_then(parse_native_id)
    }
}

/// 数字或数字字符串 -> 向下取整的句柄
pub fn parse_native_id(value: &serde_json::Value) -> Option<AlarmId> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.floor() as AlarmId)
}
