//! 提醒描述（ReminderSpec）与闹钟映射条目（AlarmMapEntry）
//!
//! ReminderSpec 每轮对账重新计算，不做原地修改；AlarmMapEntry 由 Identity Store 独占，跨进程存活。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 系统闹钟句柄
pub type AlarmId = i64;

pub const DIGEST_MORNING_KEY: &str = "digest:morning";
pub const DIGEST_EVENING_KEY: &str = "digest:evening";
pub const WEEKLY_REVIEW_KEY: &str = "digest:weekly-review";
pub const TASK_KEY_PREFIX: &str = "task:";
pub const PROJECT_KEY_PREFIX: &str = "project:";

pub fn task_key(task_id: &str) -> String {
    format!("{}{}", TASK_KEY_PREFIX, task_id)
}

pub fn project_key(project_id: &str) -> String {
    format!("{}{}", PROJECT_KEY_PREFIX, project_id)
}

/// 重复周期；None 表示单次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatInterval {
    Daily,
    Weekly,
}

impl RepeatInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatInterval::Daily => "daily",
            RepeatInterval::Weekly => "weekly",
        }
    }
}

/// 提醒种类，写入 data.kind 供打开通知时路由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    DailyDigest,
    WeeklyReview,
    TaskReminder,
    ProjectReview,
    Immediate,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::DailyDigest => "daily-digest",
            ReminderKind::WeeklyReview => "weekly-review",
            ReminderKind::TaskReminder => "task-reminder",
            ReminderKind::ProjectReview => "project-review",
            ReminderKind::Immediate => "immediate",
        }
    }
}

/// 一条「应当存在」的提醒
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderSpec {
    pub key: String,
    pub title: String,
    pub message: String,
    pub fire_at: DateTime<Utc>,
    pub repeat: Option<RepeatInterval>,
    /// 任务提醒带操作按钮
    pub has_buttons: bool,
    pub data: BTreeMap<String, String>,
}

impl ReminderSpec {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        fire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            message: message.into(),
            fire_at,
            repeat: None,
            has_buttons: false,
            data: BTreeMap::new(),
        }
    }

    pub fn with_repeat(mut self, repeat: RepeatInterval) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn with_buttons(mut self) -> Self {
        self.has_buttons = true;
        self
    }

    pub fn with_kind(self, kind: ReminderKind) -> Self {
        self.with_data("kind", kind.as_str())
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// 逻辑 key 与系统闹钟句柄的持久绑定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMapEntry {
    pub id: AlarmId,
}
