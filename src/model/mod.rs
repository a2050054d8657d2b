//! 数据模型：宿主快照（设置 / 任务 / 项目）与提醒描述

pub mod reminder;
pub mod snapshot;

pub use reminder::{
    project_key, task_key, AlarmId, AlarmMapEntry, ReminderKind, ReminderSpec, RepeatInterval,
    DIGEST_EVENING_KEY, DIGEST_MORNING_KEY, PROJECT_KEY_PREFIX, TASK_KEY_PREFIX,
    WEEKLY_REVIEW_KEY,
};
pub use snapshot::{Project, Settings, Snapshot, Task};
