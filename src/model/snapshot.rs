//! 宿主应用状态快照：settings / tasks / projects
//!
//! 字段与宿主存储的 JSON 保持一致（camelCase）；日期均为原始字符串，解析在 planner 中进行。

use serde::{Deserialize, Serialize};

/// 通知相关设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// 未设置视为开启；只有显式 false 才全局关闭
    pub notifications_enabled: Option<bool>,
    pub daily_digest_morning_enabled: Option<bool>,
    pub daily_digest_morning_time: Option<String>,
    pub daily_digest_evening_enabled: Option<bool>,
    pub daily_digest_evening_time: Option<String>,
    pub weekly_review_enabled: Option<bool>,
    pub weekly_review_time: Option<String>,
    /// 0 = 周日
    pub weekly_review_day: Option<f64>,
    /// 未设置视为开启
    pub review_at_notifications_enabled: Option<bool>,
}

impl Settings {
    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled != Some(false)
    }

    pub fn review_at_enabled(&self) -> bool {
        self.review_at_notifications_enabled != Some(false)
    }

    /// 周回顾日，截断到 0..=6，缺省为周日
    pub fn weekly_review_day(&self) -> u32 {
        match self.weekly_review_day {
            Some(day) if day.is_finite() => day.floor().clamp(0.0, 6.0) as u32,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub review_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub review_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

impl Project {
    pub fn is_archived(&self) -> bool {
        self.status.as_deref() == Some("archived")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Snapshot {
    /// 宽松解析：单条任务/项目格式错误只丢弃该条，settings 中格式错误的字段只丢弃该字段
    pub fn from_json_lenient(value: serde_json::Value) -> Self {
        Self {
            settings: value.get("settings").map(parse_settings).unwrap_or_default(),
            tasks: parse_records(&value, "tasks"),
            projects: parse_records(&value, "projects"),
        }
    }
}

/// 整体解析失败时逐字段检查，保留能单独解析的字段
fn parse_settings(value: &serde_json::Value) -> Settings {
    if let Ok(settings) = serde_json::from_value::<Settings>(value.clone()) {
        return settings;
    }
    let Some(fields) = value.as_object() else {
        tracing::warn!("Settings in snapshot is not an object, using defaults");
        return Settings::default();
    };

    let mut kept = serde_json::Map::new();
    for (key, field) in fields {
        let mut single = serde_json::Map::new();
        single.insert(key.clone(), field.clone());
        match serde_json::from_value::<Settings>(serde_json::Value::Object(single)) {
            Ok(_) => {
                kept.insert(key.clone(), field.clone());
            }
            Err(e) => tracing::warn!(field = %key, "Dropping malformed settings field: {}", e),
        }
    }
    serde_json::from_value(serde_json::Value::Object(kept)).unwrap_or_default()
}

fn parse_records<T: serde::de::DeserializeOwned>(
    value: &serde_json::Value,
    field: &str,
) -> Vec<T> {
    let Some(items) = value.get(field).and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping malformed {} record #{}: {}", field, idx, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(settings.notifications_enabled());
        assert!(settings.review_at_enabled());
        assert_eq!(settings.weekly_review_day(), 0);
    }

    #[test]
    fn test_weekly_review_day_clamped() {
        let mut settings = Settings::default();
        settings.weekly_review_day = Some(9.0);
        assert_eq!(settings.weekly_review_day(), 6);
        settings.weekly_review_day = Some(-3.0);
        assert_eq!(settings.weekly_review_day(), 0);
        settings.weekly_review_day = Some(2.7);
        assert_eq!(settings.weekly_review_day(), 2);
    }

    #[test]
    fn test_lenient_snapshot_drops_bad_records() {
        let value = json!({
            "settings": { "notificationsEnabled": true, "weeklyReviewDay": 1 },
            "tasks": [
                { "id": "t1", "title": "Write report", "dueDate": "2026-10-20T10:00" },
                { "title": "missing id" },
                "not even an object"
            ],
            "projects": [
                { "id": "p1", "title": "Garden", "reviewAt": "2026-11-01" }
            ]
        });
        let snapshot = Snapshot::from_json_lenient(value);
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].id, "t1");
        assert_eq!(snapshot.projects.len(), 1);
        assert_eq!(snapshot.settings.weekly_review_day(), 1);
    }

    #[test]
    fn test_lenient_snapshot_keeps_valid_settings_fields() {
        let value = json!({
            "settings": {
                "notificationsEnabled": false,
                "weeklyReviewDay": "1",
                "dailyDigestMorningTime": "07:30"
            }
        });
        let snapshot = Snapshot::from_json_lenient(value);
        assert_eq!(snapshot.settings.notifications_enabled, Some(false));
        assert!(!snapshot.settings.notifications_enabled());
        assert_eq!(
            snapshot.settings.daily_digest_morning_time.as_deref(),
            Some("07:30")
        );
        assert_eq!(snapshot.settings.weekly_review_day, None);
        assert!(snapshot.tasks.is_empty());

        let snapshot = Snapshot::from_json_lenient(json!({ "settings": "broken" }));
        assert_eq!(snapshot.settings, Settings::default());
    }
}
