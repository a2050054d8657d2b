//! 预本地化文案：由宿主注入，引擎本身不做翻译

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderStrings {
    pub morning_title: String,
    pub morning_body: String,
    pub evening_title: String,
    pub evening_body: String,
    pub weekly_review_title: String,
    pub weekly_review_body: String,
    pub project_review_label: String,
}

impl Default for ReminderStrings {
    fn default() -> Self {
        Self {
            morning_title: "Morning briefing".to_string(),
            morning_body: "Review your focus tasks for today.".to_string(),
            evening_title: "Evening review".to_string(),
            evening_body: "Wrap up today and plan tomorrow.".to_string(),
            weekly_review_title: "Weekly review".to_string(),
            weekly_review_body: "Time to get clear, current and creative.".to_string(),
            project_review_label: "Review project".to_string(),
        }
    }
}

/// 文案来源；每轮对账读取一次，语言切换在下一轮生效
pub trait StringCatalog: Send + Sync {
    fn strings(&self) -> ReminderStrings;
}

impl StringCatalog for ReminderStrings {
    fn strings(&self) -> ReminderStrings {
        self.clone()
    }
}
