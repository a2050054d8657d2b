//! 期望集合构建：(settings, tasks, projects, now) -> map<key, ReminderSpec>
//!
//! 纯函数，不触碰任何系统 API。单个实体字段缺失或日期格式错误只跳过该实体。

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::model::{
    project_key, task_key, Project, ReminderKind, ReminderSpec, RepeatInterval, Settings, Task,
    DIGEST_EVENING_KEY, DIGEST_MORNING_KEY, WEEKLY_REVIEW_KEY,
};
use crate::planner::occurrence::{NextOccurrence, DATE_ONLY_REMINDER_TIME};
use crate::planner::strings::ReminderStrings;
use crate::planner::time::{
    next_daily_time, next_weekly_time, parse_time_of_day, parse_with_default_time, TimeOfDay,
};

/// 当前应存在的全部提醒，按 key 排序
pub type DesiredSet = BTreeMap<String, ReminderSpec>;

const DEFAULT_MORNING: TimeOfDay = TimeOfDay::new(9, 0);
const DEFAULT_EVENING: TimeOfDay = TimeOfDay::new(20, 0);
const DEFAULT_WEEKLY_REVIEW: TimeOfDay = TimeOfDay::new(18, 0);

/// 期望集合构建器：持有本轮的文案与任务时刻计算器
pub struct DesiredSetBuilder<'a> {
    strings: &'a ReminderStrings,
    occurrence: &'a dyn NextOccurrence,
}

impl<'a> DesiredSetBuilder<'a> {
    pub fn new(strings: &'a ReminderStrings, occurrence: &'a dyn NextOccurrence) -> Self {
        Self { strings, occurrence }
    }

    pub fn build<Tz: TimeZone>(
        &self,
        settings: &Settings,
        tasks: &[Task],
        projects: &[Project],
        now: &DateTime<Tz>,
    ) -> DesiredSet {
        let mut desired = DesiredSet::new();
        if !settings.notifications_enabled() {
            return desired;
        }

        for spec in self.digests(settings, now) {
            desired.insert(spec.key.clone(), spec);
        }

        let include_review_at = settings.review_at_enabled();
        let now_utc = now.with_timezone(&Utc);
        for task in tasks {
            if let Some(spec) = self.task_reminder(task, now_utc, include_review_at) {
                desired.insert(spec.key.clone(), spec);
            }
        }

        if include_review_at {
            for project in projects {
                if let Some(spec) = self.project_review(project, now) {
                    desired.insert(spec.key.clone(), spec);
                }
            }
        }

        desired
    }

    fn digests<Tz: TimeZone>(&self, settings: &Settings, now: &DateTime<Tz>) -> Vec<ReminderSpec> {
        let mut specs = Vec::new();
        let s = self.strings;

        if settings.daily_digest_morning_enabled == Some(true) {
            let at = parse_time_of_day(
                settings.daily_digest_morning_time.as_deref(),
                DEFAULT_MORNING,
            );
            if let Some(fire_at) = next_daily_time(now, at) {
                specs.push(
                    ReminderSpec::new(
                        DIGEST_MORNING_KEY,
                        &s.morning_title,
                        &s.morning_body,
                        fire_at.with_timezone(&Utc),
                    )
                    .with_repeat(RepeatInterval::Daily)
                    .with_kind(ReminderKind::DailyDigest),
                );
            }
        }

        if settings.daily_digest_evening_enabled == Some(true) {
            let at = parse_time_of_day(
                settings.daily_digest_evening_time.as_deref(),
                DEFAULT_EVENING,
            );
            if let Some(fire_at) = next_daily_time(now, at) {
                specs.push(
                    ReminderSpec::new(
                        DIGEST_EVENING_KEY,
                        &s.evening_title,
                        &s.evening_body,
                        fire_at.with_timezone(&Utc),
                    )
                    .with_repeat(RepeatInterval::Daily)
                    .with_kind(ReminderKind::DailyDigest),
                );
            }
        }

        if settings.weekly_review_enabled == Some(true) {
            let at =
                parse_time_of_day(settings.weekly_review_time.as_deref(), DEFAULT_WEEKLY_REVIEW);
            if let Some(fire_at) = next_weekly_time(now, settings.weekly_review_day(), at) {
                specs.push(
                    ReminderSpec::new(
                        WEEKLY_REVIEW_KEY,
                        &s.weekly_review_title,
                        &s.weekly_review_body,
                        fire_at.with_timezone(&Utc),
                    )
                    .with_repeat(RepeatInterval::Weekly)
                    .with_kind(ReminderKind::WeeklyReview),
                );
            }
        }

        specs
    }

    fn task_reminder(
        &self,
        task: &Task,
        now: DateTime<Utc>,
        include_review_at: bool,
    ) -> Option<ReminderSpec> {
        if task.id.trim().is_empty() {
            return None;
        }
        let next = self.occurrence.next_scheduled_at(task, now, include_review_at)?;
        if next <= now {
            return None;
        }
        let message = task
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(self.strings.morning_body.as_str());

        Some(
            ReminderSpec::new(task_key(&task.id), &task.title, message, next)
                .with_buttons()
                .with_kind(ReminderKind::TaskReminder)
                .with_data("taskId", &task.id),
        )
    }

    fn project_review<Tz: TimeZone>(
        &self,
        project: &Project,
        now: &DateTime<Tz>,
    ) -> Option<ReminderSpec> {
        if project.id.trim().is_empty() || project.deleted_at.is_some() || project.is_archived() {
            return None;
        }
        let raw = project.review_at.as_deref()?;
        let review_at = parse_with_default_time(raw, &now.timezone(), DATE_ONLY_REMINDER_TIME)?;
        if review_at <= *now {
            return None;
        }

        Some(
            ReminderSpec::new(
                project_key(&project.id),
                &project.title,
                &self.strings.project_review_label,
                review_at.with_timezone(&Utc),
            )
            .with_kind(ReminderKind::ProjectReview)
            .with_data("projectId", &project.id),
        )
    }
}
