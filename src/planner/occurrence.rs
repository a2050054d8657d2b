//! 任务「下一次提醒时刻」的外部协作者
//!
//! 具体规则（start/due/reviewAt 优先级、重复任务的下一次）由宿主定义；
//! 这里给出一个保守的默认实现：取未来最早的候选时刻。

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::model::Task;
use crate::planner::time::{parse_with_default_time, TimeOfDay};

/// 仅有日期的字段默认提醒时刻
pub const DATE_ONLY_REMINDER_TIME: TimeOfDay = TimeOfDay::new(9, 0);

/// 计算任务的下一次提醒时刻；无可提醒时刻返回 None
pub trait NextOccurrence: Send + Sync {
    fn next_scheduled_at(
        &self,
        task: &Task,
        now: DateTime<Utc>,
        include_review_at: bool,
    ) -> Option<DateTime<Utc>>;
}

/// 默认实现：跳过已删除/已完成/已归档任务，取 startTime、dueDate、reviewAt 中严格晚于 now 的最早者
#[derive(Debug, Clone)]
pub struct DefaultNextOccurrence<Tz: TimeZone = Local> {
    tz: Tz,
}

impl DefaultNextOccurrence<Local> {
    pub fn new() -> Self {
        Self { tz: Local }
    }
}

impl Default for DefaultNextOccurrence<Local> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz: TimeZone> DefaultNextOccurrence<Tz> {
    pub fn with_timezone(tz: Tz) -> Self {
        Self { tz }
    }
}

fn is_finished(task: &Task) -> bool {
    matches!(task.status.as_deref(), Some("done") | Some("archived"))
}

impl<Tz> NextOccurrence for DefaultNextOccurrence<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    fn next_scheduled_at(
        &self,
        task: &Task,
        now: DateTime<Utc>,
        include_review_at: bool,
    ) -> Option<DateTime<Utc>> {
        if task.deleted_at.is_some() || is_finished(task) {
            return None;
        }

        let review_at = if include_review_at {
            task.review_at.as_deref()
        } else {
            None
        };

        [task.start_time.as_deref(), task.due_date.as_deref(), review_at]
            .into_iter()
            .flatten()
            .filter_map(|raw| parse_with_default_time(raw, &self.tz, DATE_ONLY_REMINDER_TIME))
            .map(|dt| dt.with_timezone(&Utc))
            .filter(|dt| *dt > now)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task {
            id: "t1".into(),
            title: "Renew passport".into(),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_earliest_future_candidate() {
        let occurrence = DefaultNextOccurrence::with_timezone(Utc);
        let mut t = task();
        t.start_time = Some("2026-10-16T08:00".into());
        t.due_date = Some("2026-10-18T10:00".into());
        t.review_at = Some("2026-10-17T10:00".into());

        let next = occurrence.next_scheduled_at(&t, now(), true).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap());

        let next = occurrence.next_scheduled_at(&t, now(), false).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_deleted_and_done_tasks_skipped() {
        let occurrence = DefaultNextOccurrence::with_timezone(Utc);
        let mut t = task();
        t.due_date = Some("2026-10-18T10:00".into());
        t.deleted_at = Some("2026-10-16T11:00".into());
        assert!(occurrence.next_scheduled_at(&t, now(), true).is_none());

        let mut t = task();
        t.due_date = Some("2026-10-18T10:00".into());
        t.status = Some("done".into());
        assert!(occurrence.next_scheduled_at(&t, now(), true).is_none());
    }

    #[test]
    fn test_date_only_defaults_to_morning() {
        let occurrence = DefaultNextOccurrence::with_timezone(Utc);
        let mut t = task();
        t.due_date = Some("2026-10-20".into());
        let next = occurrence.next_scheduled_at(&t, now(), true).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_malformed_dates_ignored() {
        let occurrence = DefaultNextOccurrence::with_timezone(Utc);
        let mut t = task();
        t.due_date = Some("someday".into());
        assert!(occurrence.next_scheduled_at(&t, now(), true).is_none());
    }
}
