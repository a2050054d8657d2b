//! 时间计算：时刻解析、下一次每日/每周触发时间、宽松日期解析
//!
//! 所有函数对时区泛型，测试可用固定偏移，运行时用 `chrono::Local`。

use std::sync::OnceLock;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone,
};
use regex::Regex;

/// 一天中的时刻（本地时间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }
}

/// 解析 "HH:MM"（允许单位数小时、尾随秒）；无法解析或越界时返回 fallback
pub fn parse_time_of_day(value: Option<&str>, fallback: TimeOfDay) -> TimeOfDay {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})(?::\d{2})?$").expect("valid regex"));

    let Some(caps) = value.map(str::trim).and_then(|v| re.captures(v)) else {
        return fallback;
    };
    let hour: u32 = caps[1].parse().unwrap_or(u32::MAX);
    let minute: u32 = caps[2].parse().unwrap_or(u32::MAX);
    if hour > 23 || minute > 59 {
        return fallback;
    }
    TimeOfDay { hour, minute }
}

/// 本地时间 -> 绝对时间。歧义（DST 回拨）取较早者；落在 DST 跳空内则后移一小时
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    }
}

/// 严格晚于 now 的下一个 {hour, minute}；今天已过则顺延到明天
pub fn next_daily_time<Tz: TimeZone>(now: &DateTime<Tz>, at: TimeOfDay) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive().and_hms_opt(at.hour, at.minute, 0)?;
    let candidate = resolve_local(&tz, today)?;
    if candidate > *now {
        return Some(candidate);
    }
    resolve_local(&tz, today + Duration::days(1))
}

/// 下一个 {星期几(0=周日), hour, minute}；当天且时间已过则顺延整一周
pub fn next_weekly_time<Tz: TimeZone>(
    now: &DateTime<Tz>,
    day_of_week_sunday_first: u32,
    at: TimeOfDay,
) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let current = now.weekday().num_days_from_sunday();
    let target = day_of_week_sunday_first.min(6);
    let mut delta = (target + 7 - current) % 7;

    let base = now.date_naive().and_hms_opt(at.hour, at.minute, 0)?;
    if delta == 0 {
        let today = resolve_local(&tz, base)?;
        if today <= *now {
            delta = 7;
        }
    }
    resolve_local(&tz, base + Duration::days(i64::from(delta)))
}

/// 字符串是否带显式时间分量（`T` 或空格后接 HH:MM）
pub fn has_time_component(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[T\s]\d{2}:\d{2}").expect("valid regex"))
        .is_match(value)
}

fn has_timezone(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(Z|[+-]\d{2}:?\d{2})$").expect("valid regex"))
        .is_match(value)
}

/// 宽松日期解析，失败返回 None
///
/// - 带 `Z` 或偏移：按 RFC 3339 解析后换算到 tz
/// - 不带时区：`YYYY-MM-DD[(T| )HH[:MM[:SS[.fff]]]]`，按 tz 的本地时间解释
pub fn safe_parse_date<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if has_timezone(value) {
        return DateTime::parse_from_rfc3339(value)
            .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%z"))
            .ok()
            .map(|dt| dt.with_timezone(tz));
    }

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:[T\s](\d{2})(?::(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?)?)?$")
            .expect("valid regex")
    });
    let caps = re.captures(value)?;
    let num = |idx: usize| -> u32 {
        caps.get(idx)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let millis = caps
        .get(7)
        .map(|m| format!("{:0<3}", m.as_str()))
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    let year: i32 = caps[1].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2), num(3))?;
    let naive = date.and_hms_milli_opt(num(4), num(5), num(6), millis)?;
    resolve_local(tz, naive)
}

/// 解析日期；若字符串不含时间分量，则落在 tz 本地的 default_time
pub fn parse_with_default_time<Tz: TimeZone>(
    value: &str,
    tz: &Tz,
    default_time: TimeOfDay,
) -> Option<DateTime<Tz>> {
    let parsed = safe_parse_date(value, tz)?;
    if has_time_component(value) {
        return Some(parsed);
    }
    let naive = parsed
        .date_naive()
        .and_hms_opt(default_time.hour, default_time.minute, 0)?;
    resolve_local(tz, naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike, Utc, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    /// 带夏令时的时区：标准 UTC-5，夏令 UTC-4
    /// 2026-03-08 02:00 跳到 03:00，2026-11-01 02:00 回拨到 01:00
    #[derive(Debug, Clone, Copy)]
    struct DstZone;

    impl DstZone {
        fn standard() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn daylight() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }
    }

    impl TimeZone for DstZone {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            DstZone
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(12, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let spring = naive(2026, 3, 8, 2, 0);
            let fall = naive(2026, 11, 1, 1, 0);
            if *local < spring {
                LocalResult::Single(Self::standard())
            } else if *local < spring + Duration::hours(1) {
                LocalResult::None
            } else if *local < fall {
                LocalResult::Single(Self::daylight())
            } else if *local < fall + Duration::hours(1) {
                LocalResult::Ambiguous(Self::daylight(), Self::standard())
            } else {
                LocalResult::Single(Self::standard())
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(12, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc >= naive(2026, 3, 8, 7, 0) && *utc < naive(2026, 11, 1, 6, 0) {
                Self::daylight()
            } else {
                Self::standard()
            }
        }
    }

    #[test]
    fn test_parse_time_of_day() {
        let fb = TimeOfDay::new(9, 0);
        assert_eq!(parse_time_of_day(Some("07:30"), fb), TimeOfDay::new(7, 30));
        assert_eq!(parse_time_of_day(Some("7:05"), fb), TimeOfDay::new(7, 5));
        assert_eq!(parse_time_of_day(Some("21:15:00"), fb), TimeOfDay::new(21, 15));
        assert_eq!(parse_time_of_day(Some("25:00"), fb), fb);
        assert_eq!(parse_time_of_day(Some("noon"), fb), fb);
        assert_eq!(parse_time_of_day(None, fb), fb);
    }

    #[test]
    fn test_daily_rollover() {
        let nine = TimeOfDay::new(9, 0);
        // 08:59 -> 今天 09:00
        let next = next_daily_time(&at(2026, 10, 16, 8, 59), nine).unwrap();
        assert_eq!(next, at(2026, 10, 16, 9, 0));
        // 09:01 -> 明天 09:00
        let next = next_daily_time(&at(2026, 10, 16, 9, 1), nine).unwrap();
        assert_eq!(next, at(2026, 10, 17, 9, 0));
        // 正好 09:00 也要顺延（严格晚于 now）
        let next = next_daily_time(&at(2026, 10, 16, 9, 0), nine).unwrap();
        assert_eq!(next, at(2026, 10, 17, 9, 0));
    }

    #[test]
    fn test_weekly_rollover() {
        let six_pm = TimeOfDay::new(18, 0);
        // 2026-10-19 是周一
        let monday_evening = at(2026, 10, 19, 19, 0);
        assert_eq!(monday_evening.weekday(), Weekday::Mon);
        let next = next_weekly_time(&monday_evening, 1, six_pm).unwrap();
        assert_eq!(next, at(2026, 10, 26, 18, 0));

        let monday_morning = at(2026, 10, 19, 8, 0);
        let next = next_weekly_time(&monday_morning, 1, six_pm).unwrap();
        assert_eq!(next, at(2026, 10, 19, 18, 0));

        // 周五 -> 下周日
        let friday = at(2026, 10, 16, 12, 0);
        let next = next_weekly_time(&friday, 0, six_pm).unwrap();
        assert_eq!(next, at(2026, 10, 18, 18, 0));
    }

    #[test]
    fn test_daily_respects_local_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        let next = next_daily_time(&now, TimeOfDay::new(9, 0)).unwrap();
        assert_eq!(next.hour(), 9);
        assert_eq!(next.with_timezone(&Utc), at(2026, 10, 17, 7, 0));
    }

    #[test]
    fn test_resolve_local_across_dst() {
        // 跳空内的 02:30 后移到 03:30（夏令时）
        let gap = resolve_local(&DstZone, naive(2026, 3, 8, 2, 30)).unwrap();
        assert_eq!(gap.naive_local(), naive(2026, 3, 8, 3, 30));
        assert_eq!(gap.with_timezone(&Utc), at(2026, 3, 8, 7, 30));

        // 回拨重复的 01:30 取较早的夏令时实例
        let ambiguous = resolve_local(&DstZone, naive(2026, 11, 1, 1, 30)).unwrap();
        assert_eq!(ambiguous.with_timezone(&Utc), at(2026, 11, 1, 5, 30));

        let plain = resolve_local(&DstZone, naive(2026, 10, 16, 9, 0)).unwrap();
        assert_eq!(plain.with_timezone(&Utc), at(2026, 10, 16, 13, 0));
    }

    #[test]
    fn test_daily_time_lands_after_dst_gap() {
        let now = DstZone
            .from_local_datetime(&naive(2026, 3, 7, 23, 0))
            .single()
            .unwrap();
        let next = next_daily_time(&now, TimeOfDay::new(2, 30)).unwrap();
        assert_eq!(next.naive_local(), naive(2026, 3, 8, 3, 30));
    }

    #[test]
    fn test_has_time_component() {
        assert!(has_time_component("2026-10-20T10:00"));
        assert!(has_time_component("2026-10-20 10:00"));
        assert!(!has_time_component("2026-10-20"));
    }

    #[test]
    fn test_safe_parse_date() {
        assert_eq!(
            safe_parse_date("2026-10-20T10:30", &Utc),
            Some(at(2026, 10, 20, 10, 30))
        );
        assert_eq!(safe_parse_date("2026-10-20", &Utc), Some(at(2026, 10, 20, 0, 0)));
        assert_eq!(
            safe_parse_date("2026-10-20T12:00:00Z", &Utc),
            Some(at(2026, 10, 20, 12, 0))
        );
        assert_eq!(
            safe_parse_date("2026-10-20T12:00:00+02:00", &Utc),
            Some(at(2026, 10, 20, 10, 0))
        );
        assert_eq!(safe_parse_date("2026-13-40", &Utc), None);
        assert_eq!(safe_parse_date("tomorrow", &Utc), None);
        assert_eq!(safe_parse_date("", &Utc), None);
    }

    #[test]
    fn test_parse_with_default_time() {
        let nine = TimeOfDay::new(9, 0);
        assert_eq!(
            parse_with_default_time("2026-11-01", &Utc, nine),
            Some(at(2026, 11, 1, 9, 0))
        );
        assert_eq!(
            parse_with_default_time("2026-11-01T15:45", &Utc, nine),
            Some(at(2026, 11, 1, 15, 45))
        );
    }
}
