//! 期望集合构建层：时间计算、任务时刻协作者、注入文案、期望集合

pub mod desired;
pub mod occurrence;
pub mod strings;
pub mod time;

pub use desired::{DesiredSet, DesiredSetBuilder};
pub use occurrence::{DefaultNextOccurrence, NextOccurrence};
pub use strings::{ReminderStrings, StringCatalog};
pub use time::{next_daily_time, next_weekly_time, parse_time_of_day, safe_parse_date, TimeOfDay};
