//! 系统闹钟边界：适配器 trait、调度参数转换、权限闸门、记录型实现

pub mod adapter;
pub mod mock;
pub mod permission;
pub mod request;

pub use adapter::{AlarmAdapter, AlarmError, AlarmEvent, EventHandler, PermissionResponse};
pub use mock::{AlarmCall, RecordingAlarmAdapter};
pub use permission::{PermissionGate, PermissionResult, Platform, ANDROID_RUNTIME_PERMISSION_API};
pub use request::{AlarmRequest, ChannelConfig, ScheduleReceipt, ScheduleType};
