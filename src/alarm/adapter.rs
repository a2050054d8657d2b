//! 系统闹钟适配器抽象
//!
//! 引擎中唯一与平台相关的边界：调度 / 取消 / 清除已触发通知 / 权限 / 事件订阅。
//! 其余模块只依赖此 trait，测试与 dry-run 使用 [`RecordingAlarmAdapter`](super::RecordingAlarmAdapter)。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::alarm::request::{AlarmRequest, ScheduleReceipt};
use crate::core::Subscription;
use crate::model::AlarmId;

/// 适配器层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    #[error("Alarm module unavailable: {0}")]
    Unavailable(String),

    #[error("Schedule rejected: {0}")]
    Rejected(String),

    #[error("Unknown alarm id: {0}")]
    UnknownAlarm(AlarmId),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// 平台推送的通知事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlarmEvent {
    NotificationOpened,
    NotificationDismissed,
}

/// 平台权限弹窗的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResponse {
    Granted,
    Denied,
    /// 用户选择「不再询问」
    NeverAskAgain,
}

/// 事件回调，payload 为平台原样给出的 JSON（对象或 JSON 字符串）
pub type EventHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

#[async_trait]
pub trait AlarmAdapter: Send + Sync {
    /// 原生模块是否存在
    fn is_available(&self) -> bool {
        true
    }

    /// 调度一个闹钟，返回平台分配的句柄
    async fn schedule(&self, request: &AlarmRequest) -> Result<ScheduleReceipt, AlarmError>;

    async fn cancel(&self, id: AlarmId) -> Result<(), AlarmError>;

    /// 取消重复闹钟（单次闹钟上调用可能报错，调用方忽略）
    async fn cancel_repeating(&self, id: AlarmId) -> Result<(), AlarmError>;

    /// 移除通知栏里已触发的通知
    async fn clear_fired(&self, id: AlarmId) -> Result<(), AlarmError>;

    async fn clear_all_fired(&self) -> Result<(), AlarmError>;

    /// 查询是否已有通知权限（Android 13+）
    async fn check_permission(&self) -> Result<bool, AlarmError>;

    /// 弹出权限请求
    async fn request_permission(&self) -> Result<PermissionResponse, AlarmError>;

    /// 订阅平台事件；平台不支持时返回空订阅
    fn subscribe(&self, event: AlarmEvent, handler: EventHandler) -> Subscription;
}
