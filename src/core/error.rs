//! 引擎错误类型
//!
//! 只有 `start()` 会把错误返回给调用方（PermissionDenied / AdapterUnavailable）；
//! 其余错误在对账与事件处理中记日志后吞掉，对账下一轮自愈。

use thiserror::Error;

use crate::model::AlarmId;

#[derive(Error, Debug)]
pub enum EngineError {
    /// 用户拒绝通知权限；can_ask_again 为 false 时只能引导去系统设置
    #[error("Notification permission denied (can ask again: {can_ask_again})")]
    PermissionDenied { can_ask_again: bool },

    /// 原生闹钟模块缺失（如运行在不支持的环境）
    #[error("Alarm adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Failed to schedule reminder {key}: {reason}")]
    ScheduleFailed { key: String, reason: String },

    #[error("Failed to cancel alarm {id}: {reason}")]
    CancelFailed { id: AlarmId, reason: String },

    /// 持久化映射无法解析；按空映射处理
    #[error("Persisted alarm map is corrupt: {0}")]
    PersistenceCorrupt(String),

    #[error("Malformed notification payload: {0}")]
    MalformedPayload(String),
}
