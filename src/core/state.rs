//! 触发器阶段：通过 watch 通道对外发布，供宿主与测试观察

use serde::Serialize;

/// 防抖状态机：Idle -(事件)-> Pending -(计时到)-> Reconciling -> Idle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    #[default]
    Idle,
    /// 计时中；期间的新事件会重置计时
    Pending,
    /// 对账进行中；期间的新事件只置位一次重跑标记
    Reconciling,
}

impl TriggerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPhase::Idle => "idle",
            TriggerPhase::Pending => "pending",
            TriggerPhase::Reconciling => "reconciling",
        }
    }
}
