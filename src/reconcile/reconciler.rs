//! Reconciler：把期望集合与系统闹钟实际状态对齐
//!
//! 每轮：加载映射（仅首次）→ 逐 key 调度/跳过 → 取消不再期望的 key → 落盘。
//! 单个 key 的失败只记日志并计入 `failed`，不会中断本轮；下一轮会再次尝试。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::alarm::{AlarmAdapter, AlarmRequest, ChannelConfig};
use crate::core::EngineError;
use crate::model::{AlarmMapEntry, ReminderSpec};
use crate::planner::DesiredSet;
use crate::reconcile::signature::Signature;
use crate::store::IdentityStore;

/// 一轮对账的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub scheduled: usize,
    pub unchanged: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl CycleReport {
    /// 本轮是否调用过适配器的调度/取消
    pub fn touched_adapter(&self) -> bool {
        self.scheduled + self.cancelled + self.failed > 0
    }
}

pub struct Reconciler {
    adapter: Arc<dyn AlarmAdapter>,
    identity: IdentityStore,
    /// 仅存在于内存；进程重启后首轮会全部重新调度一次
    signatures: HashMap<String, Signature>,
    channel: ChannelConfig,
}

impl Reconciler {
    pub fn new(
        adapter: Arc<dyn AlarmAdapter>,
        identity: IdentityStore,
        channel: ChannelConfig,
    ) -> Self {
        Self {
            adapter,
            identity,
            signatures: HashMap::new(),
            channel,
        }
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub async fn reconcile(&mut self, desired: &DesiredSet) -> CycleReport {
        self.identity.load_if_needed().await;
        let mut report = CycleReport::default();

        for (key, spec) in desired {
            match self.schedule_key(key, spec).await {
                Ok(true) => report.scheduled += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.failed += 1;
                }
            }
        }

        for key in self.identity.keys() {
            if desired.contains_key(&key) {
                continue;
            }
            if self.cancel_key(&key).await {
                report.cancelled += 1;
            }
        }

        self.identity.flush().await;
        tracing::info!(
            scheduled = report.scheduled,
            unchanged = report.unchanged,
            cancelled = report.cancelled,
            failed = report.failed,
            "Reconciliation cycle finished"
        );
        report
    }

    /// 返回 Ok(true) 表示新调度，Ok(false) 表示签名未变而跳过
    async fn schedule_key(
        &mut self,
        key: &str,
        spec: &ReminderSpec,
    ) -> Result<bool, EngineError> {
        let signature = Signature::of(spec);
        if self.identity.get(key).is_some() && self.signatures.get(key) == Some(&signature) {
            tracing::debug!(key, "Reminder unchanged, skipping");
            return Ok(false);
        }

        self.cancel_key(key).await;

        let request = AlarmRequest::from_spec(spec, &self.channel);
        let receipt = self
            .adapter
            .schedule(&request)
            .await
            .map_err(|e| EngineError::ScheduleFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        let id = receipt.native_id().ok_or_else(|| EngineError::ScheduleFailed {
            key: key.to_string(),
            reason: format!("invalid alarm id {:?}", receipt.id),
        })?;

        self.identity.insert(key, AlarmMapEntry { id });
        self.signatures.insert(key.to_string(), signature);
        tracing::debug!(key, id, fire_date = %request.fire_date, "Reminder scheduled");
        Ok(true)
    }

    /// 取消 key 对应的闹钟（单次、重复、已弹出的通知），并移除映射；key 不存在时返回 false
    pub async fn cancel_key(&mut self, key: &str) -> bool {
        let Some(entry) = self.identity.get(key) else {
            return false;
        };

        if let Err(e) = self.adapter.cancel(entry.id).await {
            let err = EngineError::CancelFailed {
                id: entry.id,
                reason: e.to_string(),
            };
            tracing::warn!(key, "{}", err);
        }
        // 单次闹钟没有重复变体，未弹出的通知也无记录，两者失败都可忽略
        if let Err(e) = self.adapter.cancel_repeating(entry.id).await {
            tracing::debug!(key, "Ignoring repeating-alarm cancel error: {}", e);
        }
        if let Err(e) = self.adapter.clear_fired(entry.id).await {
            tracing::debug!(key, "Ignoring fired-notification removal error: {}", e);
        }

        self.identity.remove(key);
        self.signatures.remove(key);
        tracing::debug!(key, id = entry.id, "Reminder cancelled");
        true
    }

    /// 取消所有已跟踪闹钟并清空持久映射；返回取消数量
    pub async fn clear_all(&mut self) -> usize {
        self.identity.load_if_needed().await;
        let mut cancelled = 0;
        for key in self.identity.keys() {
            if self.cancel_key(&key).await {
                cancelled += 1;
            }
        }
        if let Err(e) = self.adapter.clear_all_fired().await {
            tracing::warn!("Failed to remove fired notifications: {}", e);
        }
        self.clear_persisted().await;
        cancelled
    }

    /// 只清空并写回持久映射，不调用适配器
    pub async fn clear_persisted(&mut self) {
        self.identity.clear();
        self.identity.flush().await;
        self.signatures.clear();
    }

    /// 丢弃运行时缓存；下一轮从存储重新加载
    pub fn reset(&mut self) {
        self.identity.reset();
        self.signatures.clear();
    }
}
