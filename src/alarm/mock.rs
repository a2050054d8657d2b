//! 记录型适配器（用于测试与 dry-run，不触碰系统）
//!
//! 记录每一次调用并按自增序号分配句柄；可注入调度/取消失败、非法句柄、权限结果、调度延迟，
//! 并通过 `emit` 模拟平台事件。

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::alarm::adapter::{
    AlarmAdapter, AlarmError, AlarmEvent, EventHandler, PermissionResponse,
};
use crate::alarm::request::{AlarmRequest, ScheduleReceipt};
use crate::core::Subscription;
use crate::model::AlarmId;

/// 一次适配器调用
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmCall {
    Schedule { id: AlarmId, request: AlarmRequest },
    Cancel(AlarmId),
    CancelRepeating(AlarmId),
    ClearFired(AlarmId),
    ClearAllFired,
}

type Listeners = BTreeMap<AlarmEvent, BTreeMap<u64, EventHandler>>;

pub struct RecordingAlarmAdapter {
    available: AtomicBool,
    next_id: AtomicI64,
    calls: Mutex<Vec<AlarmCall>>,
    failing_keys: Mutex<HashSet<String>>,
    invalid_id_keys: Mutex<HashSet<String>>,
    fail_cancels: AtomicBool,
    permission: Mutex<PermissionResponse>,
    schedule_delay: Mutex<Option<Duration>>,
    listeners: Arc<Mutex<Listeners>>,
    next_listener: AtomicU64,
}

impl Default for RecordingAlarmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingAlarmAdapter {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            next_id: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            failing_keys: Mutex::new(HashSet::new()),
            invalid_id_keys: Mutex::new(HashSet::new()),
            fail_cancels: AtomicBool::new(false),
            permission: Mutex::new(PermissionResponse::Granted),
            schedule_delay: Mutex::new(None),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    /// 模拟原生模块缺失
    pub fn unavailable() -> Self {
        let adapter = Self::new();
        adapter.available.store(false, Ordering::SeqCst);
        adapter
    }

    pub fn set_permission(&self, response: PermissionResponse) {
        *lock(&self.permission) = response;
    }

    /// 该 key 的调度请求返回错误
    pub fn fail_key(&self, key: &str) {
        lock(&self.failing_keys).insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        lock(&self.failing_keys).remove(key);
    }

    /// 该 key 调度成功但回执里的句柄无法解析
    pub fn return_invalid_id(&self, key: &str) {
        lock(&self.invalid_id_keys).insert(key.to_string());
    }

    /// 之后的 cancel 调用全部返回错误（调用仍会被记录）
    pub fn set_fail_cancels(&self, fail: bool) {
        self.fail_cancels.store(fail, Ordering::SeqCst);
    }

    /// 每次调度前等待，用于观察对账期间到达的事件
    pub fn set_schedule_delay(&self, delay: Option<Duration>) {
        *lock(&self.schedule_delay) = delay;
    }

    pub fn calls(&self) -> Vec<AlarmCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn schedule_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, AlarmCall::Schedule { .. }))
            .count()
    }

    /// 已调度请求的 alarmKey（即时通知没有 key，不计入）
    pub fn scheduled_keys(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                AlarmCall::Schedule { request, .. } => request.alarm_key().map(str::to_string),
                _ => None,
            })
            .collect()
    }

    pub fn scheduled_requests(&self) -> Vec<AlarmRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                AlarmCall::Schedule { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled_ids(&self) -> Vec<AlarmId> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                AlarmCall::Cancel(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn listener_count(&self, event: AlarmEvent) -> usize {
        lock(&self.listeners).get(&event).map(|m| m.len()).unwrap_or(0)
    }

    /// 模拟平台推送事件
    pub fn emit(&self, event: AlarmEvent, payload: serde_json::Value) {
        let handlers: Vec<EventHandler> = lock(&self.listeners)
            .get(&event)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    fn record(&self, call: AlarmCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl AlarmAdapter for RecordingAlarmAdapter {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn schedule(&self, request: &AlarmRequest) -> Result<ScheduleReceipt, AlarmError> {
        let delay = *lock(&self.schedule_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(key) = request.alarm_key() {
            if lock(&self.failing_keys).contains(key) {
                return Err(AlarmError::Rejected(format!("injected failure for {}", key)));
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(AlarmCall::Schedule {
            id,
            request: request.clone(),
        });
        let invalid = request
            .alarm_key()
            .is_some_and(|key| lock(&self.invalid_id_keys).contains(key));
        if invalid {
            return Ok(ScheduleReceipt {
                id: Some(serde_json::Value::from("not-a-number")),
            });
        }
        Ok(ScheduleReceipt::with_id(id))
    }

    async fn cancel(&self, id: AlarmId) -> Result<(), AlarmError> {
        self.record(AlarmCall::Cancel(id));
        if self.fail_cancels.load(Ordering::SeqCst) {
            return Err(AlarmError::UnknownAlarm(id));
        }
        Ok(())
    }

    async fn cancel_repeating(&self, id: AlarmId) -> Result<(), AlarmError> {
        self.record(AlarmCall::CancelRepeating(id));
        Ok(())
    }

    async fn clear_fired(&self, id: AlarmId) -> Result<(), AlarmError> {
        self.record(AlarmCall::ClearFired(id));
        Ok(())
    }

    async fn clear_all_fired(&self) -> Result<(), AlarmError> {
        self.record(AlarmCall::ClearAllFired);
        Ok(())
    }

    async fn check_permission(&self) -> Result<bool, AlarmError> {
        Ok(*lock(&self.permission) == PermissionResponse::Granted)
    }

    async fn request_permission(&self) -> Result<PermissionResponse, AlarmError> {
        Ok(*lock(&self.permission))
    }

    fn subscribe(&self, event: AlarmEvent, handler: EventHandler) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).entry(event).or_default().insert(id, handler);
        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            if let Some(m) = lock(&listeners).get_mut(&event) {
                m.remove(&id);
            }
        })
    }
}
