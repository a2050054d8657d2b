//! 提醒引擎：生命周期与对外 API
//!
//! 运行时缓存（映射、签名、订阅、防抖任务）全部挂在 EngineInner 上：
//! - `start()` 检查适配器 → 请求权限 → 挂通知监听 → 首轮对账 → 挂 store 监听并启动防抖任务
//! - `stop()` 释放监听 → 停止防抖（等待进行中的一轮）→ 取消全部闹钟并清空映射 → 重置缓存
//!
//! 所有对账都经过 `reconciler` 上的 tokio Mutex，串行执行。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use tokio::sync::{watch, Mutex};

use crate::alarm::{AlarmAdapter, AlarmRequest, ChannelConfig, PermissionGate, PermissionResult};
use crate::core::error::EngineError;
use crate::core::state::TriggerPhase;
use crate::core::subscription::Subscription;
use crate::core::trigger::{spawn_trigger, CycleRunner, TriggerHandle, WeakCycleRunner};
use crate::model::ReminderKind;
use crate::planner::{DesiredSetBuilder, NextOccurrence, StringCatalog};
use crate::reconcile::{CycleReport, Reconciler};
use crate::router::{OpenHandler, OpenRouter};
use crate::snapshot::SnapshotSource;

/// 当前时间来源；测试可注入固定时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// 固定时钟
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineTiming {
    pub debounce: Duration,
    pub immediate_delay: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            immediate_delay: Duration::from_secs(2),
        }
    }
}

/// 仅在 started 期间存在的资源
#[derive(Default)]
struct Runtime {
    subscriptions: Vec<Subscription>,
    trigger: Option<TriggerHandle>,
}

pub(crate) struct EngineInner {
    pub(crate) adapter: Arc<dyn AlarmAdapter>,
    pub(crate) source: Arc<dyn SnapshotSource>,
    pub(crate) strings: Arc<dyn StringCatalog>,
    pub(crate) occurrence: Arc<dyn NextOccurrence>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) permission: PermissionGate,
    pub(crate) channel: ChannelConfig,
    pub(crate) timing: EngineTiming,
    pub(crate) reconciler: Mutex<Reconciler>,
    pub(crate) router: OpenRouter,
    runtime: Mutex<Runtime>,
    started: AtomicBool,
    unavailable_logged: AtomicBool,
    phase: Arc<watch::Sender<TriggerPhase>>,
}

impl EngineInner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        adapter: Arc<dyn AlarmAdapter>,
        source: Arc<dyn SnapshotSource>,
        strings: Arc<dyn StringCatalog>,
        occurrence: Arc<dyn NextOccurrence>,
        clock: Arc<dyn Clock>,
        permission: PermissionGate,
        channel: ChannelConfig,
        timing: EngineTiming,
        reconciler: Reconciler,
    ) -> Self {
        let (phase, _) = watch::channel(TriggerPhase::Idle);
        Self {
            adapter,
            source,
            strings,
            occurrence,
            clock,
            permission,
            channel,
            timing,
            reconciler: Mutex::new(reconciler),
            router: OpenRouter::new(),
            runtime: Mutex::new(Runtime::default()),
            started: AtomicBool::new(false),
            unavailable_logged: AtomicBool::new(false),
            phase: Arc::new(phase),
        }
    }

    /// 适配器缺失只提示一次
    fn check_available(&self) -> bool {
        if self.adapter.is_available() {
            return true;
        }
        if !self.unavailable_logged.swap(true, Ordering::SeqCst) {
            tracing::warn!("Native alarm module unavailable, local reminders disabled");
        }
        false
    }

    /// 读取最新快照、构建期望集合并对账
    async fn reconcile_once(&self) -> CycleReport {
        let mut reconciler = self.reconciler.lock().await;
        let snapshot = self.source.snapshot();
        let strings = self.strings.strings();
        let now = self.clock.now();
        let desired = DesiredSetBuilder::new(&strings, self.occurrence.as_ref()).build(
            &snapshot.settings,
            &snapshot.tasks,
            &snapshot.projects,
            &now,
        );
        tracing::debug!(desired = desired.len(), "Built desired reminder set");
        reconciler.reconcile(&desired).await
    }
}

#[async_trait]
impl CycleRunner for EngineInner {
    async fn run_cycle(&self) {
        self.reconcile_once().await;
    }
}

/// 对外句柄；克隆后共享同一个引擎
#[derive(Clone)]
pub struct ReminderEngine {
    inner: Arc<EngineInner>,
}

impl ReminderEngine {
    pub(crate) fn from_inner(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// 防抖阶段（Idle / Pending / Reconciling）
    pub fn phase(&self) -> watch::Receiver<TriggerPhase> {
        self.inner.phase.subscribe()
    }

    /// 幂等；失败时引擎保持未启动，可再次调用
    pub async fn start(&self) -> Result<(), EngineError> {
        let inner = &self.inner;
        let mut runtime = inner.runtime.lock().await;
        if inner.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        if !inner.check_available() {
            return Err(EngineError::AdapterUnavailable(
                "native alarm module not loaded".to_string(),
            ));
        }

        let permission = inner.permission.request(inner.adapter.as_ref()).await;
        if !permission.granted {
            tracing::warn!(
                can_ask_again = permission.can_ask_again,
                "Notification permission not granted, reminders not started"
            );
            return Err(EngineError::PermissionDenied {
                can_ask_again: permission.can_ask_again,
            });
        }

        runtime
            .subscriptions
            .extend(inner.router.attach(inner.adapter.as_ref()));

        let report = inner.reconcile_once().await;

        let runner: Arc<dyn CycleRunner> = Arc::new(WeakCycleRunner(Arc::downgrade(inner)));
        let trigger = spawn_trigger(runner, inner.timing.debounce, Arc::clone(&inner.phase));
        let notifier = trigger.notifier();
        runtime
            .subscriptions
            .push(inner.source.subscribe(Arc::new(move || notifier.notify())));
        runtime.trigger = Some(trigger);

        inner.started.store(true, Ordering::SeqCst);
        tracing::info!(scheduled = report.scheduled, "Local reminders started");
        Ok(())
    }

    /// 幂等；未启动时也会清理上次进程遗留的闹钟
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut runtime = inner.runtime.lock().await;
        inner.started.store(false, Ordering::SeqCst);

        for subscription in runtime.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        if let Some(trigger) = runtime.trigger.take() {
            trigger.stop().await;
        }

        let mut reconciler = inner.reconciler.lock().await;
        let cancelled = if inner.adapter.is_available() {
            reconciler.clear_all().await
        } else {
            // 系统闹钟无法取消，映射仍要清空
            reconciler.clear_persisted().await;
            0
        };
        reconciler.reset();
        tracing::info!(cancelled, "Local reminders stopped");
    }

    /// 设置或清除通知点击回调；启动前后均可调用
    pub fn set_notification_open_handler(&self, handler: Option<OpenHandler>) {
        self.inner.router.set_handler(handler);
    }

    /// 立即对账一轮（与防抖任务串行）
    pub async fn reconcile_now(&self) -> CycleReport {
        if !self.inner.check_available() {
            return CycleReport::default();
        }
        self.inner.reconcile_once().await
    }

    pub async fn request_permission(&self) -> PermissionResult {
        self.inner
            .permission
            .request(self.inner.adapter.as_ref())
            .await
    }

    /// 在若干秒后弹出一条即时通知；不进入映射，也不参与对账
    pub async fn send_immediate(
        &self,
        title: &str,
        message: &str,
        data: BTreeMap<String, String>,
    ) {
        let title = title.trim();
        if title.is_empty() {
            return;
        }
        let inner = &self.inner;
        if !inner.check_available() {
            return;
        }
        if !self.request_permission().await.granted {
            tracing::debug!("Permission not granted, skipping immediate notification");
            return;
        }

        let mut payload = BTreeMap::new();
        payload.insert("kind".to_string(), ReminderKind::Immediate.as_str().to_string());
        payload.extend(data);

        let delay = chrono::Duration::from_std(inner.timing.immediate_delay)
            .unwrap_or_else(|_| chrono::Duration::seconds(2));
        let fire_at = inner.clock.now().with_timezone(&Utc) + delay;
        let request =
            AlarmRequest::immediate(title, message.trim(), payload, fire_at, &inner.channel);

        if let Err(e) = inner.adapter.schedule(&request).await {
            tracing::warn!("Failed to send immediate notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{
        AlarmCall, AlarmEvent, PermissionResponse, Platform, RecordingAlarmAdapter,
    };
    use crate::core::EngineBuilder;
    use crate::model::{Settings, Snapshot};
    use crate::router::NotificationOpen;
    use crate::snapshot::InMemorySnapshotSource;
    use crate::store::{parse_alarm_map, MemoryKeyValueStore, ALARM_MAP_STORAGE_KEY};
    use chrono::TimeZone;
    use serde_json::json;

    fn morning_snapshot() -> Snapshot {
        Snapshot {
            settings: Settings {
                daily_digest_morning_enabled: Some(true),
                ..Settings::default()
            },
            ..Snapshot::default()
        }
    }

    fn engine_with(
        adapter: Arc<RecordingAlarmAdapter>,
        source: InMemorySnapshotSource,
    ) -> ReminderEngine {
        let now = Local.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        EngineBuilder::new(adapter, Arc::new(source))
            .with_clock(Arc::new(FixedClock(now)))
            .build()
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let adapter = Arc::new(RecordingAlarmAdapter::new());
        let source = InMemorySnapshotSource::new(morning_snapshot());
        let engine = engine_with(adapter.clone(), source.clone());

        engine.start().await.unwrap();
        engine.start().await.unwrap();
        assert!(engine.is_started());
        assert_eq!(adapter.schedule_count(), 1);
        assert_eq!(source.listener_count(), 1);
        assert_eq!(adapter.listener_count(AlarmEvent::NotificationOpened), 1);

        engine.stop().await;
        assert!(!engine.is_started());
        assert_eq!(source.listener_count(), 0);
        assert_eq!(adapter.listener_count(AlarmEvent::NotificationOpened), 0);
        assert_eq!(adapter.listener_count(AlarmEvent::NotificationDismissed), 0);
    }

    #[tokio::test]
    async fn test_start_fails_when_unavailable() {
        let adapter = Arc::new(RecordingAlarmAdapter::unavailable());
        let engine = engine_with(adapter.clone(), InMemorySnapshotSource::default());
        assert!(matches!(
            engine.start().await,
            Err(EngineError::AdapterUnavailable(_))
        ));
        assert!(!engine.is_started());
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_on_denied_permission() {
        let adapter = Arc::new(RecordingAlarmAdapter::new());
        adapter.set_permission(PermissionResponse::NeverAskAgain);
        let now = Local.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        let source = Arc::new(InMemorySnapshotSource::default());
        let engine = EngineBuilder::new(adapter.clone(), source)
            .with_clock(Arc::new(FixedClock(now)))
            .with_permission_gate(PermissionGate::new(Platform::Android, 34))
            .build();

        match engine.start().await {
            Err(EngineError::PermissionDenied { can_ask_again }) => assert!(!can_ask_again),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!engine.is_started());
        assert_eq!(adapter.schedule_count(), 0);
    }

    #[tokio::test]
    async fn test_send_immediate() {
        let adapter = Arc::new(RecordingAlarmAdapter::new());
        let engine = engine_with(adapter.clone(), InMemorySnapshotSource::default());

        engine.send_immediate("   ", "ignored", BTreeMap::new()).await;
        assert_eq!(adapter.schedule_count(), 0);

        let mut data = BTreeMap::new();
        data.insert("taskId".to_string(), "t9".to_string());
        engine.send_immediate("  Focus done ", " Take a break ", data).await;

        let requests = adapter.scheduled_requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.title, "Focus done");
        assert_eq!(request.message, "Take a break");
        assert_eq!(request.data["kind"], "immediate");
        assert_eq!(request.data["taskId"], "t9");
        assert!(request.alarm_key().is_none());
        assert_eq!(
            request.fire_at,
            Local.with_ymd_and_hms(2026, 10, 16, 8, 0, 2).unwrap().with_timezone(&Utc)
        );
    }

    #[tokio::test]
    async fn test_open_handler_receives_envelope() {
        let adapter = Arc::new(RecordingAlarmAdapter::new());
        let engine = engine_with(adapter.clone(), InMemorySnapshotSource::default());
        let seen = Arc::new(std::sync::Mutex::new(Vec::<NotificationOpen>::new()));
        let s = seen.clone();
        engine.set_notification_open_handler(Some(Arc::new(move |open: NotificationOpen| {
            s.lock().unwrap().push(open)
        })));
        engine.start().await.unwrap();

        adapter.emit(
            AlarmEvent::NotificationOpened,
            json!({"alarmKey": "task:t1", "taskId": "t1", "kind": "task-reminder"}),
        );
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].task_id.as_deref(), Some("t1"));

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_clears_fired() {
        let adapter = Arc::new(RecordingAlarmAdapter::new());
        let engine = engine_with(adapter.clone(), InMemorySnapshotSource::default());
        engine.stop().await;
        engine.stop().await;
        assert_eq!(
            adapter.calls(),
            vec![AlarmCall::ClearAllFired, AlarmCall::ClearAllFired]
        );
    }

    #[tokio::test]
    async fn test_stop_clears_map_when_unavailable() {
        let adapter = Arc::new(RecordingAlarmAdapter::unavailable());
        let kv = Arc::new(MemoryKeyValueStore::with_item(
            ALARM_MAP_STORAGE_KEY,
            r#"{"task:t1":{"id":4},"digest:morning":{"id":5}}"#,
        ));
        let source = Arc::new(InMemorySnapshotSource::default());
        let engine = EngineBuilder::new(adapter.clone(), source)
            .with_store(kv.clone())
            .build();

        engine.stop().await;
        assert!(adapter.calls().is_empty());
        let raw = kv.get(ALARM_MAP_STORAGE_KEY).unwrap();
        assert!(parse_alarm_map(&raw).unwrap().is_empty());
    }
}
