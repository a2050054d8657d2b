//! 触发与防抖：宿主数据变化 -> 合并 -> 串行对账
//!
//! 单个后台任务持有状态机：
//! - Idle 收到事件 -> Pending，开始计时
//! - Pending 收到事件 -> 重置计时
//! - 计时到 -> Reconciling，执行一轮
//! - Reconciling 收到事件 -> 置位重跑标记（只保留一个），本轮结束后立即再跑一轮
//!
//! 停止时取消计时并清掉重跑标记；进行中的一轮会跑完。

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::state::TriggerPhase;

/// 执行一轮对账；每轮开始时自行读取最新快照
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self);
}

/// 持有弱引用的执行器：被执行者释放后空转
pub struct WeakCycleRunner<T: CycleRunner>(pub Weak<T>);

#[async_trait]
impl<T: CycleRunner> CycleRunner for WeakCycleRunner<T> {
    async fn run_cycle(&self) {
        if let Some(runner) = self.0.upgrade() {
            runner.run_cycle().await;
        }
    }
}

/// 可克隆的事件发送端，交给 store 订阅回调
#[derive(Clone, Debug)]
pub struct TriggerNotifier {
    tx: mpsc::UnboundedSender<()>,
}

impl TriggerNotifier {
    pub fn notify(&self) {
        // 后台任务已退出时丢弃即可
        let _ = self.tx.send(());
    }
}

pub struct TriggerHandle {
    notifier: TriggerNotifier,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TriggerHandle {
    pub fn notify(&self) {
        self.notifier.notify();
    }

    pub fn notifier(&self) -> TriggerNotifier {
        self.notifier.clone()
    }

    /// 取消计时与重跑，并等待进行中的一轮结束
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Trigger worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 启动防抖后台任务；阶段变化写入 `phase`
pub fn spawn_trigger(
    runner: Arc<dyn CycleRunner>,
    debounce: Duration,
    phase: Arc<watch::Sender<TriggerPhase>>,
) -> TriggerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let worker = TriggerWorker {
        runner,
        debounce,
        phase,
        events: rx,
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(worker.run());

    TriggerHandle {
        notifier: TriggerNotifier { tx },
        cancel,
        task: Some(task),
    }
}

struct TriggerWorker {
    runner: Arc<dyn CycleRunner>,
    debounce: Duration,
    phase: Arc<watch::Sender<TriggerPhase>>,
    events: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
}

impl TriggerWorker {
    fn set_phase(&self, phase: TriggerPhase) {
        self.phase.send_replace(phase);
    }

    async fn run(mut self) {
        let mut deadline: Option<Instant> = None;

        loop {
            match deadline {
                None => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        event = self.events.recv() => {
                            if event.is_none() {
                                break;
                            }
                            deadline = Some(Instant::now() + self.debounce);
                            self.set_phase(TriggerPhase::Pending);
                        }
                    }
                }
                Some(at) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        event = self.events.recv() => {
                            if event.is_none() {
                                break;
                            }
                            deadline = Some(Instant::now() + self.debounce);
                        }
                        _ = sleep_until(at) => {
                            deadline = None;
                            self.run_cycles().await;
                            self.set_phase(TriggerPhase::Idle);
                        }
                    }
                }
            }
        }

        self.set_phase(TriggerPhase::Idle);
        tracing::debug!("Trigger worker stopped");
    }

    /// 跑一轮；期间有新事件则紧接着再跑一轮，直到没有新事件或已停止
    async fn run_cycles(&mut self) {
        loop {
            self.set_phase(TriggerPhase::Reconciling);
            let mut rerun = false;
            {
                let cycle = self.runner.run_cycle();
                tokio::pin!(cycle);
                loop {
                    tokio::select! {
                        _ = &mut cycle => break,
                        Some(()) = self.events.recv() => rerun = true,
                    }
                }
            }

            if self.cancel.is_cancelled() {
                return;
            }
            if !rerun {
                return;
            }
            tracing::debug!("Snapshot changed during reconciliation, running again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 记录每轮开始时看到的版本号
    #[derive(Default)]
    struct RecordingRunner {
        version: AtomicUsize,
        seen: Mutex<Vec<usize>>,
        cycle_time: Option<Duration>,
    }

    impl RecordingRunner {
        fn slow(cycle_time: Duration) -> Self {
            Self {
                cycle_time: Some(cycle_time),
                ..Self::default()
            }
        }

        fn cycles(&self) -> Vec<usize> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CycleRunner for RecordingRunner {
        async fn run_cycle(&self) {
            self.seen
                .lock()
                .unwrap()
                .push(self.version.load(Ordering::SeqCst));
            if let Some(d) = self.cycle_time {
                tokio::time::sleep(d).await;
            }
        }
    }

    fn phase_channel() -> (Arc<watch::Sender<TriggerPhase>>, watch::Receiver<TriggerPhase>) {
        let (tx, rx) = watch::channel(TriggerPhase::Idle);
        (Arc::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_cycle() {
        let runner = Arc::new(RecordingRunner::default());
        let (phase_tx, phase_rx) = phase_channel();
        let handle = spawn_trigger(runner.clone(), Duration::from_millis(500), phase_tx);

        for _ in 0..5 {
            handle.notify();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(*phase_rx.borrow(), TriggerPhase::Pending);
        assert!(runner.cycles().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(runner.cycles().len(), 1);
        assert_eq!(*phase_rx.borrow(), TriggerPhase::Idle);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_during_cycle_cause_one_rerun() {
        let runner = Arc::new(RecordingRunner::slow(Duration::from_secs(1)));
        let (phase_tx, phase_rx) = phase_channel();
        let handle = spawn_trigger(runner.clone(), Duration::from_millis(500), phase_tx);

        handle.notify();
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(*phase_rx.borrow(), TriggerPhase::Reconciling);

        runner.version.store(1, Ordering::SeqCst);
        handle.notify();
        handle.notify();
        handle.notify();

        tokio::time::sleep(Duration::from_secs(5)).await;
        // 第二轮读到的是新版本
        assert_eq!(runner.cycles(), vec![0, 1]);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_timer() {
        let runner = Arc::new(RecordingRunner::default());
        let (phase_tx, phase_rx) = phase_channel();
        let handle = spawn_trigger(runner.clone(), Duration::from_millis(500), phase_tx);

        handle.notify();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let notifier = handle.notifier();
        handle.stop().await;

        notifier.notify();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(runner.cycles().is_empty());
        assert_eq!(*phase_rx.borrow(), TriggerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish_without_rerun() {
        let runner = Arc::new(RecordingRunner::slow(Duration::from_secs(1)));
        let (phase_tx, _phase_rx) = phase_channel();
        let handle = spawn_trigger(runner.clone(), Duration::from_millis(500), phase_tx);

        handle.notify();
        tokio::time::sleep(Duration::from_millis(700)).await;
        handle.notify();
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runner.cycles().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_weak_runner_is_noop_after_drop() {
        let runner = Arc::new(RecordingRunner::default());
        let weak = WeakCycleRunner(Arc::downgrade(&runner));
        weak.run_cycle().await;
        assert_eq!(runner.cycles().len(), 1);
        drop(runner);
        weak.run_cycle().await;
    }
}
