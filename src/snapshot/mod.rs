//! 状态快照读取：同步拉取 + 变更推送
//!
//! 引擎每轮对账开始时才调用 `snapshot()`，保证读到运行时刻的最新状态。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::Subscription;
use crate::model::Snapshot;

/// 状态变更回调
pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// 宿主应用的响应式 store
pub trait SnapshotSource: Send + Sync {
    /// 读取当前快照
    fn snapshot(&self) -> Snapshot;

    /// 订阅变更；返回的句柄 drop 即退订
    fn subscribe(&self, handler: ChangeHandler) -> Subscription;
}

/// 内存实现：`replace` / `update` 后同步通知所有订阅者
#[derive(Clone, Default)]
pub struct InMemorySnapshotSource {
    state: Arc<RwLock<Snapshot>>,
    listeners: Arc<Mutex<BTreeMap<u64, ChangeHandler>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemorySnapshotSource {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
            ..Default::default()
        }
    }

    pub fn replace(&self, snapshot: Snapshot) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            f(&mut state);
        }
        self.notify();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn notify(&self) {
        // 先拷出回调再调用，避免回调里再订阅/退订时死锁
        let handlers: Vec<ChangeHandler> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler();
        }
    }
}

impl SnapshotSource for InMemorySnapshotSource {
    fn snapshot(&self) -> Snapshot {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn subscribe(&self, handler: ChangeHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handler);
        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            listeners.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        })
    }
}
