//! 通知点击路由：把平台的「通知被打开」事件解析为 NotificationOpen 并交给唯一的宿主回调
//!
//! 载荷是不透明 JSON（对象或 JSON 字符串）。解析失败的载荷记 debug 日志后丢弃；
//! 回调 panic 会被捕获并记日志，不影响事件源。

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;

use crate::alarm::request::ALARM_KEY_FIELD;
use crate::alarm::{AlarmAdapter, AlarmEvent};
use crate::core::{EngineError, Subscription};

/// 点击通知后交给宿主的信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOpen {
    pub notification_id: String,
    pub action_identifier: String,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub kind: Option<String>,
}

pub const OPEN_ACTION: &str = "open";

impl NotificationOpen {
    /// notification_id 取 alarmKey，缺失或为空时退回 id；两者都没有视为非法
    pub fn from_payload(payload: &Value) -> Result<Self, EngineError> {
        let fields = parse_event_payload(payload)
            .ok_or_else(|| EngineError::MalformedPayload(truncate(payload.to_string())))?;

        let notification_id = fields
            .get(ALARM_KEY_FIELD)
            .filter(|v| !v.is_empty())
            .or_else(|| fields.get("id").filter(|v| !v.is_empty()))
            .cloned()
            .ok_or_else(|| EngineError::MalformedPayload("missing alarmKey and id".to_string()))?;

        Ok(Self {
            notification_id,
            action_identifier: OPEN_ACTION.to_string(),
            task_id: fields.get("taskId").cloned(),
            project_id: fields.get("projectId").cloned(),
            kind: fields.get("kind").cloned(),
        })
    }
}

fn truncate(mut s: String) -> String {
    const MAX: usize = 120;
    if s.len() > MAX {
        let mut end = MAX;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push_str("...");
    }
    s
}

/// 对象或 JSON 编码的对象字符串 -> 扁平的字符串字段表
///
/// 字符串原样保留，数字/布尔转为字符串，null 与嵌套值忽略。
pub fn parse_event_payload(payload: &Value) -> Option<BTreeMap<String, String>> {
    let decoded;
    let object = match payload {
        Value::Object(map) => map,
        Value::String(raw) => {
            decoded = serde_json::from_str::<Value>(raw).ok()?;
            decoded.as_object()?
        }
        _ => return None,
    };

    Some(
        object
            .iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((k.clone(), value))
            })
            .collect(),
    )
}

pub type OpenHandler = Arc<dyn Fn(NotificationOpen) + Send + Sync>;

/// 持有单个宿主回调；可在 attach 之前或之后设置
#[derive(Clone, Default)]
pub struct OpenRouter {
    handler: Arc<RwLock<Option<OpenHandler>>>,
}

impl OpenRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置或清除回调（None）
    pub fn set_handler(&self, handler: Option<OpenHandler>) {
        *self.handler.write().unwrap_or_else(|e| e.into_inner()) = handler;
    }

    /// 订阅打开与关闭事件；返回的订阅在 stop 时一并释放
    pub fn attach(&self, adapter: &dyn AlarmAdapter) -> Vec<Subscription> {
        let router = self.clone();
        let opened = adapter.subscribe(
            AlarmEvent::NotificationOpened,
            Arc::new(move |payload: Value| router.dispatch(&payload)),
        );
        let dismissed =
            adapter.subscribe(AlarmEvent::NotificationDismissed, Arc::new(|_: Value| {}));
        vec![opened, dismissed]
    }

    pub fn dispatch(&self, payload: &Value) {
        let open = match NotificationOpen::from_payload(payload) {
            Ok(open) => open,
            Err(e) => {
                tracing::debug!("Dropping notification payload: {}", e);
                return;
            }
        };

        let handler = self.handler.read().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(handler) = handler else {
            tracing::debug!(
                id = %open.notification_id,
                "No notification open handler registered"
            );
            return;
        };

        let id = open.notification_id.clone();
        if catch_unwind(AssertUnwindSafe(|| handler(open))).is_err() {
            tracing::warn!(id = %id, "Notification open handler panicked");
        }
    }
}
