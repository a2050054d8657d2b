//! 提醒内容签名：相同签名的 key 不重复调度

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::model::ReminderSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(u64);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInput<'a> {
    title: &'a str,
    message: &'a str,
    fire_at: String,
    repeat_interval: &'a str,
    has_buttons: bool,
    data: &'a BTreeMap<String, String>,
}

impl Signature {
    /// 覆盖 title / message / fire_at / repeat / has_buttons / data
    pub fn of(spec: &ReminderSpec) -> Self {
        let input = SignatureInput {
            title: &spec.title,
            message: &spec.message,
            fire_at: spec.fire_at.to_rfc3339(),
            repeat_interval: spec.repeat.map(|r| r.as_str()).unwrap_or("once"),
            has_buttons: spec.has_buttons,
            data: &spec.data,
        };
        // BTreeMap 序列化顺序稳定，相同内容得到相同字符串
        let encoded = serde_json::to_string(&input).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        Signature(hasher.finish())
    }
}
