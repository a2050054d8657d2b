//! reminder-sync - 本地提醒对账引擎
//!
//! 把宿主应用的期望状态（设置、任务、项目）与系统闹钟保持一致：
//! 数据变化 → 防抖 → 构建期望集合 → 与持久映射对账 → 调度/取消系统闹钟。
//!
//! 模块划分：
//! - **alarm**: 系统闹钟适配器 trait、调度参数、权限闸门、记录型实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 引擎生命周期、构建器、错误、防抖触发器
//! - **model**: 快照数据模型与提醒描述
//! - **observability**: tracing 初始化
//! - **planner**: 期望集合构建（时间计算、文案、任务时刻）
//! - **reconcile**: 内容签名与对账
//! - **router**: 通知点击事件解析与分发
//! - **snapshot**: 宿主 store 抽象与内存实现
//! - **store**: 键值存储与 Identity Store

pub mod alarm;
pub mod config;
pub mod core;
pub mod model;
pub mod observability;
pub mod planner;
pub mod reconcile;
pub mod router;
pub mod snapshot;
pub mod store;

pub use crate::core::{EngineBuilder, EngineError, ReminderEngine, TriggerPhase};
pub use crate::reconcile::CycleReport;
pub use crate::router::NotificationOpen;
