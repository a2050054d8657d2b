//! 核心层：引擎生命周期、构建器、错误、防抖触发器、订阅句柄

pub mod builder;
pub mod engine;
pub mod error;
pub mod state;
pub mod subscription;
pub mod trigger;

pub use builder::EngineBuilder;
pub use engine::{Clock, EngineTiming, FixedClock, ReminderEngine, SystemClock};
pub use error::EngineError;
pub use state::TriggerPhase;
pub use subscription::Subscription;
pub use trigger::{spawn_trigger, CycleRunner, TriggerHandle, TriggerNotifier, WeakCycleRunner};
