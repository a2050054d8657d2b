//! 可观测性：tracing 订阅器初始化
//!
//! 默认 info 级别，可用 `RUST_LOG` 覆盖（如 `RUST_LOG=reminder_sync=debug` 查看逐 key 决策）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
