// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 日志初始化

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// 安装全局日志订阅器 (`RUST_LOG` 优先, 默认 `info`)
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    init_with("info");
}

pub fn init_with(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime())
                .with_filter(filter),
        )
        .try_init();
}
