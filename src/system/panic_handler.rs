//! Panic hook
//!
//! 记录 panic 的消息、位置和调用栈。handler 内的 panic 随后由
//! recovery 中间件转换为 500 响应，其他线程的 panic 仍按默认流程终止。

use std::panic;

/// Install custom panic hook
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        let backtrace = std::backtrace::Backtrace::force_capture();

        tracing::error!(
            panic.location = %location,
            "Panic: {}\nBacktrace:\n{}",
            message,
            backtrace
        );
    }));
}
