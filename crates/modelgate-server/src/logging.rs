//! Process-wide tracing setup.

use std::backtrace::Backtrace;
use std::cell::RefCell;

use tracing_subscriber::EnvFilter;

use crate::configuration::LogFormat;

const DEFAULT_FILTER: &str = "info,modelgate=info,modelgate_server=info";

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

/// Route panics through tracing with a captured backtrace. Backtraces stay in
/// the server log; callers only ever see a generic internal error.
///
/// The backtrace is also parked on the panicking thread so whoever catches the
/// unwind can attach it to the failed call's log record.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture().to_string();
        let location = info
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(
            panic = %panic_message(info.payload()),
            location = %location,
            backtrace = %backtrace,
            "panic"
        );
        PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
    }));
}

/// Backtrace of the last panic on this thread, if the hook recorded one.
pub fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
