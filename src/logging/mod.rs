//! Tracing subscriber setup for hosts that do not install their own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at `level` and
/// everything else at `info`. Returns `false` if a subscriber was already
/// installed, which is not an error.
pub fn init(level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("account_keys={},info", level).into());

    let text = (!json).then(tracing_subscriber::fmt::layer);
    let structured = json.then(|| tracing_subscriber::fmt::layer().json());

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .is_ok()
}
