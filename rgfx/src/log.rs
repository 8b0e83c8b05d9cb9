//! Logging setup for hosts that do not run their own `tracing` subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use rgfx_core::log::{
    LogCallback, LogCallbackLayer, LogLevel, emit, has_log_callback,
    set_log_callback,
};

/// Install a global subscriber that forwards every event to the log
/// callback. Returns `false` and changes nothing when the host already
/// installed a subscriber; add [`LogCallbackLayer`] to that one instead.
pub fn install_default() -> bool {
    match tracing_subscriber::registry()
        .with(LogCallbackLayer::new())
        .try_init()
    {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Keeping existing tracing subscriber: {e}");
            false
        }
    }
}
