//! Structured logging to stderr.
//!
//! Command output goes to stdout; everything emitted through `tracing`
//! goes to stderr so the two can be piped separately.
//!
//! `RUST_LOG` takes precedence over `[logging].level`:
//!
//! ```bash
//! RUST_LOG=doco=debug,doco_core=debug doco ask "what is the deadline?"
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// `HH:MM:SS.mmm`
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.level));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .compact()
            .with_filter(filter);

        // A test harness may already have installed a subscriber.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
