//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target every audit event is logged under.
pub const AUDIT_TARGET: &str = "vela::audit";

/// Default filter when `RUST_LOG` is unset: decision crates at DEBUG, the
/// audit trail at INFO, everything else at WARN.
pub const DEFAULT_FILTER: &str = "warn,\
vela_core=debug,vela_risk=debug,vela_router=debug,vela_lifecycle=debug,\
vela_engine=debug,vela_replay=info,vela_telemetry=info,vela::audit=info";

/// Initialize structured logging.
///
/// JSON output when `RUST_ENV=production`, with event fields flattened so
/// audit records carry `code` and `correlation_id` at the top level.
/// Pretty output otherwise. Fails if a global subscriber is already
/// installed.
pub fn init_logging() -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let result = if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
