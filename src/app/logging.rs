//! Tracing subscriber setup: local-time line format and a reloadable level filter.

use std::fmt;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::types::PollerConfig;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

/// Wall-clock timestamp in the host's time zone.
pub struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// `2024-05-01 12:00:00 [WARN] mch-1: keep-alive failed: ...`
pub struct PollerEventFormat;

fn level_colour(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "\x1b[2m",
        Level::DEBUG => "\x1b[34m",
        Level::INFO => "\x1b[32m",
        Level::WARN => "\x1b[33m",
        Level::ERROR => "\x1b[31m",
    }
}

impl<S, N> FormatEvent<S, N> for PollerEventFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        LocalTime.format_time(&mut writer)?;

        let level = event.metadata().level();
        if writer.has_ansi_escapes() {
            write!(writer, " {}[{}]\x1b[0m ", level_colour(level), level)?;
        } else {
            write!(writer, " [{}] ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Map a user-facing level name to an `EnvFilter` directive.
/// CRITICAL maps to ERROR; anything unknown falls back to INFO.
pub fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "critical" | "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

/// Install the global subscriber. Only the first call per process takes effect.
pub fn init_tracing(filter: &str) {
    use tracing_subscriber::prelude::*;

    let (filter_layer, handle) = reload::Layer::new(EnvFilter::new(filter));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .fmt_fields(DefaultFields::new())
        .event_format(PollerEventFormat);

    if tracing_subscriber::registry().with(filter_layer).with(fmt_layer).try_init().is_ok() {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Install the subscriber at the level named in `config.poller.log_level`.
pub fn init_from_config(config: &PollerConfig) {
    init_tracing(config.log_filter());
}

/// Swap the active filter at runtime. Fails if `init_tracing` never ran.
pub fn set_log_level(level: &str) -> Result<&'static str> {
    let filter = normalize_level(level);
    FILTER_HANDLE
        .get()
        .ok_or_else(|| anyhow!("tracing is not initialised"))?
        .reload(EnvFilter::new(filter))
        .map_err(|e| anyhow!("failed to reload log level: {}", e))?;
    Ok(filter)
}
