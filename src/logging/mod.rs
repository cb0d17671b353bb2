//! Structured logging for the alignment engine
//!
//! Console and JSON-file output through `tracing-subscriber`, plus a
//! per-document correlation ID carried by every alignment span.

pub mod config;
pub mod spans;

use anyhow::Result;
use std::cell::Cell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

pub use config::LoggingConfig;
pub use spans::{AlignmentSpan, BatchSpan};

thread_local! {
    static CORRELATION_ID: Cell<Option<Uuid>> = const { Cell::new(None) };
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the lifetime of the program.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    let mut layers = Vec::new();
    let mut guard = None;

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(config.include_file_location)
            .with_file(config.include_file_location);
        layers.push(console_layer.boxed());
    }

    if let Some(ref log_dir) = config.log_directory {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "alignment.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json();
        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!("Logging system initialized with config: {:?}", config);
    Ok(guard)
}

/// Tag everything logged on this thread with `id`
pub fn set_correlation_id(id: Uuid) {
    CORRELATION_ID.with(|slot| slot.set(Some(id)));
}

pub fn get_correlation_id() -> Option<Uuid> {
    CORRELATION_ID.with(Cell::get)
}

/// Generate a fresh v4 ID and make it current for this thread
pub fn new_correlation_id() -> Uuid {
    let id = Uuid::new_v4();
    set_correlation_id(id);
    id
}

pub fn clear_correlation_id() {
    CORRELATION_ID.with(|slot| slot.set(None));
}

/// Holds a document's correlation ID for one unit of work.
///
/// Pool threads are reused across documents, so the ID is cleared on drop,
/// including when the work unwinds.
#[must_use = "the correlation ID is cleared as soon as the guard is dropped"]
pub struct CorrelationScope {
    id: Uuid,
}

impl CorrelationScope {
    pub fn begin() -> Self {
        Self {
            id: new_correlation_id(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for CorrelationScope {
    fn drop(&mut self) {
        clear_correlation_id();
    }
}

/// Create a span with correlation ID automatically included
#[macro_export]
macro_rules! correlation_span {
    ($level:expr, $name:expr) => {
        if let Some(correlation_id) = $crate::logging::get_correlation_id() {
            tracing::span!($level, $name, correlation_id = %correlation_id)
        } else {
            tracing::span!($level, $name)
        }
    };
    ($level:expr, $name:expr, $($field:tt)*) => {
        if let Some(correlation_id) = $crate::logging::get_correlation_id() {
            tracing::span!($level, $name, correlation_id = %correlation_id, $($field)*)
        } else {
            tracing::span!($level, $name, $($field)*)
        }
    };
}
