use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, Registry,
    filter::EnvFilter,
    layer::{Layered, SubscriberExt},
    reload,
    util::SubscriberInitExt,
};

type FilterLayer = reload::Layer<EnvFilter, Registry>;
type BoxedLogLayer = Box<dyn Layer<Layered<FilterLayer, Registry>> + Send + Sync>;

/// Handle to the installed subscriber's level filter
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Switch between debug and info verbosity at runtime.
    ///
    /// Directives from `RUST_LOG` still take precedence over the default
    /// level.
    pub fn set_debug(&self, debug: bool) {
        if let Err(error) = self.filter.reload(env_filter(level_for(debug))) {
            warn!("Failed to change log level: {error}");
        }
    }
}

pub fn init() -> LogHandle {
    initialize_tracing(LevelFilter::INFO)
}

/// Like [`init`], starting at debug level when `debug` is set
pub fn init_with_debug(debug: bool) -> LogHandle {
    initialize_tracing(level_for(debug))
}

fn level_for(debug: bool) -> LevelFilter {
    if debug { LevelFilter::DEBUG } else { LevelFilter::INFO }
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder().with_default_directive(level.into()).from_env_lossy()
}

/// Initialize tracing subscriber with default configuration.
fn initialize_tracing(level: LevelFilter) -> LogHandle {
    let (filter_layer, filter) = reload::Layer::new(env_filter(level));

    let log_format = var("RUST_LOG_FORMAT")
        .inspect_err(|error| {
            warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}")
        })
        .unwrap_or_default();

    let log_layer: BoxedLogLayer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().boxed(),
        _ => tracing_subscriber::fmt::layer().compact().without_time().boxed(),
    };

    tracing_subscriber::registry().with(filter_layer).with(log_layer).init();

    LogHandle { filter }
}
