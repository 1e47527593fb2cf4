use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Installs a global subscriber. `filter` uses the `RUST_LOG` directive syntax and is
/// overridden by the environment when `RUST_LOG` is set.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(filter: &str, json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
}
