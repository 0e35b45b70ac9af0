use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "warn,amqp10_tool=info";
const VERBOSE_DIRECTIVE: &str = "amqp10_tool=debug";

/// Builds the event filter.
///
/// `RUST_LOG` replaces the defaults when set; `verbose` raises this crate
/// to debug on top of either.
pub fn filter(verbose: bool) -> EnvFilter {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    if verbose {
        match VERBOSE_DIRECTIVE.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    } else {
        filter
    }
}

/// Installs the process-wide subscriber.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(verbose: bool) {
    let fmt_layer = fmt::layer().with_target(false).without_time();

    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(fmt_layer)
        .try_init();
}
