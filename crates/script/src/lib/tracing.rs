use std::sync::Once;

use derive_more::FromStr;
use tracing_subscriber::{layer::Layer, registry::Registry, util::SubscriberInitExt};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

static INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, FromStr)]
pub enum LogFormat {
    Plain,
    Json,
}

fn append_transport_directives(env_filter: EnvFilter) -> EnvFilter {
    // Static directives, always parse
    env_filter
        .add_directive("hyper=off".parse().unwrap())
        .add_directive("hyper_util=off".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap())
        .add_directive("alloy_transport_http=warn".parse().unwrap())
}

pub struct LoggingConfig {
    suppress_transport_logs: bool,
    format: LogFormat,
    default_directive: String,
    is_test: bool,
    with_thread_names: bool,
}

impl LoggingConfig {
    pub fn default_for_test() -> Self {
        Self {
            is_test: true,
            ..Default::default()
        }
    }

    /// Service flavour: logs at `info` unless RUST_LOG says otherwise.
    pub fn default_for_service() -> Self {
        Self {
            default_directive: "info".to_owned(),
            with_thread_names: true,
            ..Default::default()
        }
    }

    pub fn use_format(mut self, value: LogFormat) -> Self {
        self.format = value;
        self
    }
    pub fn is_test(mut self, value: bool) -> Self {
        self.is_test = value;
        self
    }
    pub fn with_thread_names(mut self, value: bool) -> Self {
        self.with_thread_names = value;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        // CLI output goes to stdout, so logs stay off unless asked for
        Self {
            suppress_transport_logs: true,
            format: LogFormat::Plain,
            default_directive: "off".to_owned(),
            is_test: false,
            with_thread_names: false,
        }
    }
}

pub fn setup_logger(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_directive));
        if config.suppress_transport_logs {
            env_filter = append_transport_directives(env_filter);
        }

        let fmt_layer = match config.format {
            LogFormat::Json => json_subscriber::layer()
                .with_target(true)
                .with_thread_names(config.with_thread_names)
                .with_current_span(false)
                .with_span_list(false)
                .flatten_span_list_on_top_level(true)
                .flatten_event(true)
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Plain => tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_names(config.with_thread_names)
                .with_writer(std::io::stderr)
                .boxed(),
        };

        let test_layer = if config.is_test {
            Some(tracing_subscriber::fmt::layer().compact().with_test_writer())
        } else {
            None
        };

        let registry = Registry::default().with(env_filter).with(fmt_layer).with(test_layer);
        registry.init();
    });
}
