use super::config::{LogFormat, LogLevel as ConfigLogLevel};
use super::initialization::{FallbackStrategy, InitializationError, LogDirective, LogLevel};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Builds the process-wide `EnvFilter` and installs the subscriber.
pub struct LoggingSystem {
    directives: Arc<RwLock<Vec<LogDirective>>>,
    fallback_level: LogLevel,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Arc::new(RwLock::new(Vec::new())),
            fallback_level: LogLevel::Info,
        }
    }

    /// Adds a `target=level` directive. Malformed input is skipped or falls
    /// back to the default level instead of failing.
    pub fn add_directive(&self, directive_str: &str) -> Result<(), InitializationError> {
        match LogDirective::parse(directive_str) {
            Ok(directive) => {
                self.directives.write().push(directive);
                Ok(())
            }
            Err(e) => match e.fallback_strategy() {
                FallbackStrategy::UseDefaultLevel => {
                    eprintln!("Warning: {e}, using default level");
                    self.add_default_directive(directive_str);
                    Ok(())
                }
                FallbackStrategy::SkipDirective => {
                    eprintln!("Warning: {e}, skipping directive");
                    Ok(())
                }
                FallbackStrategy::AbortStartup => Err(e),
            },
        }
    }

    fn add_default_directive(&self, directive_str: &str) {
        let target = directive_str.split('=').next().unwrap_or("unknown");
        let directive = LogDirective::new(target.trim(), self.fallback_level);
        self.directives.write().push(directive);
    }

    /// Quiets the HTTP stack underneath the broadcast server.
    pub fn add_default_directives(&self) {
        let default_directives = [
            ("warp", LogLevel::Warn),
            ("hyper", LogLevel::Warn),
            ("tungstenite", LogLevel::Warn),
            ("tokio_tungstenite", LogLevel::Warn),
        ];

        let mut directives = self.directives.write();
        for (target, level) in default_directives {
            directives.push(LogDirective::new(target, level));
        }
    }

    pub fn initialize_tracing(
        &self,
        default_level: LogLevel,
        format: LogFormat,
    ) -> Result<(), InitializationError> {
        let filter_string = self.build_filter_string(default_level);

        let env_filter = EnvFilter::try_new(&filter_string).map_err(|e| {
            InitializationError::LoggingInitFailed {
                details: format!("Failed to create EnvFilter with '{filter_string}'"),
                source: Box::new(e),
            }
        })?;

        let result = match format {
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(true)
                        .compact(),
                )
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_thread_names(true),
                )
                .try_init(),
        };

        result.map_err(|e| InitializationError::LoggingInitFailed {
            details: "Failed to set global tracing subscriber".to_string(),
            source: Box::new(e),
        })
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        filter_parts.push(default_level.as_str().to_string());
        filter_parts.extend(directives.iter().map(LogDirective::to_filter_string));

        filter_parts.join(",")
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }

    pub fn clear_directives(&self) {
        self.directives.write().clear();
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ConfigLogLevel> for LogLevel {
    fn from(config_level: ConfigLogLevel) -> Self {
        match config_level {
            ConfigLogLevel::Error => LogLevel::Error,
            ConfigLogLevel::Warn => LogLevel::Warn,
            ConfigLogLevel::Info => LogLevel::Info,
            ConfigLogLevel::Debug => LogLevel::Debug,
            ConfigLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// Installs the global subscriber once per process. Later calls report
/// whether the first one succeeded.
pub fn setup_logging_safe(
    config_level: ConfigLogLevel,
    format: LogFormat,
) -> Result<(), InitializationError> {
    static INIT_SUCCESS: OnceLock<bool> = OnceLock::new();

    let initialized = *INIT_SUCCESS.get_or_init(|| {
        let logging_system = LoggingSystem::new();
        logging_system.add_default_directives();
        logging_system
            .initialize_tracing(config_level.into(), format)
            .map_err(|e| eprintln!("Warning: {e}"))
            .is_ok()
    });

    if initialized {
        Ok(())
    } else {
        Err(InitializationError::LoggingInitFailed {
            details: "Logging system initialization failed".to_string(),
            source: Box::new(std::io::Error::other("Logging initialization error")),
        })
    }
}
