use crate::error::CollectionError;

/// Runtime configuration for a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Upper bound on live notifier entries across all sessions.
    pub max_notifiers: usize,
    pub max_callbacks_per_notifier: usize,
    /// Callbacks running longer than this are logged at warn level. Zero disables the check.
    pub slow_callback_warn_ms: u64,
    /// Upper bound on concurrently open sessions.
    pub max_sessions: usize,
    pub max_expr_depth: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_notifiers: 4096,
            max_callbacks_per_notifier: 256,
            slow_callback_warn_ms: 50,
            max_sessions: 1024,
            max_expr_depth: 32,
        }
    }
}

impl DatabaseConfig {
    pub fn development() -> Self {
        Self {
            slow_callback_warn_ms: 5,
            ..Self::default()
        }
    }

    /// Tight limits, useful for catching leaked tokens in tests.
    pub fn strict() -> Self {
        Self {
            max_notifiers: 64,
            max_callbacks_per_notifier: 8,
            slow_callback_warn_ms: 1,
            max_sessions: 16,
            max_expr_depth: 16,
        }
    }

    pub fn with_max_notifiers(mut self, max_notifiers: usize) -> Self {
        self.max_notifiers = max_notifiers;
        self
    }

    pub fn with_max_callbacks_per_notifier(mut self, max_callbacks: usize) -> Self {
        self.max_callbacks_per_notifier = max_callbacks;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_slow_callback_warn_ms(mut self, warn_ms: u64) -> Self {
        self.slow_callback_warn_ms = warn_ms;
        self
    }
}

pub(crate) fn validate_config(config: &DatabaseConfig) -> Result<(), CollectionError> {
    if config.max_notifiers == 0 {
        return Err(CollectionError::InvalidConfig {
            message: "max_notifiers must be > 0".into(),
        });
    }
    if config.max_callbacks_per_notifier == 0 {
        return Err(CollectionError::InvalidConfig {
            message: "max_callbacks_per_notifier must be > 0".into(),
        });
    }
    if config.max_sessions == 0 {
        return Err(CollectionError::InvalidConfig {
            message: "max_sessions must be > 0".into(),
        });
    }
    if config.max_expr_depth == 0 || config.max_expr_depth > 256 {
        return Err(CollectionError::InvalidConfig {
            message: "max_expr_depth must be in 1..=256".into(),
        });
    }
    Ok(())
}
