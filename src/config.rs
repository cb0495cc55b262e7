//! Run configuration for flake.
//!
//! Every run is stateless: the configuration is assembled from command-line
//! flags (interactive mode) or tool arguments (MCP mode) and lives only as
//! long as the run it parameterizes.

use std::time::Duration;

/// Attempt budget used when none (or a non-positive one) is supplied.
pub const DEFAULT_ATTEMPTS: u32 = 100;

/// Interval between spinner frames while an attempt is running.
pub const DEFAULT_SPINNER_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep reading the output pipe once the child has exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Normalize a caller-supplied attempt count.
///
/// Zero and negative values fall back to [`DEFAULT_ATTEMPTS`]; values that do
/// not fit in a `u32` saturate.
///
/// # Example
///
/// ```
/// use flake::config::{normalize_attempts, DEFAULT_ATTEMPTS};
///
/// assert_eq!(normalize_attempts(5), 5);
/// assert_eq!(normalize_attempts(0), DEFAULT_ATTEMPTS);
/// assert_eq!(normalize_attempts(-3), DEFAULT_ATTEMPTS);
/// ```
#[must_use]
pub fn normalize_attempts(requested: i64) -> u32 {
    if requested <= 0 {
        DEFAULT_ATTEMPTS
    } else {
        u32::try_from(requested).unwrap_or(u32::MAX)
    }
}

/// Parameters of a single flake run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakeConfig {
    /// Upper bound on the number of attempts.
    pub attempts: u32,
    /// Delay between spinner frames in interactive mode.
    pub spinner_interval: Duration,
    /// Grace period for draining output after the child exits.
    pub drain_timeout: Duration,
}

impl Default for FlakeConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            spinner_interval: DEFAULT_SPINNER_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl FlakeConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt budget.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the spinner frame interval.
    #[must_use]
    pub fn with_spinner_interval(mut self, interval: Duration) -> Self {
        self.spinner_interval = interval;
        self
    }

    /// Set the output drain grace period.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
