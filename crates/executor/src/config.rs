use std::time::Duration;

/// Configuration for the [`ActivityDispatcher`](crate::ActivityDispatcher).
///
/// # Examples
///
/// ```
/// use provisor_executor::DispatcherConfig;
///
/// let config = DispatcherConfig::default();
/// assert_eq!(config.max_concurrent, 10);
/// ```
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum wall-clock time allowed for a single handler call.
    pub handler_timeout: Duration,
    /// Maximum number of handler calls in flight at once. Enforced via a
    /// [`tokio::sync::Semaphore`].
    pub max_concurrent: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            max_concurrent: 10,
        }
    }
}
