use std::time::Duration;

/// How long an abandoned message waits before it is delivered again.
///
/// Delays are keyed on the delivery count of the message being abandoned,
/// starting at 1 for the first delivery, and never exceed the configured cap.
#[derive(Debug, Clone, PartialEq)]
pub enum RedeliveryBackoff {
    /// `base * multiplier^(delivery_count - 1)`, clamped to `max`.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
    },
    /// The same delay after every delivery.
    Constant { delay: Duration },
    /// Make the message visible again right away.
    Immediate,
}

impl RedeliveryBackoff {
    /// Delay to apply after the given delivery.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use provisor_executor::RedeliveryBackoff;
    ///
    /// let backoff = RedeliveryBackoff::Constant { delay: Duration::from_secs(2) };
    /// assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
    /// assert_eq!(backoff.delay_for(7), Duration::from_secs(2));
    /// ```
    pub fn delay_for(&self, delivery_count: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                max,
                multiplier,
            } => {
                // Delivery counts stay small, so the exponent fits in i32.
                let exponent = i32::try_from(delivery_count.saturating_sub(1)).unwrap_or(i32::MAX);
                let raw = base.as_secs_f64() * multiplier.powi(exponent);
                if raw.is_finite() {
                    Duration::from_secs_f64(raw.min(max.as_secs_f64()))
                } else {
                    *max
                }
            }
            Self::Constant { delay } => *delay,
            Self::Immediate => Duration::ZERO,
        }
    }
}

impl Default for RedeliveryBackoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}
