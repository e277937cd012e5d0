use crate::error_class::ErrorClass;

#[derive(Debug, Clone)]
pub struct FailureGuardSnapshot {
    pub watched: ErrorClass,
    pub threshold: u32,
    pub consecutive_failures: u32,
    pub tripped: bool,
}

/// Counts consecutive failures of one [`ErrorClass`] and trips at a threshold.
///
/// - Any success resets the count
/// - A failure of a different class also resets it
/// - Once tripped it stays tripped until [`reset`](Self::reset)
///
/// Owned by a single poll loop, so no interior locking.
#[derive(Debug)]
pub struct ConsecutiveFailureGuard {
    watched: ErrorClass,
    threshold: u32,
    consecutive_failures: u32,
}

impl ConsecutiveFailureGuard {
    pub fn new(watched: ErrorClass, threshold: u32) -> Self {
        Self {
            watched,
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failure; returns `true` when the guard is (now) tripped.
    pub fn on_failure(&mut self, class: ErrorClass) -> bool {
        if class == self.watched {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        } else {
            self.consecutive_failures = 0;
        }
        self.is_tripped()
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn snapshot(&self) -> FailureGuardSnapshot {
        FailureGuardSnapshot {
            watched: self.watched,
            threshold: self.threshold,
            consecutive_failures: self.consecutive_failures,
            tripped: self.is_tripped(),
        }
    }
}
