//! Timeout budgets
//!
//! A logical operation (a paginated `updateMany`, a chunked `insertMany`, ...)
//! gets one client-side budget. Every constituent request draws its timeout
//! from what is left of it. Budgets bound client wait only; nothing is
//! cancelled server-side.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, TransportError};

#[derive(Debug, Clone, Copy)]
pub struct TimeoutBudget {
    started: Instant,
    total: Option<Duration>,
    per_request: Duration,
}

impl TimeoutBudget {
    /// # Arguments
    /// * `total` - Overall budget (`None` = only the per-request timeout applies)
    /// * `per_request` - Upper bound for any single request
    pub fn new(total: Option<Duration>, per_request: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
            per_request,
        }
    }

    /// Timeout for the next request, or a timeout error when the budget is spent.
    pub fn request_timeout(&self) -> Result<Duration> {
        let Some(total) = self.total else {
            return Ok(self.per_request);
        };

        let elapsed = self.started.elapsed();
        if elapsed >= total {
            return Err(TransportError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: total.as_millis() as u64,
            }
            .into());
        }
        Ok(self.per_request.min(total - elapsed))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn total(&self) -> Option<Duration> {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataApiError;

    #[test]
    fn test_unbounded_budget_uses_per_request_timeout() {
        let budget = TimeoutBudget::new(None, Duration::from_secs(30));
        assert_eq!(budget.request_timeout().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_remaining_budget_caps_request_timeout() {
        let budget = TimeoutBudget::new(Some(Duration::from_secs(5)), Duration::from_secs(30));
        let timeout = budget.request_timeout().unwrap();
        assert!(timeout <= Duration::from_secs(5));
        assert!(timeout > Duration::from_secs(4));
    }

    #[test]
    fn test_spent_budget_is_a_timeout() {
        let budget = TimeoutBudget::new(Some(Duration::ZERO), Duration::from_secs(30));
        assert!(matches!(
            budget.request_timeout(),
            Err(DataApiError::Transport(TransportError::Timeout { .. }))
        ));
    }
}
