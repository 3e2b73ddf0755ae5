//! Wall-clock budget consulted between units of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Budget errors.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Signal handler error.
    #[error("signal handler installation failed: {0}")]
    Signal(String),
}

/// Decides whether another compile or execute cycle may start.
///
/// Checked only before starting a unit of work; a running test is never
/// interrupted.
pub trait TimeBudget {
    /// Whether there is time left to execute one more test case.
    fn has_time_to_execute_a_test_case(&self) -> bool;
}

/// Budget without a deadline. Still honours the interrupt flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl TimeBudget for Unlimited {
    fn has_time_to_execute_a_test_case(&self) -> bool {
        !is_interrupted()
    }
}

/// Budget that expires at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    /// Deadline at `expires_at`.
    pub fn at(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl TimeBudget for Deadline {
    fn has_time_to_execute_a_test_case(&self) -> bool {
        !is_interrupted() && Instant::now() < self.expires_at
    }
}

impl<T: TimeBudget + ?Sized> TimeBudget for &T {
    fn has_time_to_execute_a_test_case(&self) -> bool {
        (**self).has_time_to_execute_a_test_case()
    }
}

impl<T: TimeBudget + ?Sized> TimeBudget for Box<T> {
    fn has_time_to_execute_a_test_case(&self) -> bool {
        (**self).has_time_to_execute_a_test_case()
    }
}

/// Whether Ctrl-C was received.
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Raise or clear the interrupt flag.
pub fn set_interrupted(value: bool) {
    INTERRUPTED.store(value, Ordering::SeqCst);
}

/// Install a Ctrl-C handler that raises the interrupt flag. Idempotent.
#[cfg(feature = "cli")]
pub fn install_interrupt_handler() -> Result<(), BudgetError> {
    use std::sync::OnceLock;

    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    let result = INIT.get_or_init(|| {
        ctrlc::set_handler(|| {
            INTERRUPTED.store(true, Ordering::SeqCst);
        })
        .map_err(|e| e.to_string())
    });

    match result {
        Ok(()) => Ok(()),
        Err(msg) => Err(BudgetError::Signal(msg.clone())),
    }
}
