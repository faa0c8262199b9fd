/// Bounded polling used by the page-readiness and transcript-panel waits
use std::cell::Cell;
use std::rc::Rc;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

impl WaitOutcome {
    pub fn is_ready(self) -> bool {
        self == WaitOutcome::Ready
    }
}

/// Shared flag that stops an in-flight wait at its next poll
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Poll `ready` every `interval_ms` until it holds, `timeout_ms` elapses, or `cancel` fires.
///
/// The predicate is checked once before any sleep, and once more at the deadline.
/// Sleeps never overshoot the deadline.
pub async fn wait_until<C, F>(
    clock: &C,
    timeout_ms: u32,
    interval_ms: u32,
    cancel: Option<&CancelToken>,
    mut ready: F,
) -> WaitOutcome
where
    C: Clock,
    F: FnMut() -> bool,
{
    let deadline = clock.now_ms() + timeout_ms as f64;
    let interval = interval_ms.max(1);

    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return WaitOutcome::Cancelled;
        }
        if ready() {
            return WaitOutcome::Ready;
        }

        let remaining = deadline - clock.now_ms();
        if remaining <= 0.0 {
            return WaitOutcome::TimedOut;
        }
        clock.sleep(interval.min(remaining.ceil() as u32)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use futures::executor::block_on;

    #[test]
    fn test_ready_immediately_never_sleeps() {
        let clock = ManualClock::new(0.0);
        let outcome = block_on(wait_until(&clock, 5_000, 200, None, || true));

        assert_eq!(outcome, WaitOutcome::Ready);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_ready_after_a_few_polls() {
        let clock = ManualClock::new(0.0);
        let mut polls = 0;
        let outcome = block_on(wait_until(&clock, 5_000, 200, None, || {
            polls += 1;
            polls == 4
        }));

        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(clock.sleeps(), vec![200, 200, 200]);
    }

    #[test]
    fn test_times_out_at_deadline() {
        let clock = ManualClock::new(0.0);
        let outcome = block_on(wait_until(&clock, 5_000, 200, None, || false));

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(clock.sleeps().len(), 25);
        assert_eq!(clock.now_ms(), 5_000.0);
    }

    #[test]
    fn test_last_sleep_is_clamped_to_deadline() {
        let clock = ManualClock::new(0.0);
        let outcome = block_on(wait_until(&clock, 500, 200, None, || false));

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(clock.sleeps(), vec![200, 200, 100]);
    }

    #[test]
    fn test_cancelled_mid_wait() {
        let clock = ManualClock::new(0.0);
        let token = CancelToken::new();
        let mut polls = 0;
        let outcome = block_on(wait_until(&clock, 5_000, 200, Some(&token), || {
            polls += 1;
            if polls == 2 {
                token.cancel();
            }
            false
        }));

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(clock.sleeps().len(), 2);
    }
}
