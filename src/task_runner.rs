/// Strategy Task Runner
///
/// Drives one strategy forever: gate, run, sleep, repeat. A failed gate or
/// run is logged and the loop moves on to the next tick; there is no
/// immediate retry.

use crate::application::strategies::Strategy;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info};

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Run `strategy` until `shutdown` turns true or its sender is dropped.
///
/// The flag is checked before every `should_execute` and around every
/// sleep; a run in progress is always awaited to completion. Iterations are
/// strictly sequential, so a strategy never has two runs in flight.
pub async fn run_strategy_loop<S>(strategy: S, mut shutdown: watch::Receiver<bool>)
where
    S: Strategy,
{
    let name = strategy.name();
    info!("Strategy '{}' started", name);

    loop {
        if shutdown_requested(&shutdown) {
            break;
        }

        match strategy.should_execute().await {
            Ok(true) => {
                info!("Strategy '{}' executing", name);
                if let Err(e) = strategy.handle_execute().await {
                    error!("Strategy '{}' failed: {}", name, e);
                }
            }
            Ok(false) => debug!("Strategy '{}' not due", name),
            Err(e) => error!("Strategy '{}' could not evaluate its schedule: {}", name, e),
        }

        if shutdown_requested(&shutdown) {
            break;
        }

        let pause = strategy.sleep_duration();
        debug!("Strategy '{}' sleeping for {:?}", name, pause);
        tokio::select! {
            _ = sleep(pause) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || shutdown_requested(&shutdown) {
                    break;
                }
            }
        }
    }

    info!("Strategy '{}' stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ExchangeError, TradingResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Calls {
        should: AtomicUsize,
        handle: AtomicUsize,
        sleep: AtomicUsize,
        checked_at: Mutex<Vec<Instant>>,
    }

    struct ScriptedStrategy {
        due: bool,
        fail: bool,
        pause: Duration,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl Strategy for ScriptedStrategy {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn should_execute(&self) -> TradingResult<bool> {
            self.calls.should.fetch_add(1, Ordering::SeqCst);
            self.calls.checked_at.lock().unwrap().push(Instant::now());
            Ok(self.due)
        }

        async fn handle_execute(&self) -> TradingResult<()> {
            self.calls.handle.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExchangeError::Network("connection reset".to_string()).into());
            }
            Ok(())
        }

        fn sleep_duration(&self) -> Duration {
            self.calls.sleep.fetch_add(1, Ordering::SeqCst);
            self.pause
        }
    }

    async fn run_for(strategy: ScriptedStrategy, window: Duration) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_strategy_loop(strategy, rx));
        tokio::time::sleep(window).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_not_due_strategy_never_runs_but_still_sleeps() {
        let calls = Arc::new(Calls::default());
        let pause = Duration::from_millis(20);
        let strategy = ScriptedStrategy {
            due: false,
            fail: false,
            pause,
            calls: calls.clone(),
        };

        run_for(strategy, Duration::from_millis(150)).await;

        let checks = calls.should.load(Ordering::SeqCst);
        assert!(checks >= 2, "expected repeated checks, got {}", checks);
        assert_eq!(calls.handle.load(Ordering::SeqCst), 0);
        assert_eq!(calls.sleep.load(Ordering::SeqCst), checks);

        let checked_at = calls.checked_at.lock().unwrap();
        for pair in checked_at.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= pause);
        }
    }

    #[tokio::test]
    async fn test_due_strategy_runs_every_iteration() {
        let calls = Arc::new(Calls::default());
        let strategy = ScriptedStrategy {
            due: true,
            fail: false,
            pause: Duration::from_millis(10),
            calls: calls.clone(),
        };

        run_for(strategy, Duration::from_millis(100)).await;

        let checks = calls.should.load(Ordering::SeqCst);
        assert!(checks >= 2);
        assert_eq!(calls.handle.load(Ordering::SeqCst), checks);
    }

    #[tokio::test]
    async fn test_failed_run_does_not_stop_loop() {
        let calls = Arc::new(Calls::default());
        let strategy = ScriptedStrategy {
            due: true,
            fail: true,
            pause: Duration::from_millis(10),
            calls: calls.clone(),
        };

        run_for(strategy, Duration::from_millis(100)).await;

        assert!(calls.handle.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_sleep() {
        let calls = Arc::new(Calls::default());
        let strategy = ScriptedStrategy {
            due: false,
            fail: false,
            pause: Duration::from_secs(3600),
            calls: calls.clone(),
        };

        run_for(strategy, Duration::from_millis(50)).await;

        assert_eq!(calls.should.load(Ordering::SeqCst), 1);
    }
}
