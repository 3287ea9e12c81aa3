use std::sync::Arc;
use std::time::Duration;

use scrutin_contracts::CancelSignal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// Propagates an external cancellation signal into an in-flight engine call.
#[derive(Debug, Clone, Copy)]
pub struct CancellationBridge {
    poll_interval: Duration,
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

impl CancellationBridge {
    /// A zero interval is raised to one millisecond.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Starts watching `signal` for the duration of one engine call.
    ///
    /// The returned guard owns a child of `run_token`; cancelling the run
    /// also cancels the engine call, while an observed signal cancels only
    /// the engine token. Must be called from within a tokio runtime.
    pub fn arm(
        &self,
        signal: Arc<dyn CancelSignal>,
        run_token: &CancellationToken,
    ) -> WatchdogGuard {
        let engine_token = run_token.child_token();
        let stop = CancellationToken::new();
        let poll_interval = self.poll_interval;

        let task = {
            let engine_token = engine_token.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = engine_token.cancelled() => break,
                        _ = ticker.tick() => {
                            if signal.is_cancelled() {
                                info!(target: "analysis::watchdog", "Canceling...");
                                engine_token.cancel();
                                break;
                            }
                        }
                    }
                }
                trace!(target: "analysis::watchdog", "watchdog finished");
            })
        };

        WatchdogGuard {
            engine_token,
            stop,
            task: Some(task),
        }
    }
}

/// Scoped watchdog; dropping it ends the watchdog task.
#[derive(Debug)]
pub struct WatchdogGuard {
    engine_token: CancellationToken,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchdogGuard {
    /// Token to hand to the engine call this guard watches.
    pub fn engine_token(&self) -> CancellationToken {
        self.engine_token.clone()
    }

    pub fn is_tripped(&self) -> bool {
        self.engine_token.is_cancelled()
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use scrutin_contracts::NeverCancelled;

    #[tokio::test(start_paused = true)]
    async fn observed_signal_cancels_engine_token_only() {
        let bridge = CancellationBridge::new(Duration::from_millis(100));
        let signal = Arc::new(AtomicBool::new(false));
        let run_token = CancellationToken::new();

        let guard = bridge.arm(signal.clone(), &run_token);
        let engine = guard.engine_token();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!engine.is_cancelled());

        signal.store(true, Ordering::Release);
        tokio::time::timeout(Duration::from_millis(200), engine.cancelled())
            .await
            .expect("watchdog should cancel the engine token");
        assert!(guard.is_tripped());
        assert!(!run_token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn run_cancellation_reaches_engine_token() {
        let bridge = CancellationBridge::new(Duration::from_millis(100));
        let run_token = CancellationToken::new();
        let guard = bridge.arm(Arc::new(NeverCancelled), &run_token);

        run_token.cancel();
        assert!(guard.engine_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_stops_watching() {
        let bridge = CancellationBridge::new(Duration::from_millis(100));
        let signal = Arc::new(AtomicBool::new(false));
        let run_token = CancellationToken::new();

        let engine = {
            let guard = bridge.arm(signal.clone(), &run_token);
            guard.engine_token()
        };
        signal.store(true, Ordering::Release);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!engine.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_polls_signal() {
        let bridge = CancellationBridge::new(Duration::ZERO);
        let signal = Arc::new(AtomicBool::new(false));
        let run_token = CancellationToken::new();
        let guard = bridge.arm(signal.clone(), &run_token);

        signal.store(true, Ordering::Release);
        tokio::time::timeout(Duration::from_millis(50), guard.engine_token().cancelled())
            .await
            .expect("watchdog should survive a zero interval");
    }
}
