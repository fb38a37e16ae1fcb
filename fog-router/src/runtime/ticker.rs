//! Cancellable periodic-task abstraction used by the background monitors.

use crate::observability::events;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

const COMPONENT: &str = "ticker";

/// Handle to a spawned periodic task; dropping it leaves the task running,
/// [`stop`](Self::stop) ends it deterministically.
pub(crate) struct TickerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Spawns a background loop invoking `tick` every `period`. The first tick
/// fires one period after spawn; a stop request wins over a pending tick.
pub(crate) fn spawn_ticker<F, Fut>(name: &'static str, period: Duration, tick: F) -> TickerHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval's first tick completes immediately; consume it so the
        // loop starts one period from now.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(
            event = events::TICKER_STOPPED,
            component = COMPONENT,
            name,
            "ticker stopped"
        );
    });

    TickerHandle {
        stop: stop_tx,
        task,
    }
}
