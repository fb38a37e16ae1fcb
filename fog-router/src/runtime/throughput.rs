//! Periodic average-throughput calculation over the status counters.

use crate::observability::status::RouterStatus;
use crate::runtime::ticker::{spawn_ticker, TickerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct SpeedWindow {
    last_count: u64,
    last_at: Instant,
}

pub(crate) struct ThroughputMonitor {
    status: Arc<RouterStatus>,
    window: Mutex<SpeedWindow>,
}

impl ThroughputMonitor {
    pub(crate) fn new(status: Arc<RouterStatus>) -> Self {
        Self {
            window: Mutex::new(SpeedWindow {
                last_count: status.processed_messages(),
                last_at: Instant::now(),
            }),
            status,
        }
    }

    pub(crate) fn spawn(status: Arc<RouterStatus>, period: Duration) -> TickerHandle {
        let monitor = Arc::new(Self::new(status));
        spawn_ticker("throughput_monitor", period, move || {
            let monitor = monitor.clone();
            async move { monitor.run_once().await }
        })
    }

    pub(crate) async fn run_once(&self) {
        let now = Instant::now();
        let count = self.status.processed_messages();

        let mut window = self.window.lock().await;
        let elapsed = now.duration_since(window.last_at).as_secs_f64();
        if elapsed > 0.0 {
            let delta = count.saturating_sub(window.last_count);
            self.status.set_average_speed(delta as f64 / elapsed);
        }
        window.last_count = count;
        window.last_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::ThroughputMonitor;
    use crate::observability::status::RouterStatus;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn computes_speed_from_counter_delta() {
        let status = Arc::new(RouterStatus::new());
        let monitor = ThroughputMonitor::new(status.clone());

        status.record_published("svc-a");
        status.record_published("svc-a");
        tokio::time::sleep(Duration::from_secs(2)).await;

        monitor.run_once().await;

        let speed = status.snapshot().average_speed_mps;
        assert!(speed > 0.9 && speed < 1.1, "speed was {speed}");
    }
}
