// =============================================================================
// Bar Finalizer — background sweep that closes out stale minute bars
// =============================================================================
//
// Periodic `tokio::time::interval` loop structured like `exit/monitor.rs`'s
// watchdog: wake on a fixed cadence, sweep, sleep. Ported 1:1 from
// `minute_bar_finalizer.py::_check_and_finalize` — a minute bar is archived
// unconditionally once wall-clock has moved a full minute past it, or early
// (after a 5s grace period) once the *next* minute has started, so a quiet
// symbol's last bar doesn't sit open forever waiting for a trade that may
// never come.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::resampler::Resampler;
use crate::types::Interval;

pub struct BarFinalizer {
    resampler: Arc<Resampler>,
    check_interval: Duration,
}

impl BarFinalizer {
    /// `check_interval` defaults to 1s (§4.D).
    pub fn new(resampler: Arc<Resampler>, check_interval: Duration) -> Self {
        Self {
            resampler,
            check_interval,
        }
    }

    /// Runs until the process exits. Errors during a sweep are logged and
    /// swallowed — a single bad sweep must not kill the watchdog.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        loop {
            ticker.tick().await;
            self.sweep();
        }
    }

    fn sweep(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let current_minute = Interval::OneMinute.floor(now_ms);
        let previous_minute = current_minute - Interval::OneMinute.millis();
        let second_of_minute = (now_ms.rem_euclid(60_000)) / 1_000;

        for (symbol, bar) in self.resampler.minute_currents() {
            let finalize = if bar.bucket_start_ms < previous_minute {
                true
            } else {
                bar.bucket_start_ms == previous_minute && second_of_minute > 5
            };
            if finalize {
                self.resampler.finalize_current(&symbol, Interval::OneMinute);
                debug!(symbol = %symbol, bucket = bar.bucket_start_ms, "minute bar finalized by sweep");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tick;

    fn tick(symbol: &str, price: f64, t: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            quantity: 1.0,
            trade_time_ms: t,
        }
    }

    #[test]
    fn finalizes_bar_once_a_full_minute_has_elapsed() {
        let resampler = Arc::new(Resampler::new(1000));
        resampler.ingest(&tick("BTCUSDT", 100.0, 0));
        let finalizer = BarFinalizer::new(resampler.clone(), Duration::from_secs(1));

        let now_ms = 3 * 60_000 + 30_000; // now is minute 3, second 30
        let current_minute = Interval::OneMinute.floor(now_ms);
        let previous_minute = current_minute - 60_000;
        assert!(0 < previous_minute); // bucket 0 is well before the previous minute
        finalizer.sweep_at(now_ms);

        let bars = resampler.get_bars("BTCUSDT", Interval::OneMinute, 10);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].bucket_start_ms, 0);
    }

    #[test]
    fn grace_period_withholds_finalize_before_five_seconds() {
        let resampler = Arc::new(Resampler::new(1000));
        resampler.ingest(&tick("BTCUSDT", 100.0, 0));
        let finalizer = BarFinalizer::new(resampler.clone(), Duration::from_secs(1));

        // Now is minute 1, second 3 — bar's bucket (0) equals previous_minute,
        // but we're still inside the grace window.
        finalizer.sweep_at(60_000 + 3_000);
        assert!(resampler.get_bars("BTCUSDT", Interval::OneMinute, 10).is_empty());

        // Past the grace window, same previous-minute relationship: finalize.
        finalizer.sweep_at(60_000 + 6_000);
        let bars = resampler.get_bars("BTCUSDT", Interval::OneMinute, 10);
        assert_eq!(bars.len(), 1);
    }
}

#[cfg(test)]
impl BarFinalizer {
    /// Test seam: run one sweep pass against an injected wall-clock time
    /// instead of `Utc::now()`.
    fn sweep_at(&self, now_ms: i64) {
        let current_minute = Interval::OneMinute.floor(now_ms);
        let previous_minute = current_minute - Interval::OneMinute.millis();
        let second_of_minute = (now_ms.rem_euclid(60_000)) / 1_000;

        for (symbol, bar) in self.resampler.minute_currents() {
            let finalize = if bar.bucket_start_ms < previous_minute {
                true
            } else {
                bar.bucket_start_ms == previous_minute && second_of_minute > 5
            };
            if finalize {
                self.resampler.finalize_current(&symbol, Interval::OneMinute);
            }
        }
    }
}
