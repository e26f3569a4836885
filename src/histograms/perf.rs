//! Logarithmic latency histogram with per-window maximum.
//!
//! This module provides [`PerfHistogram`], built on top of
//! [`TimeHistogram`]. Every observation is classified into a *perf bucket*
//! whose width grows geometrically, and the bucket id is counted in the
//! underlying store. Independently, the largest raw value of each time window
//! is tracked with a lock-free compare-and-swap loop over the bit pattern of
//! an `f64`.
//!
//! # Bucket Layout
//!
//! ```text
//!   bucket 1   [0, unit)                   (and anything below 0)
//!   bucket 2   [unit, unit * base)
//!   bucket 3   [unit * base, unit * base^2)
//!   bucket n   [unit * base^(n-2), unit * base^(n-1))
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{MetricsError, Result};
use crate::histograms::time::TimeHistogram;
use crate::ready::{ReadyPerfHistogram, ReadyTimeHistogram};

/// Classifies `value` into a perf bucket id.
///
/// Values below `unit` fall into bucket 1. Otherwise the id is
/// `2 + floor(log_base(value) - log_base(unit))`.
///
/// # Examples
///
/// ```rust
/// use finestre::histograms::perf::perf_bucket;
///
/// assert_eq!(perf_bucket(0.2, 1.0, 2.0), 1);
/// assert_eq!(perf_bucket(1.0, 1.0, 2.0), 2);
/// assert_eq!(perf_bucket(2.2, 1.0, 2.0), 3);
/// assert_eq!(perf_bucket(500.0, 10.0, 10.0), 3);
/// ```
#[inline]
pub fn perf_bucket(value: f64, unit: f64, base: f64) -> u64 {
    if value < unit {
        return 1;
    }
    let log_base = base.ln();
    let exponent = (value.ln() / log_base - unit.ln() / log_base).floor();
    // value >= unit: only rounding can take the exponent below 0, and never below -1
    debug_assert!(exponent >= -1.0, "exponent {exponent} for {value} >= {unit}");
    (2.0 + exponent.max(0.0)) as u64
}

/// A time-windowed latency histogram.
///
/// # Examples
///
/// ```rust
/// use finestre::clock::ManualClock;
/// use finestre::histograms::perf::PerfHistogram;
/// use finestre::ready::Window;
/// use std::sync::Arc;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let clock = Arc::new(ManualClock::new(UNIX_EPOCH));
/// let latency = PerfHistogram::new(Duration::from_secs(60), 1.0, 2.0)
///     .unwrap()
///     .with_clock(clock.clone());
///
/// for value in [1.0, 0.2, 2.2, 2.0, -0.0] {
///     latency.add(value).unwrap();
/// }
/// clock.advance(Duration::from_secs(60));
///
/// let windows = latency.flush();
/// assert_eq!(windows[0].metrics()[&1], 2);
/// assert_eq!(windows[0].metrics()[&2], 1);
/// assert_eq!(windows[0].metrics()[&3], 2);
/// assert_eq!(windows[0].max(), 2.2);
/// ```
#[derive(Debug)]
pub struct PerfHistogram {
    histogram: TimeHistogram<u64>,
    unit: f64,
    base: f64,
}

impl PerfHistogram {
    /// Creates an empty histogram with windows `period` wide.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidHistogram`] if `unit` is not a positive
    /// finite number or `base` is not a finite number greater than 1, and
    /// [`MetricsError::InvalidPeriod`] if `period` is zero.
    pub fn new(period: Duration, unit: f64, base: f64) -> Result<Self> {
        if !(unit.is_finite() && unit > 0.0) {
            return Err(MetricsError::InvalidHistogram {
                reason: format!("unit must be greater than 0, got {unit}"),
            });
        }
        if !(base.is_finite() && base > 1.0) {
            return Err(MetricsError::InvalidHistogram {
                reason: format!("base must be greater than 1, got {base}"),
            });
        }
        Ok(PerfHistogram {
            histogram: TimeHistogram::new(period)?,
            unit,
            base,
        })
    }

    /// Sets the maximum number of distinct perf buckets per window.
    pub fn with_max_length(self, max_len: usize) -> Self {
        Self {
            histogram: self.histogram.with_max_length(max_len),
            ..self
        }
    }

    /// Sets the clock used to place observations into windows.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            histogram: self.histogram.with_clock(clock),
            ..self
        }
    }

    /// Returns the upper bound of perf bucket 1.
    #[inline]
    pub fn unit(&self) -> f64 {
        self.unit
    }

    /// Returns the growth factor between consecutive perf buckets.
    #[inline]
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Returns the width of a window.
    #[inline]
    pub fn period(&self) -> Duration {
        self.histogram.period()
    }

    /// Records one observation in the current window.
    ///
    /// The window maximum is raised even when the bucket count is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidValue`] for NaN or infinite values, and
    /// [`MetricsError::MaxStoreLength`] if the perf bucket is new to the
    /// window and the window is full.
    #[inline]
    pub fn add(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MetricsError::InvalidValue { value });
        }
        let bucket = perf_bucket(value, self.unit, self.base);
        self.histogram.record(bucket, 1, Some(value))
    }

    /// Returns `true` if at least one window has fully elapsed since the
    /// oldest unflushed observation.
    #[inline]
    pub fn ready(&self) -> bool {
        self.histogram.ready()
    }

    /// Returns `true` if the histogram holds no unflushed observations.
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Detaches every completed window and returns them in ascending order.
    ///
    /// Window maxima are rotated together with their counters: the maximum of
    /// the window still in progress stays in the histogram.
    pub fn flush(&self) -> Vec<ReadyPerfHistogram> {
        self.histogram
            .flush_detached()
            .into_iter()
            .filter_map(|detached| {
                // every accepted observation raised the peak first
                let max = detached.bucket.peak()?;
                let window = ReadyTimeHistogram::new(
                    detached.start,
                    detached.finish,
                    detached.bucket.metrics(),
                );
                Some(ReadyPerfHistogram::new(window, max, self.unit, self.base))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::MaxStoreLengthError;
    use crate::ready::Window;
    use std::thread;
    use std::time::{SystemTime, UNIX_EPOCH};

    const PERIOD: Duration = Duration::from_secs(10);

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn histogram(clock: &Arc<ManualClock>, unit: f64, base: f64) -> PerfHistogram {
        PerfHistogram::new(PERIOD, unit, base)
            .unwrap()
            .with_clock(clock.clone())
    }

    #[test]
    fn test_invalid_parameters() {
        for (unit, base) in [
            (2.0, 1.0),
            (0.0, 2.0),
            (-1.0, 2.0),
            (1.0, 0.5),
            (f64::NAN, 2.0),
            (1.0, f64::INFINITY),
        ] {
            assert!(
                matches!(
                    PerfHistogram::new(PERIOD, unit, base),
                    Err(MetricsError::InvalidHistogram { .. })
                ),
                "unit={unit} base={base}"
            );
        }
        assert_eq!(
            PerfHistogram::new(Duration::ZERO, 1.0, 2.0).unwrap_err(),
            MetricsError::InvalidPeriod
        );
    }

    #[test]
    fn test_perf_bucket_boundaries() {
        assert_eq!(perf_bucket(-5.0, 1.0, 2.0), 1);
        assert_eq!(perf_bucket(0.999, 1.0, 2.0), 1);
        assert_eq!(perf_bucket(1.0, 1.0, 2.0), 2);
        assert_eq!(perf_bucket(1.999, 1.0, 2.0), 2);
        assert_eq!(perf_bucket(2.0, 1.0, 2.0), 3);
        assert_eq!(perf_bucket(4.0, 1.0, 2.0), 4);
        assert_eq!(perf_bucket(9.0, 1.0, 2.0), 5);
        assert_eq!(perf_bucket(0.5, 0.5, 4.0), 2);
        assert_eq!(perf_bucket(2.5, 0.5, 4.0), 3);
    }

    #[test]
    fn test_perf_bucket_at_or_above_unit_is_at_least_two() {
        for unit in [0.1, 0.3, 1.0, 7.0, 1e-6] {
            for base in [1.1, 2.0, 3.0, 10.0] {
                assert_eq!(perf_bucket(unit, unit, base), 2, "unit={unit} base={base}");
                assert!(perf_bucket(unit * 1.000_001, unit, base) >= 2);
            }
        }
    }

    #[test]
    fn test_worked_example() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = histogram(&clock, 1.0, 2.0);
        for value in [1.0, 0.2, 2.2, 2.0, -0.0] {
            hist.add(value).unwrap();
        }
        assert!(!hist.ready());
        clock.advance(PERIOD);
        assert!(hist.ready());

        let windows = hist.flush();
        assert_eq!(windows.len(), 1);
        let window = &windows[0];
        assert_eq!(window.metrics().len(), 3);
        assert_eq!(window.metrics()[&1], 2);
        assert_eq!(window.metrics()[&2], 1);
        assert_eq!(window.metrics()[&3], 2);
        assert_eq!(window.max(), 2.2);
        assert_eq!(window.unit(), 1.0);
        assert_eq!(window.base(), 2.0);
        assert_eq!(window.count(), 5);
        assert_eq!(window.start(), at(1000));
        assert_eq!(window.finish(), at(1010));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = histogram(&clock, 1.0, 2.0);
        assert!(matches!(
            hist.add(f64::NAN),
            Err(MetricsError::InvalidValue { .. })
        ));
        assert!(matches!(
            hist.add(f64::INFINITY),
            Err(MetricsError::InvalidValue { .. })
        ));
        assert!(hist.is_empty());
    }

    #[test]
    fn test_max_per_window() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = histogram(&clock, 1.0, 2.0);
        hist.add(8.0).unwrap();
        hist.add(3.0).unwrap();
        clock.advance(PERIOD);
        hist.add(1.5).unwrap();
        clock.advance(PERIOD);
        hist.add(0.5).unwrap();
        hist.add(0.7).unwrap();

        let windows = hist.flush();
        let maxes: Vec<_> = windows.iter().map(|w| w.max()).collect();
        assert_eq!(maxes, vec![8.0, 1.5]);

        // the in-progress window keeps its own maximum
        clock.advance(PERIOD);
        let windows = hist.flush();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].max(), 0.7);
        assert_eq!(windows[0].start(), at(1020));
    }

    #[test]
    fn test_max_of_negative_observations() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = histogram(&clock, 1.0, 2.0);
        hist.add(-3.0).unwrap();
        hist.add(-1.0).unwrap();
        hist.add(-2.0).unwrap();
        clock.advance(PERIOD);
        let windows = hist.flush();
        assert_eq!(windows[0].max(), -1.0);
        assert_eq!(windows[0].metrics()[&1], 3);
    }

    #[test]
    fn test_cardinality_error_surfaces_unchanged() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = histogram(&clock, 1.0, 2.0).with_max_length(1);
        hist.add(0.5).unwrap();
        assert_eq!(
            hist.add(100.0),
            Err(MetricsError::MaxStoreLength(MaxStoreLengthError { max_len: 1 }))
        );
        clock.advance(PERIOD);
        let windows = hist.flush();
        assert_eq!(windows[0].metrics().len(), 1);
        // the maximum is tracked independently of the counters
        assert_eq!(windows[0].max(), 100.0);
    }

    #[test]
    fn test_concurrent_add_and_flush() {
        const THREADS: u64 = 16;
        const ROUNDS: u64 = 20;

        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = Arc::new(histogram(&clock, 1.0, 2.0));

        let mut writers = vec![];
        for _ in 0..THREADS {
            let hist = Arc::clone(&hist);
            writers.push(thread::spawn(move || {
                for _ in 0..ROUNDS {
                    for value in 0..1000u32 {
                        hist.add(f64::from(value)).unwrap();
                    }
                }
            }));
        }

        let reader = {
            let hist = Arc::clone(&hist);
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                let mut windows = Vec::new();
                for _ in 0..100 {
                    clock.advance(Duration::from_secs(1));
                    if hist.ready() {
                        windows.extend(hist.flush());
                    }
                    thread::yield_now();
                }
                windows
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        let mut windows = reader.join().unwrap();
        clock.advance(PERIOD);
        windows.extend(hist.flush());
        assert!(hist.is_empty());

        let count: i64 = windows.iter().map(|w| w.count()).sum();
        assert_eq!(count, (THREADS * ROUNDS * 1000) as i64);

        let max = windows.iter().map(|w| w.max()).fold(f64::MIN, f64::max);
        assert_eq!(max, 999.0);
        for window in &windows {
            assert!(window.max() <= 999.0);
            assert!(window.count() > 0);
            assert_eq!(window.period(), PERIOD);
        }
        for pair in windows.windows(2) {
            assert!(pair[0].finish() <= pair[1].start());
        }
    }

    #[test]
    fn test_multiple_threads() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let hist = Arc::new(histogram(&clock, 1.0, 10.0));
        let mut handles = vec![];

        for i in 0..4 {
            let hist = Arc::clone(&hist);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    hist.add(f64::from(i * 100 + j)).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        clock.advance(PERIOD);
        let windows = hist.flush();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].max(), 399.0);
        assert_eq!(windows[0].count(), 400);
        // 0 -> 1, 1..10 -> 2, 10..100 -> 3, 100..1000 -> 4
        assert_eq!(windows[0].metrics()[&1], 1);
        assert_eq!(windows[0].metrics()[&2], 9);
        assert_eq!(windows[0].metrics()[&3], 90);
        assert_eq!(windows[0].metrics()[&4], 300);
    }
}
