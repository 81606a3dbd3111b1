//! Stress testing utilities for long-duration ring runs.

use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::time::{ Duration, Instant };

/// Configuration for stress tests
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Duration to run the test
    pub duration: Duration,
    /// Number of writer threads
    pub writers: usize,
    /// Number of reader threads
    pub readers: usize,
    /// Largest batch a writer or reader claims at once
    pub max_batch: usize,
    /// Ring capacity
    pub capacity: usize,
    /// Print progress every interval
    pub report_interval: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            writers: 1,
            readers: 1,
            max_batch: 16,
            capacity: 1024,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl StressConfig {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    pub fn with_writers(mut self, n: usize) -> Self {
        self.writers = n;
        self
    }

    pub fn with_readers(mut self, n: usize) -> Self {
        self.readers = n;
        self
    }

    pub fn with_max_batch(mut self, size: usize) -> Self {
        self.max_batch = size;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }
}

/// Metrics collected during stress testing
#[derive(Debug, Clone, Default)]
pub struct StressMetrics {
    pub puts: u64,
    pub takes: u64,
    pub bytes_put: u64,
    pub bytes_taken: u64,
    pub errors: u64,
    pub duration: Duration,
    pub peak_rate: f64,
}

impl StressMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            (self.puts as f64) / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn take_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            (self.takes as f64) / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Fraction of puts never taken (overwritten or discarded)
    pub fn loss_rate(&self) -> f64 {
        if self.puts > 0 {
            1.0 - (self.takes as f64) / (self.puts as f64)
        } else {
            0.0
        }
    }

    pub fn throughput_mbps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            (self.bytes_taken as f64) / 1_000_000.0 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Shared counters for stress testing
#[derive(Debug)]
pub struct StressCounters {
    pub puts: AtomicU64,
    pub takes: AtomicU64,
    pub bytes_put: AtomicU64,
    pub bytes_taken: AtomicU64,
    pub errors: AtomicU64,
    pub running: AtomicBool,
}

impl StressCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_put(&self, count: u64, bytes: usize) {
        self.puts.fetch_add(count, Ordering::Relaxed);
        self.bytes_put.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_take(&self, count: u64, bytes: usize) {
        self.takes.fetch_add(count, Ordering::Relaxed);
        self.bytes_taken.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StressMetrics {
        StressMetrics {
            puts: self.puts.load(Ordering::Relaxed),
            takes: self.takes.load(Ordering::Relaxed),
            bytes_put: self.bytes_put.load(Ordering::Relaxed),
            bytes_taken: self.bytes_taken.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duration: Duration::ZERO,
            peak_rate: 0.0,
        }
    }
}

impl Default for StressCounters {
    fn default() -> Self {
        Self {
            puts: AtomicU64::new(0),
            takes: AtomicU64::new(0),
            bytes_put: AtomicU64::new(0),
            bytes_taken: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }
}

/// Runner for stress tests with progress reporting
pub struct StressRunner {
    config: StressConfig,
    counters: Arc<StressCounters>,
}

impl StressRunner {
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            counters: StressCounters::new(),
        }
    }

    pub fn counters(&self) -> Arc<StressCounters> {
        self.counters.clone()
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Run `test_fn` until it returns; the reporter clears `running` once the
    /// configured duration has passed.
    pub fn run_with_progress<F>(&self, test_fn: F) -> StressMetrics
        where F: FnOnce(Arc<StressCounters>)
    {
        let start = Instant::now();
        let counters = self.counters.clone();
        let duration = self.config.duration;
        let report_interval = self.config.report_interval;

        let report_counters = counters.clone();
        let reporter = std::thread::spawn(move || {
            let mut last_puts = 0u64;
            let mut peak_rate = 0.0f64;

            while report_counters.is_running() {
                std::thread::sleep(report_interval.min(duration));

                let puts = report_counters.puts.load(Ordering::Relaxed);
                let takes = report_counters.takes.load(Ordering::Relaxed);
                let errors = report_counters.errors.load(Ordering::Relaxed);

                let rate = ((puts - last_puts) as f64) / report_interval.as_secs_f64();
                peak_rate = peak_rate.max(rate);
                last_puts = puts;

                let elapsed = start.elapsed();
                eprintln!(
                    "[{:>5.1}s] put: {:>10}, taken: {:>10}, rate: {:>10.0}/s, errors: {}",
                    elapsed.as_secs_f64(),
                    puts,
                    takes,
                    rate,
                    errors
                );

                if elapsed >= duration {
                    report_counters.stop();
                    break;
                }
            }

            peak_rate
        });

        test_fn(counters.clone());

        counters.stop();
        let peak_rate = reporter.join().unwrap_or(0.0);

        let mut metrics = counters.snapshot();
        metrics.duration = start.elapsed();
        metrics.peak_rate = peak_rate;
        metrics
    }
}

/// Print a summary of stress test results
pub fn print_summary(name: &str, metrics: &StressMetrics) {
    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║  STRESS: {:<52}║", name);
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║  Duration:        {:>10.2}s                                 ║", metrics.duration.as_secs_f64());
    eprintln!("║  Puts:            {:>10}                                   ║", metrics.puts);
    eprintln!("║  Takes:           {:>10}                                   ║", metrics.takes);
    eprintln!("║  Put Rate:        {:>10.0} /s                              ║", metrics.put_rate());
    eprintln!("║  Take Rate:       {:>10.0} /s                              ║", metrics.take_rate());
    eprintln!("║  Peak Rate:       {:>10.0} /s                              ║", metrics.peak_rate);
    eprintln!("║  Loss Rate:       {:>10.4}%                                ║", metrics.loss_rate() * 100.0);
    eprintln!("║  Errors:          {:>10}                                   ║", metrics.errors);
    eprintln!("║  Throughput:      {:>10.2} MB/s                            ║", metrics.throughput_mbps());
    eprintln!("╚══════════════════════════════════════════════════════════════╝");

    if metrics.errors > 0 {
        eprintln!("\n❌ FAILED: {} errors detected", metrics.errors);
    } else {
        eprintln!("\n✅ PASSED: No errors, {:.4}% loss", metrics.loss_rate() * 100.0);
    }
}
