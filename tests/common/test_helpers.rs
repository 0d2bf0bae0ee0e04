#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use quotawarden::{
    CategoryLimits, ManualClock, QuotaCategory, RateLimiter, RateLimiterConfig,
};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Limiter with a single configured category, driven by a manual clock starting at zero.
pub fn limiter_with(
    category: QuotaCategory,
    capacity: f64,
    refill_rate_per_millis: f64,
) -> (RateLimiter, ManualClock) {
    let config = RateLimiterConfig::builder()
        .limit(category, CategoryLimits::new(capacity, refill_rate_per_millis).unwrap())
        .build()
        .unwrap();
    let clock = ManualClock::new(0);
    (RateLimiter::new(config).unwrap().with_clock(clock.clone()), clock)
}

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber at `DEBUG` and return everything it logged.
pub fn capture_logs<F: FnOnce()>(f: F) -> String {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
