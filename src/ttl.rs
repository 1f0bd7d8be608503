//! Time-to-live support for list elements.

use crate::codec::TtlValue;
use crate::transform::{ElementTransformer, TransformStrategy};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds since the Unix epoch.
pub trait TimeProvider: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Manually driven clock.
#[derive(Debug, Default)]
pub struct ManualTimeProvider {
    now: AtomicI64,
}

impl ManualTimeProvider {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Drops elements whose TTL has elapsed.
///
/// Elements of a list are appended in time order, so the first live element
/// means every later one is live too: runs with
/// [`TransformStrategy::StopOnFirstIncluded`].
pub struct TtlFilter<T> {
    ttl_millis: i64,
    time: Arc<dyn TimeProvider>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TtlFilter<T> {
    pub fn new(ttl_millis: i64, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            ttl_millis,
            time,
            _marker: PhantomData,
        }
    }

    pub fn is_expired(&self, value: &TtlValue<T>, now: i64) -> bool {
        value.last_access.saturating_add(self.ttl_millis) <= now
    }
}

impl<T> ElementTransformer<TtlValue<T>> for TtlFilter<T> {
    fn filter_or_transform(&self, element: TtlValue<T>) -> Option<TtlValue<T>> {
        let now = self.time.now_millis();
        if self.is_expired(&element, now) {
            None
        } else {
            Some(element)
        }
    }

    fn strategy(&self) -> TransformStrategy {
        TransformStrategy::StopOnFirstIncluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let filter = TtlFilter::<u8>::new(100, clock.clone());

        assert!(filter.filter_or_transform(TtlValue::new(1, 950)).is_some());
        assert!(filter.filter_or_transform(TtlValue::new(1, 900)).is_none());

        clock.advance(60);
        assert!(filter.filter_or_transform(TtlValue::new(1, 950)).is_none());
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01 in millis.
        assert!(SystemTimeProvider.now_millis() > 1_577_836_800_000);
    }
}
