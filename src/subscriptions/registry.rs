//! Ordered subscriber registry with failure-isolated fan-out.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::types::{ChangeNotice, Subscriber};

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Subscribers that accepted the notice.
    pub delivered: usize,
    /// Subscribers that returned an error or panicked.
    pub failed: usize,
}

/// Ordered set of subscribers, unique by identity.
///
/// Registration order is delivery order. There is no removal; subscribers
/// live as long as the registry.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` unless the same handle is already registered.
    ///
    /// Returns `false` for a duplicate, which is otherwise a no-op.
    pub fn register(&mut self, subscriber: Arc<dyn Subscriber>) -> bool {
        if self.contains(&subscriber) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    /// Whether this exact handle is registered.
    pub fn contains(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        // Compare data pointers only; vtable pointers are not unique.
        let target = Arc::as_ptr(subscriber) as *const ();
        self.subscribers
            .iter()
            .any(|s| Arc::as_ptr(s) as *const () == target)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `notice` to every subscriber in registration order.
    ///
    /// Failures and panics are logged and skipped; the loop always reaches
    /// the last subscriber.
    pub fn notify_all(&self, notice: &ChangeNotice) -> NotifyReport {
        let mut report = NotifyReport::default();

        for (position, subscriber) in self.subscribers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_change(notice))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscriber = position,
                        field = notice.field_name(),
                        error = %e,
                        "Error invoking subscriber"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(
                        subscriber = position,
                        field = notice.field_name(),
                        "Subscriber panicked during delivery"
                    );
                }
            }
        }

        report
    }
}
