//! Pending → success|failure notifications, addressed by an opaque handle so
//! the same visual element is updated in place.

use chrono::{
    DateTime,
    Duration,
    Utc,
};
use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NotificationRef(u64);

impl NotificationRef {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Success,
    Failure,
}

pub trait NotificationSink {
    fn create_pending(&self, message: &str) -> NotificationRef;

    fn resolve(&self, notification: NotificationRef, outcome: Outcome, message: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotificationState {
    Pending,
    Resolved(Outcome),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub id: NotificationRef,
    pub state: NotificationState,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Toasts {
    next_id: u64,
    items: Vec<Notification>,
}

/// In-memory toast list rendered by the terminal UI.
#[derive(Clone, Debug, Default)]
pub struct NotificationCenter {
    inner: Arc<Mutex<Toasts>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn toasts(&self) -> MutexGuard<'_, Toasts> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, notification: NotificationRef) -> Option<Notification> {
        self.toasts()
            .items
            .iter()
            .find(|item| item.id == notification)
            .cloned()
    }

    /// Pending toasts plus resolved ones younger than `linger`, oldest first.
    pub fn visible(&self, now: DateTime<Utc>, linger: Duration) -> Vec<Notification> {
        self.toasts()
            .items
            .iter()
            .filter(|item| match item.state {
                NotificationState::Pending => true,
                NotificationState::Resolved(_) => now - item.updated_at < linger,
            })
            .cloned()
            .collect()
    }

    /// Drops resolved toasts older than `linger`.
    pub fn prune(&self, now: DateTime<Utc>, linger: Duration) {
        self.toasts().items.retain(|item| match item.state {
            NotificationState::Pending => true,
            NotificationState::Resolved(_) => now - item.updated_at < linger,
        });
    }
}

impl NotificationSink for NotificationCenter {
    fn create_pending(&self, message: &str) -> NotificationRef {
        let mut toasts = self.toasts();
        toasts.next_id += 1;
        let id = NotificationRef(toasts.next_id);
        toasts.items.push(Notification {
            id,
            state: NotificationState::Pending,
            message: message.to_string(),
            updated_at: Utc::now(),
        });
        id
    }

    fn resolve(&self, notification: NotificationRef, outcome: Outcome, message: &str) {
        let mut toasts = self.toasts();
        match toasts.items.iter_mut().find(|item| item.id == notification) {
            Some(item) if item.state == NotificationState::Pending => {
                item.state = NotificationState::Resolved(outcome);
                item.message = message.to_string();
                item.updated_at = Utc::now();
            }
            Some(_) => warn!(%notification, "notification already resolved"),
            None => warn!(%notification, "resolving unknown notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn resolve__updates_the_same_toast() {
        // given
        let center = NotificationCenter::new();
        let id = center.create_pending("Buying your tickets...");

        // when
        center.resolve(id, Outcome::Success, "Tickets purchased successfully!");

        // then
        let toasts = center.visible(Utc::now(), Duration::seconds(5));
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].id, id);
        assert_eq!(toasts[0].state, NotificationState::Resolved(Outcome::Success));
        assert_eq!(toasts[0].message, "Tickets purchased successfully!");
    }

    #[test]
    fn resolve__second_resolution_is_ignored() {
        let center = NotificationCenter::new();
        let id = center.create_pending("Refunding all...");
        center.resolve(id, Outcome::Failure, "Whoops something went wrong!");

        center.resolve(id, Outcome::Success, "All refunded successfully!");

        let toast = center.get(id).unwrap();
        assert_eq!(toast.state, NotificationState::Resolved(Outcome::Failure));
        assert_eq!(toast.message, "Whoops something went wrong!");
    }

    #[test]
    fn prune__keeps_pending_and_recent_toasts() {
        let center = NotificationCenter::new();
        let pending = center.create_pending("Restarting draw...");
        let done = center.create_pending("Withdrawing winnings...");
        center.resolve(done, Outcome::Success, "Winnings withdrawn successfully!");

        center.prune(Utc::now() + Duration::seconds(10), Duration::seconds(5));

        assert!(center.get(pending).is_some());
        assert!(center.get(done).is_none());
    }
}
