//! Window resize notification sources
//!
//! A [`ResizeNotifier`] hands out subscriptions backed by a socket that
//! becomes readable each time the window size changes, so the listener
//! thread can wait on resizes and shutdown with a single `poll`.
//!
//! - [`SigwinchNotifier`] - process-wide SIGWINCH delivery
//! - [`ManualNotifier`] - in-process notifications, for hosts that learn about
//!   resizes some other way and for tests

use parking_lot::Mutex;
use signal_hook::consts::SIGWINCH;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of window resize notifications.
pub trait ResizeNotifier: Send + Sync {
    /// Start delivering notifications to a new subscription.
    fn subscribe(&self) -> io::Result<ResizeSubscription>;
}

/// Unsubscribes when cancelled or dropped.
pub struct SubscriptionGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop delivery. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A live subscription: a readable end plus the guard that ends delivery.
pub struct ResizeSubscription {
    receiver: ResizeReceiver,
    guard: SubscriptionGuard,
}

impl ResizeSubscription {
    /// `receiver` must be the read half of a pair whose write half receives one
    /// byte per notification.
    pub fn new(receiver: UnixStream, guard: SubscriptionGuard) -> io::Result<Self> {
        receiver.set_nonblocking(true)?;
        Ok(Self {
            receiver: ResizeReceiver { stream: receiver },
            guard,
        })
    }

    pub(crate) fn into_parts(self) -> (ResizeReceiver, SubscriptionGuard) {
        (self.receiver, self.guard)
    }
}

/// Outcome of consuming queued notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Drained {
    pub pending: usize,
    pub closed: bool,
}

/// Read side of a subscription, owned by the listener thread.
pub(crate) struct ResizeReceiver {
    stream: UnixStream,
}

impl ResizeReceiver {
    /// Consume every queued notification without blocking.
    pub(crate) fn drain(&mut self) -> Drained {
        let mut buf = [0u8; 64];
        let mut pending = 0;
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Drained {
                        pending,
                        closed: true,
                    }
                }
                Ok(n) => pending += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Drained {
                        pending,
                        closed: false,
                    }
                }
                Err(e) => {
                    tracing::warn!("Resize subscription read failed: {}", e);
                    return Drained {
                        pending,
                        closed: true,
                    };
                }
            }
        }
    }
}

impl AsFd for ResizeReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

/// Notifier driven by the process's SIGWINCH signal.
///
/// Each subscription registers its own self-pipe handler, so several devices
/// can be subscribed at once. Unsubscribing removes only that handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigwinchNotifier;

impl ResizeNotifier for SigwinchNotifier {
    fn subscribe(&self) -> io::Result<ResizeSubscription> {
        let (receiver, sender) = UnixStream::pair()?;
        sender.set_nonblocking(true)?;

        let id = signal_hook::low_level::pipe::register(SIGWINCH, sender)?;
        tracing::debug!("Subscribed to SIGWINCH");

        let guard = SubscriptionGuard::new(move || {
            signal_hook::low_level::unregister(id);
            tracing::debug!("Unsubscribed from SIGWINCH");
        });
        ResizeSubscription::new(receiver, guard)
    }
}

type SubscriberList = Arc<Mutex<Vec<(u64, UnixStream)>>>;

/// Notifier that fires only when [`ManualNotifier::notify`] is called.
#[derive(Clone, Default)]
pub struct ManualNotifier {
    subscribers: SubscriberList,
    next_id: Arc<AtomicU64>,
}

impl ManualNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every live subscription once.
    pub fn notify(&self) {
        let subscribers = self.subscribers.lock();
        tracing::trace!("Manual resize notification to {} subscribers", subscribers.len());
        for (_, sender) in subscribers.iter() {
            // A full buffer already holds an undelivered notification.
            match (&*sender).write(&[1]) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => tracing::debug!("Dropping manual resize notification: {}", e),
            }
        }
    }

    /// Number of subscriptions that have not been cancelled.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl ResizeNotifier for ManualNotifier {
    fn subscribe(&self) -> io::Result<ResizeSubscription> {
        let (receiver, sender) = UnixStream::pair()?;
        sender.set_nonblocking(true)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, sender));

        let subscribers = Arc::clone(&self.subscribers);
        let guard = SubscriptionGuard::new(move || {
            subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
        });
        ResizeSubscription::new(receiver, guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_notify_reaches_subscriber() {
        let notifier = ManualNotifier::new();
        let (mut receiver, _guard) = notifier.subscribe().unwrap().into_parts();

        assert_eq!(
            receiver.drain(),
            Drained {
                pending: 0,
                closed: false
            }
        );

        notifier.notify();
        notifier.notify();
        let drained = receiver.drain();
        assert_eq!(drained.pending, 2);
        assert!(!drained.closed);
    }

    #[test]
    fn test_cancel_removes_subscriber_and_closes_receiver() {
        let notifier = ManualNotifier::new();
        let (mut receiver, mut guard) = notifier.subscribe().unwrap().into_parts();
        assert_eq!(notifier.subscriber_count(), 1);

        guard.cancel();
        guard.cancel();
        assert_eq!(notifier.subscriber_count(), 0);

        notifier.notify();
        assert!(receiver.drain().closed);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let notifier = ManualNotifier::new();
        let first = notifier.subscribe().unwrap();
        let _second = notifier.subscribe().unwrap();
        assert_eq!(notifier.subscriber_count(), 2);

        drop(first);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn test_sigwinch_subscription_receives_signal() {
        let (mut receiver, mut guard) = SigwinchNotifier.subscribe().unwrap().into_parts();

        signal_hook::low_level::raise(SIGWINCH).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut pending = 0;
        while pending == 0 && std::time::Instant::now() < deadline {
            pending = receiver.drain().pending;
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(pending >= 1, "SIGWINCH should reach the subscription");

        guard.cancel();
    }
}
