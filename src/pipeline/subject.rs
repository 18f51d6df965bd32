//! Ordered subscriber list with synchronous delivery

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use super::{Observer, Signal};
use crate::error::Error;

type ObserverList = Arc<Vec<(u64, Observer)>>;

/// Publishes signals to every subscriber in subscription order.
///
/// The subscriber list is copied on write, so delivery works on a snapshot
/// and subscribers may unsubscribe (or dispose stages) from inside a
/// callback without deadlocking. Delivery returns only after every
/// subscriber has returned.
pub struct Subject {
    state: Mutex<SubjectState>,
}

struct SubjectState {
    observers: ObserverList,
    next_id: u64,
    closed: bool,
}

impl Subject {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SubjectState {
                observers: Arc::default(),
                next_id: 0,
                closed: false,
            }),
        })
    }

    /// Add a subscriber. A closed subject hands back an inactive subscription.
    pub fn subscribe(self: &Arc<Self>, observer: Observer) -> Subscription {
        let mut state = self.state.lock();
        if state.closed {
            return Subscription::inactive();
        }

        let id = state.next_id;
        state.next_id += 1;

        let mut observers = Vec::with_capacity(state.observers.len() + 1);
        observers.extend(state.observers.iter().cloned());
        observers.push((id, observer));
        state.observers = Arc::new(observers);

        Subscription {
            subject: Arc::downgrade(self),
            id,
        }
    }

    fn remove(&self, id: u64) {
        let mut state = self.state.lock();
        if !state.observers.iter().any(|(existing, _)| *existing == id) {
            return;
        }
        let observers: Vec<_> = state
            .observers
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        state.observers = Arc::new(observers);
    }

    /// Deliver one span to every subscriber
    pub fn next(&self, data: &[u8]) {
        let observers = {
            let state = self.state.lock();
            if state.closed {
                return;
            }
            state.observers.clone()
        };

        for (_, observer) in observers.iter() {
            observer(Signal::Data(data));
        }
    }

    /// Signal completion and close the subject
    pub fn complete(&self) {
        self.terminate(Signal::Completed);
    }

    /// Signal a terminal error and close the subject
    pub fn fail(&self, error: &Error) {
        self.terminate(Signal::Failed(error));
    }

    fn terminate(&self, signal: Signal<'_>) {
        let observers = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.observers)
        };

        for (_, observer) in observers.iter() {
            observer(signal);
        }
    }

    /// Drop all subscribers without notifying them
    pub fn close(&self) {
        let observers = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.observers)
        };
        // Observers may own stages; drop them outside the lock
        drop(observers);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }
}

/// Handle to one subscription; unsubscribes when dropped
pub struct Subscription {
    subject: Weak<Subject>,
    id: u64,
}

impl Subscription {
    fn inactive() -> Self {
        Self {
            subject: Weak::new(),
            id: 0,
        }
    }

    /// Stop receiving signals. Calling this more than once is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(subject) = self.subject.upgrade() {
            subject.remove(self.id);
        }
        self.subject = Weak::new();
    }

    pub fn is_active(&self) -> bool {
        self.subject.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, ErrorCode};
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Observer {
        let log = log.clone();
        Arc::new(move |signal: Signal<'_>| {
            let entry = match signal {
                Signal::Data(data) => format!("{}:data:{}", name, data.len()),
                Signal::Completed => format!("{}:completed", name),
                Signal::Failed(_) => format!("{}:failed", name),
            };
            log.lock().push(entry);
        })
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let subject = Subject::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = subject.subscribe(recorder(&log, "a"));
        let _b = subject.subscribe(recorder(&log, "b"));

        subject.next(&[1, 2, 3]);
        subject.complete();
        subject.next(&[4]);

        assert_eq!(
            *log.lock(),
            vec!["a:data:3", "b:data:3", "a:completed", "b:completed"]
        );
        assert!(subject.is_closed());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subject = Subject::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sub = subject.subscribe(recorder(&log, "a"));
        assert_eq!(subject.observer_count(), 1);
        drop(sub);
        assert_eq!(subject.observer_count(), 0);

        subject.next(&[1]);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let subject = Subject::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(Mutex::new(0));

        let observer: Observer = {
            let slot = slot.clone();
            let hits = hits.clone();
            Arc::new(move |_signal: Signal<'_>| {
                *hits.lock() += 1;
                let taken = slot.lock().take();
                drop(taken);
            })
        };
        *slot.lock() = Some(subject.subscribe(observer));

        subject.next(&[1]);
        subject.next(&[2]);

        assert_eq!(*hits.lock(), 1);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_failure_is_terminal() {
        let subject = Subject::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = subject.subscribe(recorder(&log, "a"));

        let error = Error::Codec(CodecError::EncodeFailed(ErrorCode::BadArg));
        subject.fail(&error);
        subject.complete();

        assert_eq!(*log.lock(), vec!["a:failed"]);
        let late = subject.subscribe(recorder(&log, "late"));
        assert!(!late.is_active());
    }
}
