//! Stage ownership and disposal
//!
//! Every stage owns two things with a lifecycle: its link to the upstream
//! (subscription, own subject, optional ownership of the upstream) and its
//! mutable processing state (codec handle, scratch buffers, carry buffer).
//! Disposal is idempotent, cascades depth-first into an owned upstream, and
//! may be requested from inside a callback of the very stage being torn
//! down. In that case the processing state is released as soon as the
//! in-flight push unwinds.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{AudioOutput, Observer, Signal, Subject, Subscription};
use crate::audio::format::AudioFormat;
use crate::audio::pool::SharedBufferPool;

/// Construction-time options shared by all stages
#[derive(Clone)]
pub struct StageOptions {
    /// Borrow scratch buffers from this pool instead of allocating
    pub pool: Option<SharedBufferPool>,
    /// Dispose the upstream when this stage is disposed
    pub owns_upstream: bool,
}

impl StageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: SharedBufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Leave the upstream alive when this stage is disposed
    pub fn borrow_upstream(mut self) -> Self {
        self.owns_upstream = false;
        self
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            pool: None,
            owns_upstream: true,
        }
    }
}

impl std::fmt::Debug for StageOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageOptions")
            .field("pooled", &self.pool.is_some())
            .field("owns_upstream", &self.owns_upstream)
            .finish()
    }
}

/// Mutable stage state that can be released while a push is in flight
pub(crate) struct StageCell<T> {
    disposed: AtomicBool,
    state: Mutex<Option<T>>,
}

impl<T> StageCell<T> {
    pub fn new(state: T) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            state: Mutex::new(Some(state)),
        }
    }

    /// Run `f` on the state unless the stage has been disposed.
    ///
    /// The lock is held for all of `f`, downstream emission included, so
    /// nothing reachable from a downstream callback may call `with` on the
    /// same cell. Counters a callback might read belong in atomics.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if self.disposed.load(Ordering::SeqCst) {
            return None;
        }

        let result = {
            let mut guard = self.state.lock();
            guard.as_mut().map(f)
        };

        // Disposed from inside `f` or from another thread while we held the lock
        if self.disposed.load(Ordering::SeqCst) {
            self.reclaim();
        }
        result
    }

    /// Mark disposed and release the state. Returns `true` on the first call only.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.reclaim();
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn reclaim(&self) {
        // A failed try_lock means a push is in flight; it reclaims on exit
        let state = match self.state.try_lock() {
            Some(mut guard) => guard.take(),
            None => None,
        };
        drop(state);
    }
}

/// Connection between a stage, its upstream and its own subscribers
pub(crate) struct StageLink {
    upstream: Arc<dyn AudioOutput>,
    owns_upstream: bool,
    subscription: Mutex<Option<Subscription>>,
    subject: Arc<Subject>,
}

impl StageLink {
    pub fn new(upstream: Arc<dyn AudioOutput>, owns_upstream: bool) -> Self {
        Self {
            upstream,
            owns_upstream,
            subscription: Mutex::new(None),
            subject: Subject::new(),
        }
    }

    /// Subscribe `handler` on `stage` to the upstream.
    ///
    /// The callback holds the stage weakly; ownership runs from downstream
    /// to upstream only.
    pub fn attach<S>(&self, stage: &Arc<S>, handler: fn(&S, Signal<'_>))
    where
        S: Send + Sync + 'static,
    {
        let weak = Arc::downgrade(stage);
        let observer: Observer = Arc::new(move |signal: Signal<'_>| {
            if let Some(stage) = weak.upgrade() {
                handler(&stage, signal);
            }
        });
        let subscription = self.upstream.subscribe(observer);
        *self.subscription.lock() = Some(subscription);
    }

    pub fn subject(&self) -> &Arc<Subject> {
        &self.subject
    }

    pub fn format(&self) -> AudioFormat {
        self.upstream.format()
    }

    pub fn subscribe(&self, observer: Observer) -> Subscription {
        self.subject.subscribe(observer)
    }

    /// Detach from the upstream, drop subscribers and cascade if owning
    pub fn teardown(&self) {
        let subscription = self.subscription.lock().take();
        drop(subscription);
        self.subject.close();
        if self.owns_upstream {
            self.upstream.dispose();
        }
    }
}
