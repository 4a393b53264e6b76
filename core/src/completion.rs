//! Completion bundles (§3, §4.9): the user-selected notification channels
//! an RMA or RPC operation can fire into, keyed by which event triggers
//! them.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use crate::future::{Future, Promise};
use crate::persona::Persona;

/// Which stage of an operation's lifecycle a completion action reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    /// The source buffer may be reused or freed.
    Source,
    /// The operation is globally observable (e.g. an atomic has taken
    /// effect).
    Operation,
    /// The target rank's handler has finished running.
    Remote,
}

/// One user-selected action, bound to fire on a particular
/// [`CompletionEvent`].
pub enum Completion<T> {
    /// Fulfill a future the caller will poll or `wait()` on.
    Future(Promise<T>),
    /// Fulfill a promise supplied by the caller.
    Promise(Promise<T>),
    /// Schedule a fire-and-forget callback on a persona.
    Lpc(Arc<Persona>, Box<dyn FnOnce(T) + Send>),
    /// Send a remote procedure call carrying the value onward.
    Rpc(Box<dyn FnOnce(T) + Send>),
    /// Store the value for synchronous retrieval after the call returns.
    Buffered(Arc<Mutex<Option<T>>>),
    /// Block the caller until this event fires.
    Blocking(SyncSender<T>),
}

/// A compile-time-typed (here: run-time-typed, for simplicity) tuple of
/// completion actions, each reacting to one [`CompletionEvent`].
#[derive(Default)]
pub struct CompletionBundle<T> {
    actions: Vec<(CompletionEvent, Completion<T>)>,
}

impl<T: Clone + Send + 'static> CompletionBundle<T> {
    /// An empty bundle.
    pub fn new() -> Self {
        CompletionBundle { actions: Vec::new() }
    }

    /// Adds an action bound to `event`.
    pub fn on(mut self, event: CompletionEvent, action: Completion<T>) -> Self {
        self.actions.push((event, action));
        self
    }

    /// Convenience: returns a future alongside a bundle that fulfills it on
    /// `event`.
    pub fn with_future(event: CompletionEvent) -> (Self, Future<T>) {
        let (future, promise) = Future::pending();
        (CompletionBundle::new().on(event, Completion::Future(promise)), future)
    }

    /// Convenience: returns a blocking receiver alongside a bundle that
    /// signals it on `event`, for a caller that wants to block until done.
    pub fn with_blocking(event: CompletionEvent) -> (Self, Receiver<T>) {
        let (tx, rx) = sync_channel(1);
        (CompletionBundle::new().on(event, Completion::Blocking(tx)), rx)
    }

    /// Fires every action bound to `event` with `value`.
    pub fn fire(&mut self, event: CompletionEvent, value: T) {
        let mut remaining = Vec::with_capacity(self.actions.len());
        for (bound_event, action) in self.actions.drain(..) {
            if bound_event != event {
                remaining.push((bound_event, action));
                continue;
            }
            match action {
                Completion::Future(promise) | Completion::Promise(promise) => promise.fulfill(value.clone()),
                Completion::Lpc(persona, f) => {
                    let value = value.clone();
                    persona.lpc_ff(move || f(value));
                }
                Completion::Rpc(f) => f(value.clone()),
                Completion::Buffered(slot) => *slot.lock().expect("buffered completion mutex poisoned") = Some(value.clone()),
                Completion::Blocking(tx) => {
                    let _ = tx.send(value.clone());
                }
            }
        }
        self.actions = remaining;
    }
}
