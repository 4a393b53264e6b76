//! Persona + progress (§4.2): single-threaded dispatch domains and the
//! cooperative scheduling loop that drains them.
//!
//! A [`Persona`] owns two callback streams, an internal one and a user one,
//! plus a queue of deferred trivially-destructible promise completions. At
//! most one thread may have a persona active at a time; [`persona_scope`]
//! pushes it onto that thread's activation stack for the scope's lifetime.
//! The *default* persona of a thread is whatever sits at the bottom of that
//! stack — created lazily the first time the thread touches it.
//!
//! This module ties a persona's "owning thread" to thread-local activation
//! rather than implementing the source's raw xor-with-self lock encoding:
//! the observable contract (exactly one owner at a time, inline execution
//! when the caller already owns the target) is the same either way.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::future::{Future, Promise};
use crate::logging::{self, CoreEvent, PersonaEvent};
use crate::queue::{Backoff, Mpsc};
use pgas_logging::Logger;

/// Which inbox a progress call should drain.
///
/// `Internal` is always drained; `User` additionally drains the user inbox
/// and the deferred trivial-promise queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Only the internal inbox (acknowledgments, buffer releases).
    Internal,
    /// Internal plus user-submitted work.
    User,
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

static NEXT_PERSONA_ID: AtomicU64 = AtomicU64::new(0);

/// A handle to a callback stream, owned by at most one thread at a time.
pub struct Persona {
    id: u64,
    owner: std::sync::Mutex<Option<ThreadId>>,
    internal: Mpsc<Callback>,
    user: Mpsc<Callback>,
    trivial_promises: Mpsc<Callback>,
    undischarged: AtomicUsize,
}

impl Persona {
    /// Creates a new, unowned persona.
    pub fn new() -> Arc<Self> {
        Arc::new(Persona {
            id: NEXT_PERSONA_ID.fetch_add(1, Ordering::Relaxed),
            owner: std::sync::Mutex::new(None),
            internal: Mpsc::new(),
            user: Mpsc::new(),
            trivial_promises: Mpsc::new(),
            undischarged: AtomicUsize::new(0),
        })
    }

    /// This persona's process-wide identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Binds the calling thread's logger, used to report subsequent
    /// persona activations/releases on this thread (§11 ambient stack).
    ///
    /// Logging is per-thread rather than per-persona: a persona can be
    /// activated on whichever thread currently owns it, so the sink a
    /// given activation is reported to is the one installed on that
    /// activating thread, exactly like [`crate::comm::logging::install_logger`]
    /// is per-thread for the communication engine.
    pub fn set_logger(&self, logger: Logger<CoreEvent>) {
        logging::install_logger(Some(logger));
    }

    fn log_activation(&self, activated: bool) {
        logging::log(PersonaEvent { persona_id: self.id, activated });
    }

    /// True if the calling thread currently owns (has activated) this
    /// persona.
    pub fn is_current_thread_owner(&self) -> bool {
        *self.owner.lock().expect("persona owner mutex poisoned") == Some(std::thread::current().id())
    }

    /// Schedules `f` to run on this persona's owning thread and returns a
    /// future for its result.
    ///
    /// If the calling thread already owns this persona, `f` runs inline on
    /// the current stack (the "burstable" fast path); otherwise it is
    /// pushed onto the internal inbox for the owner's next [`Persona::progress`].
    pub fn lpc<R, F>(self: &Arc<Self>, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (future, promise) = Future::pending();
        self.undischarged.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        let run = move || {
            let value = f();
            promise.fulfill(value);
            this.undischarged.fetch_sub(1, Ordering::SeqCst);
        };
        if self.is_current_thread_owner() {
            run();
        } else {
            self.internal.push(Box::new(run));
        }
        future
    }

    /// Fire-and-forget scheduling: like [`Persona::lpc`] but discards the
    /// result (§12, `lpc_ff`).
    pub fn lpc_ff<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.lpc(move || f());
    }

    /// Drains this persona's inboxes for the requested level. Returns the
    /// number of callbacks executed.
    pub fn progress(self: &Arc<Self>, level: Level) -> usize {
        PROGRESSING.with(|flag| {
            if flag.get() {
                // Re-entrant progress from inside a callback: short-circuit
                // rather than recursing into the same queues.
                return 0;
            }
            flag.set(true);
            let mut count = self.internal.burst(1024, |f| f());
            if level == Level::User {
                count += self.user.burst(1024, |f| f());
                count += self.trivial_promises.burst(1024, |f| f());
            }
            flag.set(false);
            count
        })
    }

    /// Blocks (by repeatedly calling `progress(User)`) until this
    /// persona's undischarged-operation count reaches zero.
    pub fn discharge(self: &Arc<Self>) {
        let mut backoff = Backoff::new();
        while self.undischarged.load(Ordering::SeqCst) > 0 {
            let work = self.progress(Level::User);
            if !backoff.record(work) {
                std::thread::yield_now();
            }
        }
    }

    /// Increments the undischarged-operation counter; paired with a later
    /// decrement when the operation's completion fires. Used by RMA and
    /// collective call sites that aren't already routed through
    /// [`Persona::lpc`].
    pub fn begin_operation(&self) {
        self.undischarged.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements the undischarged-operation counter.
    pub fn end_operation(&self) {
        self.undischarged.fetch_sub(1, Ordering::SeqCst);
    }

    fn activate(self: &Arc<Self>) {
        let mut owner = self.owner.lock().expect("persona owner mutex poisoned");
        assert!(owner.is_none(), "persona {} already active on another thread", self.id);
        *owner = Some(std::thread::current().id());
        drop(owner);
        self.log_activation(true);
    }

    fn deactivate(self: &Arc<Self>) {
        *self.owner.lock().expect("persona owner mutex poisoned") = None;
        self.log_activation(false);
    }
}

thread_local! {
    static STACK: RefCell<Vec<Arc<Persona>>> = RefCell::new(Vec::new());
    static PROGRESSING: Cell<bool> = const { Cell::new(false) };
}

/// Returns this thread's topmost (currently active) persona, creating and
/// activating a default persona for the thread if none has been pushed yet.
pub fn current_persona() -> Arc<Persona> {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.is_empty() {
            let default = Persona::new();
            default.activate();
            stack.push(default);
        }
        stack.last().expect("just ensured non-empty").clone()
    })
}

/// A stack-ordered activation of a persona on the current thread;
/// dropping it pops the persona and re-releases ownership.
pub struct PersonaScope {
    _private: (),
}

impl Drop for PersonaScope {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let popped = stack.borrow_mut().pop().expect("persona_scope stack underflow");
            popped.deactivate();
        });
    }
}

/// Activates `persona` on the current thread for the returned scope's
/// lifetime. Scopes nest: the persona active when this call returns is the
/// new topmost one, restored to the previous one on drop.
pub fn persona_scope(persona: Arc<Persona>) -> PersonaScope {
    persona.activate();
    STACK.with(|stack| stack.borrow_mut().push(persona));
    PersonaScope { _private: () }
}
