//! Common buffering logging infrastructure, shared by the `communication` and
//! `core` crates.
//!
//! A [`Registry`] binds names (`"comm"`, `"persona"`, `"rma"`, ...) to typed
//! [`Logger`]s. Nobody is required to register anything: an unregistered
//! logger is still obtainable but its `log` calls are buffered and dropped
//! once the buffer fills, so logging never gates correctness or, absent a
//! registered sink, costs more than a buffer push.

#![forbid(missing_docs)]

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Binds names to type-erased loggers.
///
/// One `Registry` exists per thread (it is not `Send`: loggers are meant to
/// be cheap thread-local buffers, not a cross-thread broadcast channel).
pub struct Registry {
    time: Instant,
    map: HashMap<String, Box<dyn Any>>,
}

impl Registry {
    /// Creates a new, empty registry anchored at `time`.
    pub fn new(time: Instant) -> Self {
        Registry { time, map: HashMap::new() }
    }

    /// Binds `name` to an action invoked on log event batches.
    ///
    /// Returns any previously-installed action under the same name. Existing
    /// clones of the old `Logger<T>` keep writing to the old action; only
    /// newly-`get` loggers observe the new one.
    pub fn insert<T: 'static>(
        &mut self,
        name: impl Into<String>,
        action: Box<dyn Fn(&Duration, &[(Duration, T)])>,
    ) -> Option<Box<dyn Any>> {
        let logger = Logger::<T>::new(self.time, action);
        self.map.insert(name.into(), Box::new(logger))
    }

    /// Removes a bound logger, signalling end-of-stream to its consumer.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Any>> {
        self.map.remove(name)
    }

    /// Retrieves a shared handle to a bound logger, if one exists under `name`.
    pub fn get<T: 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Logger<T>>())
            .cloned()
    }
}

/// A cheap, cloneable, buffering logger bound to one destination.
pub struct Logger<T> {
    time: Instant,
    action: Rc<dyn Fn(&Duration, &[(Duration, T)])>,
    buffer: Rc<RefCell<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger { time: self.time, action: self.action.clone(), buffer: self.buffer.clone() }
    }
}

impl<T> Logger<T> {
    /// Allocates a new logger bound to `action`.
    pub fn new(time: Instant, action: Box<dyn Fn(&Duration, &[(Duration, T)])>) -> Self {
        Logger { time, action: Rc::from(action), buffer: Rc::new(RefCell::new(Vec::with_capacity(1024))) }
    }

    /// Logs `event`, timestamped at the moment of the call.
    ///
    /// The action only runs once the buffer fills (1024 events) or `flush`
    /// is called explicitly; events within one logger always arrive at the
    /// action with non-decreasing timestamps.
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes any buffered events to the action.
    pub fn flush(&self) {
        let mut buffer = self.buffer.borrow_mut();
        if !buffer.is_empty() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }
}
