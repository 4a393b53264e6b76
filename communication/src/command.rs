//! The command buffer an RPC is packaged into (§4.7).
//!
//! Every active message names its handler indirectly, by the index of a
//! statically-registered executor rather than a raw function pointer — raw
//! pointers aren't comparable across ranks once ASLR is in the picture.
//! Instead, every rank runs the same sequence of [`register`] calls at
//! startup (typically via `inventory`-style static registration at binding
//! sites, here simplified to an explicit call at each binding point), so
//! index N names the same executor everywhere.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use pgas_serialize::Reader;

/// What the receiver should do with a command's buffer once its executor returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// The buffer was allocated for this command alone; free it.
    FreeBuffer,
    /// The buffer is shared with an in-flight rendezvous pull; leave it to
    /// that path's own bookkeeping.
    Rendezvous,
    /// The buffer is borrowed and must not be freed or reused by this command.
    Restricted,
}

/// A registered handler: deserializes its argument bytes and runs the
/// underlying callable. Type-erased so heterogeneous commands can share one
/// executor table.
pub type Executor = fn(&mut Reader<'_>);

/// The link-time-stable executor table.
///
/// Keyed by insertion order rather than `TypeId`, so long as every rank
/// calls [`register`] in the same order during startup — true for an SPMD
/// program where every rank runs the same binding-site code.
static TABLE: OnceLock<Mutex<Vec<Executor>>> = OnceLock::new();

fn table() -> &'static Mutex<Vec<Executor>> {
    TABLE.get_or_init(|| Mutex::new(Vec::new()))
}

/// Registers `executor`, returning the stable index future commands will
/// reference it by.
///
/// # Panics
///
/// Does not itself panic, but a program that registers executors in a
/// rank-dependent order will silently corrupt dispatch on other ranks: this
/// is a correctness requirement on the caller, not something this function
/// can check.
pub fn register(executor: Executor) -> usize {
    let mut table = table().lock().expect("executor table poisoned");
    table.push(executor);
    table.len() - 1
}

/// Looks up a previously-registered executor by index.
pub fn lookup(index: usize) -> Option<Executor> {
    table().lock().expect("executor table poisoned").get(index).copied()
}

/// A name-keyed variant of [`register`]/[`lookup`] for call sites that
/// would rather not depend on registration order — handy in tests, where
/// multiple test functions register executors in a nondeterministic order.
static NAMED: OnceLock<Mutex<HashMap<&'static str, Executor>>> = OnceLock::new();

fn named_table() -> &'static Mutex<HashMap<&'static str, Executor>> {
    NAMED.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers `executor` under `name`.
pub fn register_named(name: &'static str, executor: Executor) {
    named_table().lock().expect("named executor table poisoned").insert(name, executor);
}

/// Looks up an executor registered via [`register_named`].
pub fn lookup_named(name: &str) -> Option<Executor> {
    named_table().lock().expect("named executor table poisoned").get(name).copied()
}

/// A command as it sits in a wire buffer: an executor index, a cleanup
/// selector, and the argument bytes the executor will deserialize.
pub struct Command {
    /// Index into the executor table.
    pub executor: usize,
    /// What to do with the buffer after the executor runs.
    pub cleanup: Cleanup,
    /// Serialized argument bytes.
    pub args: Vec<u8>,
}

impl Command {
    /// Packages `args` (already serialized) behind `executor`.
    pub fn new(executor: usize, cleanup: Cleanup, args: Vec<u8>) -> Self {
        Command { executor, cleanup, args }
    }

    /// Runs this command's executor against its own argument bytes.
    ///
    /// # Panics
    ///
    /// Panics if `executor` was never registered — this indicates the
    /// sender and receiver ranks disagree about the executor table, which
    /// is a program bug, not a recoverable runtime condition.
    pub fn dispatch(&self) {
        let executor = lookup(self.executor).expect("dispatched command names an unregistered executor");
        let mut reader = Reader::new(&self.args);
        executor(&mut reader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEEN: AtomicU32 = AtomicU32::new(0);

    fn bump(reader: &mut Reader<'_>) {
        use pgas_serialize::Serializable;
        let value = u32::deserialize(reader).expect("well-formed u32 argument");
        SEEN.store(value, Ordering::SeqCst);
    }

    #[test]
    fn register_then_dispatch_runs_the_executor() {
        use pgas_serialize::to_bytes;
        let index = register(bump);
        let command = Command::new(index, Cleanup::FreeBuffer, to_bytes(&7u32));
        command.dispatch();
        assert_eq!(SEEN.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn lookup_named_roundtrips() {
        register_named("command::tests::bump", bump);
        assert!(lookup_named("command::tests::bump").is_some());
        assert!(lookup_named("does-not-exist").is_none());
    }
}
