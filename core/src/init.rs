//! Collective init/finalize lifecycle (§6): the two process-wide
//! singletons — the master persona and the shared-heap arena — plus rank
//! identity and team membership, behind a refcounted init/finalize pair.
//!
//! Everything else in this crate assumes `init()` has run on this process;
//! calling an accessor here before `init()` or after the matching
//! `finalize()` is API misuse and panics, the same discipline
//! [`crate::gptr::GlobalPtr::new`] applies to its own invariants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

use crate::config::Config;
use crate::heap::SharedHeap;
use crate::persona::Persona;
use crate::team::Team;

/// Fatal-configuration errors from [`init`] (§7 "Fatal-configuration").
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Environment configuration was malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// `init()` was called in a process that forked since an earlier
    /// `init()` ran — forbidden by §6.
    #[error("init() called after fork")]
    InitAfterFork,
    /// `finalize()` was called without a matching outstanding `init()`.
    #[error("finalize() called without a matching init()")]
    NotInitialized,
}

struct State {
    rank_me: usize,
    rank_n: usize,
    world: Team,
    local: Team,
    master_persona: Arc<Persona>,
    heap: Arc<SharedHeap>,
    config: Config,
}

static STATE: OnceLock<Mutex<Option<State>>> = OnceLock::new();
static REFCOUNT: AtomicUsize = AtomicUsize::new(0);
static CREATOR_PID: OnceLock<u32> = OnceLock::new();

fn state_cell() -> &'static Mutex<Option<State>> {
    STATE.get_or_init(|| Mutex::new(None))
}

/// True between a matching `init()`/`finalize()` pair (at any nesting
/// depth) in this process.
pub fn initialized() -> bool {
    REFCOUNT.load(Ordering::SeqCst) > 0
}

/// Collective process-wide setup (§6). Reads environment configuration
/// (§11), builds this rank's shared heap and master persona, and records
/// rank/team identity.
///
/// Refcounted: nested `init()`/`finalize()` pairs are permitted and only
/// the outermost pair actually allocates or tears down state — callers
/// one level removed from the top of the call stack can freely call
/// `init()`/`finalize()` around their own scope of use without
/// disturbing an already-running runtime.
pub fn init(rank_me: usize, rank_n: usize) -> Result<(), RuntimeError> {
    let pid = std::process::id();
    let creator = *CREATOR_PID.get_or_init(|| pid);
    if pid != creator {
        return Err(RuntimeError::InitAfterFork);
    }

    if REFCOUNT.fetch_add(1, Ordering::SeqCst) == 0 {
        let config = match Config::from_env(rank_n) {
            Ok(config) => config,
            Err(message) => {
                REFCOUNT.store(0, Ordering::SeqCst);
                return Err(RuntimeError::Config(message));
            }
        };
        let heap = Arc::new(SharedHeap::new(rank_me, config.shared_heap_size));
        let master_persona = Persona::new();
        let world = Team::world(rank_n);
        let local = Team::local(rank_n);
        *state_cell().lock().expect("init state mutex poisoned") =
            Some(State { rank_me, rank_n, world, local, master_persona, heap, config });
    }
    Ok(())
}

/// Collective teardown (§6), the mirror of [`init`]. The innermost
/// `finalize()` of a nested pair only decrements the refcount; the
/// outermost tears down the process-wide state.
///
/// Per §7 ("Quiescence violation"), finalizing with outstanding
/// rendezvous buffers is undefined behavior upstream; this just
/// proceeds best-effort rather than fabricating a diagnostic with no
/// real transport to source it from.
pub fn finalize() -> Result<(), RuntimeError> {
    match REFCOUNT.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(1) => {
            *state_cell().lock().expect("init state mutex poisoned") = None;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(_) => Err(RuntimeError::NotInitialized),
    }
}

fn with_state<R>(f: impl FnOnce(&State) -> R) -> R {
    let guard = state_cell().lock().expect("init state mutex poisoned");
    let state = guard.as_ref().expect("pgas::init() must be called before using the runtime");
    f(state)
}

/// This process's rank index. Panics if the runtime isn't initialized.
pub fn rank_me() -> usize {
    with_state(|s| s.rank_me)
}

/// The job's rank count. Panics if the runtime isn't initialized.
pub fn rank_n() -> usize {
    with_state(|s| s.rank_n)
}

/// The world team. Panics if the runtime isn't initialized.
pub fn world_team() -> Team {
    with_state(|s| s.world.clone())
}

/// This rank's local team (§12 supplement). Panics if the runtime isn't
/// initialized.
pub fn local_team() -> Team {
    with_state(|s| s.local.clone())
}

/// The process-wide master persona. Panics if the runtime isn't
/// initialized.
pub fn master_persona() -> Arc<Persona> {
    with_state(|s| s.master_persona.clone())
}

/// The process-wide shared-heap arena. Panics if the runtime isn't
/// initialized.
pub fn shared_heap() -> Arc<SharedHeap> {
    with_state(|s| s.heap.clone())
}

/// The configuration `init()` parsed from the environment. Panics if
/// the runtime isn't initialized.
pub fn config() -> Config {
    with_state(|s| s.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // init()/finalize() touch process-wide statics; serialize the tests
    // that exercise them so they don't observe each other's state.
    static SERIAL: StdMutex<()> = StdMutex::new(());

    #[test]
    fn init_and_finalize_are_refcounted() {
        let _guard = SERIAL.lock().unwrap();
        assert!(!initialized());
        init(0, 1).unwrap();
        assert!(initialized());
        init(0, 1).unwrap(); // nested
        assert!(initialized());
        finalize().unwrap();
        assert!(initialized(), "inner finalize must not tear down the outer init");
        finalize().unwrap();
        assert!(!initialized());
    }

    #[test]
    fn accessors_reflect_the_rank_init_was_called_with() {
        let _guard = SERIAL.lock().unwrap();
        init(2, 4).unwrap();
        assert_eq!(rank_me(), 2);
        assert_eq!(rank_n(), 4);
        assert_eq!(world_team().len(), 4);
        assert_eq!(local_team().len(), 4);
        let _ = master_persona();
        let _ = shared_heap();
        finalize().unwrap();
    }

    #[test]
    fn finalize_without_init_is_an_error() {
        let _guard = SERIAL.lock().unwrap();
        assert!(!initialized());
        assert!(matches!(finalize(), Err(RuntimeError::NotInitialized)));
    }
}
