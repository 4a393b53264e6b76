//! Events logged by the asynchrony core, bound through [`pgas_logging`]
//! the way [`crate::comm::logging`] binds RPC-engine events — same
//! `Registry`/`Logger` facility, different event alphabet.
//!
//! Nothing in this crate's correctness depends on a sink being registered:
//! an unregistered `"core"` logger just buffers and drops, exactly as
//! documented on [`pgas_logging::Registry`].

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use pgas_logging::Logger;

thread_local! {
    static LOGGER: RefCell<Option<Logger<CoreEvent>>> = const { RefCell::new(None) };
}

/// Binds (or clears, passing `None`) the logger that [`log`] reports
/// core events to on the calling thread.
///
/// Deliberately thread-local rather than a [`crate::persona::Persona`]
/// field: a `Logger` is `Rc`-backed and not `Send`, so storing one in a
/// struct that crosses threads (personas are shared via `Arc` and moved
/// into worker threads) would poison the whole struct's auto traits.
pub fn install_logger(logger: Option<Logger<CoreEvent>>) {
    LOGGER.with(|cell| *cell.borrow_mut() = logger);
}

pub(crate) fn log(event: impl Into<CoreEvent>) {
    LOGGER.with(|cell| {
        if let Some(logger) = &*cell.borrow() {
            logger.log(event.into());
        }
    });
}

/// A single asynchrony-core event, logged under the `"core"` stream name.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum CoreEvent {
    /// A persona was activated on (or released by) a thread.
    Persona(PersonaEvent),
    /// An RMA operation was issued or reached one of its completion events.
    Rma(RmaEvent),
    /// A collective operation changed phase.
    Collective(CollectiveEvent),
    /// The shared-heap allocator could not satisfy a user allocation.
    LowFootprint(LowFootprintEvent),
}

/// Activation/release of a persona on a thread (§4.2).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct PersonaEvent {
    /// The persona's process-wide id.
    pub persona_id: u64,
    /// True on activation, false on release.
    pub activated: bool,
}

/// One stage of an RMA operation's lifecycle (§4.9).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct RmaEvent {
    /// The target rank.
    pub target: usize,
    /// Payload size in bytes.
    pub len: usize,
    /// Which stage this event marks.
    pub stage: RmaStage,
}

/// The stages of an RMA operation's lifecycle (mirrors
/// [`crate::completion::CompletionEvent`] plus an issue marker; kept
/// separate so a log consumer need not depend on the completion module's
/// types).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum RmaStage {
    /// The operation was issued.
    Issued,
    /// Source completion fired.
    Source,
    /// Operation completion fired.
    Operation,
    /// Remote completion fired.
    Remote,
}

/// A phase transition of a collective operation (§4.12).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct CollectiveEvent {
    /// Which kind of collective this is.
    pub kind: CollectiveKind,
    /// True when the phase is the collective's completion, false on entry.
    pub finished: bool,
}

/// Which collective a [`CollectiveEvent`] concerns.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum CollectiveKind {
    /// A barrier.
    Barrier,
    /// A reduction, trivial or tree-based.
    Reduce,
    /// A broadcast.
    Broadcast,
}

/// The shared-heap allocator could not satisfy a user allocation (§7,
/// "Allocation failure (user path only)").
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct LowFootprintEvent {
    /// Requested size in bytes.
    pub requested: usize,
}

impl From<PersonaEvent> for CoreEvent {
    fn from(v: PersonaEvent) -> Self {
        CoreEvent::Persona(v)
    }
}
impl From<RmaEvent> for CoreEvent {
    fn from(v: RmaEvent) -> Self {
        CoreEvent::Rma(v)
    }
}
impl From<CollectiveEvent> for CoreEvent {
    fn from(v: CollectiveEvent) -> Self {
        CoreEvent::Collective(v)
    }
}
impl From<LowFootprintEvent> for CoreEvent {
    fn from(v: LowFootprintEvent) -> Self {
        CoreEvent::LowFootprint(v)
    }
}
