//! Events logged by the RPC engine, bound through [`pgas_logging`].

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use pgas_logging::Logger;

thread_local! {
    static LOGGER: RefCell<Option<Logger<CommEvent>>> = const { RefCell::new(None) };
}

/// Binds (or clears, passing `None`) the logger that [`log`] reports
/// comm-engine events to on the calling thread.
///
/// Thread-local rather than an [`crate::rpc::Engine`] field: a `Logger`
/// is `Rc`-backed and not `Send`, and `Engine` is moved whole into a
/// worker thread by [`crate::initialize::initialize_from`] — storing
/// one as a field would make `Engine` itself `!Send`.
pub fn install_logger(logger: Option<Logger<CommEvent>>) {
    LOGGER.with(|cell| *cell.borrow_mut() = logger);
}

pub(crate) fn log(event: impl Into<CommEvent>) {
    LOGGER.with(|cell| {
        if let Some(logger) = &*cell.borrow() {
            logger.log(event.into());
        }
    });
}

/// Which rank and role a communication-logging thread belongs to.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct CommSetup {
    /// This rank's index.
    pub rank: usize,
    /// The peer rank this event concerns, if any.
    pub remote: Option<usize>,
}

/// A single RPC-engine event.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum CommEvent {
    /// A command was handed to the engine for a remote rank.
    Sent(SentEvent),
    /// A command arrived and was handed off to a dispatch point.
    Received(ReceivedEvent),
    /// A rendezvous handshake advanced by one step.
    Rendezvous(RendezvousEvent),
    /// A long-partitioned command part was reassembled.
    Partition(PartitionEvent),
    /// A reply-completion callback fired on the initiator.
    Reply(ReplyEvent),
}

/// A command sent to a peer.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct SentEvent {
    /// Destination rank.
    pub dest: usize,
    /// Encoded command length in bytes.
    pub len: usize,
    /// True if the rendezvous protocol was used instead of eager.
    pub rendezvous: bool,
}

/// A command received from a peer.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct ReceivedEvent {
    /// Encoded command length in bytes.
    pub len: usize,
}

/// One step of a rendezvous handshake (announce, pull, payload, or release).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct RendezvousEvent {
    /// The handle identifying the staged buffer.
    pub handle: u64,
    /// Which step of the handshake this is.
    pub step: RendezvousStep,
}

/// The four steps of a rendezvous transfer.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum RendezvousStep {
    /// The sender announced a staged buffer.
    Announce,
    /// The receiver requested the buffer.
    Pull,
    /// The sender delivered the buffer.
    Payload,
    /// The receiver released the buffer.
    Release,
}

/// One command part of a long-partitioned transfer arriving at the
/// `(sender, nonce)`-keyed reassembly table.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct PartitionEvent {
    /// The sending rank.
    pub sender: usize,
    /// The reassembly nonce this part belongs to.
    pub nonce: u64,
    /// Bytes credited to the reassembly buffer so far, after this part.
    pub credited: usize,
    /// Total command length being reassembled.
    pub total: usize,
    /// True once this part completed the reassembly (command and payload
    /// both present) and the command was handed off for dispatch.
    pub complete: bool,
}

/// A reply-completion callback invoked on the initiator of a
/// long-with-payload operation that requested one.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct ReplyEvent {
    /// The opaque reply token the initiator embedded in its send.
    pub token: u64,
}

impl From<SentEvent> for CommEvent {
    fn from(v: SentEvent) -> Self {
        CommEvent::Sent(v)
    }
}
impl From<ReceivedEvent> for CommEvent {
    fn from(v: ReceivedEvent) -> Self {
        CommEvent::Received(v)
    }
}
impl From<RendezvousEvent> for CommEvent {
    fn from(v: RendezvousEvent) -> Self {
        CommEvent::Rendezvous(v)
    }
}
impl From<PartitionEvent> for CommEvent {
    fn from(v: PartitionEvent) -> Self {
        CommEvent::Partition(v)
    }
}
impl From<ReplyEvent> for CommEvent {
    fn from(v: ReplyEvent) -> Self {
        CommEvent::Reply(v)
    }
}
