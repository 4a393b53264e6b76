//! The RPC send engine (§4.8): protocol selection, the rendezvous
//! handshake, and broadcast trees.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{ByteOrder, LittleEndian};

use crate::command::Command;
use crate::logging::{self, CommEvent, PartitionEvent, ReceivedEvent, RendezvousEvent, RendezvousStep, ReplyEvent, SentEvent};
use crate::transport::{Bytes, Transport};
use pgas_logging::Logger;

/// The transport's maximum medium-AM size, used to pick a rendezvous
/// threshold. The three landing-zone sizes named in the operation's
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingZone {
    /// 256-byte landing zone.
    Small,
    /// 512-byte landing zone.
    Medium,
    /// 1024-byte landing zone.
    Large,
}

impl LandingZone {
    /// The rendezvous threshold in bytes for this landing zone.
    pub fn threshold(self) -> usize {
        match self {
            LandingZone::Small => 256,
            LandingZone::Medium => 512,
            LandingZone::Large => 1024,
        }
    }
}

/// Which of the three wire protocols a command should travel by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// The whole serialized command fits in a single AM.
    EagerMedium,
    /// The command is announced, then pulled, then released.
    Rendezvous,
    /// The command travels with a user payload attached via RDMA put.
    LongWithPayload,
}

/// Picks a protocol for a command of `command_len` bytes carrying an
/// optional `payload_len`-byte user payload, against `zone`'s threshold.
pub fn choose_protocol(command_len: usize, payload_len: usize, zone: LandingZone) -> Protocol {
    if payload_len > 0 {
        Protocol::LongWithPayload
    } else if command_len <= zone.threshold() {
        Protocol::EagerMedium
    } else {
        Protocol::Rendezvous
    }
}

/// Where a delivered command should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Runs immediately in the AM handler; must be trivial, must not suspend.
    Restricted,
    /// Enqueues onto the master persona's inbox.
    Master,
    /// Enqueues onto an explicit persona, identified by an opaque handle.
    ///
    /// The low bit set means "dereference this handle as a pointer to a
    /// persona in the target's memory", mirroring dormant-promise wake-ups;
    /// this type only carries the handle; interpreting the low bit is the
    /// receiver's job.
    Persona(u64),
}

const TAG_EAGER: u8 = 0;
const TAG_RENDEZVOUS_ANNOUNCE: u8 = 1;
const TAG_RENDEZVOUS_PULL: u8 = 2;
const TAG_RENDEZVOUS_PAYLOAD: u8 = 3;
const TAG_RENDEZVOUS_RELEASE: u8 = 4;
const TAG_LONG_PACKED: u8 = 5;
const TAG_LONG_PAYLOAD_PART: u8 = 6;
const TAG_LONG_CMD_PART: u8 = 7;
const TAG_REPLY: u8 = 8;

/// How many bytes of a serialized command fit in the packed long-with-
/// payload form's AM argument slots before the partitioned form (§4.8,
/// point 3b) is needed instead.
const LONG_CMD_ARG_CAPACITY: usize = 96;

/// Command bytes carried per partitioned-form AM part.
const LONG_CMD_PART_CHUNK: usize = 64;

fn write_reply_token(out: &mut Vec<u8>, reply_token: Option<u64>) {
    match reply_token {
        Some(token) => {
            out.push(1);
            write_u64_field(out, token);
        }
        None => out.push(0),
    }
}

fn read_reply_token(bytes: &[u8], offset: &mut usize) -> Option<u64> {
    let present = bytes[*offset];
    *offset += 1;
    if present == 1 {
        Some(read_u64_field(bytes, offset))
    } else {
        None
    }
}

/// A long-partitioned command's in-progress reassembly, keyed by
/// `(sender, nonce)`: command bytes are credited in as their parts
/// arrive, independently of the single payload-part message.
struct PartialLong {
    dispatch: Dispatch,
    reply_token: Option<u64>,
    total_len: usize,
    command_buf: Vec<u8>,
    credited: usize,
    filled: Vec<bool>,
    payload: Option<Vec<u8>>,
}

impl PartialLong {
    fn new(dispatch: Dispatch, reply_token: Option<u64>, total_len: usize) -> PartialLong {
        PartialLong { dispatch, reply_token, total_len, command_buf: vec![0u8; total_len], credited: 0, filled: vec![false; total_len], payload: None }
    }

    fn credit_chunk(&mut self, offset: usize, chunk: &[u8]) {
        self.command_buf[offset..offset + chunk.len()].copy_from_slice(chunk);
        for slot in &mut self.filled[offset..offset + chunk.len()] {
            if !*slot {
                *slot = true;
                self.credited += 1;
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.credited == self.total_len && self.payload.is_some()
    }
}

fn write_envelope_header(tag: u8, dispatch: Dispatch, out: &mut Vec<u8>) {
    out.push(tag);
    match dispatch {
        Dispatch::Restricted => out.push(0),
        Dispatch::Master => out.push(1),
        Dispatch::Persona(handle) => {
            out.push(2);
            let mut buf = [0u8; 8];
            LittleEndian::write_u64(&mut buf, handle);
            out.extend_from_slice(&buf);
        }
    }
}

fn write_u64_field(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn read_u64_field(bytes: &[u8], offset: &mut usize) -> u64 {
    let value = LittleEndian::read_u64(&bytes[*offset..*offset + 8]);
    *offset += 8;
    value
}

fn read_dispatch(bytes: &[u8], offset: &mut usize) -> Dispatch {
    let kind = bytes[*offset];
    *offset += 1;
    match kind {
        0 => Dispatch::Restricted,
        1 => Dispatch::Master,
        2 => {
            let handle = LittleEndian::read_u64(&bytes[*offset..*offset + 8]);
            *offset += 8;
            Dispatch::Persona(handle)
        }
        other => panic!("unrecognized dispatch tag {other}"),
    }
}

fn encode_command(command: &Command) -> Vec<u8> {
    let mut out = Vec::with_capacity(command.args.len() + 16);
    let mut header = [0u8; 16];
    LittleEndian::write_u64(&mut header[0..8], command.executor as u64);
    header[8] = match command.cleanup {
        crate::command::Cleanup::FreeBuffer => 0,
        crate::command::Cleanup::Rendezvous => 1,
        crate::command::Cleanup::Restricted => 2,
    };
    out.extend_from_slice(&header);
    out.extend_from_slice(&command.args);
    out
}

fn decode_command(bytes: &[u8]) -> Command {
    let executor = LittleEndian::read_u64(&bytes[0..8]) as usize;
    let cleanup = match bytes[8] {
        0 => crate::command::Cleanup::FreeBuffer,
        1 => crate::command::Cleanup::Rendezvous,
        2 => crate::command::Cleanup::Restricted,
        other => panic!("unrecognized cleanup tag {other}"),
    };
    Command::new(executor, cleanup, bytes[16..].to_vec())
}

/// A command delivered to this rank, paired with where it should run.
pub struct Delivery {
    /// Where the command should be dispatched.
    pub dispatch: Dispatch,
    /// The delivered command.
    pub command: Command,
}

/// Drives the wire protocols over a [`Transport`]: eager sends go straight
/// through, rendezvous sends are staged here until pulled and released.
pub struct Engine<T: Transport> {
    transport: T,
    zone: LandingZone,
    next_handle: AtomicU64,
    next_nonce: AtomicU64,
    staged: HashMap<u64, (Bytes, Dispatch)>,
    reassembly: HashMap<(usize, u64), PartialLong>,
    completed_replies: Vec<u64>,
}

impl<T: Transport> Engine<T> {
    /// Wraps a transport, using `zone` to pick the rendezvous threshold.
    pub fn new(transport: T, zone: LandingZone) -> Self {
        Engine {
            transport,
            zone,
            next_handle: AtomicU64::new(0),
            next_nonce: AtomicU64::new(0),
            staged: HashMap::new(),
            reassembly: HashMap::new(),
            completed_replies: Vec::new(),
        }
    }

    /// Binds the calling thread's logger, reported to by every
    /// subsequent send/receive/rendezvous-step event this engine logs
    /// from that thread (§11 ambient stack: "AM issue/receive").
    /// Without one installed, [`crate::logging::log`] is a no-op —
    /// logging is never on this engine's hot-path cost unless a caller
    /// opts in.
    pub fn with_logger(self, logger: Logger<CommEvent>) -> Self {
        logging::install_logger(Some(logger));
        self
    }

    /// This rank's index.
    pub fn rank(&self) -> usize {
        self.transport.rank()
    }

    /// The number of ranks in the job.
    pub fn peers(&self) -> usize {
        self.transport.peers()
    }

    /// Sends `command` to `dest`, choosing eager or rendezvous automatically
    /// from its encoded size against the landing zone's threshold.
    pub fn send(&mut self, dest: usize, dispatch: Dispatch, command: Command) {
        let encoded = encode_command(&command);
        match choose_protocol(encoded.len(), 0, self.zone) {
            Protocol::EagerMedium => {
                let mut out = Vec::with_capacity(encoded.len() + 10);
                write_envelope_header(TAG_EAGER, dispatch, &mut out);
                out.extend_from_slice(&encoded);
                logging::log(SentEvent { dest, len: encoded.len(), rendezvous: false });
                self.transport.send(dest, Bytes::from(out));
            }
            Protocol::Rendezvous => {
                let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
                self.staged.insert(handle, (Bytes::from(encoded.clone()), dispatch));
                let mut out = Vec::with_capacity(26);
                write_envelope_header(TAG_RENDEZVOUS_ANNOUNCE, Dispatch::Restricted, &mut out);
                write_u64_field(&mut out, handle);
                write_u64_field(&mut out, encoded.len() as u64);
                write_u64_field(&mut out, self.rank() as u64);
                logging::log(SentEvent { dest, len: encoded.len(), rendezvous: true });
                logging::log(RendezvousEvent { handle, step: RendezvousStep::Announce });
                self.transport.send(dest, Bytes::from(out));
            }
            Protocol::LongWithPayload => unreachable!("choose_protocol only returns this with a nonzero payload_len"),
        }
    }

    /// Sends an attached user payload together with a command in one
    /// long-with-payload operation (§4.8, point 3): packed when the
    /// encoded command fits an AM's argument slots, partitioned
    /// (command split across several parts, reassembled at the
    /// receiver) when it doesn't.
    pub fn send_with_payload(&mut self, dest: usize, dispatch: Dispatch, command: Command, payload: &[u8]) {
        self.send_with_payload_impl(dest, dispatch, command, payload, None);
    }

    /// As [`Engine::send_with_payload`], but embeds `reply_token` in the
    /// AM so the receiver sends a short reply back once the command is
    /// reassembled and delivered — the initiator collects it from
    /// [`Engine::take_completed_replies`]. `reply_token` is opaque to
    /// this engine, mirroring [`Dispatch::Persona`]'s low-bit-tagged
    /// handle: interpreting it is the caller's job.
    pub fn send_with_payload_and_reply(&mut self, dest: usize, dispatch: Dispatch, command: Command, payload: &[u8], reply_token: u64) {
        self.send_with_payload_impl(dest, dispatch, command, payload, Some(reply_token));
    }

    fn send_with_payload_impl(&mut self, dest: usize, dispatch: Dispatch, command: Command, payload: &[u8], reply_token: Option<u64>) {
        let encoded = encode_command(&command);
        if encoded.len() <= LONG_CMD_ARG_CAPACITY {
            let mut out = Vec::with_capacity(encoded.len() + payload.len() + 27);
            write_envelope_header(TAG_LONG_PACKED, dispatch, &mut out);
            write_u64_field(&mut out, self.rank() as u64);
            write_reply_token(&mut out, reply_token);
            write_u64_field(&mut out, payload.len() as u64);
            out.extend_from_slice(payload);
            out.extend_from_slice(&encoded);
            self.transport.send(dest, Bytes::from(out));
        } else {
            self.send_long_partitioned(dest, dispatch, &encoded, payload, reply_token);
        }
    }

    fn send_long_partitioned(&mut self, dest: usize, dispatch: Dispatch, encoded: &[u8], payload: &[u8], reply_token: Option<u64>) {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let sender = self.rank() as u64;

        let mut payload_msg = Vec::with_capacity(payload.len() + 26);
        write_envelope_header(TAG_LONG_PAYLOAD_PART, Dispatch::Restricted, &mut payload_msg);
        write_u64_field(&mut payload_msg, nonce);
        write_u64_field(&mut payload_msg, sender);
        payload_msg.extend_from_slice(payload);
        self.transport.send(dest, Bytes::from(payload_msg));

        for (index, chunk) in encoded.chunks(LONG_CMD_PART_CHUNK).enumerate() {
            let part_offset = index * LONG_CMD_PART_CHUNK;
            let mut out = Vec::with_capacity(chunk.len() + 36);
            write_envelope_header(TAG_LONG_CMD_PART, dispatch, &mut out);
            write_u64_field(&mut out, nonce);
            write_u64_field(&mut out, sender);
            write_u64_field(&mut out, encoded.len() as u64);
            write_u64_field(&mut out, part_offset as u64);
            write_reply_token(&mut out, reply_token);
            out.extend_from_slice(chunk);
            self.transport.send(dest, Bytes::from(out));
        }
    }

    /// Drains reply-completion tokens that arrived since the last call —
    /// one per [`Engine::send_with_payload_and_reply`] whose command was
    /// fully reassembled and delivered at the destination.
    pub fn take_completed_replies(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.completed_replies)
    }

    /// Drains arrived messages, servicing rendezvous handshakes, long-
    /// partitioned reassembly, and reply-completions internally, and
    /// returning only commands ready for the caller to dispatch.
    pub fn poll(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        for bytes in self.transport.try_recv() {
            self.handle_envelope(&bytes, &mut out);
        }
        out
    }

    fn handle_envelope(&mut self, bytes: &[u8], out: &mut Vec<Delivery>) {
        let mut offset = 1;
        let tag = bytes[0];
        let dispatch = read_dispatch(bytes, &mut offset);
        match tag {
            TAG_EAGER => {
                logging::log(ReceivedEvent { len: bytes.len() - offset });
                out.push(Delivery { dispatch, command: decode_command(&bytes[offset..]) });
            }
            TAG_LONG_PACKED => {
                let sender = read_u64_field(bytes, &mut offset) as usize;
                let reply_token = read_reply_token(bytes, &mut offset);
                let payload_len = read_u64_field(bytes, &mut offset) as usize;
                let _payload = &bytes[offset..offset + payload_len];
                offset += payload_len;
                logging::log(ReceivedEvent { len: bytes.len() - offset });
                out.push(Delivery { dispatch, command: decode_command(&bytes[offset..]) });
                if let Some(token) = reply_token {
                    self.send_reply(sender, token);
                }
            }
            TAG_LONG_PAYLOAD_PART => {
                let nonce = read_u64_field(bytes, &mut offset);
                let sender = read_u64_field(bytes, &mut offset) as usize;
                let payload = bytes[offset..].to_vec();
                let key = (sender, nonce);
                let ready = match self.reassembly.get_mut(&key) {
                    Some(partial) => {
                        partial.payload = Some(payload);
                        partial.is_complete()
                    }
                    None => {
                        // Command parts haven't arrived yet; stash the
                        // payload under a placeholder entry with an
                        // unknown total length until the first command
                        // part registers one.
                        self.reassembly.insert(key, PartialLong { dispatch, reply_token: None, total_len: 0, command_buf: Vec::new(), credited: 0, filled: Vec::new(), payload: Some(payload) });
                        false
                    }
                };
                if ready {
                    self.deliver_reassembled(key, out);
                }
            }
            TAG_LONG_CMD_PART => {
                let nonce = read_u64_field(bytes, &mut offset);
                let sender = read_u64_field(bytes, &mut offset) as usize;
                let total_len = read_u64_field(bytes, &mut offset) as usize;
                let part_offset = read_u64_field(bytes, &mut offset) as usize;
                let reply_token = read_reply_token(bytes, &mut offset);
                let chunk = &bytes[offset..];
                let key = (sender, nonce);
                let entry = self
                    .reassembly
                    .entry(key)
                    .and_modify(|partial| {
                        if partial.total_len == 0 && total_len > 0 {
                            partial.command_buf = vec![0u8; total_len];
                            partial.filled = vec![false; total_len];
                            partial.total_len = total_len;
                            partial.dispatch = dispatch;
                            partial.reply_token = reply_token;
                        }
                    })
                    .or_insert_with(|| PartialLong::new(dispatch, reply_token, total_len));
                entry.credit_chunk(part_offset, chunk);
                let complete = entry.is_complete();
                logging::log(PartitionEvent { sender, nonce, credited: entry.credited, total: entry.total_len, complete });
                if complete {
                    self.deliver_reassembled(key, out);
                }
            }
            TAG_RENDEZVOUS_ANNOUNCE => {
                let handle = read_u64_field(bytes, &mut offset);
                let _len = read_u64_field(bytes, &mut offset);
                let announcer = read_u64_field(bytes, &mut offset) as usize;
                let mut pull = Vec::with_capacity(26);
                write_envelope_header(TAG_RENDEZVOUS_PULL, Dispatch::Restricted, &mut pull);
                write_u64_field(&mut pull, handle);
                write_u64_field(&mut pull, self.rank() as u64);
                logging::log(RendezvousEvent { handle, step: RendezvousStep::Pull });
                self.transport.send(announcer, Bytes::from(pull));
            }
            TAG_RENDEZVOUS_PULL => {
                let handle = read_u64_field(bytes, &mut offset);
                let puller = read_u64_field(bytes, &mut offset) as usize;
                if let Some((staged, staged_dispatch)) = self.staged.get(&handle) {
                    let mut payload = Vec::with_capacity(staged.len() + 26);
                    write_envelope_header(TAG_RENDEZVOUS_PAYLOAD, *staged_dispatch, &mut payload);
                    write_u64_field(&mut payload, handle);
                    write_u64_field(&mut payload, self.rank() as u64);
                    payload.extend_from_slice(staged);
                    logging::log(RendezvousEvent { handle, step: RendezvousStep::Payload });
                    self.transport.send(puller, Bytes::from(payload));
                }
            }
            TAG_RENDEZVOUS_PAYLOAD => {
                let handle = read_u64_field(bytes, &mut offset);
                let stager = read_u64_field(bytes, &mut offset) as usize;
                out.push(Delivery { dispatch, command: decode_command(&bytes[offset..]) });
                let mut release = Vec::with_capacity(18);
                write_envelope_header(TAG_RENDEZVOUS_RELEASE, Dispatch::Restricted, &mut release);
                write_u64_field(&mut release, handle);
                self.transport.send(stager, Bytes::from(release));
            }
            TAG_RENDEZVOUS_RELEASE => {
                let handle = read_u64_field(bytes, &mut offset);
                logging::log(RendezvousEvent { handle, step: RendezvousStep::Release });
                self.staged.remove(&handle);
            }
            TAG_REPLY => {
                let token = read_u64_field(bytes, &mut offset);
                logging::log(ReplyEvent { token });
                self.completed_replies.push(token);
            }
            other => panic!("unrecognized envelope tag {other}"),
        }
    }

    /// Removes a completed reassembly entry and hands its command off
    /// for dispatch, firing a reply back to the sender if one was
    /// requested.
    fn deliver_reassembled(&mut self, key: (usize, u64), out: &mut Vec<Delivery>) {
        let (sender, _nonce) = key;
        let partial = self.reassembly.remove(&key).expect("deliver_reassembled called on a key just confirmed present");
        logging::log(ReceivedEvent { len: partial.command_buf.len() });
        out.push(Delivery { dispatch: partial.dispatch, command: decode_command(&partial.command_buf) });
        if let Some(token) = partial.reply_token {
            self.send_reply(sender, token);
        }
    }

    fn send_reply(&mut self, dest: usize, token: u64) {
        let mut out = Vec::with_capacity(18);
        write_envelope_header(TAG_REPLY, Dispatch::Restricted, &mut out);
        write_u64_field(&mut out, token);
        self.transport.send(dest, Bytes::from(out));
    }
}

/// Computes the eager broadcast tree's children for `rank` out of `peers`
/// total, covering `[lo, hi)`. Each hop keeps 15/16 of the remaining range
/// on one side and forwards the other 1/16 — a shallow, wide tree suited to
/// small eager messages.
pub fn eager_broadcast_children(lo: usize, hi: usize) -> Vec<(usize, usize, usize)> {
    broadcast_children(lo, hi, 15, 16)
}

/// Computes the rendezvous broadcast tree's children, halving the range at
/// each hop — a deeper tree that amortizes the heavier per-hop rendezvous
/// handshake over fewer, larger fan-outs per level.
pub fn rendezvous_broadcast_children(lo: usize, hi: usize) -> Vec<(usize, usize, usize)> {
    broadcast_children(lo, hi, 1, 2)
}

/// Splits `[lo, hi)` (excluding `lo`, the originator) into forwarding
/// targets, each paired with the sub-range it is responsible for relaying
/// to. `keep_num/keep_den` is the fraction of the remaining range that
/// stays with the first forwarding target.
fn broadcast_children(lo: usize, hi: usize, keep_num: usize, keep_den: usize) -> Vec<(usize, usize, usize)> {
    let mut children = Vec::new();
    let mut remaining_lo = lo + 1;
    while remaining_lo < hi {
        let remaining = hi - remaining_lo;
        let split = remaining_lo + (remaining * keep_num / keep_den).max(1).min(remaining);
        children.push((remaining_lo, remaining_lo, split));
        remaining_lo = split;
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{self, Cleanup, Command};
    use crate::transport::Process;

    #[test]
    fn protocol_choice_respects_the_threshold() {
        assert_eq!(choose_protocol(200, 0, LandingZone::Small), Protocol::EagerMedium);
        assert_eq!(choose_protocol(300, 0, LandingZone::Small), Protocol::Rendezvous);
        assert_eq!(choose_protocol(50, 64, LandingZone::Small), Protocol::LongWithPayload);
    }

    #[test]
    fn eager_broadcast_tree_reaches_every_rank_exactly_once() {
        let peers = 17;
        let mut reached = vec![false; peers];
        let mut frontier = vec![(0usize, 0usize, peers)];
        while let Some((rank, lo, hi)) = frontier.pop() {
            if reached[rank] {
                continue;
            }
            reached[rank] = true;
            for (child, clo, chi) in eager_broadcast_children(lo, hi) {
                frontier.push((child, clo, chi));
            }
        }
        assert!(reached.iter().all(|&seen| seen), "{reached:?}");
    }

    #[test]
    fn rendezvous_broadcast_tree_reaches_every_rank_exactly_once() {
        let peers = 9;
        let mut reached = vec![false; peers];
        let mut frontier = vec![(0usize, 0usize, peers)];
        while let Some((rank, lo, hi)) = frontier.pop() {
            if reached[rank] {
                continue;
            }
            reached[rank] = true;
            for (child, clo, chi) in rendezvous_broadcast_children(lo, hi) {
                frontier.push((child, clo, chi));
            }
        }
        assert!(reached.iter().all(|&seen| seen), "{reached:?}");
    }

    fn noop_executor(_reader: &mut pgas_serialize::Reader<'_>) {}

    #[test]
    fn long_partitioned_command_reassembles_and_completes_its_reply() {
        let mut ranks = Process::new_vector(2);
        let mut engine1 = Engine::new(ranks.pop().unwrap(), LandingZone::Small);
        let mut engine0 = Engine::new(ranks.pop().unwrap(), LandingZone::Small);

        let executor = command::register(noop_executor);
        let args = vec![7u8; 200];
        let command = Command::new(executor, Cleanup::FreeBuffer, args.clone());
        let payload = vec![3u8; 40];
        engine0.send_with_payload_and_reply(1, Dispatch::Restricted, command, &payload, 42);

        let delivered = loop {
            let delivered = engine1.poll();
            if !delivered.is_empty() {
                break delivered;
            }
            std::thread::yield_now();
        };
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].command.args, args);

        let replies = loop {
            let replies = engine0.poll();
            let completed = engine0.take_completed_replies();
            if !completed.is_empty() {
                break completed;
            }
            let _ = replies;
            std::thread::yield_now();
        };
        assert_eq!(replies, vec![42]);
    }

    #[test]
    fn packed_long_with_payload_command_delivers_without_partitioning() {
        let mut ranks = Process::new_vector(2);
        let mut engine1 = Engine::new(ranks.pop().unwrap(), LandingZone::Small);
        let mut engine0 = Engine::new(ranks.pop().unwrap(), LandingZone::Small);

        let executor = command::register(noop_executor);
        let args = vec![1u8, 2, 3, 4];
        let command = Command::new(executor, Cleanup::FreeBuffer, args.clone());
        let payload = vec![9u8; 16];
        engine0.send_with_payload(1, Dispatch::Restricted, command, &payload);

        let delivered = loop {
            let delivered = engine1.poll();
            if !delivered.is_empty() {
                break delivered;
            }
            std::thread::yield_now();
        };
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].command.args, args);
        assert!(engine0.poll().is_empty());
        assert!(engine0.take_completed_replies().is_empty());
    }
}
