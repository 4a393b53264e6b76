//! A partitioned global address space (PGAS) runtime: an asynchronous,
//! one-sided communication library for SPMD parallel programs atop a
//! lightweight RDMA-capable transport.
//!
//! Each process in the job is a "rank" holding local memory plus a slice of
//! a globally-addressable shared heap; any rank may read, write, or invoke
//! computation on any other rank's slice. The four tightly-coupled pieces
//! that make that work:
//!
//! - The asynchrony core: [`future`], [`persona`], [`queue`].
//! - The RPC/AM protocol engine lives in the sibling `pgas-comm` crate
//!   (re-exported here as [`comm`]); this crate builds completions and
//!   dispatch points on top of it.
//! - Serialization ([`serialize`], re-exporting `pgas-serialize`), zero-copy
//!   when possible.
//! - Global-pointer RMA and collectives: [`gptr`], [`rma`], [`vis`],
//!   [`atomic`], [`collective`], [`copy`], [`heap`].
//!
//! Plus the ambient runtime surface: [`config`] (environment-variable
//! configuration), [`team`] and [`dist_object`] (rank/team identity and
//! per-rank distributed objects), and [`init`] (the collective
//! init/finalize lifecycle).

#![forbid(missing_docs)]

pub mod atomic;
pub mod collective;
pub mod completion;
pub mod config;
pub mod copy;
pub mod dist_object;
pub mod future;
pub mod gptr;
pub mod heap;
pub mod init;
pub mod logging;
pub mod persona;
pub mod queue;
pub mod rma;
pub mod team;
pub mod vis;

pub use atomic::{AtomicDomain, AtomicOp};
pub use completion::{Completion, CompletionEvent};
pub use config::Config;
pub use dist_object::{DistObject, DistObjectRef};
pub use future::{Future, Promise};
pub use gptr::{GlobalPtr, Kind};
pub use init::{finalize, init, initialized};
pub use persona::{current_persona, persona_scope, Persona, PersonaScope};
pub use team::{Rank, Team};

pub use pgas_bytes as bytes;
pub use pgas_comm as comm;
pub use pgas_container as container;
pub use pgas_logging as logging_core;
pub use pgas_serialize as serialize;
