//! RPC/active-message engine: the command buffer (§4.7), the eager /
//! rendezvous / long-with-payload wire protocols and broadcast trees
//! (§4.8), bound closures (§4.4), and the reference in-process transports
//! that stand in for a real network backend.
//!
//! The actual wire movement of bytes between ranks ([`transport::Transport`])
//! is deliberately a thin trait boundary: a production deployment plugs in
//! an RDMA-verbs or TCP backend there. [`transport::Thread`] and
//! [`transport::Process`] are reference implementations good enough to
//! exercise and test everything above that boundary.

#![forbid(missing_docs)]

pub mod bind;
pub mod command;
pub mod initialize;
pub mod logging;
pub mod rpc;
pub mod transport;

pub use initialize::{initialize, initialize_from, initialize_single, Configuration, WorkerGuards};
pub use rpc::{Dispatch, Engine, LandingZone, Protocol};
pub use transport::{Process, Thread, Transport};
