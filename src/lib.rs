//! Per-flow connection-state tracking for a stateless TCP prober.
//!
//! A stateless prober sends probe packets without a kernel TCP connection
//! behind them, so it must reconstruct enough handshake state on its own to
//! decide whether each arriving packet is a legitimate reply to an
//! outstanding probe. This crate is that core: a sharded concurrent state
//! table keyed by a packed (address, port) correlation key, a transition
//! API for the per-flow bookkeeping packet workers perform, and a
//! sequence/ack validator covering SYN-ACKs, data replies, RSTs, and hosts
//! that answer from an unexpected ephemeral port.
//!
//! Packet capture, probe construction, banner classification, and timeout
//! scheduling live in the embedding application; this crate is a pure
//! in-process library boundary.

pub mod addr;
pub mod conf;
pub mod key;
pub mod packet;
pub mod state;
pub mod store;
pub mod tracker;
pub mod verify;

pub use addr::{AddrError, NumericAddr};
pub use conf::TrackerConf;
pub use key::FlowKey;
pub use packet::PacketMeta;
pub use state::FlowState;
pub use store::{ShardedTable, DEFAULT_SHARD_COUNT};
pub use tracker::FlowTracker;
pub use verify::verify_sa;
