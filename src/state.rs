//! Per-flow bookkeeping stored in the table.

use crate::packet::PacketMeta;

/// Mutable state for one tracked flow.
///
/// Keeps the most recent packet seen for the flow together with the
/// handshake progress needed to validate later replies. The record never
/// leaves the store as a mutable reference; all writes go through the
/// tracker, which mutates it under the owning shard's lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    /// Most recent packet tracked for this flow. Holds the expected
    /// sequence/ack numbers for reply validation.
    pub packet: PacketMeta,
    /// Whether an ACK has been observed.
    pub ack: bool,
    /// Handshake step counter, bounds handshake retries.
    pub handshake_num: u32,
    /// Count of replies seen from a port other than the one probed,
    /// accumulated on the entry for the original probe.
    pub ephemeral_resp_num: u32,
    /// Set once the flow is known to reply from an unexpected port.
    pub hyperacktive: bool,
    /// Original probe port recorded on ephemeral-keyed entries.
    pub parent_sport: u16,
    /// Previously seen ephemeral-port packets, kept in arrival order for
    /// deduplicating repeated off-port replies.
    pub ephemeral_filters: Vec<PacketMeta>,
    /// Whether a post-handshake payload arrived.
    pub data: bool,
}

impl FlowState {
    /// Fresh state for a newly registered flow.
    pub fn new(packet: PacketMeta) -> Self {
        Self {
            packet,
            ..Default::default()
        }
    }
}
