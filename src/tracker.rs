//! Flow transition API: the bookkeeping layer packet workers drive.
//!
//! Every operation derives the packet's correlation key, then performs its
//! read or mutation through the sharded table's atomic primitives, so a
//! transition on one flow can never lose an update to a racing worker.
//! Operations on unseen keys return a false/zero sentinel: a reply for an
//! already-removed flow (duplicate, late, or post-timeout) is expected
//! steady-state behavior, not an error.

use tracing::debug;

use crate::{
    conf::TrackerConf,
    key::FlowKey,
    packet::PacketMeta,
    state::FlowState,
    store::ShardedTable,
    verify::verify_sa,
};

/// Tracks connection state for every outstanding probe.
pub struct FlowTracker {
    table: ShardedTable<FlowKey, FlowState>,
    trace_packets: bool,
}

impl FlowTracker {
    pub fn new(conf: &TrackerConf) -> Self {
        Self {
            table: ShardedTable::with_shards(conf.shard_count),
            trace_packets: conf.trace_packets,
        }
    }

    /// Start tracking a flow, or refresh the tracked packet if the flow is
    /// already known. Counters and flags on an existing entry survive; only
    /// the packet reference is replaced.
    pub fn register(&self, packet: &PacketMeta) {
        let key = FlowKey::for_packet(packet);
        self.table.upsert(
            key,
            || FlowState::new(packet.clone()),
            |state| state.packet = packet.clone(),
        );
    }

    /// Claim a reply for processing. Returns `(exists, started)`:
    /// `(false, false)` for an untracked flow, `(true, true)` for the one
    /// caller that wins the claim, `(true, false)` for everyone else.
    pub fn is_start_processing(&self, packet: &PacketMeta) -> (bool, bool) {
        let key = FlowKey::for_packet(packet);
        let started = self.table.update(key, |state| {
            if state.packet.processing {
                false
            } else {
                state.packet.start_processing();
                true
            }
        });
        match started {
            Some(started) => (true, started),
            None => (false, false),
        }
    }

    /// Mark the flow's tracked packet as being processed.
    pub fn start_processing(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| state.packet.start_processing())
            .is_some()
    }

    /// Clear the processing mark on the flow's tracked packet.
    pub fn finish_processing(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| state.packet.finished_processing())
            .is_some()
    }

    /// Bump the attempt counter on the flow's tracked packet.
    pub fn increment_counter(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| state.packet.increment_counter())
            .is_some()
    }

    /// Bump the handshake step counter.
    pub fn inc_handshake(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| state.handshake_num += 1)
            .is_some()
    }

    pub fn get_handshake(&self, packet: &PacketMeta) -> u32 {
        let key = FlowKey::for_packet(packet);
        self.table
            .read(key, |state| state.handshake_num)
            .unwrap_or(0)
    }

    /// Record that an ACK was observed for this flow.
    pub fn update_ack(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table.update(key, |state| state.ack = true).is_some()
    }

    pub fn get_ack(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table.read(key, |state| state.ack).unwrap_or(false)
    }

    /// Count an off-port reply against the entry of the *original* probe,
    /// found by substituting `parent_sport` for the packet's own port.
    pub fn inc_ephemeral_resp(&self, packet: &PacketMeta, parent_sport: u16) -> bool {
        let key = FlowKey::with_parent_port(packet, parent_sport);
        self.table
            .update(key, |state| state.ephemeral_resp_num += 1)
            .is_some()
    }

    pub fn get_ephemeral_resp_num(&self, packet: &PacketMeta) -> u32 {
        let key = FlowKey::for_packet(packet);
        self.table
            .read(key, |state| state.ephemeral_resp_num)
            .unwrap_or(0)
    }

    pub fn get_hyperacktive_status(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .read(key, |state| state.hyperacktive)
            .unwrap_or(false)
    }

    /// Flag the flow as replying from an unexpected port.
    pub fn set_hyperacktive_status(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| state.hyperacktive = true)
            .is_some()
    }

    /// Record which original probe port an ephemeral-keyed entry belongs to.
    pub fn set_parent_sport(&self, packet: &PacketMeta, parent_sport: u16) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| state.parent_sport = parent_sport)
            .is_some()
    }

    pub fn get_parent_sport(&self, packet: &PacketMeta) -> u16 {
        let key = FlowKey::for_packet(packet);
        self.table
            .read(key, |state| state.parent_sport)
            .unwrap_or(0)
    }

    /// Append off-port packets to the flow's ephemeral history.
    pub fn record_ephemeral(&self, packet: &PacketMeta, ephemerals: &[PacketMeta]) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table
            .update(key, |state| {
                state.ephemeral_filters.extend_from_slice(ephemerals)
            })
            .is_some()
    }

    pub fn get_ephemeral_filters(&self, packet: &PacketMeta) -> Option<Vec<PacketMeta>> {
        let key = FlowKey::for_packet(packet);
        self.table.read(key, |state| state.ephemeral_filters.clone())
    }

    /// Record that a post-handshake payload arrived.
    pub fn update_data(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table.update(key, |state| state.data = true).is_some()
    }

    pub fn get_data(&self, packet: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(packet);
        self.table.read(key, |state| state.data).unwrap_or(false)
    }

    /// Stop tracking the flow. The returned packet carries the final ack
    /// status for downstream reporting; for an untracked flow it is a plain
    /// copy with `acked` false.
    pub fn remove(&self, packet: &PacketMeta) -> PacketMeta {
        let key = FlowKey::for_packet(packet);
        let mut finalized = packet.clone();
        finalized.acked = self
            .table
            .remove(key)
            .map(|state| state.ack)
            .unwrap_or(false);
        finalized
    }

    pub fn contains(&self, packet: &PacketMeta) -> bool {
        self.table.contains(FlowKey::for_packet(packet))
    }

    /// Clone out the packet currently tracked for this flow.
    pub fn find(&self, packet: &PacketMeta) -> Option<PacketMeta> {
        let key = FlowKey::for_packet(packet);
        self.table.read(key, |state| state.packet.clone())
    }

    /// Number of flows currently tracked.
    pub fn active_flow_count(&self) -> usize {
        self.table.len()
    }

    /// Decide whether `received` is a legitimate reply to a tracked probe.
    ///
    /// An untracked key means the host is not under scan. A tracked entry
    /// must match the reply's (address, destination port, source port)
    /// triple before the sequence/ack numbers are checked, so an aliased
    /// key can never validate a stranger's packet.
    pub fn verify_scanning_ip(&self, received: &PacketMeta) -> bool {
        let key = FlowKey::for_packet(received);
        let Some(tracked) = self.find_by_key(key) else {
            return false;
        };

        if tracked.saddr == received.saddr
            && tracked.dport == received.dport
            && tracked.sport == received.sport
            && verify_sa(&tracked, received)
        {
            return true;
        }

        if self.trace_packets {
            debug!(
                saddr = %tracked.saddr,
                recv_seqnum = received.seqnum,
                stored_seqnum = tracked.seqnum,
                recv_acknum = received.acknum,
                stored_acknum = tracked.acknum,
                recv_payload_len = received.payload.len(),
                stored_response_len = tracked.response_len,
                "reply failed sequence validation"
            );
        }
        false
    }

    fn find_by_key(&self, key: FlowKey) -> Option<PacketMeta> {
        self.table.read(key, |state| state.packet.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::NumericAddr;
    use crate::packet::{TCP_FLAG_ACK, TCP_FLAG_SYN};

    fn tracker() -> FlowTracker {
        FlowTracker::new(&TrackerConf {
            shard_count: 64,
            trace_packets: false,
        })
    }

    fn probe(addr: u32, sport: u16) -> PacketMeta {
        PacketMeta {
            saddr: NumericAddr::new(addr),
            sport,
            dport: 42513,
            seqnum: 100,
            acknum: 50,
            response_len: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_register_find_contains() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        assert!(!tracker.contains(&p));
        assert_eq!(tracker.find(&p), None);

        tracker.register(&p);
        assert!(tracker.contains(&p));
        assert_eq!(tracker.find(&p), Some(p.clone()));
        assert_eq!(tracker.active_flow_count(), 1);
    }

    #[test]
    fn test_register_existing_keeps_counters() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        tracker.register(&p);
        tracker.inc_handshake(&p);
        tracker.update_ack(&p);

        // Re-registering replaces the tracked packet only.
        let mut refreshed = p.clone();
        refreshed.seqnum = 200;
        tracker.register(&refreshed);

        assert_eq!(tracker.find(&p).unwrap().seqnum, 200);
        assert_eq!(tracker.get_handshake(&p), 1);
        assert!(tracker.get_ack(&p));
    }

    #[test]
    fn test_remove_snapshots_ack() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        tracker.register(&p);
        tracker.update_ack(&p);

        let finalized = tracker.remove(&p);
        assert!(finalized.acked);
        assert!(!tracker.contains(&p));

        // Removing an untracked flow reports no ack.
        let finalized = tracker.remove(&p);
        assert!(!finalized.acked);
    }

    #[test]
    fn test_remove_without_ack() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        tracker.register(&p);
        let finalized = tracker.remove(&p);
        assert!(!finalized.acked);
    }

    #[test]
    fn test_is_start_processing_claims_once() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        assert_eq!(tracker.is_start_processing(&p), (false, false));

        tracker.register(&p);
        assert_eq!(tracker.is_start_processing(&p), (true, true));
        assert_eq!(tracker.is_start_processing(&p), (true, false));

        assert!(tracker.finish_processing(&p));
        assert_eq!(tracker.is_start_processing(&p), (true, true));
    }

    #[test]
    fn test_processing_flag_transitions() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        assert!(!tracker.start_processing(&p));
        assert!(!tracker.finish_processing(&p));

        tracker.register(&p);
        assert!(tracker.start_processing(&p));
        assert!(tracker.find(&p).unwrap().processing);
        assert!(tracker.finish_processing(&p));
        assert!(!tracker.find(&p).unwrap().processing);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);
        tracker.register(&p);

        for expected in 1..=5u32 {
            assert!(tracker.inc_handshake(&p));
            assert_eq!(tracker.get_handshake(&p), expected);
        }

        for expected in 1..=5u32 {
            assert!(tracker.increment_counter(&p));
            assert_eq!(tracker.find(&p).unwrap().counter, expected);
        }
    }

    #[test]
    fn test_ephemeral_resp_accumulates_under_parent_key() {
        let tracker = tracker();
        let origin = probe(0x0A000001, 443);
        tracker.register(&origin);

        // Replies from several distinct ephemeral ports, all tied back to
        // the original probe on port 443.
        for ephemeral_port in [51001, 51002, 51003] {
            let reply = probe(0x0A000001, ephemeral_port);
            assert!(tracker.inc_ephemeral_resp(&reply, 443));
        }

        assert_eq!(tracker.get_ephemeral_resp_num(&origin), 3);

        // An untracked parent port counts nothing.
        let reply = probe(0x0A000001, 51004);
        assert!(!tracker.inc_ephemeral_resp(&reply, 80));
    }

    #[test]
    fn test_hyperacktive_and_parent_sport() {
        let tracker = tracker();
        let p = probe(0x0A000001, 51001);

        assert!(!tracker.get_hyperacktive_status(&p));
        assert!(!tracker.set_hyperacktive_status(&p));
        assert_eq!(tracker.get_parent_sport(&p), 0);

        tracker.register(&p);
        assert!(tracker.set_hyperacktive_status(&p));
        assert!(tracker.get_hyperacktive_status(&p));

        assert!(tracker.set_parent_sport(&p, 443));
        assert_eq!(tracker.get_parent_sport(&p), 443);
    }

    #[test]
    fn test_ephemeral_filters_keep_order() {
        let tracker = tracker();
        let origin = probe(0x0A000001, 443);

        assert!(!tracker.record_ephemeral(&origin, &[]));
        assert_eq!(tracker.get_ephemeral_filters(&origin), None);

        tracker.register(&origin);

        let first = probe(0x0A000001, 51001);
        let second = probe(0x0A000001, 51002);
        assert!(tracker.record_ephemeral(&origin, &[first.clone()]));
        assert!(tracker.record_ephemeral(&origin, &[second.clone()]));

        assert_eq!(
            tracker.get_ephemeral_filters(&origin),
            Some(vec![first, second])
        );
    }

    #[test]
    fn test_data_flag() {
        let tracker = tracker();
        let p = probe(0x0A000001, 443);

        assert!(!tracker.get_data(&p));
        assert!(!tracker.update_data(&p));

        tracker.register(&p);
        assert!(tracker.update_data(&p));
        assert!(tracker.get_data(&p));
    }

    #[test]
    fn test_verify_scanning_ip_unregistered() {
        let tracker = tracker();
        let reply = probe(0x0A000001, 443);
        assert!(!tracker.verify_scanning_ip(&reply));
    }

    #[test]
    fn test_verify_scanning_ip_synack() {
        let tracker = tracker();
        let sent = probe(0x0A000001, 443);
        tracker.register(&sent);

        let mut reply = sent.clone();
        reply.tcp_flags = TCP_FLAG_SYN | TCP_FLAG_ACK;
        reply.acknum = sent.seqnum + 1;
        assert!(tracker.verify_scanning_ip(&reply));

        reply.acknum = sent.seqnum;
        assert!(!tracker.verify_scanning_ip(&reply));
    }

    #[test]
    fn test_verify_scanning_ip_rejects_triple_mismatch() {
        let tracker = tracker();
        let sent = probe(0x0A000001, 443);
        tracker.register(&sent);

        // Valid numbers, but the reply's destination port disagrees with
        // the tracked probe: an aliased key must not validate.
        let mut reply = sent.clone();
        reply.tcp_flags = TCP_FLAG_SYN | TCP_FLAG_ACK;
        reply.acknum = sent.seqnum + 1;
        reply.dport = sent.dport + 1;
        assert!(!tracker.verify_scanning_ip(&reply));
    }
}
