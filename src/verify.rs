//! Sequence/ack validation for probe replies.

use crate::packet::PacketMeta;

/// Decide whether `received` legitimately continues the flow whose
/// expectations are held in `expected` (the tracked probe packet).
///
/// A SYN-ACK must acknowledge exactly the probe's sequence number plus one.
/// Anything else (data, RST, bare ACK) must echo the expected sequence
/// number or the one after it, and acknowledge the probe's ack number plus
/// the probe payload length; an ack of zero is also accepted because RSTs
/// commonly carry it.
pub fn verify_sa(expected: &PacketMeta, received: &PacketMeta) -> bool {
    if received.syn() && received.ack() {
        return received.acknum == expected.seqnum.wrapping_add(1);
    }

    if received.seqnum == expected.seqnum || received.seqnum == expected.seqnum.wrapping_add(1) {
        if received.acknum == expected.acknum.wrapping_add(expected.response_len) {
            return true;
        }
        if received.acknum == 0 {
            return true;
        }
    }
    false
}
