//! Packet metadata exchanged with the capture and probe-dispatch layers.
//!
//! One `PacketMeta` describes a single observed or sent packet. The tracker
//! stores the most recent packet for each flow and stamps bookkeeping fields
//! (processing flag, attempt counter, final acked status) onto it as the
//! flow progresses.

use crate::addr::NumericAddr;

/// TCP flag masks, matching the flag byte of the TCP header.
pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;
pub const TCP_FLAG_URG: u8 = 0x20;
pub const TCP_FLAG_ECE: u8 = 0x40;
pub const TCP_FLAG_CWR: u8 = 0x80;

/// Metadata for one probe or reply packet.
///
/// Sequence and ack numbers are host byte order. `response_len` is the
/// length of the payload the prober sent on this flow, used when validating
/// the ack number of the reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketMeta {
    /// Source address in validated numeric form.
    pub saddr: NumericAddr,
    /// Source transport port.
    pub sport: u16,
    /// Destination transport port.
    pub dport: u16,
    /// Sequence number.
    pub seqnum: u32,
    /// Acknowledgment number.
    pub acknum: u32,
    /// TCP flags bitfield: FIN|SYN|RST|PSH|ACK|URG|ECE|CWR.
    pub tcp_flags: u8,
    /// Transport payload.
    pub payload: Vec<u8>,
    /// Length of the probe payload sent on this flow.
    pub response_len: u32,
    /// Set while a worker is handling a reply for this flow.
    pub processing: bool,
    /// Probe attempt counter.
    pub counter: u32,
    /// Final ack status, stamped on removal for downstream reporting.
    pub acked: bool,
}

impl PacketMeta {
    #[inline]
    fn flag(&self, mask: u8) -> bool {
        (self.tcp_flags & mask) != 0
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.flag(TCP_FLAG_FIN)
    }

    #[inline]
    pub fn syn(&self) -> bool {
        self.flag(TCP_FLAG_SYN)
    }

    #[inline]
    pub fn rst(&self) -> bool {
        self.flag(TCP_FLAG_RST)
    }

    #[inline]
    pub fn psh(&self) -> bool {
        self.flag(TCP_FLAG_PSH)
    }

    #[inline]
    pub fn ack(&self) -> bool {
        self.flag(TCP_FLAG_ACK)
    }

    #[inline]
    pub fn urg(&self) -> bool {
        self.flag(TCP_FLAG_URG)
    }

    #[inline]
    pub fn ece(&self) -> bool {
        self.flag(TCP_FLAG_ECE)
    }

    #[inline]
    pub fn cwr(&self) -> bool {
        self.flag(TCP_FLAG_CWR)
    }

    /// Mark this packet as being handled by a worker.
    #[inline]
    pub fn start_processing(&mut self) {
        self.processing = true;
    }

    /// Clear the processing mark once the worker is done.
    #[inline]
    pub fn finished_processing(&mut self) {
        self.processing = false;
    }

    /// Bump the probe attempt counter.
    #[inline]
    pub fn increment_counter(&mut self) {
        self.counter += 1;
    }
}
