//! ARP over Ethernet/IPv4.

use super::error::{PacketError, PacketResult};
use super::ethernet::{EthernetHeader, MacAddr, ETHERNET_HEADER_LEN, ETH_TYPE_ARP, ETH_TYPE_IPV4};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// Length of an Ethernet/IPv4 ARP packet.
pub const ARP_PACKET_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;

/// ARP operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    /// Who-has request.
    Request,
    /// Is-at reply.
    Reply,
    /// Anything else (RARP and friends).
    Other(u16),
}

impl From<u16> for ArpOperation {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }
}

impl From<ArpOperation> for u16 {
    fn from(value: ArpOperation) -> Self {
        match value {
            ArpOperation::Request => 1,
            ArpOperation::Reply => 2,
            ArpOperation::Other(op) => op,
        }
    }
}

/// An ARP packet for Ethernet hardware and IPv4 protocol addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Operation.
    pub operation: ArpOperation,
    /// Sender hardware address.
    pub sender_mac: MacAddr,
    /// Sender protocol address.
    pub sender_ip: Ipv4Addr,
    /// Target hardware address.
    pub target_mac: MacAddr,
    /// Target protocol address.
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Build an is-at reply answering `request` with `answer_mac`.
    #[must_use]
    pub fn reply_to(request: &ArpPacket, answer_mac: MacAddr) -> Self {
        Self {
            operation: ArpOperation::Reply,
            sender_mac: answer_mac,
            sender_ip: request.target_ip,
            target_mac: request.sender_mac,
            target_ip: request.sender_ip,
        }
    }

    /// Parse an ARP packet.
    pub fn parse(buf: &mut impl Buf) -> PacketResult<Self> {
        if buf.remaining() < ARP_PACKET_LEN {
            return Err(PacketError::truncated("arp", ARP_PACKET_LEN, buf.remaining()));
        }

        let htype = buf.get_u16();
        let ptype = buf.get_u16();
        let hlen = buf.get_u8();
        let plen = buf.get_u8();
        if htype != HTYPE_ETHERNET || ptype != ETH_TYPE_IPV4 || hlen != 6 || plen != 4 {
            return Err(PacketError::malformed(
                "arp",
                format!("unsupported htype={htype} ptype={ptype:#06x} hlen={hlen} plen={plen}"),
            ));
        }

        let operation = ArpOperation::from(buf.get_u16());
        let sender_mac = MacAddr::read(buf);
        let sender_ip = Ipv4Addr::from(buf.get_u32());
        let target_mac = MacAddr::read(buf);
        let target_ip = Ipv4Addr::from(buf.get_u32());

        Ok(Self {
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }

    /// Serialize the packet.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(HTYPE_ETHERNET);
        buf.put_u16(ETH_TYPE_IPV4);
        buf.put_u8(6);
        buf.put_u8(4);
        buf.put_u16(self.operation.into());
        buf.put_slice(&self.sender_mac.0);
        buf.put_u32(self.sender_ip.into());
        buf.put_slice(&self.target_mac.0);
        buf.put_u32(self.target_ip.into());
    }

    /// Serialize the packet inside an Ethernet frame from sender to target.
    #[must_use]
    pub fn to_frame(&self) -> Bytes {
        let dst = if self.target_mac == MacAddr::ZERO {
            MacAddr::BROADCAST
        } else {
            self.target_mac
        };

        let mut buf = BytesMut::with_capacity(ETHERNET_HEADER_LEN + ARP_PACKET_LEN);
        EthernetHeader {
            dst,
            src: self.sender_mac,
            ethertype: ETH_TYPE_ARP,
        }
        .write(&mut buf);
        self.write(&mut buf);
        buf.freeze()
    }
}

/// Synthesize a complete Ethernet+ARP reply telling `requester` that
/// `answer_ip` is at `answer_mac`.
#[must_use]
pub fn arp_reply_frame(
    requester_mac: MacAddr,
    requester_ip: Ipv4Addr,
    answer_mac: MacAddr,
    answer_ip: Ipv4Addr,
) -> Bytes {
    ArpPacket {
        operation: ArpOperation::Reply,
        sender_mac: answer_mac,
        sender_ip: answer_ip,
        target_mac: requester_mac,
        target_ip: requester_ip,
    }
    .to_frame()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ArpPacket {
        ArpPacket {
            operation: ArpOperation::Request,
            sender_mac: MacAddr::new(0, 0, 0, 0, 0, 4),
            sender_ip: Ipv4Addr::new(10, 0, 0, 4),
            target_mac: MacAddr::ZERO,
            target_ip: Ipv4Addr::new(10, 0, 0, 100),
        }
    }

    #[test]
    fn test_request_frame_is_broadcast() {
        let frame = request().to_frame();
        assert_eq!(frame.len(), 42);

        let mut buf = &frame[..];
        let eth = EthernetHeader::parse(&mut buf).unwrap();
        assert!(eth.dst.is_broadcast());
        assert_eq!(eth.ethertype, ETH_TYPE_ARP);
        assert_eq!(ArpPacket::parse(&mut buf).unwrap(), request());
    }

    #[test]
    fn test_reply_frame_layout() {
        let vip_mac = MacAddr::new(0, 0, 0, 0, 0xff, 0xff);
        let frame = arp_reply_frame(
            MacAddr::new(0, 0, 0, 0, 0, 4),
            Ipv4Addr::new(10, 0, 0, 4),
            vip_mac,
            Ipv4Addr::new(10, 0, 0, 100),
        );

        let mut buf = &frame[..];
        let eth = EthernetHeader::parse(&mut buf).unwrap();
        assert_eq!(eth.dst, MacAddr::new(0, 0, 0, 0, 0, 4));
        assert_eq!(eth.src, vip_mac);

        let reply = ArpPacket::parse(&mut buf).unwrap();
        assert_eq!(reply, ArpPacket::reply_to(&request(), vip_mac));
        assert_eq!(u16::from(reply.operation), 2);
    }

    #[test]
    fn test_parse_rejects_non_ipv4() {
        let mut raw = BytesMut::new();
        request().write(&mut raw);
        raw[2] = 0x86;
        raw[3] = 0xdd;

        let err = ArpPacket::parse(&mut &raw[..]).unwrap_err();
        assert!(matches!(err, PacketError::Malformed { layer: "arp", .. }));
    }

    #[test]
    fn test_parse_truncated() {
        let err = ArpPacket::parse(&mut &[0u8; 20][..]).unwrap_err();
        assert!(matches!(err, PacketError::Truncated { needed: 28, .. }));
    }
}
