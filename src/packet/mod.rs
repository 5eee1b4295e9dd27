//! # Header Codec
//!
//! Decoding and encoding of the link-layer frames carried in OpenFlow
//! packet-in and packet-out messages. Only the layers the balancer acts on
//! are decoded: Ethernet, ARP, IPv4 and TCP. Everything else is classified as
//! [`DecodedFrame::Ignored`] rather than treated as an error.

mod arp;
mod error;
mod ethernet;
mod ipv4;
mod tcp;

pub use arp::{arp_reply_frame, ArpOperation, ArpPacket, ARP_PACKET_LEN};
pub use error::{PacketError, PacketResult};
pub use ethernet::{
    EthernetHeader, MacAddr, ETHERNET_HEADER_LEN, ETH_TYPE_ARP, ETH_TYPE_IPV4, ETH_TYPE_IPV6,
    ETH_TYPE_LLDP, ETH_TYPE_VLAN,
};
pub use ipv4::{
    checksum, Ipv4Header, IPV4_MIN_HEADER_LEN, IP_PROTO_ICMP, IP_PROTO_TCP, IP_PROTO_UDP,
};
pub use tcp::{TcpFlags, TcpHeader, TCP_MIN_HEADER_LEN};

use bytes::{BufMut, Bytes, BytesMut};

/// A frame decoded as far as the balancer cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// An ARP packet.
    Arp {
        /// Link-layer header.
        eth: EthernetHeader,
        /// ARP body.
        arp: ArpPacket,
    },

    /// An IPv4 datagram, with its TCP header when it carries one.
    Ipv4 {
        /// Link-layer header.
        eth: EthernetHeader,
        /// Network-layer header.
        ip: Ipv4Header,
        /// Transport header for unfragmented (or first-fragment) TCP.
        tcp: Option<TcpHeader>,
    },

    /// A frame of an ethertype the balancer does not handle.
    Ignored {
        /// The unhandled ethertype.
        ethertype: u16,
    },
}

impl DecodedFrame {
    /// The Ethernet header, when the frame was decoded past it.
    #[must_use]
    pub fn ethernet(&self) -> Option<&EthernetHeader> {
        match self {
            Self::Arp { eth, .. } | Self::Ipv4 { eth, .. } => Some(eth),
            Self::Ignored { .. } => None,
        }
    }
}

/// Decode a raw Ethernet frame.
///
/// # Errors
///
/// Returns [`PacketError::Truncated`] when the frame is too short for a
/// header the balancer parses and [`PacketError::Malformed`] for structurally
/// invalid ARP, IPv4 or TCP headers.
pub fn decode(frame: &[u8]) -> PacketResult<DecodedFrame> {
    let mut buf = frame;
    let eth = EthernetHeader::parse(&mut buf)?;

    match eth.ethertype {
        ETH_TYPE_ARP => {
            let arp = ArpPacket::parse(&mut buf)?;
            Ok(DecodedFrame::Arp { eth, arp })
        },
        ETH_TYPE_IPV4 => {
            let ip = Ipv4Header::parse(&mut buf)?;
            let tcp = if ip.protocol == IP_PROTO_TCP && !ip.is_later_fragment() {
                Some(TcpHeader::parse(&mut buf)?)
            } else {
                None
            };
            Ok(DecodedFrame::Ipv4 { eth, ip, tcp })
        },
        ethertype => Ok(DecodedFrame::Ignored { ethertype }),
    }
}

/// Encode a complete Ethernet/IPv4/TCP frame.
///
/// The IPv4 total length, protocol and both checksums are filled in from the
/// supplied headers and payload.
#[must_use]
pub fn tcp_frame(eth: &EthernetHeader, ip: &Ipv4Header, tcp: &TcpHeader, payload: &[u8]) -> Bytes {
    let segment_len = TCP_MIN_HEADER_LEN + payload.len();

    let mut ip = *ip;
    ip.protocol = IP_PROTO_TCP;
    ip.total_len = (IPV4_MIN_HEADER_LEN + segment_len) as u16;

    let mut segment = BytesMut::with_capacity(segment_len);
    TcpHeader { checksum: 0, ..*tcp }.write(&mut segment);
    segment.put_slice(payload);

    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&ip.src.octets());
    pseudo[4..8].copy_from_slice(&ip.dst.octets());
    pseudo[9] = IP_PROTO_TCP;
    pseudo[10..12].copy_from_slice(&(segment_len as u16).to_be_bytes());
    let sum = ipv4::finish_checksum(ipv4::sum_words(ipv4::sum_words(0, &pseudo), &segment));
    segment[16..18].copy_from_slice(&sum.to_be_bytes());

    let mut frame = BytesMut::with_capacity(ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN + segment_len);
    EthernetHeader {
        ethertype: ETH_TYPE_IPV4,
        ..*eth
    }
    .write(&mut frame);
    ip.write(&mut frame);
    frame.put_slice(&segment);
    frame.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn eth() -> EthernetHeader {
        EthernetHeader {
            dst: MacAddr::new(0, 0, 0, 0, 0xff, 0xff),
            src: MacAddr::new(0, 0, 0, 0, 0, 4),
            ethertype: ETH_TYPE_IPV4,
        }
    }

    fn syn_frame() -> Bytes {
        tcp_frame(
            &eth(),
            &Ipv4Header::new(
                Ipv4Addr::new(10, 0, 0, 4),
                Ipv4Addr::new(10, 0, 0, 100),
                IP_PROTO_TCP,
            ),
            &TcpHeader::new(40000, 8080, TcpFlags::SYN),
            b"",
        )
    }

    #[test]
    fn test_decode_tcp_frame() {
        let frame = syn_frame();
        match decode(&frame).unwrap() {
            DecodedFrame::Ipv4 { eth, ip, tcp } => {
                assert_eq!(eth.src, MacAddr::new(0, 0, 0, 0, 0, 4));
                assert_eq!(ip.dst, Ipv4Addr::new(10, 0, 0, 100));
                assert_eq!(ip.total_len, 40);
                let tcp = tcp.unwrap();
                assert_eq!(tcp.dst_port, 8080);
                assert!(tcp.flags.contains(TcpFlags::SYN));
            },
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_tcp_checksum_verifies() {
        let frame = tcp_frame(
            &eth(),
            &Ipv4Header::new(
                Ipv4Addr::new(10, 0, 0, 4),
                Ipv4Addr::new(10, 0, 0, 1),
                IP_PROTO_TCP,
            ),
            &TcpHeader::new(40000, 8080, TcpFlags::ACK | TcpFlags::PSH),
            b"hello",
        );

        let ip_start = ETHERNET_HEADER_LEN;
        let tcp_start = ip_start + IPV4_MIN_HEADER_LEN;
        assert_eq!(checksum(&frame[ip_start..tcp_start]), 0);

        let mut pseudo = Vec::new();
        pseudo.extend_from_slice(&frame[ip_start + 12..ip_start + 20]);
        pseudo.extend_from_slice(&[0, IP_PROTO_TCP]);
        pseudo.extend_from_slice(&((frame.len() - tcp_start) as u16).to_be_bytes());
        pseudo.extend_from_slice(&frame[tcp_start..]);
        assert_eq!(checksum(&pseudo), 0);
    }

    #[test]
    fn test_decode_arp() {
        let frame = arp_reply_frame(
            MacAddr::new(0, 0, 0, 0, 0, 4),
            Ipv4Addr::new(10, 0, 0, 4),
            MacAddr::new(0, 0, 0, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let decoded = decode(&frame).unwrap();
        assert!(matches!(
            decoded,
            DecodedFrame::Arp { arp, .. } if arp.operation == ArpOperation::Reply
        ));
        assert!(decoded.ethernet().is_some());
    }

    #[test]
    fn test_decode_ignores_lldp_and_ipv6() {
        for ethertype in [ETH_TYPE_LLDP, ETH_TYPE_IPV6] {
            let mut frame = BytesMut::new();
            EthernetHeader {
                ethertype,
                ..eth()
            }
            .write(&mut frame);
            frame.put_bytes(0, 40);

            assert_eq!(
                decode(&frame).unwrap(),
                DecodedFrame::Ignored { ethertype }
            );
        }
    }

    #[test]
    fn test_decode_udp_has_no_tcp_header() {
        let mut frame = BytesMut::new();
        eth().write(&mut frame);
        Ipv4Header::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, IP_PROTO_UDP).write(&mut frame);
        frame.put_bytes(0, 8);

        assert!(matches!(
            decode(&frame).unwrap(),
            DecodedFrame::Ipv4 { tcp: None, .. }
        ));
    }

    #[test]
    fn test_decode_truncated_tcp() {
        let frame = syn_frame();
        let err = decode(&frame[..frame.len() - 4]).unwrap_err();
        assert!(matches!(err, PacketError::Truncated { layer: "tcp", .. }));
    }

    #[test]
    fn test_decode_runt_frame() {
        assert!(decode(&[0u8; 6]).is_err());
    }
}
