//! IPv4 header.

use super::error::{PacketError, PacketResult};
use bytes::{Buf, BufMut};
use std::net::Ipv4Addr;

/// ICMP protocol number.
pub const IP_PROTO_ICMP: u8 = 1;
/// TCP protocol number.
pub const IP_PROTO_TCP: u8 = 6;
/// UDP protocol number.
pub const IP_PROTO_UDP: u8 = 17;

/// Length of an IPv4 header without options.
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// An IPv4 header. Options are skipped on parse and never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes (IHL * 4).
    pub header_len: usize,
    /// DSCP/ECN byte.
    pub tos: u8,
    /// Total datagram length.
    pub total_len: u16,
    /// Identification.
    pub identification: u16,
    /// Flags and fragment offset.
    pub flags_fragment: u16,
    /// Time to live.
    pub ttl: u8,
    /// Payload protocol.
    pub protocol: u8,
    /// Header checksum as received.
    pub checksum: u16,
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Create a header with sensible defaults for a synthesized datagram.
    #[must_use]
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8) -> Self {
        Self {
            header_len: IPV4_MIN_HEADER_LEN,
            tos: 0,
            total_len: IPV4_MIN_HEADER_LEN as u16,
            identification: 0,
            flags_fragment: 0x4000,
            ttl: 64,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    /// Parse a header, leaving `buf` positioned at the payload.
    pub fn parse(buf: &mut impl Buf) -> PacketResult<Self> {
        if buf.remaining() < IPV4_MIN_HEADER_LEN {
            return Err(PacketError::truncated(
                "ipv4",
                IPV4_MIN_HEADER_LEN,
                buf.remaining(),
            ));
        }

        let version_ihl = buf.get_u8();
        let version = version_ihl >> 4;
        if version != 4 {
            return Err(PacketError::malformed("ipv4", format!("version {version}")));
        }

        let header_len = usize::from(version_ihl & 0x0f) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(PacketError::malformed(
                "ipv4",
                format!("header length {header_len}"),
            ));
        }

        let tos = buf.get_u8();
        let total_len = buf.get_u16();
        let identification = buf.get_u16();
        let flags_fragment = buf.get_u16();
        let ttl = buf.get_u8();
        let protocol = buf.get_u8();
        let checksum = buf.get_u16();
        let src = Ipv4Addr::from(buf.get_u32());
        let dst = Ipv4Addr::from(buf.get_u32());

        let options_len = header_len - IPV4_MIN_HEADER_LEN;
        if buf.remaining() < options_len {
            return Err(PacketError::truncated(
                "ipv4 options",
                options_len,
                buf.remaining(),
            ));
        }
        buf.advance(options_len);

        Ok(Self {
            header_len,
            tos,
            total_len,
            identification,
            flags_fragment,
            ttl,
            protocol,
            checksum,
            src,
            dst,
        })
    }

    /// Whether this datagram is a non-first fragment (no L4 header present).
    #[must_use]
    pub fn is_later_fragment(&self) -> bool {
        self.flags_fragment & 0x1fff != 0
    }

    /// Serialize a 20-byte header with a freshly computed checksum.
    pub fn write(&self, buf: &mut impl BufMut) {
        let mut raw = [0u8; IPV4_MIN_HEADER_LEN];
        {
            let mut out = &mut raw[..];
            out.put_u8(0x45);
            out.put_u8(self.tos);
            out.put_u16(self.total_len);
            out.put_u16(self.identification);
            out.put_u16(self.flags_fragment);
            out.put_u8(self.ttl);
            out.put_u8(self.protocol);
            out.put_u16(0);
            out.put_u32(self.src.into());
            out.put_u32(self.dst.into());
        }
        let sum = checksum(&raw);
        raw[10..12].copy_from_slice(&sum.to_be_bytes());
        buf.put_slice(&raw);
    }
}

/// Internet checksum (RFC 1071) over `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    finish_checksum(sum_words(0, data))
}

pub(crate) fn sum_words(mut acc: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        acc += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        acc += u32::from(*last) << 8;
    }
    acc
}

pub(crate) fn finish_checksum(mut acc: u32) -> u16 {
    while acc >> 16 != 0 {
        acc = (acc & 0xffff) + (acc >> 16);
    }
    !(acc as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_written_header_checksums_to_zero() {
        let mut header = Ipv4Header::new(
            Ipv4Addr::new(10, 0, 0, 4),
            Ipv4Addr::new(10, 0, 0, 100),
            IP_PROTO_TCP,
        );
        header.total_len = 40;

        let mut buf = BytesMut::new();
        header.write(&mut buf);
        assert_eq!(buf.len(), 20);
        assert_eq!(checksum(&buf), 0);

        let parsed = Ipv4Header::parse(&mut &buf[..]).unwrap();
        assert_eq!(parsed.src, Ipv4Addr::new(10, 0, 0, 4));
        assert_eq!(parsed.dst, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(parsed.protocol, IP_PROTO_TCP);
        assert_eq!(parsed.total_len, 40);
    }

    #[test]
    fn test_parse_skips_options() {
        let mut buf = BytesMut::new();
        Ipv4Header::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, IP_PROTO_UDP).write(&mut buf);
        buf[0] = 0x46;
        buf.extend_from_slice(&[1, 1, 1, 1, 0xee]);

        let mut cursor = &buf[..];
        let parsed = Ipv4Header::parse(&mut cursor).unwrap();
        assert_eq!(parsed.header_len, 24);
        assert_eq!(cursor, &[0xee]);
    }

    #[test]
    fn test_parse_rejects_bad_version_and_ihl() {
        let mut buf = BytesMut::new();
        Ipv4Header::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, IP_PROTO_TCP).write(&mut buf);

        let mut v6 = buf.clone();
        v6[0] = 0x65;
        assert!(matches!(
            Ipv4Header::parse(&mut &v6[..]),
            Err(PacketError::Malformed { .. })
        ));

        let mut short_ihl = buf.clone();
        short_ihl[0] = 0x44;
        assert!(matches!(
            Ipv4Header::parse(&mut &short_ihl[..]),
            Err(PacketError::Malformed { .. })
        ));
    }

    #[test]
    fn test_checksum_odd_length() {
        assert_eq!(checksum(&[0xff]), !0xff00);
    }
}
