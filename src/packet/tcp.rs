//! TCP header.

use super::error::{PacketError, PacketResult};
use bytes::{Buf, BufMut};
use std::fmt;

/// Length of a TCP header without options.
pub const TCP_MIN_HEADER_LEN: usize = 20;

/// TCP control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    /// No more data from sender.
    pub const FIN: Self = Self(0x01);
    /// Synchronize sequence numbers.
    pub const SYN: Self = Self(0x02);
    /// Reset the connection.
    pub const RST: Self = Self(0x04);
    /// Push function.
    pub const PSH: Self = Self(0x08);
    /// Acknowledgment field significant.
    pub const ACK: Self = Self(0x10);
    /// Urgent pointer field significant.
    pub const URG: Self = Self(0x20);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// FIN or RST: the segment ends the connection.
    #[must_use]
    pub fn is_teardown(self) -> bool {
        self.intersects(Self::FIN | Self::RST)
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TcpFlags, &str); 6] = [
            (TcpFlags::SYN, "SYN"),
            (TcpFlags::ACK, "ACK"),
            (TcpFlags::FIN, "FIN"),
            (TcpFlags::RST, "RST"),
            (TcpFlags::PSH, "PSH"),
            (TcpFlags::URG, "URG"),
        ];

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// A TCP header. Options are skipped on parse and never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Source port.
    pub src_port: u16,
    /// Destination port.
    pub dst_port: u16,
    /// Sequence number.
    pub seq: u32,
    /// Acknowledgment number.
    pub ack: u32,
    /// Header length in bytes.
    pub header_len: usize,
    /// Control bits.
    pub flags: TcpFlags,
    /// Receive window.
    pub window: u16,
    /// Checksum as received.
    pub checksum: u16,
    /// Urgent pointer.
    pub urgent: u16,
}

impl TcpHeader {
    /// Create a header for a synthesized segment.
    #[must_use]
    pub fn new(src_port: u16, dst_port: u16, flags: TcpFlags) -> Self {
        Self {
            src_port,
            dst_port,
            seq: 0,
            ack: 0,
            header_len: TCP_MIN_HEADER_LEN,
            flags,
            window: 65535,
            checksum: 0,
            urgent: 0,
        }
    }

    /// Parse a header, leaving `buf` positioned at the payload.
    pub fn parse(buf: &mut impl Buf) -> PacketResult<Self> {
        if buf.remaining() < TCP_MIN_HEADER_LEN {
            return Err(PacketError::truncated(
                "tcp",
                TCP_MIN_HEADER_LEN,
                buf.remaining(),
            ));
        }

        let src_port = buf.get_u16();
        let dst_port = buf.get_u16();
        let seq = buf.get_u32();
        let ack = buf.get_u32();
        let offset_flags = buf.get_u16();
        let window = buf.get_u16();
        let checksum = buf.get_u16();
        let urgent = buf.get_u16();

        let header_len = usize::from(offset_flags >> 12) * 4;
        if header_len < TCP_MIN_HEADER_LEN {
            return Err(PacketError::malformed(
                "tcp",
                format!("data offset {}", header_len / 4),
            ));
        }

        let options_len = header_len - TCP_MIN_HEADER_LEN;
        if buf.remaining() < options_len {
            return Err(PacketError::truncated(
                "tcp options",
                options_len,
                buf.remaining(),
            ));
        }
        buf.advance(options_len);

        Ok(Self {
            src_port,
            dst_port,
            seq,
            ack,
            header_len,
            flags: TcpFlags((offset_flags & 0x3f) as u8),
            window,
            checksum,
            urgent,
        })
    }

    /// Serialize a 20-byte header using the stored checksum.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u16((5 << 12) | u16::from(self.flags.0));
        buf.put_u16(self.window);
        buf.put_u16(self.checksum);
        buf.put_u16(self.urgent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_flags() {
        let fin_ack = TcpFlags::FIN | TcpFlags::ACK;
        assert!(fin_ack.is_teardown());
        assert!(fin_ack.contains(TcpFlags::ACK));
        assert!(!fin_ack.contains(TcpFlags::SYN));
        assert!(TcpFlags::RST.is_teardown());
        assert!(!(TcpFlags::SYN | TcpFlags::ACK).is_teardown());
        assert_eq!(fin_ack.to_string(), "[ACK|FIN]");
    }

    #[test]
    fn test_parse_written_header() {
        let mut header = TcpHeader::new(40000, 8080, TcpFlags::SYN);
        header.seq = 7;

        let mut buf = BytesMut::new();
        header.write(&mut buf);
        buf.extend_from_slice(b"GET");

        let mut cursor = &buf[..];
        let parsed = TcpHeader::parse(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(cursor, b"GET");
    }

    #[test]
    fn test_parse_rejects_short_offset() {
        let mut buf = BytesMut::new();
        TcpHeader::new(1, 2, TcpFlags::ACK).write(&mut buf);
        buf[12] = 0x40;

        let err = TcpHeader::parse(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PacketError::Malformed { layer: "tcp", .. }));
    }

    #[test]
    fn test_parse_truncated_options() {
        let mut buf = BytesMut::new();
        TcpHeader::new(1, 2, TcpFlags::ACK).write(&mut buf);
        buf[12] = 0x80;

        let err = TcpHeader::parse(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PacketError::Truncated { .. }));
    }
}
