//! OXM match fields and the `ofp_match` structure.

use super::error::{OpenFlowError, OpenFlowResult};
use crate::packet::MacAddr;
use bytes::{Buf, BufMut, Bytes};
use std::net::Ipv4Addr;

/// `OFPXMC_OPENFLOW_BASIC`.
pub const OXM_CLASS_OPENFLOW_BASIC: u16 = 0x8000;

const OFPMT_OXM: u16 = 1;

const OXM_IN_PORT: u8 = 0;
const OXM_ETH_DST: u8 = 3;
const OXM_ETH_SRC: u8 = 4;
const OXM_ETH_TYPE: u8 = 5;
const OXM_IP_PROTO: u8 = 10;
const OXM_IPV4_SRC: u8 = 11;
const OXM_IPV4_DST: u8 = 12;
const OXM_TCP_SRC: u8 = 13;
const OXM_TCP_DST: u8 = 14;

pub(crate) fn ensure(available: usize, needed: usize, what: &'static str) -> OpenFlowResult<()> {
    if available < needed {
        return Err(OpenFlowError::Truncated {
            what,
            needed,
            available,
        });
    }
    Ok(())
}

pub(crate) fn padding_for(len: usize) -> usize {
    (8 - len % 8) % 8
}

/// A single exact-match OXM field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OxmField {
    /// Switch input port.
    InPort(u32),
    /// Ethernet destination.
    EthDst(MacAddr),
    /// Ethernet source.
    EthSrc(MacAddr),
    /// Ethernet type.
    EthType(u16),
    /// IP protocol.
    IpProto(u8),
    /// IPv4 source.
    Ipv4Src(Ipv4Addr),
    /// IPv4 destination.
    Ipv4Dst(Ipv4Addr),
    /// TCP source port.
    TcpSrc(u16),
    /// TCP destination port.
    TcpDst(u16),
    /// A field the balancer does not interpret.
    Other {
        /// OXM class.
        class: u16,
        /// Field number.
        field: u8,
        /// Whether a mask follows the value.
        has_mask: bool,
        /// Value (and mask) bytes.
        payload: Bytes,
    },
}

impl OxmField {
    fn class_and_field(&self) -> (u16, u8, bool) {
        match self {
            Self::InPort(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_IN_PORT, false),
            Self::EthDst(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_ETH_DST, false),
            Self::EthSrc(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_ETH_SRC, false),
            Self::EthType(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_ETH_TYPE, false),
            Self::IpProto(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_IP_PROTO, false),
            Self::Ipv4Src(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_IPV4_SRC, false),
            Self::Ipv4Dst(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_IPV4_DST, false),
            Self::TcpSrc(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_TCP_SRC, false),
            Self::TcpDst(_) => (OXM_CLASS_OPENFLOW_BASIC, OXM_TCP_DST, false),
            Self::Other {
                class,
                field,
                has_mask,
                ..
            } => (*class, *field, *has_mask),
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::InPort(_) | Self::Ipv4Src(_) | Self::Ipv4Dst(_) => 4,
            Self::EthDst(_) | Self::EthSrc(_) => 6,
            Self::EthType(_) | Self::TcpSrc(_) | Self::TcpDst(_) => 2,
            Self::IpProto(_) => 1,
            Self::Other { payload, .. } => payload.len(),
        }
    }

    /// Encoded length including the 4-byte OXM header.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + self.payload_len()
    }

    /// Serialize the field.
    pub fn write(&self, buf: &mut impl BufMut) {
        let (class, field, has_mask) = self.class_and_field();
        buf.put_u16(class);
        buf.put_u8((field << 1) | u8::from(has_mask));
        buf.put_u8(self.payload_len() as u8);

        match self {
            Self::InPort(port) => buf.put_u32(*port),
            Self::EthDst(mac) | Self::EthSrc(mac) => buf.put_slice(&mac.octets()),
            Self::EthType(value) | Self::TcpSrc(value) | Self::TcpDst(value) => {
                buf.put_u16(*value)
            },
            Self::IpProto(proto) => buf.put_u8(*proto),
            Self::Ipv4Src(addr) | Self::Ipv4Dst(addr) => buf.put_u32((*addr).into()),
            Self::Other { payload, .. } => buf.put_slice(payload),
        }
    }

    /// Parse one field.
    pub fn parse(buf: &mut impl Buf) -> OpenFlowResult<Self> {
        ensure(buf.remaining(), 4, "oxm header")?;
        let class = buf.get_u16();
        let field_mask = buf.get_u8();
        let len = usize::from(buf.get_u8());
        ensure(buf.remaining(), len, "oxm value")?;

        let field = field_mask >> 1;
        let has_mask = field_mask & 1 == 1;

        let expected = match (class, field, has_mask) {
            (OXM_CLASS_OPENFLOW_BASIC, OXM_IN_PORT | OXM_IPV4_SRC | OXM_IPV4_DST, false) => 4,
            (OXM_CLASS_OPENFLOW_BASIC, OXM_ETH_DST | OXM_ETH_SRC, false) => 6,
            (OXM_CLASS_OPENFLOW_BASIC, OXM_ETH_TYPE | OXM_TCP_SRC | OXM_TCP_DST, false) => 2,
            (OXM_CLASS_OPENFLOW_BASIC, OXM_IP_PROTO, false) => 1,
            _ => {
                return Ok(Self::Other {
                    class,
                    field,
                    has_mask,
                    payload: buf.copy_to_bytes(len),
                })
            },
        };

        if len != expected {
            return Err(OpenFlowError::InvalidLength {
                what: "oxm value",
                length: len,
            });
        }

        Ok(match field {
            OXM_IN_PORT => Self::InPort(buf.get_u32()),
            OXM_ETH_DST => Self::EthDst(MacAddr::read(buf)),
            OXM_ETH_SRC => Self::EthSrc(MacAddr::read(buf)),
            OXM_ETH_TYPE => Self::EthType(buf.get_u16()),
            OXM_IP_PROTO => Self::IpProto(buf.get_u8()),
            OXM_IPV4_SRC => Self::Ipv4Src(Ipv4Addr::from(buf.get_u32())),
            OXM_IPV4_DST => Self::Ipv4Dst(Ipv4Addr::from(buf.get_u32())),
            OXM_TCP_SRC => Self::TcpSrc(buf.get_u16()),
            _ => Self::TcpDst(buf.get_u16()),
        })
    }
}

/// An `ofp_match` of type OXM. An empty match wildcards everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    fields: Vec<OxmField>,
}

impl Match {
    /// Create an empty (match-all) match.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn with(mut self, field: OxmField) -> Self {
        self.fields.push(field);
        self
    }

    /// Match on input port.
    #[must_use]
    pub fn in_port(self, port: u32) -> Self {
        self.with(OxmField::InPort(port))
    }

    /// Match on ethertype.
    #[must_use]
    pub fn eth_type(self, ethertype: u16) -> Self {
        self.with(OxmField::EthType(ethertype))
    }

    /// Match on IP protocol.
    #[must_use]
    pub fn ip_proto(self, proto: u8) -> Self {
        self.with(OxmField::IpProto(proto))
    }

    /// Match on IPv4 source.
    #[must_use]
    pub fn ipv4_src(self, addr: Ipv4Addr) -> Self {
        self.with(OxmField::Ipv4Src(addr))
    }

    /// Match on IPv4 destination.
    #[must_use]
    pub fn ipv4_dst(self, addr: Ipv4Addr) -> Self {
        self.with(OxmField::Ipv4Dst(addr))
    }

    /// Match on TCP source port.
    #[must_use]
    pub fn tcp_src(self, port: u16) -> Self {
        self.with(OxmField::TcpSrc(port))
    }

    /// Match on TCP destination port.
    #[must_use]
    pub fn tcp_dst(self, port: u16) -> Self {
        self.with(OxmField::TcpDst(port))
    }

    /// The fields of this match, in wire order.
    #[must_use]
    pub fn fields(&self) -> &[OxmField] {
        &self.fields
    }

    /// Number of fields present. More fields means a more specific rule.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.fields.len()
    }

    /// The `IN_PORT` field, if present.
    #[must_use]
    pub fn get_in_port(&self) -> Option<u32> {
        self.fields.iter().find_map(|f| match f {
            OxmField::InPort(port) => Some(*port),
            _ => None,
        })
    }

    fn unpadded_len(&self) -> usize {
        4 + self.fields.iter().map(OxmField::encoded_len).sum::<usize>()
    }

    /// Encoded length including trailing padding.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let len = self.unpadded_len();
        len + padding_for(len)
    }

    /// Serialize the match with trailing padding.
    pub fn write(&self, buf: &mut impl BufMut) {
        let len = self.unpadded_len();
        buf.put_u16(OFPMT_OXM);
        buf.put_u16(len as u16);
        for field in &self.fields {
            field.write(buf);
        }
        buf.put_bytes(0, padding_for(len));
    }

    /// Parse a match, consuming its trailing padding.
    pub fn parse(buf: &mut impl Buf) -> OpenFlowResult<Self> {
        ensure(buf.remaining(), 4, "ofp_match")?;
        let match_type = buf.get_u16();
        let len = usize::from(buf.get_u16());
        if match_type != OFPMT_OXM || len < 4 {
            return Err(OpenFlowError::InvalidLength {
                what: "ofp_match",
                length: len,
            });
        }

        let body_len = len - 4;
        ensure(buf.remaining(), body_len + padding_for(len), "ofp_match body")?;
        let mut body = buf.copy_to_bytes(body_len);
        buf.advance(padding_for(len));

        let mut fields = Vec::new();
        while body.has_remaining() {
            fields.push(OxmField::parse(&mut body)?);
        }

        Ok(Self { fields })
    }
}
