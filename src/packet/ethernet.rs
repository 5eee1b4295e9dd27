//! Ethernet II header and MAC addresses.

use super::error::{PacketError, PacketResult};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// IPv4 ethertype.
pub const ETH_TYPE_IPV4: u16 = 0x0800;
/// ARP ethertype.
pub const ETH_TYPE_ARP: u16 = 0x0806;
/// 802.1Q VLAN tag.
pub const ETH_TYPE_VLAN: u16 = 0x8100;
/// IPv6 ethertype.
pub const ETH_TYPE_IPV6: u16 = 0x86dd;
/// Link Layer Discovery Protocol.
pub const ETH_TYPE_LLDP: u16 = 0x88cc;

/// Length of an untagged Ethernet header.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// A 48-bit link-layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// The all-zero address, used as the unknown target in ARP requests.
    pub const ZERO: Self = Self([0; 6]);

    /// Create an address from its six octets.
    #[must_use]
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self([a, b, c, d, e, f])
    }

    /// Raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether this is the broadcast address.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub(crate) fn read(buf: &mut impl Buf) -> Self {
        let mut octets = [0u8; 6];
        buf.copy_to_slice(&mut octets);
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);

        for octet in &mut octets {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| PacketError::InvalidMac(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| PacketError::InvalidMac(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(PacketError::InvalidMac(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An Ethernet II header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination address.
    pub dst: MacAddr,
    /// Source address.
    pub src: MacAddr,
    /// Payload ethertype.
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Parse a header, leaving `buf` positioned at the payload.
    pub fn parse(buf: &mut impl Buf) -> PacketResult<Self> {
        if buf.remaining() < ETHERNET_HEADER_LEN {
            return Err(PacketError::truncated(
                "ethernet",
                ETHERNET_HEADER_LEN,
                buf.remaining(),
            ));
        }

        let dst = MacAddr::read(buf);
        let src = MacAddr::read(buf);
        let ethertype = buf.get_u16();

        Ok(Self {
            dst,
            src,
            ethertype,
        })
    }

    /// Serialize the header.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.dst.0);
        buf.put_slice(&self.src.0);
        buf.put_u16(self.ethertype);
    }
}
