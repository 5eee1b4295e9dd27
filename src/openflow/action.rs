//! Actions and instructions.

use super::error::{OpenFlowError, OpenFlowResult};
use super::oxm::{ensure, padding_for, OxmField};
use crate::packet::MacAddr;
use bytes::{Buf, BufMut, Bytes};
use std::net::Ipv4Addr;

/// `OFPP_CONTROLLER`: send to the controller.
pub const OFPP_CONTROLLER: u32 = 0xffff_fffd;
/// `OFPP_ANY`: wildcard port for deletes.
pub const OFPP_ANY: u32 = 0xffff_ffff;
/// `OFPCML_NO_BUFFER`: send the whole packet to the controller.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

const OFPAT_OUTPUT: u16 = 0;
const OFPAT_SET_FIELD: u16 = 25;
const OFPIT_APPLY_ACTIONS: u16 = 4;

const OUTPUT_ACTION_LEN: usize = 16;

/// An action applied to a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Forward out of a port.
    Output {
        /// Output port.
        port: u32,
        /// Bytes to send when outputting to the controller.
        max_len: u16,
    },
    /// Rewrite a header field.
    SetField(OxmField),
    /// An action the balancer does not interpret.
    Other {
        /// Action type.
        action_type: u16,
        /// Body following the type/length header.
        body: Bytes,
    },
}

impl Action {
    /// Output to a switch port.
    #[must_use]
    pub fn output(port: u32) -> Self {
        Self::Output { port, max_len: 0 }
    }

    /// Output whole packets to the controller.
    #[must_use]
    pub fn to_controller() -> Self {
        Self::Output {
            port: OFPP_CONTROLLER,
            max_len: OFPCML_NO_BUFFER,
        }
    }

    /// Rewrite the Ethernet source.
    #[must_use]
    pub fn set_eth_src(mac: MacAddr) -> Self {
        Self::SetField(OxmField::EthSrc(mac))
    }

    /// Rewrite the Ethernet destination.
    #[must_use]
    pub fn set_eth_dst(mac: MacAddr) -> Self {
        Self::SetField(OxmField::EthDst(mac))
    }

    /// Rewrite the IPv4 source.
    #[must_use]
    pub fn set_ipv4_src(addr: Ipv4Addr) -> Self {
        Self::SetField(OxmField::Ipv4Src(addr))
    }

    /// Rewrite the IPv4 destination.
    #[must_use]
    pub fn set_ipv4_dst(addr: Ipv4Addr) -> Self {
        Self::SetField(OxmField::Ipv4Dst(addr))
    }

    /// Encoded length including padding.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Output { .. } => OUTPUT_ACTION_LEN,
            Self::SetField(field) => {
                let len = 4 + field.encoded_len();
                len + padding_for(len)
            },
            Self::Other { body, .. } => 4 + body.len(),
        }
    }

    /// Serialize the action.
    pub fn write(&self, buf: &mut impl BufMut) {
        match self {
            Self::Output { port, max_len } => {
                buf.put_u16(OFPAT_OUTPUT);
                buf.put_u16(OUTPUT_ACTION_LEN as u16);
                buf.put_u32(*port);
                buf.put_u16(*max_len);
                buf.put_bytes(0, 6);
            },
            Self::SetField(field) => {
                let unpadded = 4 + field.encoded_len();
                buf.put_u16(OFPAT_SET_FIELD);
                buf.put_u16(self.encoded_len() as u16);
                field.write(buf);
                buf.put_bytes(0, padding_for(unpadded));
            },
            Self::Other { action_type, body } => {
                buf.put_u16(*action_type);
                buf.put_u16((4 + body.len()) as u16);
                buf.put_slice(body);
            },
        }
    }

    /// Parse one action.
    pub fn parse(buf: &mut impl Buf) -> OpenFlowResult<Self> {
        ensure(buf.remaining(), 4, "action header")?;
        let action_type = buf.get_u16();
        let len = usize::from(buf.get_u16());
        if len < 4 || len % 8 != 0 {
            return Err(OpenFlowError::InvalidLength {
                what: "action",
                length: len,
            });
        }
        ensure(buf.remaining(), len - 4, "action body")?;
        let mut body = buf.copy_to_bytes(len - 4);

        match action_type {
            OFPAT_OUTPUT if len == OUTPUT_ACTION_LEN => Ok(Self::Output {
                port: body.get_u32(),
                max_len: body.get_u16(),
            }),
            OFPAT_SET_FIELD => Ok(Self::SetField(OxmField::parse(&mut body)?)),
            _ => Ok(Self::Other { action_type, body }),
        }
    }

    /// Serialize a list of actions.
    pub fn write_all(actions: &[Action], buf: &mut impl BufMut) {
        for action in actions {
            action.write(buf);
        }
    }

    /// Total encoded length of a list of actions.
    #[must_use]
    pub fn list_len(actions: &[Action]) -> usize {
        actions.iter().map(Action::encoded_len).sum()
    }

    /// Parse actions until `buf` is exhausted.
    pub fn parse_all(buf: &mut impl Buf) -> OpenFlowResult<Vec<Action>> {
        let mut actions = Vec::new();
        while buf.has_remaining() {
            actions.push(Self::parse(buf)?);
        }
        Ok(actions)
    }
}

/// A flow-table instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Apply the actions immediately.
    ApplyActions(Vec<Action>),
    /// An instruction the balancer does not interpret.
    Other {
        /// Instruction type.
        instruction_type: u16,
        /// Body following the type/length header.
        body: Bytes,
    },
}

impl Instruction {
    /// Encoded length.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::ApplyActions(actions) => 8 + Action::list_len(actions),
            Self::Other { body, .. } => 4 + body.len(),
        }
    }

    /// Serialize the instruction.
    pub fn write(&self, buf: &mut impl BufMut) {
        match self {
            Self::ApplyActions(actions) => {
                buf.put_u16(OFPIT_APPLY_ACTIONS);
                buf.put_u16(self.encoded_len() as u16);
                buf.put_bytes(0, 4);
                Action::write_all(actions, buf);
            },
            Self::Other {
                instruction_type,
                body,
            } => {
                buf.put_u16(*instruction_type);
                buf.put_u16((4 + body.len()) as u16);
                buf.put_slice(body);
            },
        }
    }

    /// Parse one instruction.
    pub fn parse(buf: &mut impl Buf) -> OpenFlowResult<Self> {
        ensure(buf.remaining(), 4, "instruction header")?;
        let instruction_type = buf.get_u16();
        let len = usize::from(buf.get_u16());
        if len < 4 {
            return Err(OpenFlowError::InvalidLength {
                what: "instruction",
                length: len,
            });
        }
        ensure(buf.remaining(), len - 4, "instruction body")?;
        let mut body = buf.copy_to_bytes(len - 4);

        if instruction_type == OFPIT_APPLY_ACTIONS && body.len() >= 4 {
            body.advance(4);
            return Ok(Self::ApplyActions(Action::parse_all(&mut body)?));
        }

        Ok(Self::Other {
            instruction_type,
            body,
        })
    }
}
