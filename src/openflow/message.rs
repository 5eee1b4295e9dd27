//! OpenFlow 1.3 message framing and the message subset the balancer uses.

use super::action::{Action, Instruction, OFPP_ANY};
use super::error::{OpenFlowError, OpenFlowResult};
use super::oxm::{ensure, Match};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// OpenFlow 1.3 wire version.
pub const OFP_VERSION: u8 = 0x04;
/// Length of the common header.
pub const OFP_HEADER_LEN: usize = 8;
/// `OFP_NO_BUFFER`: the packet is carried in the message, not buffered.
pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;
/// `OFPG_ANY`: wildcard group for deletes.
pub const OFPG_ANY: u32 = 0xffff_ffff;
/// Largest message the length field can describe.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// OpenFlow message types handled by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Version negotiation.
    Hello = 0,
    /// Error report.
    Error = 1,
    /// Keepalive request.
    EchoRequest = 2,
    /// Keepalive reply.
    EchoReply = 3,
    /// Switch features request.
    FeaturesRequest = 5,
    /// Switch features reply.
    FeaturesReply = 6,
    /// Packet sent to the controller.
    PacketIn = 10,
    /// Flow entry removed.
    FlowRemoved = 11,
    /// Port added, removed or changed.
    PortStatus = 12,
    /// Packet sent by the controller.
    PacketOut = 13,
    /// Flow table modification.
    FlowMod = 14,
    /// Barrier request.
    BarrierRequest = 20,
    /// Barrier reply.
    BarrierReply = 21,
}

impl MessageType {
    /// Create a message type from its wire value.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Hello,
            1 => Self::Error,
            2 => Self::EchoRequest,
            3 => Self::EchoReply,
            5 => Self::FeaturesRequest,
            6 => Self::FeaturesReply,
            10 => Self::PacketIn,
            11 => Self::FlowRemoved,
            12 => Self::PortStatus,
            13 => Self::PacketOut,
            14 => Self::FlowMod,
            20 => Self::BarrierRequest,
            21 => Self::BarrierReply,
            _ => return None,
        })
    }
}

/// The common OpenFlow header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    /// Protocol version.
    pub version: u8,
    /// Raw message type.
    pub msg_type: u8,
    /// Total message length including this header.
    pub length: u16,
    /// Transaction id.
    pub xid: u32,
}

impl OfpHeader {
    /// Parse a header.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is shorter than a header or the length
    /// field is smaller than the header itself.
    pub fn parse(raw: &[u8]) -> OpenFlowResult<Self> {
        ensure(raw.len(), OFP_HEADER_LEN, "ofp_header")?;
        let mut buf = raw;
        let header = Self {
            version: buf.get_u8(),
            msg_type: buf.get_u8(),
            length: buf.get_u16(),
            xid: buf.get_u32(),
        };

        if usize::from(header.length) < OFP_HEADER_LEN {
            return Err(OpenFlowError::InvalidLength {
                what: "ofp_header",
                length: usize::from(header.length),
            });
        }

        Ok(header)
    }

    /// Length of the body following the header.
    #[must_use]
    pub fn body_len(&self) -> usize {
        usize::from(self.length) - OFP_HEADER_LEN
    }
}

/// Contents of a FEATURES_REPLY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFeatures {
    /// Datapath id.
    pub datapath_id: u64,
    /// Max packets buffered at once.
    pub n_buffers: u32,
    /// Number of tables.
    pub n_tables: u8,
    /// Auxiliary connection id.
    pub auxiliary_id: u8,
    /// Capability bitmap.
    pub capabilities: u32,
}

/// Why a packet was sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    /// No matching flow (table-miss).
    NoMatch,
    /// Explicit output to the controller.
    Action,
    /// Invalid TTL.
    InvalidTtl,
    /// Unknown reason code.
    Other(u8),
}

impl From<u8> for PacketInReason {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoMatch,
            1 => Self::Action,
            2 => Self::InvalidTtl,
            other => Self::Other(other),
        }
    }
}

impl From<PacketInReason> for u8 {
    fn from(value: PacketInReason) -> Self {
        match value {
            PacketInReason::NoMatch => 0,
            PacketInReason::Action => 1,
            PacketInReason::InvalidTtl => 2,
            PacketInReason::Other(other) => other,
        }
    }
}

/// A PACKET_IN message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    /// Buffer id on the switch, or [`OFP_NO_BUFFER`].
    pub buffer_id: u32,
    /// Full length of the frame.
    pub total_len: u16,
    /// Why the packet was sent.
    pub reason: PacketInReason,
    /// Table that was looked up.
    pub table_id: u8,
    /// Cookie of the matching flow entry.
    pub cookie: u64,
    /// Pipeline fields, including `IN_PORT`.
    pub match_fields: Match,
    /// The frame (possibly truncated to `max_len`).
    pub data: Bytes,
}

impl PacketIn {
    /// The ingress port reported in the match.
    #[must_use]
    pub fn in_port(&self) -> Option<u32> {
        self.match_fields.get_in_port()
    }
}

/// A PACKET_OUT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    /// Buffer id on the switch, or [`OFP_NO_BUFFER`] when `data` is sent.
    pub buffer_id: u32,
    /// Port the packet arrived on (or `OFPP_CONTROLLER`).
    pub in_port: u32,
    /// Actions applied to the packet.
    pub actions: Vec<Action>,
    /// Frame bytes.
    pub data: Bytes,
}

/// FLOW_MOD command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCommand {
    /// New flow.
    Add,
    /// Modify matching flows.
    Modify,
    /// Modify the exactly matching flow.
    ModifyStrict,
    /// Delete matching flows.
    Delete,
    /// Delete the exactly matching flow.
    DeleteStrict,
    /// Unknown command.
    Other(u8),
}

impl From<u8> for FlowModCommand {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Add,
            1 => Self::Modify,
            2 => Self::ModifyStrict,
            3 => Self::Delete,
            4 => Self::DeleteStrict,
            other => Self::Other(other),
        }
    }
}

impl From<FlowModCommand> for u8 {
    fn from(value: FlowModCommand) -> Self {
        match value {
            FlowModCommand::Add => 0,
            FlowModCommand::Modify => 1,
            FlowModCommand::ModifyStrict => 2,
            FlowModCommand::Delete => 3,
            FlowModCommand::DeleteStrict => 4,
            FlowModCommand::Other(other) => other,
        }
    }
}

/// A FLOW_MOD message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    /// Opaque controller cookie.
    pub cookie: u64,
    /// Cookie mask for modify/delete.
    pub cookie_mask: u64,
    /// Target table.
    pub table_id: u8,
    /// Command.
    pub command: FlowModCommand,
    /// Idle timeout in seconds (0 = none).
    pub idle_timeout: u16,
    /// Hard timeout in seconds (0 = none).
    pub hard_timeout: u16,
    /// Priority.
    pub priority: u16,
    /// Buffered packet to apply to, or [`OFP_NO_BUFFER`].
    pub buffer_id: u32,
    /// Output port filter for deletes.
    pub out_port: u32,
    /// Output group filter for deletes.
    pub out_group: u32,
    /// `OFPFF_*` flags.
    pub flags: u16,
    /// Match.
    pub match_fields: Match,
    /// Instructions.
    pub instructions: Vec<Instruction>,
}

impl FlowMod {
    /// An ADD that applies `actions` to packets matching `match_fields`.
    #[must_use]
    pub fn add(priority: u16, match_fields: Match, actions: Vec<Action>, idle_timeout: u16) -> Self {
        Self {
            cookie: 0,
            cookie_mask: 0,
            table_id: 0,
            command: FlowModCommand::Add,
            idle_timeout,
            hard_timeout: 0,
            priority,
            buffer_id: OFP_NO_BUFFER,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
            flags: 0,
            match_fields,
            instructions: vec![Instruction::ApplyActions(actions)],
        }
    }

    /// A DELETE_STRICT removing the entry with exactly this priority and match.
    #[must_use]
    pub fn delete_strict(priority: u16, match_fields: Match) -> Self {
        Self {
            command: FlowModCommand::DeleteStrict,
            instructions: Vec::new(),
            ..Self::add(priority, match_fields, Vec::new(), 0)
        }
    }

    /// Actions of the first APPLY_ACTIONS instruction.
    #[must_use]
    pub fn apply_actions(&self) -> &[Action] {
        self.instructions
            .iter()
            .find_map(|i| match i {
                Instruction::ApplyActions(actions) => Some(actions.as_slice()),
                Instruction::Other { .. } => None,
            })
            .unwrap_or(&[])
    }
}

/// A decoded OpenFlow message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfpMessage {
    /// HELLO (elements are ignored).
    Hello,
    /// ERROR.
    Error {
        /// `ofp_error_type`.
        error_type: u16,
        /// Type-specific code.
        code: u16,
        /// Leading bytes of the offending request.
        data: Bytes,
    },
    /// ECHO_REQUEST.
    EchoRequest(Bytes),
    /// ECHO_REPLY.
    EchoReply(Bytes),
    /// FEATURES_REQUEST.
    FeaturesRequest,
    /// FEATURES_REPLY.
    FeaturesReply(SwitchFeatures),
    /// PACKET_IN.
    PacketIn(PacketIn),
    /// FLOW_REMOVED (summary only).
    FlowRemoved {
        /// Cookie of the removed entry.
        cookie: u64,
        /// Priority of the removed entry.
        priority: u16,
        /// `ofp_flow_removed_reason`.
        reason: u8,
    },
    /// PORT_STATUS (summary only).
    PortStatus {
        /// `ofp_port_reason`.
        reason: u8,
        /// Affected port.
        port_no: u32,
    },
    /// PACKET_OUT.
    PacketOut(PacketOut),
    /// FLOW_MOD.
    FlowMod(FlowMod),
    /// BARRIER_REQUEST.
    BarrierRequest,
    /// BARRIER_REPLY.
    BarrierReply,
    /// Any other message type, ignored.
    Unknown {
        /// Raw type.
        msg_type: u8,
    },
}

impl OfpMessage {
    /// The wire type of this message.
    #[must_use]
    pub fn msg_type(&self) -> u8 {
        let t = match self {
            Self::Hello => MessageType::Hello,
            Self::Error { .. } => MessageType::Error,
            Self::EchoRequest(_) => MessageType::EchoRequest,
            Self::EchoReply(_) => MessageType::EchoReply,
            Self::FeaturesRequest => MessageType::FeaturesRequest,
            Self::FeaturesReply(_) => MessageType::FeaturesReply,
            Self::PacketIn(_) => MessageType::PacketIn,
            Self::FlowRemoved { .. } => MessageType::FlowRemoved,
            Self::PortStatus { .. } => MessageType::PortStatus,
            Self::PacketOut(_) => MessageType::PacketOut,
            Self::FlowMod(_) => MessageType::FlowMod,
            Self::BarrierRequest => MessageType::BarrierRequest,
            Self::BarrierReply => MessageType::BarrierReply,
            Self::Unknown { msg_type } => return *msg_type,
        };
        t as u8
    }

    /// Encode the message, header included.
    ///
    /// # Errors
    ///
    /// Returns [`OpenFlowError::InvalidLength`] when the encoded message
    /// does not fit the 16-bit header length.
    pub fn encode(&self, xid: u32) -> OpenFlowResult<Bytes> {
        let mut body = BytesMut::new();
        self.write_body(&mut body);

        let length = OFP_HEADER_LEN + body.len();
        let wire_length = u16::try_from(length).map_err(|_| OpenFlowError::InvalidLength {
            what: "ofp_header",
            length,
        })?;

        let mut buf = BytesMut::with_capacity(length);
        buf.put_u8(OFP_VERSION);
        buf.put_u8(self.msg_type());
        buf.put_u16(wire_length);
        buf.put_u32(xid);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    fn write_body(&self, buf: &mut BytesMut) {
        match self {
            Self::Hello
            | Self::FeaturesRequest
            | Self::BarrierRequest
            | Self::BarrierReply
            | Self::Unknown { .. } => {},
            Self::Error {
                error_type,
                code,
                data,
            } => {
                buf.put_u16(*error_type);
                buf.put_u16(*code);
                buf.put_slice(data);
            },
            Self::EchoRequest(data) | Self::EchoReply(data) => buf.put_slice(data),
            Self::FeaturesReply(features) => {
                buf.put_u64(features.datapath_id);
                buf.put_u32(features.n_buffers);
                buf.put_u8(features.n_tables);
                buf.put_u8(features.auxiliary_id);
                buf.put_bytes(0, 2);
                buf.put_u32(features.capabilities);
                buf.put_u32(0);
            },
            Self::PacketIn(packet_in) => {
                buf.put_u32(packet_in.buffer_id);
                buf.put_u16(packet_in.total_len);
                buf.put_u8(packet_in.reason.into());
                buf.put_u8(packet_in.table_id);
                buf.put_u64(packet_in.cookie);
                packet_in.match_fields.write(buf);
                buf.put_bytes(0, 2);
                buf.put_slice(&packet_in.data);
            },
            Self::FlowRemoved {
                cookie,
                priority,
                reason,
            } => {
                buf.put_u64(*cookie);
                buf.put_u16(*priority);
                buf.put_u8(*reason);
                buf.put_u8(0);
                buf.put_bytes(0, 32);
                super::oxm::Match::new().write(buf);
            },
            Self::PortStatus { reason, port_no } => {
                buf.put_u8(*reason);
                buf.put_bytes(0, 7);
                buf.put_u32(*port_no);
                buf.put_bytes(0, 60);
            },
            Self::PacketOut(packet_out) => {
                buf.put_u32(packet_out.buffer_id);
                buf.put_u32(packet_out.in_port);
                buf.put_u16(Action::list_len(&packet_out.actions) as u16);
                buf.put_bytes(0, 6);
                Action::write_all(&packet_out.actions, buf);
                buf.put_slice(&packet_out.data);
            },
            Self::FlowMod(flow_mod) => {
                buf.put_u64(flow_mod.cookie);
                buf.put_u64(flow_mod.cookie_mask);
                buf.put_u8(flow_mod.table_id);
                buf.put_u8(flow_mod.command.into());
                buf.put_u16(flow_mod.idle_timeout);
                buf.put_u16(flow_mod.hard_timeout);
                buf.put_u16(flow_mod.priority);
                buf.put_u32(flow_mod.buffer_id);
                buf.put_u32(flow_mod.out_port);
                buf.put_u32(flow_mod.out_group);
                buf.put_u16(flow_mod.flags);
                buf.put_bytes(0, 2);
                flow_mod.match_fields.write(buf);
                for instruction in &flow_mod.instructions {
                    instruction.write(buf);
                }
            },
        }
    }

    /// Decode a message body given its already-parsed header.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported version or a body that does not
    /// match the layout of its message type.
    pub fn decode(header: &OfpHeader, mut body: Bytes) -> OpenFlowResult<Self> {
        let msg_type = MessageType::from_u8(header.msg_type);

        // HELLO is the only message exchanged before versions are agreed.
        if header.version != OFP_VERSION && msg_type != Some(MessageType::Hello) {
            return Err(OpenFlowError::UnsupportedVersion(header.version));
        }

        let Some(msg_type) = msg_type else {
            return Ok(Self::Unknown {
                msg_type: header.msg_type,
            });
        };

        let buf = &mut body;
        Ok(match msg_type {
            MessageType::Hello => Self::Hello,
            MessageType::Error => {
                ensure(buf.remaining(), 4, "ofp_error_msg")?;
                Self::Error {
                    error_type: buf.get_u16(),
                    code: buf.get_u16(),
                    data: buf.split_off(0),
                }
            },
            MessageType::EchoRequest => Self::EchoRequest(body),
            MessageType::EchoReply => Self::EchoReply(body),
            MessageType::FeaturesRequest => Self::FeaturesRequest,
            MessageType::FeaturesReply => {
                ensure(buf.remaining(), 24, "ofp_switch_features")?;
                let datapath_id = buf.get_u64();
                let n_buffers = buf.get_u32();
                let n_tables = buf.get_u8();
                let auxiliary_id = buf.get_u8();
                buf.advance(2);
                let capabilities = buf.get_u32();
                Self::FeaturesReply(SwitchFeatures {
                    datapath_id,
                    n_buffers,
                    n_tables,
                    auxiliary_id,
                    capabilities,
                })
            },
            MessageType::PacketIn => {
                ensure(buf.remaining(), 16, "ofp_packet_in")?;
                let buffer_id = buf.get_u32();
                let total_len = buf.get_u16();
                let reason = PacketInReason::from(buf.get_u8());
                let table_id = buf.get_u8();
                let cookie = buf.get_u64();
                let match_fields = Match::parse(buf)?;
                ensure(buf.remaining(), 2, "ofp_packet_in pad")?;
                buf.advance(2);
                Self::PacketIn(PacketIn {
                    buffer_id,
                    total_len,
                    reason,
                    table_id,
                    cookie,
                    match_fields,
                    data: buf.split_off(0),
                })
            },
            MessageType::FlowRemoved => {
                ensure(buf.remaining(), 12, "ofp_flow_removed")?;
                Self::FlowRemoved {
                    cookie: buf.get_u64(),
                    priority: buf.get_u16(),
                    reason: buf.get_u8(),
                }
            },
            MessageType::PortStatus => {
                ensure(buf.remaining(), 12, "ofp_port_status")?;
                let reason = buf.get_u8();
                buf.advance(7);
                Self::PortStatus {
                    reason,
                    port_no: buf.get_u32(),
                }
            },
            MessageType::PacketOut => {
                ensure(buf.remaining(), 16, "ofp_packet_out")?;
                let buffer_id = buf.get_u32();
                let in_port = buf.get_u32();
                let actions_len = usize::from(buf.get_u16());
                buf.advance(6);
                ensure(buf.remaining(), actions_len, "ofp_packet_out actions")?;
                let mut actions = buf.split_to(actions_len);
                Self::PacketOut(PacketOut {
                    buffer_id,
                    in_port,
                    actions: Action::parse_all(&mut actions)?,
                    data: buf.split_off(0),
                })
            },
            MessageType::FlowMod => {
                ensure(buf.remaining(), 40, "ofp_flow_mod")?;
                let cookie = buf.get_u64();
                let cookie_mask = buf.get_u64();
                let table_id = buf.get_u8();
                let command = FlowModCommand::from(buf.get_u8());
                let idle_timeout = buf.get_u16();
                let hard_timeout = buf.get_u16();
                let priority = buf.get_u16();
                let buffer_id = buf.get_u32();
                let out_port = buf.get_u32();
                let out_group = buf.get_u32();
                let flags = buf.get_u16();
                buf.advance(2);
                let match_fields = Match::parse(buf)?;
                let mut instructions = Vec::new();
                while buf.has_remaining() {
                    instructions.push(Instruction::parse(buf)?);
                }
                Self::FlowMod(FlowMod {
                    cookie,
                    cookie_mask,
                    table_id,
                    command,
                    idle_timeout,
                    hard_timeout,
                    priority,
                    buffer_id,
                    out_port,
                    out_group,
                    flags,
                    match_fields,
                    instructions,
                })
            },
            MessageType::BarrierRequest => Self::BarrierRequest,
            MessageType::BarrierReply => Self::BarrierReply,
        })
    }

    /// Decode one complete message (header and body) from `raw`.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` does not hold exactly one valid message.
    pub fn from_bytes(raw: &[u8]) -> OpenFlowResult<(OfpHeader, Self)> {
        let header = OfpHeader::parse(raw)?;
        if raw.len() != usize::from(header.length) {
            return Err(OpenFlowError::InvalidLength {
                what: "ofp message",
                length: raw.len(),
            });
        }
        let body = Bytes::copy_from_slice(&raw[OFP_HEADER_LEN..]);
        let message = Self::decode(&header, body)?;
        Ok((header, message))
    }
}
