//! OpenFlow 1.3 wire subset.
//!
//! Only the messages, match fields, actions and instructions the load
//! balancer exchanges with its switches are modelled. Everything else decodes
//! to [`OfpMessage::Unknown`] and is ignored by the runtime.

mod action;
mod error;
mod message;
mod oxm;

pub use action::{Action, Instruction, OFPCML_NO_BUFFER, OFPP_ANY, OFPP_CONTROLLER};
pub use error::{OpenFlowError, OpenFlowResult};
pub use message::{
    FlowMod, FlowModCommand, MessageType, OfpHeader, OfpMessage, PacketIn, PacketInReason,
    PacketOut, SwitchFeatures, MAX_MESSAGE_SIZE, OFPG_ANY, OFP_HEADER_LEN, OFP_NO_BUFFER,
    OFP_VERSION,
};
pub use oxm::{Match, OxmField, OXM_CLASS_OPENFLOW_BASIC};
