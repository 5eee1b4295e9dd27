//! ARP proxy for the virtual IP and learned hosts.

use super::clients::ClientTable;
use crate::packet::{arp_reply_frame, ArpOperation, ArpPacket, EthernetHeader, MacAddr};
use bytes::Bytes;
use std::net::Ipv4Addr;
use tracing::debug;

/// What to do with an ARP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpOutcome {
    /// Send `frame` out of `out_port`.
    Reply {
        /// Port to emit the reply on (the requester's ingress port).
        out_port: u32,
        /// Complete Ethernet+ARP reply.
        frame: Bytes,
    },
    /// A request for an address we cannot answer.
    Unanswered,
    /// Not a request; only used for learning.
    Ignored,
}

/// Answers ARP requests on behalf of the VIP and of every learned host.
#[derive(Debug, Clone)]
pub struct ArpProxy {
    virtual_ip: Ipv4Addr,
    virtual_mac: MacAddr,
}

impl ArpProxy {
    /// Create a proxy for the given virtual service.
    #[must_use]
    pub fn new(virtual_ip: Ipv4Addr, virtual_mac: MacAddr) -> Self {
        Self {
            virtual_ip,
            virtual_mac,
        }
    }

    /// Learn the sender and, for requests, build the reply.
    pub fn handle(
        &self,
        clients: &mut ClientTable,
        eth: &EthernetHeader,
        arp: &ArpPacket,
        in_port: u32,
    ) -> ArpOutcome {
        clients.learn(arp.sender_ip, eth.src, in_port);

        if arp.operation != ArpOperation::Request {
            return ArpOutcome::Ignored;
        }

        let answer = if arp.target_ip == self.virtual_ip {
            Some(self.virtual_mac)
        } else {
            clients.get(arp.target_ip).map(|c| c.mac)
        };

        match answer {
            Some(answer_mac) => {
                debug!(
                    requester = %arp.sender_ip,
                    target = %arp.target_ip,
                    mac = %answer_mac,
                    "Answering ARP request"
                );
                ArpOutcome::Reply {
                    out_port: in_port,
                    frame: arp_reply_frame(eth.src, arp.sender_ip, answer_mac, arp.target_ip),
                }
            },
            None => ArpOutcome::Unanswered,
        }
    }
}
