//! Flow rule construction.
//!
//! The installer never touches a switch. It turns balancing decisions into
//! [`Effect`]s that the switch runtime encodes and sends.

use super::backend::Backend;
use super::clients::Client;
use crate::openflow::{Action, FlowMod, Match, PacketOut, OFPP_CONTROLLER, OFP_NO_BUFFER};
use crate::packet::{MacAddr, ETH_TYPE_IPV4, IP_PROTO_TCP};
use bytes::Bytes;
use std::net::Ipv4Addr;

/// Something the runtime must send to the originating switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Add or delete a flow entry.
    FlowMod(FlowMod),
    /// Emit a packet.
    PacketOut(PacketOut),
}

/// A flow entry: a match plus the actions applied to matching packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    /// Match fields.
    pub match_fields: Match,
    /// Rewrite and output actions.
    pub actions: Vec<Action>,
}

/// Builds session rules for one virtual service.
#[derive(Debug, Clone)]
pub struct FlowRuleInstaller {
    virtual_ip: Ipv4Addr,
    virtual_mac: MacAddr,
    priority: u16,
    idle_timeout: u16,
}

impl FlowRuleInstaller {
    /// Create an installer.
    #[must_use]
    pub fn new(virtual_ip: Ipv4Addr, virtual_mac: MacAddr, priority: u16, idle_timeout: u16) -> Self {
        Self {
            virtual_ip,
            virtual_mac,
            priority,
            idle_timeout,
        }
    }

    /// Client → VIP, rewritten to client → backend.
    #[must_use]
    pub fn forward_rule(&self, client: Ipv4Addr, backend: &Backend, service_port: u16) -> FlowRule {
        FlowRule {
            match_fields: Match::new()
                .eth_type(ETH_TYPE_IPV4)
                .ip_proto(IP_PROTO_TCP)
                .ipv4_src(client)
                .ipv4_dst(self.virtual_ip)
                .tcp_dst(service_port),
            actions: vec![
                Action::set_ipv4_dst(backend.address()),
                Action::set_eth_dst(backend.mac()),
                Action::set_eth_src(self.virtual_mac),
                Action::output(backend.switch_port()),
            ],
        }
    }

    /// Backend → client, rewritten to VIP → client.
    #[must_use]
    pub fn return_rule(&self, backend: &Backend, client: &Client, service_port: u16) -> FlowRule {
        FlowRule {
            match_fields: Match::new()
                .eth_type(ETH_TYPE_IPV4)
                .ip_proto(IP_PROTO_TCP)
                .ipv4_src(backend.address())
                .ipv4_dst(client.address)
                .tcp_src(service_port),
            actions: vec![
                Action::set_ipv4_src(self.virtual_ip),
                Action::set_eth_src(self.virtual_mac),
                Action::set_eth_dst(client.mac),
                Action::output(client.switch_port),
            ],
        }
    }

    /// Add `rule` with the session priority and idle timeout.
    #[must_use]
    pub fn add(&self, rule: &FlowRule) -> Effect {
        Effect::FlowMod(FlowMod::add(
            self.priority,
            rule.match_fields.clone(),
            rule.actions.clone(),
            self.idle_timeout,
        ))
    }

    /// Strictly delete the entry installed for `rule`.
    #[must_use]
    pub fn remove(&self, rule: &FlowRule) -> Effect {
        Effect::FlowMod(FlowMod::delete_strict(
            self.priority,
            rule.match_fields.clone(),
        ))
    }

    /// Add `rule`, then replay the packet that triggered it through the
    /// same actions.
    #[must_use]
    pub fn install(&self, rule: &FlowRule, in_port: u32, payload: Bytes) -> Vec<Effect> {
        vec![self.add(rule), Self::replay(rule, in_port, payload)]
    }

    /// Send `payload` through `rule`'s actions without touching the table.
    #[must_use]
    pub fn replay(rule: &FlowRule, in_port: u32, payload: Bytes) -> Effect {
        Effect::PacketOut(PacketOut {
            buffer_id: OFP_NO_BUFFER,
            in_port,
            actions: rule.actions.clone(),
            data: payload,
        })
    }

    /// Emit a controller-built frame on `out_port`.
    #[must_use]
    pub fn emit(out_port: u32, frame: Bytes) -> Effect {
        Effect::PacketOut(PacketOut {
            buffer_id: OFP_NO_BUFFER,
            in_port: OFPP_CONTROLLER,
            actions: vec![Action::output(out_port)],
            data: frame,
        })
    }

    /// Lowest-priority rule sending every unmatched packet to the controller.
    #[must_use]
    pub fn table_miss() -> Effect {
        Effect::FlowMod(FlowMod::add(0, Match::new(), vec![Action::to_controller()], 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::config::BackendConfig;
    use crate::openflow::{FlowModCommand, OFPCML_NO_BUFFER};

    const VIP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 100);
    const VMAC: MacAddr = MacAddr::new(0, 0, 0, 0, 0xff, 0xff);

    fn installer() -> FlowRuleInstaller {
        FlowRuleInstaller::new(VIP, VMAC, 20, 60)
    }

    fn backend() -> Backend {
        Backend::new(&BackendConfig::new(
            Ipv4Addr::new(10, 0, 0, 2),
            MacAddr::new(0, 0, 0, 0, 0, 2),
            2,
            [8080],
        ))
    }

    fn client() -> Client {
        Client {
            address: Ipv4Addr::new(10, 0, 0, 4),
            mac: MacAddr::new(0, 0, 0, 0, 0, 4),
            switch_port: 4,
        }
    }

    #[test]
    fn test_forward_rule() {
        let rule = installer().forward_rule(client().address, &backend(), 8080);
        assert_eq!(
            rule.match_fields,
            Match::new()
                .eth_type(ETH_TYPE_IPV4)
                .ip_proto(IP_PROTO_TCP)
                .ipv4_src(client().address)
                .ipv4_dst(VIP)
                .tcp_dst(8080)
        );
        assert_eq!(rule.actions.last(), Some(&Action::output(2)));
        assert!(rule.actions.contains(&Action::set_eth_src(VMAC)));
    }

    #[test]
    fn test_return_rule() {
        let rule = installer().return_rule(&backend(), &client(), 8080);
        assert_eq!(rule.match_fields.specificity(), 5);
        assert_eq!(
            rule.actions,
            vec![
                Action::set_ipv4_src(VIP),
                Action::set_eth_src(VMAC),
                Action::set_eth_dst(client().mac),
                Action::output(4),
            ]
        );
    }

    #[test]
    fn test_install_adds_then_replays() {
        let installer = installer();
        let rule = installer.forward_rule(client().address, &backend(), 8080);
        let effects = installer.install(&rule, 4, Bytes::from_static(b"syn"));

        assert_eq!(effects.len(), 2);
        match &effects[0] {
            Effect::FlowMod(fm) => {
                assert_eq!(fm.command, FlowModCommand::Add);
                assert_eq!(fm.priority, 20);
                assert_eq!(fm.idle_timeout, 60);
                assert_eq!(fm.apply_actions(), rule.actions.as_slice());
            },
            other => panic!("unexpected effect {other:?}"),
        }
        match &effects[1] {
            Effect::PacketOut(po) => {
                assert_eq!(po.buffer_id, OFP_NO_BUFFER);
                assert_eq!(po.in_port, 4);
                assert_eq!(po.actions, rule.actions);
                assert_eq!(&po.data[..], b"syn");
            },
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn test_remove_is_strict() {
        let installer = installer();
        let rule = installer.forward_rule(client().address, &backend(), 8080);
        match installer.remove(&rule) {
            Effect::FlowMod(fm) => {
                assert_eq!(fm.command, FlowModCommand::DeleteStrict);
                assert_eq!(fm.priority, 20);
                assert_eq!(fm.match_fields, rule.match_fields);
            },
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn test_table_miss() {
        match FlowRuleInstaller::table_miss() {
            Effect::FlowMod(fm) => {
                assert_eq!(fm.priority, 0);
                assert_eq!(fm.match_fields.specificity(), 0);
                assert_eq!(
                    fm.apply_actions(),
                    &[Action::Output {
                        port: OFPP_CONTROLLER,
                        max_len: OFPCML_NO_BUFFER,
                    }]
                );
            },
            other => panic!("unexpected effect {other:?}"),
        }
    }
}
