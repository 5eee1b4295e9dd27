//! Load balancer module implementing `ModuleContract`.
//!
//! [`LoadBalancer::handle_event`] is the whole control plane: it takes one
//! switch event and returns the effects the switch runtime must perform.

use super::arp::{ArpOutcome, ArpProxy};
use super::backend::BackendRegistry;
use super::clients::{Client, ClientTable, Learned};
use super::config::LoadBalancerConfig;
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::installer::{Effect, FlowRuleInstaller};
use super::selector::BackendSelector;
use super::session::{Direction, Session, SessionKey, SessionTable};
use crate::module::{
    Capability, MetricsPayload, ModuleConfig, ModuleContract, ModuleError, ModuleManifest,
    ModuleResult, ModuleStatus,
};
use crate::packet::{self, DecodedFrame, EthernetHeader, Ipv4Header, TcpHeader};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Input to the dispatch function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    /// A switch finished the features handshake.
    SwitchConnected {
        /// Datapath id from FEATURES_REPLY.
        datapath_id: u64,
    },
    /// A switch forwarded a packet to the controller.
    PacketIn {
        /// Originating switch.
        datapath_id: u64,
        /// Ingress port on that switch.
        in_port: u32,
        /// The Ethernet frame.
        data: Bytes,
    },
    /// A switch connection closed.
    SwitchDisconnected {
        /// Datapath id of the closed switch.
        datapath_id: u64,
    },
}

/// Load balancer statistics.
#[derive(Debug, Default)]
pub struct LoadBalancerStats {
    /// Packet-ins dispatched.
    pub packet_in: AtomicU64,
    /// Frames that failed to decode.
    pub decode_errors: AtomicU64,
    /// ARP replies sent.
    pub arp_replies: AtomicU64,
    /// ARP requests nobody could answer.
    pub arp_unanswered: AtomicU64,
    /// Total selections made.
    pub total_selections: AtomicU64,
    /// Successful selections.
    pub successful_selections: AtomicU64,
    /// Failed selections (no eligible backend).
    pub failed_selections: AtomicU64,
    /// Sessions created.
    pub sessions_created: AtomicU64,
    /// Sessions torn down by FIN or RST.
    pub sessions_closed: AtomicU64,
    /// Sessions dropped by controller-side expiry.
    pub sessions_expired: AtomicU64,
    /// Flow entries added.
    pub flows_installed: AtomicU64,
}

impl LoadBalancerStats {
    /// Record a selection.
    pub fn record_selection(&self, success: bool) {
        self.total_selections.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_selections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_selections.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Load balancer module.
pub struct LoadBalancer {
    config: LoadBalancerConfig,
    registry: BackendRegistry,
    clients: ClientTable,
    sessions: SessionTable,
    selector: BackendSelector,
    arp: ArpProxy,
    installer: FlowRuleInstaller,
    stats: Arc<LoadBalancerStats>,
    status: ModuleStatus,
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("virtual_ip", &self.config.virtual_ip)
            .field("backends", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .field("clients", &self.clients.len())
            .field("status", &self.status)
            .finish()
    }
}

impl LoadBalancer {
    /// Create a load balancer with the default configuration and no backends.
    #[must_use]
    pub fn new() -> Self {
        let config = LoadBalancerConfig::default();
        Self {
            registry: BackendRegistry::new(),
            clients: ClientTable::new(),
            sessions: SessionTable::new(),
            selector: BackendSelector::new(),
            arp: ArpProxy::new(config.virtual_ip, config.virtual_mac),
            installer: Self::installer_for(&config),
            stats: Arc::new(LoadBalancerStats::default()),
            status: ModuleStatus::Stopped,
            config,
        }
    }

    /// Create a load balancer with configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend list is inconsistent.
    pub fn with_config(config: LoadBalancerConfig) -> LoadBalancerResult<Self> {
        let mut balancer = Self::new();
        balancer.apply_config(config)?;
        Ok(balancer)
    }

    fn installer_for(config: &LoadBalancerConfig) -> FlowRuleInstaller {
        FlowRuleInstaller::new(
            config.virtual_ip,
            config.virtual_mac,
            config.session_priority,
            config.idle_timeout_secs(),
        )
    }

    /// Replace the configuration, resetting sessions and rotation.
    ///
    /// Learned clients survive.
    fn apply_config(&mut self, config: LoadBalancerConfig) -> LoadBalancerResult<()> {
        let registry = BackendRegistry::from_configs(&config.backends)?;
        if registry.contains(config.virtual_ip) {
            return Err(LoadBalancerError::VirtualIpIsBackend(config.virtual_ip));
        }
        if registry.is_empty() {
            warn!("No backends configured");
        }

        self.registry = registry;
        self.sessions = SessionTable::new();
        self.selector = BackendSelector::new();
        self.arp = ArpProxy::new(config.virtual_ip, config.virtual_mac);
        self.installer = Self::installer_for(&config);
        self.config = config;
        Ok(())
    }

    /// Get the active configuration.
    #[must_use]
    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    /// Get load balancer statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<LoadBalancerStats> {
        &self.stats
    }

    /// Get the backend registry.
    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Get the session table.
    #[must_use]
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Get the client table.
    #[must_use]
    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    /// Get the round-robin state.
    #[must_use]
    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    /// Dispatch one switch event.
    pub fn handle_event(&mut self, event: SwitchEvent) -> Vec<Effect> {
        match event {
            SwitchEvent::SwitchConnected { datapath_id } => {
                info!(datapath_id, "Installing table-miss rule");
                LoadBalancerStats::bump(&self.stats.flows_installed);
                vec![FlowRuleInstaller::table_miss()]
            },
            SwitchEvent::PacketIn {
                datapath_id,
                in_port,
                data,
            } => self.handle_packet_in(datapath_id, in_port, data),
            SwitchEvent::SwitchDisconnected { datapath_id } => {
                // Sessions outlive the connection; the switch keeps its rules.
                info!(
                    datapath_id,
                    sessions = self.sessions.len(),
                    "Switch disconnected"
                );
                Vec::new()
            },
        }
    }

    fn handle_packet_in(&mut self, datapath_id: u64, in_port: u32, data: Bytes) -> Vec<Effect> {
        LoadBalancerStats::bump(&self.stats.packet_in);

        let frame = match packet::decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                LoadBalancerStats::bump(&self.stats.decode_errors);
                debug!(datapath_id, in_port, error = %e, "Dropping undecodable frame");
                return Vec::new();
            },
        };

        match frame {
            DecodedFrame::Arp { eth, arp } => {
                match self.arp.handle(&mut self.clients, &eth, &arp, in_port) {
                    ArpOutcome::Reply { out_port, frame } => {
                        LoadBalancerStats::bump(&self.stats.arp_replies);
                        vec![FlowRuleInstaller::emit(out_port, frame)]
                    },
                    ArpOutcome::Unanswered => {
                        LoadBalancerStats::bump(&self.stats.arp_unanswered);
                        Vec::new()
                    },
                    ArpOutcome::Ignored => Vec::new(),
                }
            },
            DecodedFrame::Ipv4 { eth, ip, tcp } => {
                self.learn_ipv4_sender(&eth, &ip, in_port);
                match tcp {
                    Some(tcp) => self.handle_tcp(datapath_id, in_port, &eth, &ip, &tcp, data),
                    None => Vec::new(),
                }
            },
            DecodedFrame::Ignored { .. } => Vec::new(),
        }
    }

    fn learn_ipv4_sender(&mut self, eth: &EthernetHeader, ip: &Ipv4Header, in_port: u32) {
        if in_port < self.config.host_port_min
            || self.clients.contains(ip.src)
            || self.registry.contains(ip.src)
            || ip.src == self.config.virtual_ip
        {
            return;
        }
        if self.clients.learn(ip.src, eth.src, in_port) == Learned::New {
            debug!(client = %ip.src, mac = %eth.src, port = in_port, "Learned client");
        }
    }

    fn handle_tcp(
        &mut self,
        datapath_id: u64,
        in_port: u32,
        eth: &EthernetHeader,
        ip: &Ipv4Header,
        tcp: &TcpHeader,
        data: Bytes,
    ) -> Vec<Effect> {
        if tcp.flags.is_teardown() {
            return self.teardown(in_port, ip, tcp, data);
        }

        if ip.dst == self.config.virtual_ip {
            return self.new_flow(datapath_id, in_port, eth, ip, tcp, data);
        }

        if self.registry.contains(ip.src) {
            return self.return_flow(in_port, ip, tcp, data);
        }

        Vec::new()
    }

    fn new_flow(
        &mut self,
        datapath_id: u64,
        in_port: u32,
        eth: &EthernetHeader,
        ip: &Ipv4Header,
        tcp: &TcpHeader,
        data: Bytes,
    ) -> Vec<Effect> {
        let service_port = tcp.dst_port;
        let client = self.clients.get(ip.src).copied().unwrap_or(Client {
            address: ip.src,
            mac: eth.src,
            switch_port: in_port,
        });

        let selection = match self.selector.select(
            &self.registry,
            &mut self.sessions,
            client,
            service_port,
            datapath_id,
            Instant::now(),
        ) {
            Ok(selection) => {
                self.stats.record_selection(true);
                selection
            },
            Err(e) => {
                self.stats.record_selection(false);
                warn!(client = %ip.src, port = service_port, error = %e, "Dropping packet");
                return Vec::new();
            },
        };

        if selection.is_new {
            LoadBalancerStats::bump(&self.stats.sessions_created);
        }

        let forward = self
            .installer
            .forward_rule(ip.src, &selection.backend, service_port);
        let reverse = self
            .installer
            .return_rule(&selection.backend, &selection.client, service_port);

        LoadBalancerStats::add(&self.stats.flows_installed, 2);
        let mut effects = self.installer.install(&forward, in_port, data);
        effects.push(self.installer.add(&reverse));
        effects
    }

    fn return_flow(
        &mut self,
        in_port: u32,
        ip: &Ipv4Header,
        tcp: &TcpHeader,
        data: Bytes,
    ) -> Vec<Effect> {
        let session_client = self
            .sessions
            .get(&SessionKey::new(ip.dst, tcp.src_port))
            .map(|session| session.client);
        let (Some(backend), Some(client)) = (
            self.registry.get(ip.src),
            session_client.or_else(|| self.clients.get(ip.dst).copied()),
        ) else {
            return Vec::new();
        };

        let rule = self.installer.return_rule(backend, &client, tcp.src_port);
        debug!(backend = %ip.src, client = %ip.dst, port = tcp.src_port, "Installing return path");

        LoadBalancerStats::bump(&self.stats.flows_installed);
        self.installer.install(&rule, in_port, data)
    }

    fn teardown(
        &mut self,
        in_port: u32,
        ip: &Ipv4Header,
        tcp: &TcpHeader,
        data: Bytes,
    ) -> Vec<Effect> {
        let Some((key, direction)) = self.sessions.resolve_teardown(
            self.config.virtual_ip,
            ip.src,
            ip.dst,
            tcp.src_port,
            tcp.dst_port,
        ) else {
            debug!(src = %ip.src, dst = %ip.dst, flags = %tcp.flags, "Teardown for unknown session");
            return Vec::new();
        };

        let Some(session) = self.sessions.remove(&key) else {
            return Vec::new();
        };
        LoadBalancerStats::bump(&self.stats.sessions_closed);
        info!(
            session = %key,
            backend = %session.backend.address(),
            flags = %tcp.flags,
            "Session ended"
        );

        self.teardown_effects(&session, direction, in_port, data)
    }

    fn teardown_effects(
        &self,
        session: &Session,
        direction: Direction,
        in_port: u32,
        data: Bytes,
    ) -> Vec<Effect> {
        let key = session.key;
        let forward = self
            .installer
            .forward_rule(key.client, &session.backend, key.service_port);
        let reverse = self
            .installer
            .return_rule(&session.backend, &session.client, key.service_port);

        let mut effects = Vec::new();
        if self.config.remove_rules_on_close {
            effects.push(self.installer.remove(&forward));
            effects.push(self.installer.remove(&reverse));
        }

        let replay = match direction {
            Direction::Forward => &forward,
            Direction::Return => &reverse,
        };
        effects.push(FlowRuleInstaller::replay(replay, in_port, data));

        effects
    }

    fn running_status(&self) -> ModuleStatus {
        if self.registry.is_empty() {
            ModuleStatus::Degraded {
                reason: "no backends configured".to_string(),
            }
        } else {
            ModuleStatus::Running
        }
    }

    /// Drop sessions idle longer than `session_expiry`, if configured.
    ///
    /// Returns how many sessions were dropped. The switch ages out the
    /// matching rules on its own idle timeout, so no effects are produced.
    pub fn expire_sessions(&mut self, now: Instant) -> usize {
        let Some(max_idle) = self.config.session_expiry else {
            return 0;
        };

        let expired = self.sessions.expire_idle(now, max_idle);
        for session in &expired {
            debug!(session = %session.key, backend = %session.backend.address(), "Session expired");
        }
        LoadBalancerStats::add(&self.stats.sessions_expired, expired.len());
        expired.len()
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleContract for LoadBalancer {
    fn manifest(&self) -> ModuleManifest {
        ModuleManifest::builder("load_balancer")
            .description("Stateful L4 load balancer for OpenFlow switches")
            .version(1, 0, 0)
            .author("Pied Piper")
            .capability(Capability::OpenFlow)
            .capability(Capability::LoadBalancing)
            .capability(Capability::ArpProxy)
            .capability(Capability::SessionAffinity)
            .capability(Capability::HotReload)
            .build()
    }

    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        info!("Initializing load balancer module");
        self.status = ModuleStatus::Initializing;

        let lb_config: LoadBalancerConfig = match config.raw_config() {
            Some(raw) => toml::from_str(raw)
                .map_err(|e| ModuleError::ConfigError(format!("failed to parse config: {e}")))?,
            None => LoadBalancerConfig::default(),
        };

        self.apply_config(lb_config)
            .map_err(|e| ModuleError::ConfigError(e.to_string()))?;

        info!(
            virtual_ip = %self.config.virtual_ip,
            backends = self.registry.len(),
            services = ?self.config.service_ports(),
            "Load balancer initialized"
        );
        Ok(())
    }

    fn start(&mut self) -> ModuleResult<()> {
        if self.status.is_operational() {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "stopped or initializing".to_string(),
            });
        }

        self.status = self.running_status();
        info!(status = %self.status, "Load balancer started");
        Ok(())
    }

    fn stop(&mut self) -> ModuleResult<()> {
        if !self.status.is_operational() {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "running".to_string(),
            });
        }

        self.status = ModuleStatus::Stopped;
        info!(sessions = self.sessions.len(), "Load balancer stopped");
        Ok(())
    }

    fn reload(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        info!("Reloading load balancer configuration");
        let previous = self.status.clone();
        let was_running = previous.is_operational();

        if let Err(e) = self.init(config) {
            self.status = previous;
            return Err(e);
        }

        if was_running {
            self.status = self.running_status();
        }
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        self.status.clone()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut metrics = MetricsPayload::new();
        let counters = [
            ("packet_in", &self.stats.packet_in),
            ("decode_errors", &self.stats.decode_errors),
            ("arp_replies", &self.stats.arp_replies),
            ("arp_unanswered", &self.stats.arp_unanswered),
            ("total_selections", &self.stats.total_selections),
            ("successful_selections", &self.stats.successful_selections),
            ("failed_selections", &self.stats.failed_selections),
            ("sessions_created", &self.stats.sessions_created),
            ("sessions_closed", &self.stats.sessions_closed),
            ("sessions_expired", &self.stats.sessions_expired),
            ("flows_installed", &self.stats.flows_installed),
        ];
        for (name, counter) in counters {
            metrics.counter(name, counter.load(Ordering::Relaxed));
        }

        metrics.gauge("active_sessions", self.sessions.len() as f64);
        metrics.gauge("known_clients", self.clients.len() as f64);
        metrics.gauge("backend_count", self.registry.len() as f64);

        metrics
    }

    fn heartbeat(&self) -> bool {
        self.status.is_operational() || self.status == ModuleStatus::Initializing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::config::BackendConfig;
    use crate::openflow::{FlowModCommand, Match, OFPP_CONTROLLER};
    use crate::packet::{
        arp_reply_frame, tcp_frame, ArpOperation, ArpPacket, MacAddr, TcpFlags, ETH_TYPE_IPV4,
        IP_PROTO_TCP,
    };
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const VIP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 100);
    const VMAC: MacAddr = MacAddr::new(0, 0, 0, 0, 0xff, 0xff);
    const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);
    const CLIENT_MAC: MacAddr = MacAddr::new(0, 0, 0, 0, 0, 4);

    fn config() -> LoadBalancerConfig {
        let backend = |last: u8, services: &[u16]| {
            BackendConfig::new(
                Ipv4Addr::new(10, 0, 0, last),
                MacAddr::new(0, 0, 0, 0, 0, last),
                u32::from(last),
                services.iter().copied(),
            )
        };
        LoadBalancerConfig {
            backends: vec![
                backend(1, &[8080]),
                backend(2, &[8080, 8181]),
                backend(3, &[8181]),
            ],
            ..Default::default()
        }
    }

    fn segment(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, flags: TcpFlags) -> Bytes {
        let eth = EthernetHeader {
            dst: VMAC,
            src: CLIENT_MAC,
            ethertype: ETH_TYPE_IPV4,
        };
        tcp_frame(
            &eth,
            &Ipv4Header::new(src, dst, IP_PROTO_TCP),
            &TcpHeader::new(sport, dport, flags),
            &[],
        )
    }

    fn packet_in(data: Bytes) -> SwitchEvent {
        SwitchEvent::PacketIn {
            datapath_id: 1,
            in_port: 4,
            data,
        }
    }

    fn forwarded_to(effects: &[Effect]) -> Option<u32> {
        effects.iter().find_map(|e| match e {
            Effect::PacketOut(po) => po.actions.iter().rev().find_map(|a| match a {
                crate::openflow::Action::Output { port, .. } => Some(*port),
                _ => None,
            }),
            Effect::FlowMod(_) => None,
        })
    }

    #[test]
    fn test_switch_connected_installs_table_miss() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let effects = lb.handle_event(SwitchEvent::SwitchConnected { datapath_id: 1 });
        assert_eq!(effects, vec![FlowRuleInstaller::table_miss()]);
    }

    #[test]
    fn test_new_flow_effects() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let syn = segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN);
        let effects = lb.handle_event(packet_in(syn));

        assert_eq!(effects.len(), 3);
        assert!(matches!(&effects[0], Effect::FlowMod(fm) if fm.command == FlowModCommand::Add));
        assert!(matches!(&effects[1], Effect::PacketOut(_)));
        assert!(matches!(&effects[2], Effect::FlowMod(fm) if fm.command == FlowModCommand::Add));
        assert_eq!(forwarded_to(&effects), Some(1));
        assert_eq!(lb.sessions().len(), 1);
        assert!(lb.clients().contains(CLIENT));
    }

    #[test]
    fn test_fin_tears_down_and_replays() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN)));

        let fin = segment(CLIENT, VIP, 40000, 8080, TcpFlags::FIN | TcpFlags::ACK);
        let effects = lb.handle_event(packet_in(fin));

        let deletes = effects
            .iter()
            .filter(|e| matches!(e, Effect::FlowMod(fm) if fm.command == FlowModCommand::DeleteStrict))
            .count();
        assert_eq!(deletes, 2);
        assert_eq!(forwarded_to(&effects), Some(1));
        assert!(lb.sessions().is_empty());
        assert_eq!(lb.stats().sessions_closed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_fin_keeps_rules_when_configured() {
        let mut lb = LoadBalancer::with_config(LoadBalancerConfig {
            remove_rules_on_close: false,
            ..config()
        })
        .unwrap();
        lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN)));

        let effects = lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::RST)));
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], Effect::PacketOut(_)));
    }

    #[test]
    fn test_teardown_for_unknown_session_is_dropped() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let effects = lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::FIN)));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_no_eligible_backend() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let effects = lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 9090, TcpFlags::SYN)));

        assert!(effects.is_empty());
        assert!(lb.sessions().is_empty());
        assert_eq!(lb.stats().failed_selections.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_return_path_from_backend() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN)));

        let reply = segment(
            Ipv4Addr::new(10, 0, 0, 1),
            CLIENT,
            8080,
            40000,
            TcpFlags::SYN | TcpFlags::ACK,
        );
        let effects = lb.handle_event(SwitchEvent::PacketIn {
            datapath_id: 1,
            in_port: 1,
            data: reply,
        });

        assert_eq!(effects.len(), 2);
        assert_eq!(forwarded_to(&effects), Some(4));
    }

    #[test]
    fn test_low_port_senders_not_learned() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let stray = segment(Ipv4Addr::new(10, 0, 0, 9), Ipv4Addr::new(10, 0, 0, 10), 1, 2, TcpFlags::ACK);
        lb.handle_event(SwitchEvent::PacketIn {
            datapath_id: 1,
            in_port: 2,
            data: stray,
        });
        assert!(lb.clients().is_empty());
    }

    #[test]
    fn test_unlearned_client_teardown_from_backend() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let low = Ipv4Addr::new(10, 0, 0, 9);
        let at_port_3 = |data: Bytes| SwitchEvent::PacketIn {
            datapath_id: 1,
            in_port: 3,
            data,
        };

        let setup = lb.handle_event(at_port_3(segment(low, VIP, 40000, 8080, TcpFlags::SYN)));
        assert!(lb.clients().is_empty());
        let Some(Effect::FlowMod(return_add)) = setup.last() else {
            panic!("expected return rule, got {setup:?}");
        };

        let fin = segment(
            Ipv4Addr::new(10, 0, 0, 1),
            low,
            8080,
            40000,
            TcpFlags::FIN | TcpFlags::ACK,
        );
        let effects = lb.handle_event(SwitchEvent::PacketIn {
            datapath_id: 1,
            in_port: 1,
            data: fin,
        });

        assert!(lb.sessions().is_empty());
        let deleted: Vec<&Match> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::FlowMod(fm) if fm.command == FlowModCommand::DeleteStrict => {
                    Some(&fm.match_fields)
                },
                _ => None,
            })
            .collect();
        assert_eq!(deleted.len(), 2);
        assert!(deleted.contains(&&return_add.match_fields));
        assert_eq!(forwarded_to(&effects), Some(3));
    }

    #[test]
    fn test_arp_request_for_vip() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let request = ArpPacket {
            operation: ArpOperation::Request,
            sender_mac: CLIENT_MAC,
            sender_ip: CLIENT,
            target_mac: MacAddr::ZERO,
            target_ip: VIP,
        }
        .to_frame();

        let effects = lb.handle_event(packet_in(request));
        match effects.as_slice() {
            [Effect::PacketOut(po)] => {
                assert_eq!(po.in_port, OFPP_CONTROLLER);
                assert_eq!(po.data, arp_reply_frame(CLIENT_MAC, CLIENT, VMAC, VIP));
            },
            other => panic!("unexpected effects {other:?}"),
        }
        assert_eq!(lb.stats().arp_replies.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_garbage_frame_counted() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        let effects = lb.handle_event(packet_in(Bytes::from_static(&[0u8; 5])));
        assert!(effects.is_empty());
        assert_eq!(lb.stats().decode_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_expiry_is_opt_in() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN)));
        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(lb.expire_sessions(later), 0);

        let mut lb = LoadBalancer::with_config(LoadBalancerConfig {
            session_expiry: Some(Duration::from_secs(60)),
            ..config()
        })
        .unwrap();
        lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN)));
        assert_eq!(lb.expire_sessions(later), 1);
        assert!(lb.sessions().is_empty());
    }

    #[test]
    fn test_vip_cannot_be_backend() {
        let mut config = config();
        config.virtual_ip = Ipv4Addr::new(10, 0, 0, 1);
        let err = LoadBalancer::with_config(config).unwrap_err();
        assert!(matches!(err, LoadBalancerError::VirtualIpIsBackend(_)));
    }

    #[test]
    fn test_lifecycle() {
        let mut lb = LoadBalancer::new();
        let raw = toml::to_string(&config()).unwrap();
        lb.init(ModuleConfig::from_raw(raw)).unwrap();
        assert_eq!(lb.registry().len(), 3);

        lb.start().unwrap();
        assert!(lb.heartbeat());
        assert!(lb.start().is_err());

        assert_eq!(lb.manifest().name, "load_balancer");
        assert!(lb.manifest().has_capability(&Capability::ArpProxy));

        lb.reload(ModuleConfig::new()).unwrap();
        assert!(matches!(lb.status(), ModuleStatus::Degraded { .. }));
        assert!(lb.registry().is_empty());

        assert!(lb.manifest().has_capability(&Capability::HotReload));
        assert!(lb.reload(ModuleConfig::from_raw("backends = [".to_string())).is_err());
        assert!(matches!(lb.status(), ModuleStatus::Degraded { .. }));

        lb.stop().unwrap();
        assert!(lb.stop().is_err());
    }

    #[test]
    fn test_metrics() {
        let mut lb = LoadBalancer::with_config(config()).unwrap();
        lb.handle_event(packet_in(segment(CLIENT, VIP, 40000, 8080, TcpFlags::SYN)));

        let metrics = lb.metrics();
        assert_eq!(metrics.counters.get("packet_in"), Some(&1));
        assert_eq!(metrics.counters.get("sessions_created"), Some(&1));
        assert_eq!(metrics.counters.get("flows_installed"), Some(&2));
        assert_eq!(metrics.gauges.get("active_sessions"), Some(&1.0));
        assert_eq!(metrics.gauges.get("backend_count"), Some(&3.0));

        let text = metrics.to_prometheus("pied_piper");
        assert!(text.contains("pied_piper_packet_in 1"));
    }
}
