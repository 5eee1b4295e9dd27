//! Synthetic lab topologies and frames.

use bytes::Bytes;
use pied_piper_lb::modules::load_balancer::{BackendConfig, LoadBalancerConfig, SwitchEvent};
use pied_piper_lb::packet::{
    tcp_frame, EthernetHeader, Ipv4Header, MacAddr, TcpFlags, TcpHeader, ETH_TYPE_IPV4,
    IP_PROTO_TCP,
};
use std::net::Ipv4Addr;

pub const VIP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 100);
pub const SERVICE_PORT: u16 = 8080;

/// `count` backends on ports 1.., all serving [`SERVICE_PORT`].
pub fn lab_config(count: u8) -> LoadBalancerConfig {
    let backends = (1..=count)
        .map(|n| {
            BackendConfig::new(
                Ipv4Addr::new(10, 0, 1, n),
                MacAddr::new(0, 0, 0, 0, 1, n),
                u32::from(n),
                [SERVICE_PORT],
            )
        })
        .collect();
    LoadBalancerConfig {
        virtual_ip: VIP,
        backends,
        ..Default::default()
    }
}

/// A client segment towards the VIP from host `client` on switch port 100+.
pub fn client_segment(client: u16, src_port: u16, flags: TcpFlags) -> SwitchEvent {
    let [hi, lo] = client.to_be_bytes();
    let eth = EthernetHeader {
        dst: MacAddr::new(0, 0, 0, 0, 0xff, 0xff),
        src: MacAddr::new(0, 0, 0, 2, hi, lo),
        ethertype: ETH_TYPE_IPV4,
    };
    let data: Bytes = tcp_frame(
        &eth,
        &Ipv4Header::new(Ipv4Addr::new(10, 2, hi, lo), VIP, IP_PROTO_TCP),
        &TcpHeader::new(src_port, SERVICE_PORT, flags),
        &[],
    );
    SwitchEvent::PacketIn {
        datapath_id: 1,
        in_port: 100 + u32::from(client),
        data,
    }
}
