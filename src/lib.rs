//! # Pied Piper
//!
//! A stateful L4 load-balancing controller for OpenFlow 1.3 switches.
//!
//! ## Features
//!
//! - Virtual IP fronting a pool of TCP backends
//! - Per-service round-robin with client session affinity
//! - Proxy ARP for the virtual IP and learning of client locations
//! - Address-rewriting flow rules installed on the switch, so only the first
//!   packet of each direction reaches the controller
//! - Rule teardown on FIN/RST and optional idle-session expiry
//!
//! ## Architecture
//!
//! The [`controller`] runtime accepts switch connections and turns OpenFlow
//! traffic into [`modules::load_balancer::SwitchEvent`]s. The load balancer
//! answers each event with a list of effects (flow mods and packet-outs)
//! which the runtime encodes and sends back to the switch. The balancer
//! implements the [`module::ModuleContract`] trait for uniform lifecycle
//! management and metrics.
//!
//! Frame parsing lives in [`packet`] and the OpenFlow wire format in
//! [`openflow`].

pub mod config;
pub mod controller;
pub mod module;
pub mod modules;
pub mod openflow;
pub mod packet;
