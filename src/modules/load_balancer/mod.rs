//! # Load Balancer Module
//!
//! Stateful L4 load balancing for a single virtual IP.
//!
//! ## Features
//!
//! - **Session Affinity**: a client keeps its backend per service port until FIN/RST
//! - **Per-port Round-Robin**: each service port rotates over the backends that serve it
//! - **ARP Proxy**: the VIP and every learned host are answered by the controller
//! - **Address Rewriting**: forward and return rules hide backends behind the VIP
//!
//! ## Architecture
//!
//! ```text
//!  packet-in ──▶ ┌─────────────────────┐
//!                │    LoadBalancer     │
//!                │  ┌──────────────┐   │     ┌──────────┐
//!                │  │  ArpProxy    │───┼───▶│ Effects  │──▶ switch
//!                │  └──────────────┘   │     └──────────┘
//!                │  ┌──────────────┐   │          ▲
//!                │  │  Selector    │───┼── FlowRuleInstaller
//!                │  │  Sessions    │   │
//!                │  │  Clients     │   │
//!                │  └──────────────┘   │
//!                └─────────────────────┘
//! ```

pub mod arp;
pub mod backend;
pub mod balancer;
pub mod clients;
pub mod config;
pub mod error;
pub mod installer;
pub mod selector;
pub mod session;

pub use arp::{ArpOutcome, ArpProxy};
pub use backend::{Backend, BackendRegistry};
pub use balancer::{LoadBalancer, LoadBalancerStats, SwitchEvent};
pub use clients::{Client, ClientTable, Learned};
pub use config::{BackendConfig, LoadBalancerConfig};
pub use error::{LoadBalancerError, LoadBalancerResult};
pub use installer::{Effect, FlowRule, FlowRuleInstaller};
pub use selector::{BackendSelector, Selection};
pub use session::{Direction, Session, SessionKey, SessionTable};
