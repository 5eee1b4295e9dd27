//! # Controller Modules
//!
//! Built-in modules of the controller. Each module implements the
//! [`ModuleContract`](crate::module::ModuleContract) trait for uniform
//! lifecycle management.
//!
//! ## Available Modules
//!
//! - [`load_balancer`] - Stateful L4 load balancing behind a virtual IP

pub mod load_balancer;
