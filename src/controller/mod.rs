//! Controller runtime: the OpenFlow listener, per-switch connections and
//! configuration reload.

mod error;
mod reload;
mod server;
mod switch;

pub use error::{ControllerError, ControllerResult};
pub use reload::ConfigReloader;
pub use server::ControllerServer;
pub use switch::{read_message, SwitchConnection, SwitchSettings, MAX_ECHO_INTERVAL};
