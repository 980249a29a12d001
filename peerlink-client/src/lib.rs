mod bus;
mod config;
mod connection;
mod delivery;
mod error;
mod session;
mod signaling;
mod transfer;
mod transport;

pub use bus::*;
pub use config::*;
pub use connection::*;
pub use delivery::*;
pub use error::*;
pub use session::*;
pub use signaling::*;
pub use transfer::*;
pub use transport::*;
