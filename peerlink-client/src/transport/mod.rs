mod provider;
mod transport_event;
mod webrtc_transport;

pub use provider::*;
pub use transport_event::*;
pub use webrtc_transport::*;
