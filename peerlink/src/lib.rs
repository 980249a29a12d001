pub use peerlink_core::{PeerId, RoomId};

pub mod model {
    pub use peerlink_core::model::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use peerlink_client::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use peerlink_relay::*;
}
