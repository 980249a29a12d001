mod loopback;
mod recording_sink;
mod test_peer;

pub use loopback::*;
pub use recording_sink::*;
pub use severable_link::*;
pub use test_peer::*;
