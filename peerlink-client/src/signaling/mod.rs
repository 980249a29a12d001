mod handler;
mod relay_link;
mod ws_link;

pub use handler::*;
pub use relay_link::*;
pub use ws_link::*;
