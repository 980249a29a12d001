mod relay_helpers;
mod test_client;

pub use relay_helpers::*;
pub use test_client::*;
