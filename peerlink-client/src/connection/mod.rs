mod manager;
mod records;

pub use manager::*;
pub use records::*;
