pub mod types;
pub mod table;

pub use table::*;
pub use types::*;
