pub mod bar_store;
pub mod error;
pub mod indicator_bank;
pub mod indicators;
pub mod ingest;

pub use bar_store::*;
pub use error::*;
pub use indicator_bank::*;
pub use indicators::*;
pub use ingest::*;
