pub mod audit;
pub mod cli;
pub mod core;
pub mod error;
pub mod inventory;
pub mod notify;
pub mod remote;
pub mod store;
pub mod util;

pub use crate::error::AuditError;
pub use crate::util::json;
