pub mod core;
pub mod models;
pub mod naming;
pub mod store;

pub use self::core::*;
pub use models::*;
pub use naming::*;
pub use store::*;
