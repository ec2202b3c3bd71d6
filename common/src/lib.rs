pub mod breaker;
pub mod claims;
pub mod error;
pub mod keys;
pub mod money;
pub mod retry;
pub mod rpc_types;
pub mod verify;

pub use claims::{Claims, TokenKind};
pub use error::AppError;
pub use money::Money;
