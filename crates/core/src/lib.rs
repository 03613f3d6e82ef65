pub mod account;
pub mod transaction;
pub mod watermark;

pub use account::{Account, AccountRef};
pub use transaction::Transaction;
pub use watermark::DEFAULT_LOOKBACK_DAYS;
