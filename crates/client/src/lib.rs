pub mod api;
pub mod cursor;
pub mod wire;

pub use api::{ApiClient, AuthError};
pub use cursor::{FetchError, Page, PageCursor};
pub use wire::{parse_account, parse_transaction, ParseError};
