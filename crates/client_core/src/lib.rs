pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod table;
pub mod token_store;

pub use config::{load_settings, ClientSettings};
pub use error::ClientError;
pub use pipeline::{AuthFailureHook, RequestPipeline};
pub use session::{Credentials, SessionController, SessionEvent, SessionSnapshot, SessionState};
pub use table::{Order, SortMode, SortValue, TableDefaults, TableRow, TableState};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
