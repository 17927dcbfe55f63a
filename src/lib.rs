pub mod api;
pub mod config;
pub mod console;
pub mod dbaas;
pub mod error;
pub mod fanout;
pub mod poller;
pub mod util;

pub use api::ApiClient;
pub use config::Config;
pub use console::{Console, Notice};
pub use error::{ClientError, ClientResult};
