pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod pipeline;
pub mod source;
pub mod store;

pub use config::Config;
pub use event::{parse_line, Event, Message, StatusChange};
pub use pipeline::SiteSummary;
pub use store::EventStore;
