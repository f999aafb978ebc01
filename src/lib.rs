pub mod builder;
pub mod cache;
pub mod config;
pub mod exception;
pub mod param;
pub mod relay;
pub mod request;
pub mod util;

pub use builder::OutboundRequest;
pub use cache::{CachedResponse, ResponseCache, SharedCache, TagMatch};
pub use config::Config;
pub use exception::Exception;
pub use param::{HttpRequestMethod, HttpVersion};
pub use relay::{handle_connection, SessionOutcome};
pub use request::{LineKind, Request};
