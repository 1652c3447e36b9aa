pub mod cache;
pub mod config;
pub mod exception;
pub mod headers;
pub mod mixcloud;
pub mod param;
pub mod podcast;
pub mod queue;
pub mod request;
pub mod response;
pub mod server;
pub mod util;

pub use cache::FeedCache;
pub use config::Config;
pub use exception::Exception;
pub use mixcloud::{Feed, Track};
pub use queue::{Download, DownloadQueue};
pub use request::Request;
pub use server::{handle_connection, Context, Route};
pub use util::HtmlBuilder;
