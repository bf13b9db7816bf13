pub mod addons;
pub mod cache;
pub mod config;
pub mod exception;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod static_handler;
pub mod store;
pub mod tunnel;
pub mod util;
pub mod validator;

pub use cache::{CacheRecord, CacheTable};
pub use config::{Config, StaticHandling};
pub use exception::Exception;
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use router::{Flow, Handler, Router};
pub use static_handler::StaticAssetHandler;
pub use store::{FsResourceStore, InstanceRef, ResourceStore};
pub use tunnel::{RewrittenInstruction, TunnelBridge, TunnelCommand};
