//! Loopback HTTP proxy in front of the agy gateway.
//!
//! The gateway answers with provider-specific model ids that clients do not
//! recognize. Every request is forwarded verbatim to the configured upstream;
//! responses come back with the `model` field normalized ([`model`]), either
//! in a buffered JSON body or line by line in an SSE stream ([`transform`]).

pub mod config;
pub mod error;
pub mod forward;
pub mod model;
pub mod server;
pub mod transform;

pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use model::{MODEL_ID_MAP, normalize_model_id};
pub use server::{AgyProxy, ShutdownHandle};
pub use transform::{SseRewriter, transform_json_body, transform_sse_line};
