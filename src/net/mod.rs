pub mod client;
pub mod types;

pub use client::{HttpClient, Network};
pub use types::{CacheMode, Request, Response, ResponseKind};
