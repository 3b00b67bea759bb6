//! Port implementations.

pub mod http_dispatch;

pub use http_dispatch::HttpDispatcher;
