//! HTTP surface: the agent service and the relay service routers

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use server::serve_agent;
pub use server::serve_relay;
