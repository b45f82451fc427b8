pub mod builds;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod versions;
pub mod ws;

pub use routes::create_router;
pub use ws::WsMessage;
