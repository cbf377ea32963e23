pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::GatewayError;
pub use handlers::create_router;
pub use routes::{resolve_route, RouteTarget};
pub use state::AppState;
