//! Gateway server: HTTP boundary and process lifecycle

mod proxy;
mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Gateway;
