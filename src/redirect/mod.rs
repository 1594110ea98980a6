pub mod handlers;
mod resolver;
pub mod routes;

pub use resolver::{ClickRedirector, ClickTarget};
pub use routes::create_redirect_router;
