pub mod handlers;
pub mod manage;
pub mod params;
pub mod routes;
mod static_files;

pub use handlers::AppState;
pub use routes::create_api_router;
