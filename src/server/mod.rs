pub mod error;
pub mod handler;
pub mod listener;
pub mod manager;
pub mod reload;

pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use handler::{RequestHandler, LOST_MESSAGE};
pub use listener::ServerListener;
pub use manager::ServerManager;
pub use reload::{shared_routes, ReloadCoordinator, SharedRoutes};
