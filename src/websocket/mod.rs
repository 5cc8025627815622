pub mod connection;
pub mod handler;
pub mod types;

pub use connection::Connection;
pub use handler::ws_handler;
