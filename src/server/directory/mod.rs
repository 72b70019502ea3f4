/// Session directory: advertised, joinable sessions (create, query, reserve, expire).

pub mod http;
pub mod server;
pub mod store;
pub mod types;

pub use server::DirectoryServer;
