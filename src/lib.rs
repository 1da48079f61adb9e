pub mod auth;
pub mod error;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod storage; // upload handling, exposed for routes and tests
pub mod timeout; // request deadline middleware

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use timeout::RequestTimeout;
