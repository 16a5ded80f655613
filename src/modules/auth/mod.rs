pub mod controller;
pub mod error;
pub mod middleware;
pub mod model;
pub mod routes;
pub mod schema;
pub mod service;
pub mod store;

pub use routes::auth_routes;
