pub mod api;
pub mod consumer;
pub mod error;
pub mod models;
pub mod processor;
pub mod queue;
pub mod schema;
pub mod store;
