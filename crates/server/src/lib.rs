pub mod api;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handler_factory;
pub mod publisher;
pub mod state_factory;
