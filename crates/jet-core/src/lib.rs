pub mod cache;
pub mod config;
pub mod library;
pub mod metadata;
pub mod model;
pub mod platform;
pub mod resolver;
