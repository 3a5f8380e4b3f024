pub mod component;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod registry;
pub mod security;
pub mod settings;
pub mod uuid;
