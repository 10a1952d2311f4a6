//! Core types and traits for the TransitFlow notification pipeline

pub mod config;
pub mod errors;
pub mod event;
pub mod handler;
pub mod prelude;

pub use config::BrokerConfig;
pub use errors::NotifyError;
pub use event::NotificationEvent;
pub use handler::NotificationHandler;
