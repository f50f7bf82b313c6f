pub mod auth;
pub mod content;
pub mod core;
pub mod dashboard;
pub mod messages;
pub mod notifications;
pub mod session;
