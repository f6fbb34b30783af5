pub mod client;
pub mod config;
pub mod logging;
pub mod sensors;
pub mod services;
pub mod shell;
