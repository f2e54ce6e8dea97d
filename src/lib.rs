pub mod broker;
pub mod codec;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod models;
pub mod store;
