pub mod config;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod routes;
pub mod sandbox;
pub mod verdict;
pub mod web_server;
