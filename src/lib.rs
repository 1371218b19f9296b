pub mod api;
pub mod auth;
pub mod config;
pub mod conflict;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod external;
pub mod geocoder;
pub mod matching;
pub mod notifier;
pub mod server;
