pub mod auth;
pub mod config;
pub mod game;
pub mod ledger;
pub mod registry;
pub mod round;
pub mod scoring;
pub mod types;
