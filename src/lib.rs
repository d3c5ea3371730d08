pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod indicators;
pub mod models;
pub mod processor;
pub mod utils;
