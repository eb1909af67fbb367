pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod detector;
pub mod pipeline;
mod server;
pub mod storage;

pub use config::Opts;
