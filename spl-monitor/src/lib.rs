pub mod api;
pub mod config;
pub mod db;
pub mod stream_handler;
