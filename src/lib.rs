pub mod config;
pub mod errors;
pub mod logo_assets;
pub mod models;
pub mod utils;
pub mod web;
