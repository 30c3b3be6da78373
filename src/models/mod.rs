//! Domain models shared by the pipeline components

pub mod logo;

pub use logo::*;
