// Imagist image transformation proxy library

pub mod config;
pub mod constants;
pub mod error;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod source;
pub mod transform;
