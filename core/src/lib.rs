pub mod bridge;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod net;
pub mod protocol;
pub mod serial;
