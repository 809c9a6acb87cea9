//! Command implementations.

mod config;
mod doctor;
mod init;
mod serve;
mod voices;

pub use config::run_config;
pub use doctor::run_doctor;
pub use init::run_init;
pub use serve::run_serve;
pub use voices::run_voices;
