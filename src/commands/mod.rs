pub mod config;
pub mod plan;
pub mod run;
pub mod status;

// Re-export command functions for convenience
pub use config::{config_init, config_show};
pub use plan::plan;
pub use run::run;
pub use status::{clear, status};
