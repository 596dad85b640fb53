//! Configuration: explicit structs constructed once at process start and
//! passed by reference into each component.

mod load;
mod schema;

pub use load::{apply_env_overrides, config_path, load, load_from};
pub use schema::{
    CommandTemplates, Config, GatewayConfig, JobsConfig, KeyHelperConfig, LoggingConfig,
    MirrorConfig, StorageConfig,
};
