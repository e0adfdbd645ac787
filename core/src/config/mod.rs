mod load;
mod types;

pub use load::{
    apply_env_overrides, get_data_dir, load, load_from_file, ENV_FAILURE_POLICY, ENV_LOG_LEVEL,
    ENV_MAX_PARALLEL, ENV_PERMISSION_PRESET,
};
pub use types::{AppConfig, LoggingConfig, OutputConfig, OutputFormat, PermissionsConfig};
