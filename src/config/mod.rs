pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    load_settings, parse_bool, read_env_file, settings_from_sources, DebugMode,
    RetrievalWeightSettings, Settings, ValidatorSettings,
};
