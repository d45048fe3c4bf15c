//! Hub configuration: schema, file discovery, `${ENV}` substitution.
//!
//! Files are looked up as `smarthub.{toml,yaml,yml,json}`, first in the
//! working directory, then in `~/.config/smarthub/`.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, data_dir, discover_and_load, find_or_default_config_path,
        load_config, set_config_dir,
    },
    schema::{DiscoveryConfig, GatewayConfig, HubConfig, StorageBackend, StorageConfig},
};
