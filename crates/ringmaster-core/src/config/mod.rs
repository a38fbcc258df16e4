//! Runtime configuration: serde TOML schema plus file/env loading.

mod loader;
mod schema;

pub use loader::{default_config_path, load_config, load_default_config, save_config};
pub use schema::{
    AgentConfig, GuardConfig, IdempotencyConfig, MemoryConfig, RagConfig, ResilienceConfig,
    RingmasterConfig,
};
