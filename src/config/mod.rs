mod loader;
mod types;

pub use loader::{CONFIG_FILE, load};
pub use types::{
    ClusterSettings, Config, ImageSpec, ProbeTarget, ProbeTargets, RegistrySettings, Timeouts,
};
