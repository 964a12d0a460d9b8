//! Run configuration read from a TOML file. Every section and key is optional.
//!
//! ```toml
//! seed = 42
//!
//! [pso]
//! num_particles = 30
//! max_iters = 50
//! update = "immediate"
//!
//! [power_flow]
//! tolerance = 1e-8
//!
//! [[grid.dg]]
//! bus = 7
//! p_mw = 0.2
//!
//! [cache]
//! capacity = 64
//! ```

use crate::error::ReconfResult;
use crate::fitting::PSOSettings;
use crate::network::DistributedGeneration;
use crate::power_flow::PowerFlowSettings;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Seed of the swarm's random generator; entropy when absent
    pub seed: Option<u64>,
    pub pso: PSOSettings,
    pub power_flow: PowerFlowSettings,
    pub grid: GridSettings,
    pub cache: CacheSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridSettings {
    pub dg: Vec<DistributedGeneration>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            dg: vec![
                DistributedGeneration {
                    bus: 7,
                    p_mw: 0.2,
                    q_mvar: 0.0,
                },
                DistributedGeneration {
                    bus: 22,
                    p_mw: 0.2,
                    q_mvar: 0.0,
                },
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Configurations remembered by the loss cache, 0 disables it
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl CacheSettings {
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.capacity)
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> ReconfResult<Self> {
        let settings: Settings = toml::from_str(s)?;
        settings.pso.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> ReconfResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}
