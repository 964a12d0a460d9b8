//! Loss-minimizing reconfiguration of distribution networks with a binary particle swarm.
//!
//! A [`Configuration`] holds one bit per tie switch (1 = closed). The swarm searches the
//! configurations that close exactly one tie switch for the lowest active loss reported by
//! a [`FitnessOracle`]. Configurations the oracle fails to evaluate receive a penalty
//! fitness, so a single bad power flow never aborts a run.
//!
//! ```no_run
//! use dnr_pso::{ieee33, NetworkOracle, PSOSettings, PowerFlowSettings, Reconfigurer};
//! use std::sync::Arc;
//!
//! let network = Arc::new(ieee33(&[])?);
//! let oracle = NetworkOracle::new(network, PowerFlowSettings::default());
//! let result = Reconfigurer::new(oracle, PSOSettings::default()).fit(Some(42), None, false)?;
//! println!("{} -> {:.2} kW", result.best_configuration, result.best_loss_kw);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod bounds;
pub mod encoding;
pub mod error;
pub mod fitting;
pub mod network;
pub mod oracle;
pub mod particleswarm;
pub mod power_flow;
pub mod record;
pub mod report;
pub mod settings;
pub mod topology;

pub use bounds::{FeasibilityRepair, SingleTieRepair};
pub use encoding::Configuration;
pub use error::{ReconfError, ReconfResult};
pub use fitting::{best_of, optimize, PSOSettings, ReconfigurationResult, Reconfigurer};
pub use network::{ieee33, DistributedGeneration, Network};
pub use oracle::{
    evaluate, CachedOracle, FitnessOracle, FnOracle, NetworkOracle, OracleWrapper,
    TableOracle, ValidatedOracle, DEFAULT_PENALTY_KW,
};
pub use particleswarm::{BinaryParticleSwarm, GlobalBestUpdate};
pub use power_flow::{PowerFlowError, PowerFlowSettings, PowerFlowSolution};
pub use record::ConvergenceRecord;
pub use report::ReconfigurationReport;
pub use settings::Settings;
pub use topology::{RadialityValidator, TopologyValidator};
