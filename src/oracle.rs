use crate::encoding::Configuration;
use crate::error::ReconfError;
use crate::network::Network;
use crate::power_flow::{solve_configuration, PowerFlowSettings};
use crate::topology::TopologyValidator;
use anyhow::{anyhow, bail, Context, Result};
use enum_dispatch::enum_dispatch;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Fitness assigned to configurations whose evaluation fails.
pub const DEFAULT_PENALTY_KW: f64 = 10_000.0;

/// Loss evaluation of a tie-switch configuration. Usually backed by a power flow,
/// so every call is assumed to be expensive.
#[enum_dispatch]
pub trait FitnessOracle: Send + Sync {
    /// Number of tie switches, i.e. the configuration length
    fn switch_count(&self) -> usize;

    /// Total active loss in kW, or the reason the evaluation failed
    fn losses_kw(&self, code: &Configuration) -> Result<f64>;
}

impl<O: FitnessOracle + ?Sized> FitnessOracle for &O {
    fn switch_count(&self) -> usize {
        (**self).switch_count()
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        (**self).losses_kw(code)
    }
}

impl<O: FitnessOracle + ?Sized> FitnessOracle for Box<O> {
    fn switch_count(&self) -> usize {
        (**self).switch_count()
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        (**self).losses_kw(code)
    }
}

/// Loss of `code`, with any failure or non-finite result replaced by `penalty_kw`.
pub fn evaluate<O: FitnessOracle + ?Sized>(
    oracle: &O,
    code: &Configuration,
    penalty_kw: f64,
) -> f64 {
    match oracle.losses_kw(code) {
        Ok(loss) if loss.is_finite() => loss,
        Ok(loss) => {
            debug!(%code, loss, "non-finite loss, applying penalty");
            penalty_kw
        }
        Err(err) => {
            debug!(%code, error = %err, "evaluation failed, applying penalty");
            penalty_kw
        }
    }
}

/// Power flow on a network whose tie switches follow the configuration.
#[derive(Clone)]
pub struct NetworkOracle {
    pub network: Arc<Network>,
    pub settings: PowerFlowSettings,
}

impl NetworkOracle {
    pub fn new(network: Arc<Network>, settings: PowerFlowSettings) -> Self {
        Self { network, settings }
    }
}

impl FitnessOracle for NetworkOracle {
    fn switch_count(&self) -> usize {
        self.network.tie_switches().len()
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        let solution = solve_configuration(&self.network, code, &self.settings)
            .with_context(|| format!("power flow failed for {}", code))?;
        Ok(solution.total_loss_kw())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableEntry {
    pub configuration: Configuration,
    pub loss_kw: f64,
}

/// Precomputed losses, e.g. exported from another power flow tool.
/// Configurations missing from the table fail to evaluate.
#[derive(Clone, Debug)]
pub struct TableOracle {
    switch_count: usize,
    losses: HashMap<Configuration, f64>,
}

impl TableOracle {
    pub fn from_entries(entries: Vec<TableEntry>) -> Result<Self, ReconfError> {
        let switch_count = entries
            .first()
            .map(|e| e.configuration.len())
            .ok_or(ReconfError::EmptyConfiguration)?;
        let mut losses = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.configuration.len() != switch_count {
                return Err(ReconfError::LengthMismatch {
                    expected: switch_count,
                    found: entry.configuration.len(),
                });
            }
            losses.insert(entry.configuration, entry.loss_kw);
        }
        Ok(Self {
            switch_count,
            losses,
        })
    }

    /// Load a JSON list of `{"configuration": [0, 1, ...], "loss_kw": ...}` entries.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Error opening loss table {}", path.display()))?;
        let entries: Vec<TableEntry> = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Error parsing loss table {}", path.display()))?;
        Ok(Self::from_entries(entries)?)
    }
}

impl FitnessOracle for TableOracle {
    fn switch_count(&self) -> usize {
        self.switch_count
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        self.losses
            .get(code)
            .copied()
            .ok_or_else(|| anyhow!("no tabulated loss for {}", code))
    }
}

/// Oracles selectable at run time.
#[enum_dispatch(FitnessOracle)]
#[derive(Clone)]
pub enum OracleWrapper {
    NetworkOracle,
    TableOracle,
}

/// Oracle defined by a closure.
pub struct FnOracle<F> {
    switch_count: usize,
    f: F,
}

impl<F> FnOracle<F>
where
    F: Fn(&Configuration) -> Result<f64> + Send + Sync,
{
    pub fn new(switch_count: usize, f: F) -> Self {
        Self { switch_count, f }
    }
}

impl<F> FitnessOracle for FnOracle<F>
where
    F: Fn(&Configuration) -> Result<f64> + Send + Sync,
{
    fn switch_count(&self) -> usize {
        self.switch_count
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        (self.f)(code)
    }
}

/// Memoizes another oracle. Failures are cached too, with their message.
pub struct CachedOracle<O: FitnessOracle> {
    inner: O,
    cache: Mutex<LruCache<Configuration, Result<f64, String>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<O: FitnessOracle> CachedOracle<O> {
    pub fn new(inner: O, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// (hits, misses) so far.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn lookup(&self, code: &Configuration) -> Result<Option<Result<f64, String>>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("oracle cache lock poisoned"))?;
        Ok(cache.get(code).cloned())
    }
}

impl<O: FitnessOracle> FitnessOracle for CachedOracle<O> {
    fn switch_count(&self) -> usize {
        self.inner.switch_count()
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        if let Some(cached) = self.lookup(code)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.map_err(|msg| anyhow!(msg));
        }
        let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            %code,
            hits = self.hits.load(Ordering::Relaxed),
            misses,
            "loss cache miss"
        );
        // Evaluated without holding the lock
        let result = self.inner.losses_kw(code).map_err(|e| format!("{:#}", e));
        self.cache
            .lock()
            .map_err(|_| anyhow!("oracle cache lock poisoned"))?
            .put(code.clone(), result.clone());
        result.map_err(|msg| anyhow!(msg))
    }
}

/// Rejects configurations the validator refuses before asking the inner oracle.
pub struct ValidatedOracle<O: FitnessOracle, V: TopologyValidator> {
    inner: O,
    validator: V,
}

impl<O: FitnessOracle, V: TopologyValidator> ValidatedOracle<O, V> {
    pub fn new(inner: O, validator: V) -> Self {
        Self { inner, validator }
    }
}

impl<O: FitnessOracle, V: TopologyValidator> FitnessOracle for ValidatedOracle<O, V> {
    fn switch_count(&self) -> usize {
        self.inner.switch_count()
    }

    fn losses_kw(&self, code: &Configuration) -> Result<f64> {
        if let Err(violation) = self.validator.validate(code) {
            bail!("{} rejected: {}", code, violation);
        }
        self.inner.losses_kw(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ieee33;
    use crate::topology::RadialityValidator;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn failures_become_the_penalty() {
        let oracle = FnOracle::new(3, |code: &Configuration| {
            if code.is_closed(0) {
                bail!("did not converge")
            } else if code.is_closed(1) {
                Ok(f64::NAN)
            } else {
                Ok(12.5)
            }
        });
        assert_eq!(evaluate(&oracle, &Configuration::single(3, 0), 10_000.0), 10_000.0);
        assert_eq!(evaluate(&oracle, &Configuration::single(3, 1), 777.0), 777.0);
        assert_eq!(evaluate(&oracle, &Configuration::single(3, 2), 10_000.0), 12.5);
    }

    #[test]
    fn cache_calls_inner_oracle_once_per_configuration() {
        let calls = AtomicUsize::new(0);
        let oracle = FnOracle::new(4, |code: &Configuration| {
            calls.fetch_add(1, Ordering::SeqCst);
            if code.is_closed(3) {
                bail!("diverged")
            }
            Ok(code.closed_indices().next().unwrap_or(9) as f64)
        });
        let cached = CachedOracle::new(oracle, NonZeroUsize::new(8).unwrap());
        for _ in 0..3 {
            for i in 0..4 {
                let _ = cached.losses_kw(&Configuration::single(4, i));
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cached.stats(), (8, 4));
        let err = cached.losses_kw(&Configuration::single(4, 3)).unwrap_err();
        assert!(err.to_string().contains("diverged"));
        assert_eq!(cached.losses_kw(&Configuration::single(4, 2)).unwrap(), 2.0);
    }

    #[test]
    fn table_oracle_lookup() {
        let table = TableOracle::from_entries(vec![
            TableEntry {
                configuration: Configuration::single(2, 0),
                loss_kw: 80.0,
            },
            TableEntry {
                configuration: Configuration::single(2, 1),
                loss_kw: 70.0,
            },
        ])
        .unwrap();
        assert_eq!(table.switch_count(), 2);
        assert_eq!(table.losses_kw(&Configuration::single(2, 1)).unwrap(), 70.0);
        assert!(table.losses_kw(&Configuration::open(2)).is_err());
        assert!(matches!(
            TableOracle::from_entries(vec![]),
            Err(ReconfError::EmptyConfiguration)
        ));
    }

    #[test]
    fn table_oracle_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("losses.json");
        std::fs::write(
            &path,
            r#"[{"configuration": [1, 0, 0], "loss_kw": 140.0},
                {"configuration": [0, 1, 0], "loss_kw": 125.5}]"#,
        )
        .unwrap();
        let table = TableOracle::from_json_file(&path).unwrap();
        let wrapped = OracleWrapper::from(table);
        assert_eq!(wrapped.switch_count(), 3);
        assert_eq!(wrapped.losses_kw(&Configuration::single(3, 1)).unwrap(), 125.5);
    }

    #[test]
    fn network_oracle_reports_losses() {
        let network = Arc::new(ieee33(&[]).unwrap());
        let oracle = NetworkOracle::new(network, PowerFlowSettings::default());
        assert_eq!(oracle.switch_count(), 5);
        let loss = oracle.losses_kw(&Configuration::single(5, 0)).unwrap();
        assert!(loss > 0.0 && loss < DEFAULT_PENALTY_KW);
        assert!(oracle.losses_kw(&Configuration::open(3)).is_err());
    }

    #[test]
    fn validated_oracle_rejects_meshed_topologies() {
        let network = Arc::new(ieee33(&[]).unwrap());
        let oracle = ValidatedOracle::new(
            NetworkOracle::new(network.clone(), PowerFlowSettings::default()),
            RadialityValidator::new(network),
        );
        assert!(oracle.losses_kw(&Configuration::open(5)).is_ok());
        let err = oracle.losses_kw(&Configuration::single(5, 1)).unwrap_err();
        assert!(err.to_string().contains("loop"));
        assert_eq!(
            evaluate(&oracle, &Configuration::single(5, 1), DEFAULT_PENALTY_KW),
            DEFAULT_PENALTY_KW
        );
    }
}
