//! Summary of a reconfiguration run in network terms.

use crate::encoding::Configuration;
use crate::fitting::ReconfigurationResult;
use crate::network::Network;
use crate::power_flow::{solve_configuration, PowerFlowSettings};
use crate::record::ConvergenceRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::warn;

/// Operating voltage band in p.u.
pub const VOLTAGE_LIMITS_PU: (f64, f64) = (0.95, 1.05);

#[derive(Clone, Debug, Serialize)]
pub struct SwitchState {
    pub name: String,
    /// Index of the tie line in the network's line list
    pub line: usize,
    pub closed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReconfigurationReport {
    pub network: String,
    pub best_configuration: Configuration,
    pub switches: Vec<SwitchState>,
    pub best_loss_kw: f64,
    /// Loss with every tie switch open
    pub initial_loss_kw: f64,
    pub loss_reduction_percent: f64,
    /// Empty when the power flow of the best configuration fails
    pub voltage_profile_pu: Vec<f64>,
    pub min_voltage: Option<(usize, f64)>,
    pub voltage_violations: Vec<usize>,
    pub iteration_record: ConvergenceRecord,
    /// Generation at which the best loss was first found
    pub settled_at: Option<usize>,
    pub iters: u64,
    pub time: f64,
}

impl ReconfigurationReport {
    /// `initial_loss_kw` is the fitness of the all-open configuration under the same oracle.
    pub fn new(
        network: &Network,
        settings: &PowerFlowSettings,
        result: &ReconfigurationResult,
        initial_loss_kw: f64,
    ) -> Result<Self> {
        let code = &result.best_configuration;
        let states = network.line_states(code)?;
        let switches = network
            .tie_switches()
            .iter()
            .map(|&line| SwitchState {
                name: network.lines[line].name.clone(),
                line,
                closed: states[line],
            })
            .collect();

        let (voltage_profile_pu, min_voltage, voltage_violations) =
            match solve_configuration(network, code, settings) {
                Ok(solution) => {
                    let (min_pu, max_pu) = VOLTAGE_LIMITS_PU;
                    let violations = solution.voltage_violations(min_pu, max_pu);
                    let min_voltage = solution.min_voltage();
                    (solution.vm_pu, min_voltage, violations)
                }
                Err(err) => {
                    warn!(%code, error = %err, "no voltage profile for the best configuration");
                    (Vec::new(), None, Vec::new())
                }
            };

        let loss_reduction_percent = if initial_loss_kw > 0.0 {
            (initial_loss_kw - result.best_loss_kw) / initial_loss_kw * 100.0
        } else {
            0.0
        };

        Ok(Self {
            network: network.name.clone(),
            best_configuration: code.clone(),
            switches,
            best_loss_kw: result.best_loss_kw,
            initial_loss_kw,
            loss_reduction_percent,
            voltage_profile_pu,
            min_voltage,
            voltage_violations,
            iteration_record: result.iteration_record.clone(),
            settled_at: result.iteration_record.settled_at(),
            iters: result.iters,
            time: result.time,
        })
    }

    /// Switching actions that take the network from all ties open to the best configuration.
    pub fn operations(&self) -> Vec<String> {
        self.switches
            .iter()
            .filter(|s| s.closed)
            .map(|s| format!("close {} (line {})", s.name, s.line))
            .collect()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Error creating report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl fmt::Display for ReconfigurationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.network)?;
        writeln!(f, "best configuration: {}", self.best_configuration)?;
        for switch in &self.switches {
            let state = if switch.closed { "closed" } else { "open" };
            writeln!(f, "  {:<8} {}", switch.name, state)?;
        }
        writeln!(f, "initial loss: {:.2} kW", self.initial_loss_kw)?;
        writeln!(f, "best loss:    {:.2} kW", self.best_loss_kw)?;
        writeln!(f, "reduction:    {:.2} %", self.loss_reduction_percent)?;
        if let Some((bus, vm)) = self.min_voltage {
            writeln!(f, "min voltage:  {:.4} p.u. at bus {}", vm, bus)?;
        }
        if !self.voltage_violations.is_empty() {
            writeln!(
                f,
                "{} bus(es) outside {:?} p.u.",
                self.voltage_violations.len(),
                VOLTAGE_LIMITS_PU
            )?;
        }
        for op in self.operations() {
            writeln!(f, "advice: {}", op)?;
        }
        if let Some(generation) = self.settled_at {
            writeln!(f, "best found at generation {}", generation)?;
        }
        write!(f, "{} generations in {:.2} s", self.iters, self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ieee33;

    fn result(code: Configuration, best_loss_kw: f64) -> ReconfigurationResult {
        ReconfigurationResult {
            best_configuration: code,
            best_loss_kw,
            iteration_record: ConvergenceRecord::from(vec![120.0, best_loss_kw]),
            seed: Some(1),
            iters: 1,
            time: 0.5,
        }
    }

    #[test]
    fn report_for_closed_tie() {
        let net = ieee33(&[]).unwrap();
        let settings = PowerFlowSettings::default();
        let report = ReconfigurationReport::new(
            &net,
            &settings,
            &result(Configuration::single(5, 1), 90.0),
            120.0,
        )
        .unwrap();
        assert_eq!(report.switches.len(), 5);
        assert!(report.switches[1].closed);
        assert_eq!(report.switches[1].line, 33);
        assert!((report.loss_reduction_percent - 25.0).abs() < 1e-12);
        assert_eq!(report.voltage_profile_pu.len(), 33);
        assert_eq!(report.voltage_profile_pu[0], 1.0);
        let (bus, vm) = report.min_voltage.unwrap();
        assert!(bus > 0 && vm < 1.0);
        assert_eq!(report.operations(), vec!["close tie 34 (line 33)".to_string()]);
        assert_eq!(report.settled_at, Some(1));
        let summary = report.to_string();
        assert!(summary.contains("tie 34   closed"));
        assert!(summary.contains("best found at generation 1"));
    }

    #[test]
    fn written_report_is_json() {
        let net = ieee33(&[]).unwrap();
        let report = ReconfigurationReport::new(
            &net,
            &PowerFlowSettings::default(),
            &result(Configuration::single(5, 4), 100.0),
            100.0,
        )
        .unwrap();
        assert_eq!(report.loss_reduction_percent, 0.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["best_configuration"], serde_json::json!([0, 0, 0, 0, 1]));
        assert_eq!(value["iteration_record"], serde_json::json!([120.0, 100.0]));
    }

    #[test]
    fn wrong_length_is_an_error() {
        let net = ieee33(&[]).unwrap();
        assert!(ReconfigurationReport::new(
            &net,
            &PowerFlowSettings::default(),
            &result(Configuration::single(3, 0), 1.0),
            1.0
        )
        .is_err());
    }
}
