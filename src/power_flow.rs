//! AC power flow for feeders that are radial or carry a few loops.
//!
//! The non-slack block of the bus admittance matrix is factorized once; the bus voltages
//! are then found by fixed-point iteration on the constant-power current injections
//! (the implicit Z-bus method). Loops closed by tie lines need no special treatment.

use crate::encoding::Configuration;
use crate::error::ReconfError;
use crate::network::Network;
use nalgebra as na;
use na::Complex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use thiserror::Error;

type C64 = Complex<f64>;

/// Voltages below this magnitude are treated as collapse.
const COLLAPSE_VM_PU: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PowerFlowSettings {
    /// Largest voltage update (p.u.) accepted as converged
    pub tolerance: f64,
    pub max_iter: usize,
}

impl Default for PowerFlowSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iter: 100,
        }
    }
}

#[derive(Error, Debug)]
pub enum PowerFlowError {
    #[error("{0} bus(es) are not connected to the slack bus")]
    Islanded(usize),
    #[error("bus admittance matrix is singular")]
    Singular,
    #[error("power flow diverged at iteration {0}")]
    Diverged(usize),
    #[error("power flow did not converge in {iterations} iterations (mismatch {mismatch:e})")]
    NotConverged { iterations: usize, mismatch: f64 },
    #[error(transparent)]
    Network(#[from] ReconfError),
}

#[derive(Clone, Debug, Serialize)]
pub struct PowerFlowSolution {
    pub vm_pu: Vec<f64>,
    pub va_degree: Vec<f64>,
    /// Active loss per line in MW, zero for lines out of service
    pub line_loss_mw: Vec<f64>,
    pub iterations: usize,
}

impl PowerFlowSolution {
    pub fn total_loss_mw(&self) -> f64 {
        self.line_loss_mw.iter().sum()
    }

    pub fn total_loss_kw(&self) -> f64 {
        self.total_loss_mw() * 1000.0
    }

    /// (bus, magnitude) of the lowest voltage.
    pub fn min_voltage(&self) -> Option<(usize, f64)> {
        self.vm_pu
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Buses whose magnitude lies outside `[min_pu, max_pu]`.
    pub fn voltage_violations(&self, min_pu: f64, max_pu: f64) -> Vec<usize> {
        self.vm_pu
            .iter()
            .enumerate()
            .filter(|&(_, &vm)| vm < min_pu || vm > max_pu)
            .map(|(bus, _)| bus)
            .collect()
    }
}

struct BranchAdmittance {
    line: usize,
    from: usize,
    to: usize,
    series: C64,
    half_shunt: C64,
}

fn branch_admittances(net: &Network, in_service: &[bool]) -> Vec<BranchAdmittance> {
    let z_base = net.base_impedance_ohm();
    net.lines
        .iter()
        .enumerate()
        .filter(|(i, _)| in_service[*i])
        .map(|(i, line)| {
            let t = &line.line_type;
            let z = C64::new(t.r_ohm_per_km, t.x_ohm_per_km) * line.length_km / z_base;
            let b_siemens = 2.0 * PI * net.f_hz * t.c_nf_per_km * 1e-9 * line.length_km;
            BranchAdmittance {
                line: i,
                from: line.from_bus,
                to: line.to_bus,
                series: C64::new(1.0, 0.0) / z,
                half_shunt: C64::new(0.0, b_siemens * z_base / 2.0),
            }
        })
        .collect()
}

/// Number of buses without an in-service path to the slack bus.
fn unsupplied_buses(net: &Network, branches: &[BranchAdmittance]) -> usize {
    let n = net.buses.len();
    let mut adjacency = vec![Vec::new(); n];
    for br in branches {
        adjacency[br.from].push(br.to);
        adjacency[br.to].push(br.from);
    }
    let mut reached = vec![false; n];
    let mut queue = VecDeque::from([net.slack_bus]);
    reached[net.slack_bus] = true;
    while let Some(bus) = queue.pop_front() {
        for &next in &adjacency[bus] {
            if !reached[next] {
                reached[next] = true;
                queue.push_back(next);
            }
        }
    }
    reached.iter().filter(|&&r| !r).count()
}

/// Solve the network with the given in-service flag for every line.
pub fn solve(
    net: &Network,
    in_service: &[bool],
    settings: &PowerFlowSettings,
) -> Result<PowerFlowSolution, PowerFlowError> {
    let n = net.buses.len();
    let slack = net.slack_bus;
    let branches = branch_admittances(net, in_service);

    let islanded = unsupplied_buses(net, &branches);
    if islanded > 0 {
        return Err(PowerFlowError::Islanded(islanded));
    }

    let mut y_bus = na::DMatrix::<C64>::zeros(n, n);
    for br in &branches {
        let (i, j) = (br.from, br.to);
        y_bus[(i, i)] += br.series + br.half_shunt;
        y_bus[(j, j)] += br.series + br.half_shunt;
        y_bus[(i, j)] -= br.series;
        y_bus[(j, i)] -= br.series;
    }

    // Non-slack buses in ascending order
    let pq: Vec<usize> = (0..n).filter(|&b| b != slack).collect();
    let m = pq.len();
    let y_ll = na::DMatrix::from_fn(m, m, |r, c| y_bus[(pq[r], pq[c])]);
    let v_slack = C64::new(net.slack_vm_pu, 0.0);
    let source = na::DVector::from_fn(m, |r, _| -y_bus[(pq[r], slack)] * v_slack);
    let s_spec: Vec<C64> = pq
        .iter()
        .map(|&b| {
            let (p, q) = net.buses[b].injection();
            C64::new(p, q) / net.sn_mva
        })
        .collect();

    let lu = y_ll.lu();
    if !lu.is_invertible() {
        return Err(PowerFlowError::Singular);
    }

    let mut v = na::DVector::from_element(m, v_slack);
    let mut mismatch = f64::INFINITY;
    for iteration in 1..=settings.max_iter {
        let injection = na::DVector::from_fn(m, |r, _| (s_spec[r] / v[r]).conj());
        let v_new = lu
            .solve(&(injection + &source))
            .ok_or(PowerFlowError::Singular)?;
        if v_new
            .iter()
            .any(|x| !x.re.is_finite() || !x.im.is_finite() || x.norm() < COLLAPSE_VM_PU)
        {
            return Err(PowerFlowError::Diverged(iteration));
        }
        mismatch = (&v_new - &v).iter().map(|d| d.norm()).fold(0.0, f64::max);
        v = v_new;
        if mismatch < settings.tolerance {
            let mut voltages = vec![v_slack; n];
            for (r, &b) in pq.iter().enumerate() {
                voltages[b] = v[r];
            }
            tracing::trace!(iteration, "power flow converged");
            return Ok(build_solution(net, &branches, &voltages, iteration));
        }
    }
    Err(PowerFlowError::NotConverged {
        iterations: settings.max_iter,
        mismatch,
    })
}

fn build_solution(
    net: &Network,
    branches: &[BranchAdmittance],
    voltages: &[C64],
    iterations: usize,
) -> PowerFlowSolution {
    let mut line_loss_mw = vec![0.0; net.lines.len()];
    for br in branches {
        let (vi, vj) = (voltages[br.from], voltages[br.to]);
        let i_ij = (vi - vj) * br.series + vi * br.half_shunt;
        let i_ji = (vj - vi) * br.series + vj * br.half_shunt;
        let loss = vi * i_ij.conj() + vj * i_ji.conj();
        line_loss_mw[br.line] = loss.re * net.sn_mva;
    }
    PowerFlowSolution {
        vm_pu: voltages.iter().map(|v| v.norm()).collect(),
        va_degree: voltages.iter().map(|v| v.arg().to_degrees()).collect(),
        line_loss_mw,
        iterations,
    }
}

/// Apply `code` to the tie switches, then solve.
pub fn solve_configuration(
    net: &Network,
    code: &Configuration,
    settings: &PowerFlowSettings,
) -> Result<PowerFlowSolution, PowerFlowError> {
    let states = net.line_states(code)?;
    solve(net, &states, settings)
}
