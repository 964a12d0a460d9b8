//! Distribution network description consumed by the power flow and the radiality check.
//!
//! The network keeps sectionalizing lines and tie lines in one list. Tie lines are the
//! decision variables of the reconfiguration: the `i`-th entry of
//! [`Network::tie_switches`] is driven by bit `i` of a [`Configuration`].

use crate::encoding::Configuration;
use crate::error::{ReconfError, ReconfResult};
use serde::{Deserialize, Serialize};

/// Per-kilometre line parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineType {
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    pub c_nf_per_km: f64,
    pub max_i_ka: f64,
}

/// Line type shared by every branch of the 33-bus feeder.
pub const IEEE33_LINE_TYPE: LineType = LineType {
    r_ohm_per_km: 0.324,
    x_ohm_per_km: 0.209,
    c_nf_per_km: 126.0,
    max_i_ka: 0.4,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Section,
    Tie,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Line {
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    pub length_km: f64,
    pub line_type: LineType,
    pub kind: LineKind,
    /// Switch state the line has when no configuration is applied.
    pub in_service: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
    pub p_load_mw: f64,
    pub q_load_mvar: f64,
    pub p_gen_mw: f64,
    pub q_gen_mvar: f64,
}

impl Bus {
    /// Net injection (generation minus load) in MW / Mvar.
    pub fn injection(&self) -> (f64, f64) {
        (
            self.p_gen_mw - self.p_load_mw,
            self.q_gen_mvar - self.q_load_mvar,
        )
    }
}

/// A distributed generator modelled as a constant PQ injection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistributedGeneration {
    pub bus: usize,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub vn_kv: f64,
    pub f_hz: f64,
    pub sn_mva: f64,
    pub slack_bus: usize,
    pub slack_vm_pu: f64,
    pub buses: Vec<Bus>,
    pub lines: Vec<Line>,
    tie_switches: Vec<usize>,
}

impl Network {
    pub fn new(name: &str, vn_kv: f64, f_hz: f64) -> Self {
        Self {
            name: name.to_string(),
            vn_kv,
            f_hz,
            sn_mva: 1.0,
            slack_bus: 0,
            slack_vm_pu: 1.0,
            buses: Vec::new(),
            lines: Vec::new(),
            tie_switches: Vec::new(),
        }
    }

    pub fn add_bus(&mut self, name: &str) -> usize {
        self.buses.push(Bus {
            name: name.to_string(),
            ..Default::default()
        });
        self.buses.len() - 1
    }

    pub fn set_slack(&mut self, bus: usize, vm_pu: f64) -> ReconfResult<()> {
        self.check_bus(bus)?;
        self.slack_bus = bus;
        self.slack_vm_pu = vm_pu;
        Ok(())
    }

    pub fn add_load(&mut self, bus: usize, p_mw: f64, q_mvar: f64) -> ReconfResult<()> {
        self.check_bus(bus)?;
        self.buses[bus].p_load_mw += p_mw;
        self.buses[bus].q_load_mvar += q_mvar;
        Ok(())
    }

    pub fn add_generation(&mut self, dg: DistributedGeneration) -> ReconfResult<()> {
        self.check_bus(dg.bus)?;
        self.buses[dg.bus].p_gen_mw += dg.p_mw;
        self.buses[dg.bus].q_gen_mvar += dg.q_mvar;
        Ok(())
    }

    pub fn add_line(
        &mut self,
        name: &str,
        from_bus: usize,
        to_bus: usize,
        length_km: f64,
        line_type: LineType,
    ) -> ReconfResult<usize> {
        self.push_line(name, from_bus, to_bus, length_km, line_type, LineKind::Section)
    }

    /// Add a normally open tie line. Its position in the tie list is its bit index.
    pub fn add_tie_line(
        &mut self,
        name: &str,
        from_bus: usize,
        to_bus: usize,
        length_km: f64,
        line_type: LineType,
    ) -> ReconfResult<usize> {
        let idx = self.push_line(name, from_bus, to_bus, length_km, line_type, LineKind::Tie)?;
        self.tie_switches.push(idx);
        Ok(idx)
    }

    fn push_line(
        &mut self,
        name: &str,
        from_bus: usize,
        to_bus: usize,
        length_km: f64,
        line_type: LineType,
        kind: LineKind,
    ) -> ReconfResult<usize> {
        self.check_bus(from_bus)?;
        self.check_bus(to_bus)?;
        self.lines.push(Line {
            name: name.to_string(),
            from_bus,
            to_bus,
            length_km,
            line_type,
            kind,
            in_service: kind == LineKind::Section,
        });
        Ok(self.lines.len() - 1)
    }

    fn check_bus(&self, bus: usize) -> ReconfResult<()> {
        if bus < self.buses.len() {
            Ok(())
        } else {
            Err(ReconfError::UnknownBus(bus))
        }
    }

    /// Line indices of the tie switches, in bit order.
    pub fn tie_switches(&self) -> &[usize] {
        &self.tie_switches
    }

    pub fn tie_switch_names(&self) -> Vec<&str> {
        self.tie_switches
            .iter()
            .map(|&i| self.lines[i].name.as_str())
            .collect()
    }

    /// In-service flag of every line once `code` is applied to the tie switches.
    /// Sectionalizing lines keep their own state.
    pub fn line_states(&self, code: &Configuration) -> ReconfResult<Vec<bool>> {
        if code.len() != self.tie_switches.len() {
            return Err(ReconfError::LengthMismatch {
                expected: self.tie_switches.len(),
                found: code.len(),
            });
        }
        let mut states: Vec<bool> = self.lines.iter().map(|l| l.in_service).collect();
        for (bit, &line) in self.tie_switches.iter().enumerate() {
            states[line] = code.is_closed(bit);
        }
        Ok(states)
    }

    pub fn base_impedance_ohm(&self) -> f64 {
        self.vn_kv * self.vn_kv / self.sn_mva
    }
}

/// Section lines of the 33-bus feeder: (from, to, length in km).
const IEEE33_SECTIONS: [(usize, usize, f64); 32] = [
    (0, 1, 0.4),
    (1, 2, 0.4),
    (2, 3, 0.6),
    (3, 4, 0.6),
    (4, 5, 0.6),
    (5, 6, 0.6),
    (6, 7, 0.6),
    (7, 8, 0.6),
    (8, 9, 0.6),
    (9, 10, 0.6),
    (10, 11, 0.6),
    (11, 12, 0.6),
    (12, 13, 0.6),
    (13, 14, 0.1),
    (14, 15, 0.1),
    (15, 16, 0.1),
    (16, 17, 0.1),
    (17, 18, 0.2),
    (18, 19, 0.2),
    (19, 20, 0.2),
    (20, 21, 0.2),
    (21, 22, 0.2),
    (22, 23, 0.2),
    (23, 24, 0.2),
    (24, 25, 0.2),
    (25, 26, 0.2),
    (26, 27, 0.2),
    (27, 28, 0.2),
    (28, 29, 0.2),
    (29, 30, 0.2),
    (30, 31, 0.2),
    (31, 32, 0.2),
];

const IEEE33_TIES: [(usize, usize, f64); 5] = [
    (7, 20, 0.8),
    (8, 14, 0.8),
    (11, 21, 0.8),
    (17, 32, 0.8),
    (24, 28, 0.8),
];

/// (bus, MW, Mvar)
const IEEE33_LOADS: [(usize, f64, f64); 32] = [
    (1, 0.010, 0.006),
    (2, 0.009, 0.004),
    (3, 0.120, 0.080),
    (4, 0.060, 0.030),
    (5, 0.060, 0.020),
    (6, 0.045, 0.030),
    (7, 0.060, 0.035),
    (8, 0.060, 0.035),
    (9, 0.090, 0.040),
    (10, 0.090, 0.040),
    (11, 0.060, 0.020),
    (12, 0.060, 0.020),
    (13, 0.060, 0.020),
    (14, 0.120, 0.070),
    (15, 0.200, 0.100),
    (16, 0.100, 0.060),
    (17, 0.060, 0.030),
    (18, 0.060, 0.020),
    (19, 0.045, 0.030),
    (20, 0.060, 0.035),
    (21, 0.060, 0.035),
    (22, 0.045, 0.025),
    (23, 0.060, 0.030),
    (24, 0.060, 0.030),
    (25, 0.060, 0.030),
    (26, 0.045, 0.025),
    (27, 0.060, 0.030),
    (28, 0.060, 0.030),
    (29, 0.060, 0.030),
    (30, 0.045, 0.025),
    (31, 0.060, 0.030),
    (32, 0.060, 0.030),
];

/// IEEE 33-bus feeder at 12.66 kV with the given DG injections.
///
/// Tie lines 33-37 are open, every section line is closed, bus 0 is the substation.
pub fn ieee33(dg: &[DistributedGeneration]) -> ReconfResult<Network> {
    let mut net = Network::new("IEEE 33-bus", 12.66, 50.0);
    for i in 0..33 {
        net.add_bus(&format!("bus {}", i));
    }
    net.set_slack(0, 1.0)?;
    for (idx, &(from, to, length)) in IEEE33_SECTIONS.iter().enumerate() {
        net.add_line(&format!("section {}", idx + 1), from, to, length, IEEE33_LINE_TYPE)?;
    }
    for (idx, &(from, to, length)) in IEEE33_TIES.iter().enumerate() {
        net.add_tie_line(&format!("tie {}", 33 + idx), from, to, length, IEEE33_LINE_TYPE)?;
    }
    for &(bus, p, q) in IEEE33_LOADS.iter() {
        net.add_load(bus, p, q)?;
    }
    for &g in dg {
        net.add_generation(g)?;
    }
    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ieee33_layout() {
        let net = ieee33(&[]).unwrap();
        assert_eq!(net.buses.len(), 33);
        assert_eq!(net.lines.len(), 37);
        assert_eq!(net.tie_switches(), &[32, 33, 34, 35, 36]);
        assert_eq!(net.tie_switch_names()[0], "tie 33");
        let total_load: f64 = net.buses.iter().map(|b| b.p_load_mw).sum();
        assert!((total_load - 2.104).abs() < 1e-9);
    }

    #[test]
    fn configuration_drives_only_tie_lines() {
        let net = ieee33(&[]).unwrap();
        let states = net.line_states(&Configuration::single(5, 3)).unwrap();
        assert!(states[..32].iter().all(|&s| s));
        assert_eq!(&states[32..], &[false, false, false, true, false]);
    }

    #[test]
    fn wrong_configuration_length_is_rejected() {
        let net = ieee33(&[]).unwrap();
        assert!(matches!(
            net.line_states(&Configuration::open(4)),
            Err(ReconfError::LengthMismatch {
                expected: 5,
                found: 4
            })
        ));
    }

    #[test]
    fn dg_is_an_injection() {
        let dg = DistributedGeneration {
            bus: 7,
            p_mw: 0.2,
            q_mvar: 0.05,
        };
        let net = ieee33(&[dg]).unwrap();
        let (p, q) = net.buses[7].injection();
        assert!((p - 0.14).abs() < 1e-12);
        assert!((q - 0.015).abs() < 1e-12);
        assert!(matches!(
            ieee33(&[DistributedGeneration { bus: 40, ..dg }]),
            Err(ReconfError::UnknownBus(40))
        ));
    }
}
