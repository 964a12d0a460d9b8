use crate::error::ReconfError;
use itertools::Itertools;
use nalgebra as na;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Switch states of the tie switches, in the order the network lists them.
/// `true` means closed (in service).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct Configuration(Vec<bool>);

impl Configuration {
    /// All tie switches open.
    pub fn open(len: usize) -> Self {
        Self(vec![false; len])
    }

    /// Exactly one tie switch closed.
    pub fn single(len: usize, closed: usize) -> Self {
        let mut code = Self::open(len);
        code.set(closed, true);
        code
    }

    /// Independent Bernoulli(0.5) draw for every switch.
    pub fn random(rng: &mut impl Rng, len: usize) -> Self {
        Self((0..len).map(|_| rng.gen_bool(0.5)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.0[index]
    }

    pub fn set(&mut self, index: usize, closed: bool) {
        self.0[index] = closed;
    }

    pub fn clear(&mut self) {
        self.0.iter_mut().for_each(|b| *b = false);
    }

    pub fn closed_count(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    pub fn closed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().positions(|&b| b)
    }

    /// The bits as a vector of 0.0 / 1.0, used in the velocity update.
    pub fn as_vector(&self) -> na::DVector<f64> {
        na::DVector::from_iterator(self.len(), self.0.iter().map(|&b| if b { 1.0 } else { 0.0 }))
    }
}

impl From<Vec<bool>> for Configuration {
    fn from(value: Vec<bool>) -> Self {
        Self(value)
    }
}

impl From<Configuration> for Vec<u8> {
    fn from(value: Configuration) -> Self {
        value.0.into_iter().map(u8::from).collect()
    }
}

impl TryFrom<Vec<u8>> for Configuration {
    type Error = ReconfError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        value
            .into_iter()
            .map(|bit| match bit {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(ReconfError::InvalidBit(other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().map(|&b| u8::from(b)).join(", "))
    }
}
