use thiserror::Error;

/// Errors raised while setting up a reconfiguration run.
///
/// Everything here is reported before the first oracle call. Failures of the oracle
/// itself never surface as errors, they are turned into the penalty fitness.
#[derive(Error, Debug)]
pub enum ReconfError {
    #[error("invalid configuration length: the network has no tie switches")]
    EmptyConfiguration,

    #[error("invalid swarm size: at least one particle is required")]
    EmptySwarm,

    #[error("invalid PSO parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("configuration has {found} bits, the network has {expected} tie switches")]
    LengthMismatch { expected: usize, found: usize },

    #[error("invalid switch state {0}, expected 0 or 1")]
    InvalidBit(u8),

    #[error("bus {0} does not exist")]
    UnknownBus(usize),

    #[error("could not parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReconfResult<T> = Result<T, ReconfError>;
