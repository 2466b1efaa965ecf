//! Key-derivation parameter sets
//!
//! Every stored credential carries the tag of the parameter set it was
//! derived with, so the iteration count or algorithm can be raised later
//! without invalidating existing credentials.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Verifier length in bytes (256 bits)
pub const VERIFIER_LEN: usize = 32;

/// PBKDF2 iteration count used when nothing else is configured
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 10_000;

/// Upper bound on PBKDF2 iterations accepted from config or storage
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Upper bound on Argon2 memory (4 GiB)
pub const MAX_ARGON2_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Upper bound on Argon2 passes
pub const MAX_ARGON2_ITERATIONS: u32 = 64;

/// Upper bound on Argon2 lanes
pub const MAX_ARGON2_LANES: u32 = 64;

/// Parameter set assumed for records written without a tag
pub const LEGACY_KDF: KdfParams = KdfParams::Pbkdf2Sha1 {
    iterations: DEFAULT_PBKDF2_ITERATIONS,
};

/// Password-based KDF and its cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    /// PBKDF2 with HMAC-SHA1
    Pbkdf2Sha1 {
        /// Iteration count
        iterations: u32,
    },
    /// PBKDF2 with HMAC-SHA256
    Pbkdf2Sha256 {
        /// Iteration count
        iterations: u32,
    },
    /// Argon2id, version 0x13
    Argon2id {
        /// Memory cost in KiB
        memory_kib: u32,
        /// Time cost (passes)
        iterations: u32,
        /// Parallelism
        lanes: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2Sha256 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Argon2id preset: 19 MiB, 2 passes, 1 lane
    pub const fn argon2id_moderate() -> Self {
        KdfParams::Argon2id {
            memory_kib: 19_456,
            iterations: 2,
            lanes: 1,
        }
    }

    /// Short algorithm name used as the tag prefix
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            KdfParams::Pbkdf2Sha1 { .. } => "pbkdf2-sha1",
            KdfParams::Pbkdf2Sha256 { .. } => "pbkdf2-sha256",
            KdfParams::Argon2id { .. } => "argon2id",
        }
    }

    /// True when `self` costs an attacker more than `stored`.
    ///
    /// Algorithms rank Argon2id over PBKDF2-SHA256 over PBKDF2-SHA1. Within
    /// PBKDF2 the iteration count decides; within Argon2id the product of
    /// memory and passes does. Lanes do not count.
    pub fn is_stronger_than(&self, stored: &KdfParams) -> bool {
        match self.rank().cmp(&stored.rank()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.work() > stored.work(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KdfParams::Pbkdf2Sha1 { .. } => 0,
            KdfParams::Pbkdf2Sha256 { .. } => 1,
            KdfParams::Argon2id { .. } => 2,
        }
    }

    fn work(&self) -> u64 {
        match *self {
            KdfParams::Pbkdf2Sha1 { iterations } | KdfParams::Pbkdf2Sha256 { iterations } => {
                u64::from(iterations)
            }
            KdfParams::Argon2id {
                memory_kib,
                iterations,
                ..
            } => u64::from(memory_kib) * u64::from(iterations),
        }
    }

    /// Reject parameter sets that cannot be evaluated
    pub fn validate(&self) -> Result<()> {
        match *self {
            KdfParams::Pbkdf2Sha1 { iterations } | KdfParams::Pbkdf2Sha256 { iterations } => {
                if iterations == 0 || iterations > MAX_PBKDF2_ITERATIONS {
                    return Err(Error::InvalidKdf(format!(
                        "PBKDF2 iterations must be in 1..={}, got {}",
                        MAX_PBKDF2_ITERATIONS, iterations
                    )));
                }
            }
            KdfParams::Argon2id {
                memory_kib,
                iterations,
                lanes,
            } => {
                if iterations == 0 || iterations > MAX_ARGON2_ITERATIONS {
                    return Err(Error::InvalidKdf(format!(
                        "Argon2 passes must be in 1..={}, got {}",
                        MAX_ARGON2_ITERATIONS, iterations
                    )));
                }
                if lanes == 0 || lanes > MAX_ARGON2_LANES {
                    return Err(Error::InvalidKdf(format!(
                        "Argon2 lanes must be in 1..={}, got {}",
                        MAX_ARGON2_LANES, lanes
                    )));
                }
                if memory_kib > MAX_ARGON2_MEMORY_KIB {
                    return Err(Error::InvalidKdf(format!(
                        "Argon2 memory must be at most {} KiB, got {}",
                        MAX_ARGON2_MEMORY_KIB, memory_kib
                    )));
                }
                if memory_kib < lanes * 8 {
                    return Err(Error::InvalidKdf(format!(
                        "Argon2 memory must be at least {} KiB for {} lanes",
                        8 * lanes,
                        lanes
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdfParams::Pbkdf2Sha1 { iterations } | KdfParams::Pbkdf2Sha256 { iterations } => {
                write!(f, "{}:{}", self.algorithm_name(), iterations)
            }
            KdfParams::Argon2id {
                memory_kib,
                iterations,
                lanes,
            } => write!(
                f,
                "{}:m={},t={},p={}",
                self.algorithm_name(),
                memory_kib,
                iterations,
                lanes
            ),
        }
    }
}

impl FromStr for KdfParams {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        let (name, rest) = tag
            .split_once(':')
            .ok_or_else(|| Error::InvalidKdf(format!("missing ':' in tag {:?}", tag)))?;

        let params = match name {
            "pbkdf2-sha1" => KdfParams::Pbkdf2Sha1 {
                iterations: parse_u32(rest, tag)?,
            },
            "pbkdf2-sha256" => KdfParams::Pbkdf2Sha256 {
                iterations: parse_u32(rest, tag)?,
            },
            "argon2id" => {
                let mut memory_kib = None;
                let mut iterations = None;
                let mut lanes = None;
                for field in rest.split(',') {
                    let (key, value) = field
                        .split_once('=')
                        .ok_or_else(|| Error::InvalidKdf(format!("bad field in tag {:?}", tag)))?;
                    let value = parse_u32(value, tag)?;
                    match key {
                        "m" => memory_kib = Some(value),
                        "t" => iterations = Some(value),
                        "p" => lanes = Some(value),
                        _ => {
                            return Err(Error::InvalidKdf(format!(
                                "unknown field {:?} in tag {:?}",
                                key, tag
                            )))
                        }
                    }
                }
                match (memory_kib, iterations, lanes) {
                    (Some(memory_kib), Some(iterations), Some(lanes)) => KdfParams::Argon2id {
                        memory_kib,
                        iterations,
                        lanes,
                    },
                    _ => {
                        return Err(Error::InvalidKdf(format!(
                            "incomplete argon2id tag {:?}",
                            tag
                        )))
                    }
                }
            }
            other => return Err(Error::InvalidKdf(format!("unknown algorithm {:?}", other))),
        };

        params.validate()?;
        Ok(params)
    }
}

fn parse_u32(value: &str, tag: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::InvalidKdf(format!("bad number {:?} in tag {:?}", value, tag)))
}
