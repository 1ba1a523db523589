//! Core type definitions shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 32-byte hash (SHA-256)
pub type Hash256 = [u8; 32];

/// Elliptic-curve parameter set a circuit's proof is constructed under.
///
/// The curve affects hash and key material only, never circuit logic, so it
/// is part of circuit identity for caching and artifact resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveId {
    Bn254,
    Bls12_381,
}

impl CurveId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurveId::Bn254 => "bn254",
            CurveId::Bls12_381 => "bls12_381",
        }
    }
}

impl Default for CurveId {
    fn default() -> Self {
        CurveId::Bn254
    }
}

impl fmt::Display for CurveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurveId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bn254" | "bn128" => Ok(CurveId::Bn254),
            "bls12_381" | "bls12-381" => Ok(CurveId::Bls12_381),
            other => Err(format!("unknown curve: {other}")),
        }
    }
}
