//! Circuit identity: versioned registry records and the static artifact
//! manifest produced by the circuit build tooling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::domain::CurveId;

/// A versioned circuit registration.
///
/// At most one record per `(name, curve)` is active at a time; activating a
/// new version is paired with deactivating the prior one in the same
/// critical section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitRecord {
    /// Circuit name, e.g. `eligibility` or `batch_tally`
    pub name: String,
    /// Curve the compiled artifacts target
    pub curve: CurveId,
    /// Monotonic version per name
    pub version: u32,
    /// Content hash of the compiled circuit (hex)
    pub circuit_hash: String,
    /// Whether this record is the one `resolve` returns
    pub active: bool,
}

/// Artifact locations for one `(circuit, curve)` pair in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Content hash of the circuit source (hex)
    pub hash: String,
    pub r1cs: String,
    pub wasm: String,
    pub zkey: String,
}

/// Static circuit manifest: `name -> curve -> artifact entry`.
///
/// Written by the circuit build step; loaded once at startup. A missing
/// manifest file degrades to empty defaults with a warning, it is not a
/// startup failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitManifest {
    entries: HashMap<String, HashMap<CurveId, ManifestEntry>>,
}

impl CircuitManifest {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the manifest from disk, falling back to empty defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse circuit manifest, using empty defaults");
                    Self::empty()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "circuit manifest not found, using empty defaults");
                Self::empty()
            }
        }
    }

    /// Look up the manifest entry for a circuit/curve pair.
    pub fn entry(&self, name: &str, curve: CurveId) -> Option<&ManifestEntry> {
        self.entries.get(name).and_then(|by_curve| by_curve.get(&curve))
    }

    /// Insert an entry (used by tests and tooling).
    pub fn insert(&mut self, name: impl Into<String>, curve: CurveId, entry: ManifestEntry) {
        self.entries.entry(name.into()).or_default().insert(curve, entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
