//! Cycle-basis artifact.
//!
//! Computing the cycle basis is cheap for small systems but is repeated by
//! every run of a large one. The artifact stores the basis together with a
//! SHA-256 fingerprint of the ordered line list; any change to the lines
//! (order, endpoints or susceptance) invalidates it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pcm_core::{cycle_basis, CycleBasis, Network};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CycleArtifact {
    fingerprint: String,
    lines: usize,
    basis: CycleBasis,
}

/// Fingerprint of the line list, in network order.
pub fn line_fingerprint(network: &Network) -> String {
    let mut hasher = Sha256::new();
    for line in network.lines() {
        hasher.update(line.name.as_bytes());
        hasher.update([0]);
        hasher.update(line.source.as_bytes());
        hasher.update([0]);
        hasher.update(line.sink.as_bytes());
        hasher.update([0]);
        hasher.update(line.susceptance.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn save_cycle_basis(network: &Network, basis: &CycleBasis, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let artifact = CycleArtifact {
        fingerprint: line_fingerprint(network),
        lines: network.lines().len(),
        basis: basis.clone(),
    };
    let json = serde_json::to_string_pretty(&artifact).context("serializing cycle basis")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), cycles = basis.len(), "cycle basis saved");
    Ok(())
}

/// Read an artifact; `None` when its fingerprint does not match `network`.
pub fn load_cycle_basis(network: &Network, path: &Path) -> Result<Option<CycleBasis>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let artifact: CycleArtifact =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    if artifact.fingerprint != line_fingerprint(network) || !artifact.basis.matches(network) {
        return Ok(None);
    }
    Ok(Some(artifact.basis))
}

/// Reuse the artifact at `path` when it is current, otherwise recompute and overwrite it.
pub fn load_or_compute_cycle_basis(network: &Network, path: &Path) -> Result<CycleBasis> {
    if path.exists() {
        match load_cycle_basis(network, path) {
            Ok(Some(basis)) => {
                info!(path = %path.display(), cycles = basis.len(), "reusing cycle basis");
                return Ok(basis);
            }
            Ok(None) => info!(path = %path.display(), "cycle basis is stale, recomputing"),
            Err(e) => warn!(path = %path.display(), error = %e, "unreadable cycle basis, recomputing"),
        }
    }
    let basis = cycle_basis(network);
    save_cycle_basis(network, &basis, path)?;
    Ok(basis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcm_core::Line;
    use tempfile::tempdir;

    fn triangle() -> Network {
        let mut network = Network::new();
        for node in ["A", "B", "C", "D"] {
            network.ensure_node(node);
        }
        network.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap();
        network.add_line(Line::new("B", "C", 10.0, 100.0)).unwrap();
        network.add_line(Line::new("C", "A", 10.0, 100.0)).unwrap();
        network
    }

    #[test]
    fn test_round_trip_and_reuse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cycles.json");
        let network = triangle();
        let basis = load_or_compute_cycle_basis(&network, &path).unwrap();
        assert_eq!(basis.len(), 1);
        assert_eq!(load_cycle_basis(&network, &path).unwrap(), Some(basis));
    }

    #[test]
    fn test_changed_lines_invalidate_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cycles.json");
        let network = triangle();
        save_cycle_basis(&network, &cycle_basis(&network), &path).unwrap();

        let mut changed = triangle();
        changed.add_line(Line::new("A", "D", 10.0, 100.0)).unwrap();
        assert_eq!(load_cycle_basis(&changed, &path).unwrap(), None);

        let mut looped = triangle();
        looped.add_line(Line::new("A", "C", 5.0, 50.0)).unwrap();
        let basis = load_or_compute_cycle_basis(&looped, &path).unwrap();
        assert_eq!(basis.len(), 2);
        assert!(load_cycle_basis(&looped, &path).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_artifact_is_recomputed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cycles.json");
        fs::write(&path, "not json").unwrap();
        assert!(load_cycle_basis(&triangle(), &path).is_err());
        let basis = load_or_compute_cycle_basis(&triangle(), &path).unwrap();
        assert_eq!(basis.len(), 1);
    }
}
