//! Content-based hashing for run IDs.

use cm_project::Scenario;
use sha2::{Digest, Sha256};

/// Run id for a scenario: everything that affects the numbers is hashed,
/// the display name and description are not.
pub fn compute_run_id(scenario: &Scenario, solver_version: &str) -> String {
    let mut hasher = Sha256::new();

    let mut keyed = scenario.clone();
    keyed.name.clear();
    keyed.description = None;
    let scenario_json = serde_json::to_string(&keyed).unwrap_or_default();
    hasher.update(scenario_json.as_bytes());

    hasher.update(solver_version.as_bytes());

    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_project::presets::{ikr_block_scenario, spontaneous_scenario};

    #[test]
    fn hash_stability() {
        let scenario = spontaneous_scenario();
        let hash1 = compute_run_id(&scenario, "v1");
        let hash2 = compute_run_id(&scenario, "v1");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let a = compute_run_id(&spontaneous_scenario(), "v1");
        let b = compute_run_id(&ikr_block_scenario(), "v1");
        let c = compute_run_id(&spontaneous_scenario(), "v2");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn renaming_keeps_the_id() {
        let mut renamed = spontaneous_scenario();
        renamed.name = "Another name".to_string();
        renamed.description = Some("notes".to_string());
        assert_eq!(
            compute_run_id(&renamed, "v1"),
            compute_run_id(&spontaneous_scenario(), "v1")
        );
    }
}
