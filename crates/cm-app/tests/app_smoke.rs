//! Smoke test for cm-app service layer.

use std::path::PathBuf;
use cm_app::{describe_scenario, load_scenario, validate_scenario};

#[test]
fn test_load_bundled_scenarios() {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.pop(); // go to crates
    dir.pop(); // go to repo root
    dir.push("scenarios");

    for file in [
        "01_spontaneous.yaml",
        "02_ikr_block.yaml",
        "03_paced_resting.yaml",
        "04_explicit_state.yaml",
        "05_voltage_clamp.yaml",
        "06_irregular_pacing.yaml",
    ] {
        let path = dir.join(file);
        let scenario = load_scenario(&path).expect("Failed to load scenario");
        validate_scenario(&scenario).expect("Validation should succeed");

        let summary = describe_scenario(&scenario);
        println!("Scenario: {} ({})", summary.name, summary.initial_state);
        assert!(summary.t_end_s > summary.t0_s);
        if file.starts_with("05") {
            assert_eq!(summary.protocol, "voltage_clamp");
        }
    }
}

#[test]
fn missing_scenario_file_is_reported() {
    let err = load_scenario(&PathBuf::from("does/not/exist.yaml")).unwrap_err();
    assert!(matches!(err, cm_app::AppError::ScenarioFileRead { .. }));
}
