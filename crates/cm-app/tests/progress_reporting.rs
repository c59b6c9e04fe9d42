//! Integration tests for shared run progress, caching and result queries.

use std::path::{Path, PathBuf};

use cm_app::{
    RunOptions, RunProgressEvent, RunRequest, RunResponse, RunStage, ensure_run,
    ensure_run_with_progress, list_runs, load_run, query,
};
use cm_project::presets;

fn write_scenario(dir_name: &str, t_end_s: f64) -> PathBuf {
    let dir = std::env::temp_dir().join(dir_name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let mut scenario = presets::spontaneous_scenario();
    scenario.interval.t_end_s = t_end_s;
    let path = dir.join("scenario.yaml");
    cm_app::save_scenario(&path, &scenario).unwrap();
    path
}

fn collect_events(request: &RunRequest<'_>) -> (RunResponse, Vec<RunProgressEvent>) {
    let mut events = Vec::new();
    let response = ensure_run_with_progress(request, Some(&mut |event| events.push(event)))
        .expect("run with progress should succeed");
    (response, events)
}

fn request(path: &Path, use_cache: bool) -> RunRequest<'_> {
    RunRequest {
        scenario_path: path,
        options: RunOptions {
            use_cache,
            solver_version: "0.1.0".to_string(),
        },
    }
}

#[test]
fn progress_and_timing_are_reported() {
    let path = write_scenario("cm_app_progress", 0.2);
    let (response, events) = collect_events(&request(&path, false));

    assert!(!response.loaded_from_cache);
    let stages: Vec<RunStage> = events.iter().map(|e| e.stage).collect();
    let position = |stage: RunStage| stages.iter().position(|s| *s == stage);
    let integrating = position(RunStage::Integrating).expect("expected integration events");
    let reconstructing = position(RunStage::Reconstructing).expect("expected reconstruction");
    let aggregating = position(RunStage::Aggregating).expect("expected aggregation");
    assert!(integrating < reconstructing && reconstructing < aggregating);
    assert_eq!(stages.last(), Some(&RunStage::Completed));

    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| e.integration.as_ref())
        .map(|p| p.fraction_complete)
        .collect();
    assert!(!fractions.is_empty());
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!(events.windows(2).all(|w| w[0].elapsed_wall_s <= w[1].elapsed_wall_s));

    assert!(response.timing.total_time_s > 0.0);
    assert!(response.timing.simulate_time_s > 0.0);
    assert!(response.timing.steps >= 200, "max_step bounds the step count");
    assert_eq!(response.timing.samples, response.timing.steps + 1);

    let (manifest, records) = load_run(&path, &response.run_id).expect("run should load");
    assert_eq!(manifest, response.manifest);
    let summary = query::get_run_summary(&records).expect("summary should load");
    assert_eq!(summary.record_count, response.timing.samples);
    assert_eq!(summary.time_range.0, 0.0);
    assert!((summary.time_range.1 - 0.2).abs() < 1e-12);
    assert_eq!(summary.state_count, manifest.state_names.len());

    let slew = query::extract_series(&manifest, &records, "dvm_dt").unwrap();
    assert_eq!(slew[0], 0.0);
    let i_tot = query::extract_series(&manifest, &records, "i_tot").unwrap();
    assert!(i_tot.iter().all(|v| v.is_finite()));
}

#[test]
fn second_run_is_served_from_cache() {
    let path = write_scenario("cm_app_cache", 0.05);

    let first = ensure_run(&request(&path, true)).unwrap();
    assert!(!first.loaded_from_cache);

    let (second, events) = collect_events(&request(&path, true));
    assert!(second.loaded_from_cache);
    assert_eq!(second.run_id, first.run_id);
    assert!(events.iter().any(|e| e.stage == RunStage::LoadingCachedResult));
    assert!(events.iter().all(|e| e.stage != RunStage::Integrating));

    let runs = list_runs(&path).unwrap();
    assert_eq!(runs.len(), 1);

    let prefix = &first.run_id[..8];
    let (manifest, _) = load_run(&path, prefix).unwrap();
    assert_eq!(manifest.run_id, first.run_id);
}

#[test]
fn failed_run_reports_its_stage() {
    let dir = std::env::temp_dir().join("cm_app_failed_run");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let mut scenario = presets::spontaneous_scenario();
    scenario.interval.t_end_s = 0.05;
    scenario.solver.max_steps = 3;
    let path = dir.join("scenario.yaml");
    cm_app::save_scenario(&path, &scenario).unwrap();

    let err = ensure_run(&request(&path, false)).unwrap_err();
    match err {
        cm_app::AppError::Simulation { stage, t, .. } => {
            assert_eq!(stage, cm_sim::SimStage::Integration);
            let t = t.expect("integration failures carry the time reached");
            assert!((0.0..0.05).contains(&t));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(list_runs(&path).unwrap().is_empty());
}
