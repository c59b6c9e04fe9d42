//! Run execution and caching service.

use cm_project::Scenario;
use cm_results::{
    RunManifest, RunStore, RunSummary as StoredSummary, SampleRecord, SolverStatsRecord,
};
use cm_sim::{SimProgress, SimRecord, run_sim_with_progress};
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::progress::{IntegrationProgress, RunProgressEvent, RunStage};
use crate::runtime_compile::compile_scenario;
use crate::scenario_service;

/// Version tag mixed into run ids; bump when numerics change.
pub const SOLVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Options for running simulations.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub use_cache: bool,
    pub solver_version: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            solver_version: SOLVER_VERSION.to_string(),
        }
    }
}

/// Request to execute a run.
pub struct RunRequest<'a> {
    pub scenario_path: &'a Path,
    pub options: RunOptions,
}

/// Wall-clock timing of a run.
#[derive(Debug, Clone, Default)]
pub struct RunTimingSummary {
    pub simulate_time_s: f64,
    pub save_time_s: f64,
    pub load_cache_time_s: f64,
    pub total_time_s: f64,
    pub steps: usize,
    pub rejected_steps: usize,
    pub samples: usize,
}

/// Response from a run execution.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: String,
    pub manifest: RunManifest,
    pub loaded_from_cache: bool,
    pub timing: RunTimingSummary,
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    stage: RunStage,
    started: Instant,
    message: Option<String>,
    integration: Option<IntegrationProgress>,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        let mut event = RunProgressEvent::stage(stage, started.elapsed().as_secs_f64(), message);
        event.integration = integration;
        cb(event);
    }
}

/// Execute or load a run based on request.
pub fn ensure_run(request: &RunRequest) -> AppResult<RunResponse> {
    ensure_run_with_progress(request, None)
}

/// Execute or load a run and stream backend progress events.
pub fn ensure_run_with_progress(
    request: &RunRequest,
    mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<RunResponse> {
    let started = Instant::now();
    let mut timing = RunTimingSummary::default();

    emit_progress(
        &mut progress_cb,
        RunStage::LoadingScenario,
        started,
        Some("Loading scenario".to_string()),
        None,
    );
    let scenario = scenario_service::load_scenario(request.scenario_path)?;

    emit_progress(
        &mut progress_cb,
        RunStage::CheckingCache,
        started,
        Some("Checking run cache".to_string()),
        None,
    );
    let run_id = cm_results::compute_run_id(&scenario, &request.options.solver_version);
    let store = RunStore::for_scenario(request.scenario_path)?;

    if request.options.use_cache && store.has_run(&run_id) {
        emit_progress(
            &mut progress_cb,
            RunStage::LoadingCachedResult,
            started,
            Some("Loading cached run".to_string()),
            None,
        );
        let load_started = Instant::now();
        let manifest = store.load_manifest(&run_id)?;
        timing.load_cache_time_s = load_started.elapsed().as_secs_f64();
        timing.samples = manifest.summary.map_or(0, |s| s.samples);
        timing.steps = manifest.stats.steps;
        timing.rejected_steps = manifest.stats.rejected_steps;
        timing.total_time_s = started.elapsed().as_secs_f64();

        emit_progress(
            &mut progress_cb,
            RunStage::Completed,
            started,
            Some("Loaded cached run".to_string()),
            None,
        );
        return Ok(RunResponse {
            run_id,
            manifest,
            loaded_from_cache: true,
            timing,
        });
    }

    let simulate_started = Instant::now();
    let record = simulate(&scenario, &mut progress_cb, started)?;
    timing.simulate_time_s = simulate_started.elapsed().as_secs_f64();
    timing.steps = record.stats.steps;
    timing.rejected_steps = record.stats.rejected_steps;
    timing.samples = record.len();

    emit_progress(
        &mut progress_cb,
        RunStage::SavingResults,
        started,
        Some(format!("Saving {} samples", record.len())),
        None,
    );
    let save_started = Instant::now();
    let manifest = build_manifest(&run_id, &scenario, &record, &request.options.solver_version);
    store.save_run(&manifest, &record_to_samples(&record))?;
    timing.save_time_s = save_started.elapsed().as_secs_f64();
    timing.total_time_s = started.elapsed().as_secs_f64();

    info!(
        run_id = %run_id,
        samples = record.len(),
        total_time_s = timing.total_time_s,
        "run stored"
    );

    emit_progress(
        &mut progress_cb,
        RunStage::Completed,
        started,
        Some("Run completed".to_string()),
        None,
    );

    Ok(RunResponse {
        run_id,
        manifest,
        loaded_from_cache: false,
        timing,
    })
}

/// Run a scenario in memory, without touching the run cache.
pub fn execute_scenario(scenario: &Scenario) -> AppResult<SimRecord> {
    simulate(scenario, &mut None, Instant::now())
}

fn simulate(
    scenario: &Scenario,
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    started: Instant,
) -> AppResult<SimRecord> {
    let runtime = compile_scenario(scenario)?;
    let t0 = runtime.options.t0;
    let t_end = runtime.options.t_end;

    emit_progress(
        progress_cb,
        RunStage::Integrating,
        started,
        Some(format!("Integrating {t0} s to {t_end} s")),
        None,
    );

    // Per-step events are thinned to roughly 0.5 % of the interval.
    let mut last_reported = f64::NEG_INFINITY;
    let mut on_progress = |p: SimProgress| match p {
        SimProgress::Integrating(step) => {
            let fraction = step.fraction_complete(t0);
            if fraction - last_reported >= 0.005 || fraction >= 1.0 {
                last_reported = fraction;
                emit_progress(
                    progress_cb,
                    RunStage::Integrating,
                    started,
                    None,
                    Some(IntegrationProgress {
                        sim_time_s: step.t,
                        t_end_s: step.t_end,
                        fraction_complete: fraction,
                        step: step.step,
                        step_size_s: step.h,
                        rejected_steps: step.rejected_steps,
                    }),
                );
            }
        }
        SimProgress::Reconstructing { samples } => emit_progress(
            progress_cb,
            RunStage::Reconstructing,
            started,
            Some(format!("Reconstructing {samples} samples")),
            None,
        ),
        SimProgress::Aggregating { samples } => emit_progress(
            progress_cb,
            RunStage::Aggregating,
            started,
            Some(format!("Aggregating {samples} samples")),
            None,
        ),
    };

    let record = run_sim_with_progress(
        &runtime.model,
        &runtime.y0,
        &runtime.options,
        Some(&mut on_progress as &mut dyn FnMut(SimProgress)),
    )?;
    Ok(record)
}

fn build_manifest(
    run_id: &str,
    scenario: &Scenario,
    record: &SimRecord,
    solver_version: &str,
) -> RunManifest {
    let summary = record.summary().map(|s| StoredSummary {
        samples: s.samples,
        vm_min_v: s.vm_min,
        vm_max_v: s.vm_max,
        peak_i_tot: s.peak_i_tot,
        max_upstroke_v_per_s: s.max_upstroke,
        derivative_mismatch: record.derivative_mismatch,
    });
    let selection = scenario
        .currents
        .clone()
        .unwrap_or_else(|| cm_sim::CurrentSelection::default().names().to_vec());

    RunManifest {
        run_id: run_id.to_string(),
        scenario_name: scenario.name.clone(),
        model: record.model.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        solver_version: solver_version.to_string(),
        t0_s: scenario.interval.t0_s,
        t_end_s: scenario.interval.t_end_s,
        state_names: record.state_names.iter().map(|s| s.to_string()).collect(),
        diagnostic_names: record
            .reconstruction
            .names
            .iter()
            .map(|s| s.to_string())
            .collect(),
        current_selection: selection,
        protocol: scenario.protocol.name().to_string(),
        stimulations_s: record
            .pacing
            .as_ref()
            .map(|p| p.stimulations.clone())
            .unwrap_or_default(),
        stats: SolverStatsRecord {
            steps: record.stats.steps,
            rejected_steps: record.stats.rejected_steps,
            rhs_evals: record.stats.rhs_evals,
            jacobian_evals: record.stats.jacobian_evals,
            lu_decompositions: record.stats.lu_decompositions,
        },
        summary,
    }
}

fn record_to_samples(record: &SimRecord) -> Vec<SampleRecord> {
    (0..record.len())
        .map(|i| SampleRecord {
            time_s: record.t[i],
            state: record.y[i].clone(),
            diagnostics: record
                .reconstruction
                .diagnostics
                .iter()
                .map(|column| column[i])
                .collect(),
            i_tot: record.series.i_tot[i],
            dvm_dt: record.series.dvm_dt[i],
        })
        .collect()
}

/// List runs stored next to a scenario, most recent first.
pub fn list_runs(scenario_path: &Path) -> AppResult<Vec<RunManifest>> {
    let store = RunStore::for_scenario(scenario_path)?;
    let mut runs = store.list_runs()?;
    runs.reverse();
    Ok(runs)
}

/// Load a stored run by id or unique id prefix.
pub fn load_run(
    scenario_path: &Path,
    run_id: &str,
) -> AppResult<(RunManifest, Vec<SampleRecord>)> {
    let store = RunStore::for_scenario(scenario_path)?;
    let run_id = store.resolve_prefix(run_id)?;
    let manifest = store.load_manifest(&run_id)?;
    let records = store.load_samples(&run_id)?;
    if records.is_empty() {
        return Err(AppError::Results(format!("run {run_id} has no samples")));
    }
    Ok((manifest, records))
}
