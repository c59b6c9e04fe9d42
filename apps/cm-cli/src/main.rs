use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use cm_app::{
    AppError, AppResult, RunOptions, RunProgressEvent, RunRequest, RunStage, query,
    run_service, scenario_service,
};
use cm_results::ReferenceTrace;

#[derive(Parser)]
#[command(name = "cm-cli")]
#[command(about = "Cardiomyo CLI - hiPSC cardiomyocyte action potential simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a built-in scenario to a file
    Init {
        /// Built-in scenario id (spontaneous, ikr-block, paced, voltage-clamp)
        preset: String,
        /// Output scenario path
        output: PathBuf,
    },
    /// Validate scenario file syntax and values
    Validate {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Run a simulation
    Run {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// List cached runs for a scenario
    Runs {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Show details of a cached run
    ShowRun {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Run ID or unique prefix
        run_id: String,
    },
    /// Export time series data from a run
    ExportSeries {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Run ID or unique prefix
        run_id: String,
        /// Series names (t, state slots, diagnostics, i_tot, dvm_dt)
        #[arg(required = true)]
        series: Vec<String>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare a run's membrane potential against reference tables
    Compare {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Run ID or unique prefix
        run_id: String,
        /// Reference state table (one row per sample)
        #[arg(long)]
        states: PathBuf,
        /// Reference sample times
        #[arg(long)]
        times: PathBuf,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { preset, output } => cmd_init(&preset, &output),
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Run {
            scenario_path,
            no_cache,
        } => cmd_run(&scenario_path, !no_cache),
        Commands::Runs { scenario_path } => cmd_runs(&scenario_path),
        Commands::ShowRun {
            scenario_path,
            run_id,
        } => cmd_show_run(&scenario_path, &run_id),
        Commands::ExportSeries {
            scenario_path,
            run_id,
            series,
            output,
        } => cmd_export_series(&scenario_path, &run_id, &series, output.as_deref()),
        Commands::Compare {
            scenario_path,
            run_id,
            states,
            times,
        } => cmd_compare(&scenario_path, &run_id, &states, &times),
    }
}

fn cmd_init(preset: &str, output: &Path) -> AppResult<()> {
    let scenario = cm_project::builtin(preset).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "unknown preset {preset}, expected one of {}",
            cm_project::BUILTIN_IDS.join(", ")
        ))
    })?;
    scenario_service::save_scenario(output, &scenario)?;
    println!("✓ Wrote {} to {}", scenario.name, output.display());
    Ok(())
}

fn cmd_validate(scenario_path: &Path) -> AppResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = scenario_service::load_scenario(scenario_path)?;
    scenario_service::validate_scenario(&scenario)?;
    let summary = scenario_service::describe_scenario(&scenario);
    println!("✓ Scenario is valid");
    println!("  Name: {}", summary.name);
    println!("  Initial state: {}", summary.initial_state);
    println!(
        "  Interval: {:.3} - {:.3} s",
        summary.t0_s, summary.t_end_s
    );
    println!("  Drug block active: {}", summary.drug_active);
    println!("  Protocol: {}", summary.protocol);
    if summary.conductance_overrides > 0 {
        println!("  Conductance overrides: {}", summary.conductance_overrides);
    }
    Ok(())
}

fn cmd_run(scenario_path: &Path, use_cache: bool) -> AppResult<()> {
    println!("Running scenario: {}", scenario_path.display());

    let request = RunRequest {
        scenario_path,
        options: RunOptions {
            use_cache,
            ..RunOptions::default()
        },
    };

    let mut last_emit = Instant::now();
    let mut last_stage = None;
    let response = run_service::ensure_run_with_progress(
        &request,
        Some(&mut |event| {
            let emit_now =
                last_stage != Some(event.stage) || last_emit.elapsed().as_millis() >= 100;
            if emit_now {
                render_cli_progress(&event);
                last_stage = Some(event.stage);
                last_emit = Instant::now();
            }
        }),
    )?;
    clear_progress_line();

    if response.loaded_from_cache {
        println!("✓ Loaded from cache: {}", response.run_id);
    } else {
        println!("✓ Simulation completed: {}", response.run_id);
    }

    print_timing_summary(&response.timing);

    if let Some(summary) = &response.manifest.summary {
        println!("\nTrace summary:");
        println!("  Samples: {}", summary.samples);
        println!(
            "  Vm range: {:.2} .. {:.2} mV",
            summary.vm_min_v * 1e3,
            summary.vm_max_v * 1e3
        );
        println!("  Peak i_tot: {:.3} A/F", summary.peak_i_tot);
        println!(
            "  Max upstroke: {:.2} V/s",
            summary.max_upstroke_v_per_s
        );
    }

    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(140));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    match (&event.stage, &event.integration) {
        (RunStage::Integrating, Some(p)) => {
            let width = 28usize;
            let filled = ((p.fraction_complete * width as f64).round() as usize).min(width);
            let bar = format!(
                "{}{}",
                "#".repeat(filled),
                "-".repeat(width.saturating_sub(filled))
            );
            print!(
                "\r[{}] {:>6.2}%  t={:.3}/{:.3}s  step={}  h={:.2e}  rejected={}  elapsed={:.1}s",
                bar,
                p.fraction_complete * 100.0,
                p.sim_time_s,
                p.t_end_s,
                p.step,
                p.step_size_s,
                p.rejected_steps,
                event.elapsed_wall_s
            );
            let _ = io::stdout().flush();
        }
        _ => {
            let spinner = ['|', '/', '-', '\\'];
            let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
            let mut line = format!(
                "\r{} {}  elapsed={:.2}s",
                spinner[spin_idx],
                event.stage.label(),
                event.elapsed_wall_s
            );
            if let Some(msg) = &event.message {
                line.push_str(&format!("  {}", msg));
            }
            print!("{}", line);
            let _ = io::stdout().flush();
        }
    }
}

fn print_timing_summary(timing: &cm_app::RunTimingSummary) {
    let total = timing.total_time_s.max(1.0e-12);
    let simulate_pct = 100.0 * timing.simulate_time_s / total;
    let save_pct = 100.0 * timing.save_time_s / total;

    println!("\nTiming summary:");
    if timing.load_cache_time_s > 0.0 {
        println!("  Cache load: {:.3}s", timing.load_cache_time_s);
    } else {
        println!(
            "  Simulate: {:.3}s ({:.1}%)",
            timing.simulate_time_s, simulate_pct
        );
        println!("  Save:     {:.3}s ({:.1}%)", timing.save_time_s, save_pct);
    }
    println!("  Total:    {:.3}s", timing.total_time_s);
    println!("  Accepted steps: {}", timing.steps);
    println!("  Rejected steps: {}", timing.rejected_steps);
}

fn cmd_runs(scenario_path: &Path) -> AppResult<()> {
    let runs = run_service::list_runs(scenario_path)?;

    if runs.is_empty() {
        println!("No cached runs found for {}", scenario_path.display());
    } else {
        println!("Cached runs for {}:", scenario_path.display());
        for manifest in runs {
            println!(
                "  {} ({}, solver {})",
                manifest.run_id, manifest.timestamp, manifest.solver_version
            );
        }
    }
    Ok(())
}

fn cmd_show_run(scenario_path: &Path, run_id: &str) -> AppResult<()> {
    println!("Loading run: {}", run_id);

    let (manifest, records) = run_service::load_run(scenario_path, run_id)?;
    let summary = query::get_run_summary(&records)?;

    println!("\nRun Summary:");
    println!("  Run: {}", manifest.run_id);
    println!("  Scenario: {}", manifest.scenario_name);
    println!("  Model: {}", manifest.model);
    println!("  Time points: {}", summary.record_count);
    println!(
        "  Time range: {:.3} - {:.3} s",
        summary.time_range.0, summary.time_range.1
    );
    println!(
        "  Solver: {} steps, {} rejected, {} rhs evals, {} jacobians",
        manifest.stats.steps,
        manifest.stats.rejected_steps,
        manifest.stats.rhs_evals,
        manifest.stats.jacobian_evals
    );
    println!("  Total current sums: {}", manifest.current_selection.join(" "));

    println!("\nSeries:");
    for name in query::list_series_names(&manifest) {
        println!("  {}", name);
    }

    Ok(())
}

fn cmd_export_series(
    scenario_path: &Path,
    run_id: &str,
    series: &[String],
    output: Option<&Path>,
) -> AppResult<()> {
    let (manifest, records) = run_service::load_run(scenario_path, run_id)?;

    if let Some(path) = output {
        query::export_series(&manifest, &records, series, path)?;
        println!(
            "✓ Exported {} data points to {}",
            records.len(),
            path.display()
        );
    } else {
        let columns = query::series_columns(&manifest, &records, series)?;
        cm_results::write_series_csv(io::stdout().lock(), &columns)?;
    }

    Ok(())
}

fn cmd_compare(
    scenario_path: &Path,
    run_id: &str,
    states: &Path,
    times: &Path,
) -> AppResult<()> {
    let (manifest, records) = run_service::load_run(scenario_path, run_id)?;
    let reference = ReferenceTrace::load(states, times)?;
    let comparison = query::compare_run(&manifest, &records, &reference)?;

    println!("Comparison against {}:", states.display());
    println!(
        "  Reference samples compared: {} (skipped {})",
        comparison.compared, comparison.skipped
    );
    println!("  Vm RMSE: {:.3e} V", comparison.rmse);
    println!(
        "  Vm max |error|: {:.3e} V at t = {:.4} s",
        comparison.max_abs, comparison.t_at_max
    );
    Ok(())
}
