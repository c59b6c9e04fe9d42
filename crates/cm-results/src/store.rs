//! On-disk run cache.
//!
//! Each run lives in its own directory named by run id. Samples are streamed
//! to `samples.jsonl`, one JSON object per accepted sample; `manifest.json` is
//! written last, so a directory without a manifest is an incomplete run.

use crate::types::{RunManifest, SampleRecord};
use crate::{ResultsError, ResultsResult};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";
const SAMPLES_FILE: &str = "samples.jsonl";

#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        fs::create_dir_all(&root_dir)?;
        Ok(Self { root_dir })
    }

    /// Store next to a scenario file, under `.cardiomyo/runs`.
    pub fn for_scenario(scenario_path: &Path) -> ResultsResult<Self> {
        let scenario_dir = scenario_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "scenario path has no parent directory".to_string(),
            })?;
        Self::new(scenario_dir.join(".cardiomyo").join("runs"))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    fn manifest_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(MANIFEST_FILE)
    }

    fn samples_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(SAMPLES_FILE)
    }

    /// True once a run's manifest has been written.
    pub fn has_run(&self, run_id: &str) -> bool {
        self.manifest_path(run_id).is_file()
    }

    /// Write a run. An existing run with the same id is replaced.
    pub fn save_run(&self, manifest: &RunManifest, samples: &[SampleRecord]) -> ResultsResult<()> {
        fs::create_dir_all(self.run_dir(&manifest.run_id))?;
        let manifest_path = self.manifest_path(&manifest.run_id);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }

        let mut out = BufWriter::new(File::create(self.samples_path(&manifest.run_id))?);
        for sample in samples {
            serde_json::to_writer(&mut out, sample)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        let mut out = BufWriter::new(File::create(manifest_path)?);
        serde_json::to_writer_pretty(&mut out, manifest)?;
        out.flush()?;
        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        if !self.has_run(run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let reader = BufReader::new(File::open(self.manifest_path(run_id))?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Stream the samples of a complete run in time order.
    pub fn samples(&self, run_id: &str) -> ResultsResult<SampleReader> {
        if !self.has_run(run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let path = self.samples_path(run_id);
        let file = File::open(&path).map_err(|_| ResultsError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        Ok(SampleReader {
            path,
            lines: BufReader::new(file).lines(),
            line: 0,
        })
    }

    pub fn load_samples(&self, run_id: &str) -> ResultsResult<Vec<SampleRecord>> {
        self.samples(run_id)?.collect()
    }

    /// All stored runs, oldest first. Directories without a readable manifest
    /// are skipped.
    pub fn list_runs(&self) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().into_owned();
            if let Ok(manifest) = self.load_manifest(&run_id) {
                runs.push(manifest);
            }
        }
        runs.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(runs)
    }

    /// Resolve a full run id from a unique prefix.
    pub fn resolve_prefix(&self, prefix: &str) -> ResultsResult<String> {
        if self.has_run(prefix) {
            return Ok(prefix.to_string());
        }
        let mut matches = self
            .list_runs()?
            .into_iter()
            .map(|m| m.run_id)
            .filter(|id| id.starts_with(prefix));
        match (matches.next(), matches.count()) {
            (Some(only), 0) => Ok(only),
            (None, _) => Err(ResultsError::RunNotFound {
                run_id: prefix.to_string(),
            }),
            (Some(_), rest) => Err(ResultsError::AmbiguousRunId {
                prefix: prefix.to_string(),
                matches: rest + 1,
            }),
        }
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}

/// Line-by-line reader over a run's `samples.jsonl`. Blank lines are skipped.
pub struct SampleReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl Iterator for SampleReader {
    type Item = ResultsResult<SampleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&text).map_err(|source| {
                ResultsError::CorruptSample {
                    path: self.path.clone(),
                    line: self.line,
                    source,
                }
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SolverStatsRecord;

    fn manifest(run_id: &str) -> RunManifest {
        RunManifest {
            run_id: run_id.to_string(),
            scenario_name: "store".to_string(),
            model: "Paci2018".to_string(),
            timestamp: "2026-03-01T00:00:00Z".to_string(),
            solver_version: "v1".to_string(),
            t0_s: 0.0,
            t_end_s: 1.0,
            state_names: vec!["Vm".to_string()],
            diagnostic_names: vec!["i_Na".to_string()],
            current_selection: vec!["i_Na".to_string()],
            protocol: "spontaneous".to_string(),
            stimulations_s: Vec::new(),
            stats: SolverStatsRecord::default(),
            summary: None,
        }
    }

    fn sample(t: f64) -> SampleRecord {
        SampleRecord {
            time_s: t,
            state: vec![-0.07 + t],
            diagnostics: vec![-t],
            i_tot: -t,
            dvm_dt: 1.0,
        }
    }

    fn store(name: &str) -> RunStore {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        RunStore::new(dir).unwrap()
    }

    #[test]
    fn samples_are_one_object_per_line() {
        let store = store("cm_results_store_lines");
        let samples: Vec<_> = (0..5).map(|i| sample(i as f64 * 0.25)).collect();
        store.save_run(&manifest("r1"), &samples).unwrap();

        let text = fs::read_to_string(store.samples_path("r1")).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.ends_with('\n'));
        let streamed: Vec<_> = store
            .samples("r1")
            .unwrap()
            .map(|s| s.unwrap().time_s)
            .collect();
        assert_eq!(streamed, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn saving_again_replaces_a_longer_run() {
        let store = store("cm_results_store_replace");
        let long: Vec<_> = (0..10).map(|i| sample(i as f64)).collect();
        store.save_run(&manifest("r1"), &long).unwrap();
        store.save_run(&manifest("r1"), &long[..2]).unwrap();
        assert_eq!(store.load_samples("r1").unwrap(), long[..2].to_vec());
    }

    #[test]
    fn corrupt_sample_line_is_located() {
        let store = store("cm_results_store_corrupt");
        store
            .save_run(&manifest("r1"), &[sample(0.0), sample(1.0)])
            .unwrap();
        let path = store.samples_path("r1");
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("\n{\"time_s\": 2.0, \"state\": [\n");
        fs::write(&path, text).unwrap();

        match store.load_samples("r1") {
            Err(ResultsError::CorruptSample { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn run_without_manifest_is_incomplete() {
        let store = store("cm_results_store_incomplete");
        store.save_run(&manifest("r1"), &[sample(0.0)]).unwrap();
        fs::remove_file(store.manifest_path("r1")).unwrap();

        assert!(!store.has_run("r1"));
        assert!(store.list_runs().unwrap().is_empty());
        assert!(matches!(
            store.samples("r1"),
            Err(ResultsError::RunNotFound { .. })
        ));
    }
}
