//! Workspace umbrella crate for cfgmatch.
//!
//! `cfgmatch` links the records a download left on disk for two environments.
//! This crate stitches the [`ingest`] and [`matcher`] crates into a file-based
//! run: load both record directories, match every type on a worker pool,
//! and write one result document per type.
//!
//! ```no_run
//! use cfgmatch::{MatchParameters, run_match};
//!
//! let params = MatchParameters::from_file("match.yaml")?;
//! let stats = run_match(&params)?;
//! println!("{}", stats.render_table());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod persist;

pub use crate::config::{
    ConfigLoadError, EngineYamlConfig, EnvironmentConfig, MatchKind, MatchParameters,
};
pub use crate::error::{RunError, TypeError, TypeFailure};
pub use crate::persist::{
    CACHE_DIR, load_entity_matches, read_previous, result_path, rewrite_ids, sanitize_type_name,
};

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ingest::{EntityMatches, IngestError, RecordKind, RecordSets, ingest_side, load_record_dir};
use matcher::{MatchKey, MatchProcessing, Matcher, Side};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{Level, error, info, warn};

use crate::persist::{PendingWrites, stage_config_cache, stage_output};

/// Counts of one successfully matched type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStats {
    pub type_name: String,
    pub source_records: usize,
    pub target_records: usize,
    pub matched: usize,
    pub multi_matched: usize,
    pub unmatched: usize,
    pub elapsed: Duration,
    /// Files written for the type.
    pub files: Vec<PathBuf>,
}

/// Aggregate result of a run, ordered by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub types: Vec<TypeStats>,
    pub failed: Vec<String>,
}

impl RunStats {
    pub fn matched(&self) -> usize {
        self.types.iter().map(|t| t.matched).sum()
    }

    pub fn multi_matched(&self) -> usize {
        self.types.iter().map(|t| t.multi_matched).sum()
    }

    pub fn unmatched(&self) -> usize {
        self.types.iter().map(|t| t.unmatched).sum()
    }

    /// Fixed-width table of per-type counts, one line per type plus a total.
    pub fn render_table(&self) -> String {
        let width = self
            .types
            .iter()
            .map(|t| t.type_name.len())
            .chain(self.failed.iter().map(String::len))
            .chain(["TYPE".len(), "TOTAL".len()])
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
            "TYPE", "SOURCE", "TARGET", "MATCHED", "MULTI", "UNMATCHED"
        );
        for t in &self.types {
            let _ = writeln!(
                out,
                "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
                t.type_name, t.source_records, t.target_records, t.matched, t.multi_matched, t.unmatched
            );
        }
        for name in &self.failed {
            let _ = writeln!(out, "{name:<width$}  FAILED");
        }
        let _ = write!(
            out,
            "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
            "TOTAL",
            self.types.iter().map(|t| t.source_records).sum::<usize>(),
            self.types.iter().map(|t| t.target_records).sum::<usize>(),
            self.matched(),
            self.multi_matched(),
            self.unmatched()
        );
        out
    }
}

/// Shared, read-only inputs of every type run.
struct RunContext<'a> {
    params: &'a MatchParameters,
    matcher: Matcher,
    entity_matches: Option<EntityMatches>,
    match_key: MatchKey,
}

/// Raw records of one type on both sides.
struct TypeJob {
    type_name: String,
    source: Result<Vec<Value>, IngestError>,
    target: Result<Vec<Value>, IngestError>,
}

#[derive(Default)]
struct Accumulator {
    stats: Vec<TypeStats>,
    failures: Vec<TypeFailure>,
}

/// Match every type found in either environment.
///
/// Types are matched independently; a failing type is reported in
/// [`RunError::Types`] after every other type finished and wrote its result.
pub fn run_match(params: &MatchParameters) -> Result<RunStats, RunError> {
    let start = Instant::now();
    let span = tracing::span!(
        Level::INFO,
        "cfgmatch.run",
        kind = ?params.kind,
        source = %params.source.label(),
        target = %params.target.label()
    );
    let _guard = span.enter();

    params.validate()?;
    let matcher = Matcher::new(params.rules(), params.engine_options())?;

    let entity_matches = match (&params.entities_match_dir, params.kind) {
        (Some(dir), MatchKind::Configs) => Some(load_entity_matches(dir)?),
        _ => None,
    };

    let source = load_record_dir(&params.source.dir).map_err(|source| RunError::Records {
        side: Side::Source,
        source,
    })?;
    let target = load_record_dir(&params.target.dir).map_err(|source| RunError::Records {
        side: Side::Target,
        source,
    })?;

    fs::create_dir_all(&params.output_dir).map_err(|err| RunError::Io {
        path: params.output_dir.display().to_string(),
        message: err.to_string(),
    })?;

    let jobs = pair_types(source, target);
    info!(
        types = jobs.len(),
        tiers = matcher.tiers().len(),
        entity_types = entity_matches.as_ref().map_or(0, EntityMatches::type_count),
        "run_start"
    );

    let ctx = RunContext {
        params,
        matcher,
        entity_matches,
        match_key: params.match_key(),
    };

    let accumulator = Mutex::new(Accumulator::default());
    let fan_out = || {
        jobs.into_par_iter().for_each(|job| {
            let type_name = job.type_name.clone();
            let result = match_one(&ctx, job);
            let mut acc = accumulator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match result {
                Ok(stats) => acc.stats.push(stats),
                Err(error) => {
                    error!(type_name = %type_name, error = %error, "match_type_failed");
                    acc.failures.push(TypeFailure { type_name, error });
                }
            }
        });
    };

    match params.engine.workers {
        Some(workers) => rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cfgmatch-worker-{i}"))
            .build()
            .map_err(|err| RunError::Pool(err.to_string()))?
            .install(fan_out),
        None => fan_out(),
    }

    let Accumulator {
        mut stats,
        mut failures,
    } = accumulator
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    stats.sort_by(|a, b| a.type_name.cmp(&b.type_name));
    failures.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    let run_stats = RunStats {
        types: stats,
        failed: failures.iter().map(|f| f.type_name.clone()).collect(),
    };
    for line in run_stats.render_table().lines() {
        info!("{line}");
    }
    info!(
        types = run_stats.types.len(),
        failed = failures.len(),
        matched = run_stats.matched(),
        multi_matched = run_stats.multi_matched(),
        unmatched = run_stats.unmatched(),
        elapsed_micros = start.elapsed().as_micros(),
        "run_done"
    );

    if failures.is_empty() {
        Ok(run_stats)
    } else {
        Err(RunError::Types(failures))
    }
}

/// One job per type present on either side; a missing side is empty.
fn pair_types(mut source: RecordSets, mut target: RecordSets) -> Vec<TypeJob> {
    let names: BTreeSet<String> = source.keys().chain(target.keys()).cloned().collect();
    names
        .into_iter()
        .map(|type_name| {
            let source = source.remove(&type_name).unwrap_or_else(|| Ok(Vec::new()));
            let target = target.remove(&type_name).unwrap_or_else(|| Ok(Vec::new()));
            TypeJob {
                type_name,
                source,
                target,
            }
        })
        .collect()
}

fn match_one(ctx: &RunContext<'_>, job: TypeJob) -> Result<TypeStats, TypeError> {
    let start = Instant::now();
    let params = ctx.params;
    let kind = RecordKind::for_type(&job.type_name, params.kind.is_entities());

    let ingest_error = |side: Side| move |source: IngestError| TypeError::Ingest { side, source };
    let source_values = job.source.map_err(ingest_error(Side::Source))?;
    let target_values = job.target.map_err(ingest_error(Side::Target))?;
    if source_values.is_empty() {
        warn!(type_name = %job.type_name, "source_records_empty");
    }

    // Target references already name target entities.
    let source = ingest_side("source", source_values, &kind, ctx.entity_matches.as_ref())
        .map_err(ingest_error(Side::Source))?;
    let target =
        ingest_side("target", target_values, &kind, None).map_err(ingest_error(Side::Target))?;

    let previous = read_previous(params.prev_result_dir.as_deref(), &job.type_name)?;

    let mut processing = MatchProcessing::new(kind.clone(), source, target);
    let output = ctx
        .matcher
        .match_type(&mut processing, previous.as_ref(), ctx.match_key.clone())?;

    let mut writes = PendingWrites::default();
    stage_output(&mut writes, &params.output_dir, &output)?;
    if kind.is_config() {
        stage_config_cache(
            &mut writes,
            &params.output_dir,
            &kind,
            processing.source().list().values(),
            &output.matches,
        )?;
    }
    let files = writes.commit()?;

    Ok(TypeStats {
        type_name: job.type_name,
        source_records: processing.source().list().len(),
        target_records: processing.target().list().len(),
        matched: output.matched_count(),
        multi_matched: output.multi_matched_count(),
        unmatched: output.unmatched_count(),
        elapsed: start.elapsed(),
        files,
    })
}
