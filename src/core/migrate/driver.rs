//! Run orchestration: expand fetch expressions, dispatch every matched file,
//! then clean up and copy the project overlay.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::utils::io;

use super::catalog::TemplateSet;
use super::cleanup::{delete_deprecated, CleanupReport};
use super::reference::{migrate_reference, Migrated, SkippedReason};
use super::rules::{compile_rules, SubstitutionRule};
use super::scope::FileTarget;
use super::substitute::{apply_rules, SubstitutionOutcome};
use super::WriteMode;

/// Expressions processed when none are given, relative to the input folder.
pub const DEFAULT_FETCH_EXPRESSIONS: [&str; 9] = [
    "./aura/**/*.js",
    "./aura/**/*.cmp",
    "./classes/*.cls",
    "./objects/*/fields/*.xml",
    "./objects/*/recordTypes/*.xml",
    "./triggers/*.trigger",
    "./permissionsets/*.xml",
    "./profiles/*.xml",
    "./staticresources/*.json",
];

/// Split a comma-separated expression list.
///
/// `None` selects the defaults; an empty string selects nothing.
pub fn parse_fetch_expressions(raw: Option<&str>) -> Vec<String> {
    match raw {
        None => DEFAULT_FETCH_EXPRESSIONS
            .iter()
            .map(|e| e.to_string())
            .collect(),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Expressions selecting field definitions go to the lookup migrator.
pub fn is_reference_expression(expression: &str) -> bool {
    expression.contains("objects") && expression.contains("fields")
}

/// Compile the ordered rules applying to files matched by `expression`.
pub fn rules_for_expression(
    config: &MigrationConfig,
    expression: &str,
) -> Result<Vec<SubstitutionRule>> {
    let templates = TemplateSet::resolve(&config.global_config, expression);
    compile_rules(&config.objects, &templates, &config.global_config)
}

/// Files under `input` matched by `expression`, sorted.
pub fn expand_expression(input: &Path, expression: &str) -> Result<Vec<PathBuf>> {
    let relative = expression.trim_start_matches("./").trim_start_matches('/');
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&input.to_string_lossy()),
        relative
    );

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| {
            Error::validation_invalid_argument(
                "fetch",
                format!("Invalid glob pattern '{}': {}", expression, e),
                Some(expression.to_string()),
                None,
            )
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Substitution,
    Reference,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: PathBuf,
    pub replacements: usize,
    pub written: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub expression: String,
    pub kind: BatchKind,
    pub matched_files: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<FileChange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub migrated: Vec<Migrated>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
    /// Files no rule was allowed to touch.
    pub out_of_scope: usize,
    pub untouched: usize,
}

impl BatchReport {
    fn new(expression: &str, kind: BatchKind, matched_files: usize) -> Self {
        BatchReport {
            expression: expression.to_string(),
            kind,
            matched_files,
            changed: Vec::new(),
            migrated: Vec::new(),
            skipped: Vec::new(),
            out_of_scope: 0,
            untouched: 0,
        }
    }

    fn skip(&mut self, path: &Path, reason: impl Into<String>) {
        self.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        });
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayReport {
    pub source: PathBuf,
    pub files: usize,
    pub written: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub input_folder: PathBuf,
    pub dry_run: bool,
    pub batches: Vec<BatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayReport>,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn changed_files(&self) -> usize {
        self.batches.iter().map(|b| b.changed.len()).sum()
    }

    pub fn migrated_files(&self) -> usize {
        self.batches.iter().map(|b| b.migrated.len()).sum()
    }
}

// ============================================================================
// Run
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_folder: PathBuf,
    pub fetch_expressions: Vec<String>,
    pub delete_files: bool,
    pub copy_project: bool,
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            input_folder: PathBuf::from("."),
            fetch_expressions: parse_fetch_expressions(None),
            delete_files: true,
            copy_project: true,
            dry_run: false,
        }
    }
}

fn substitution_batch(
    config: &MigrationConfig,
    expression: &str,
    files: &[PathBuf],
    mode: WriteMode,
) -> Result<BatchReport> {
    let rules = rules_for_expression(config, expression)?;
    let mut batch = BatchReport::new(expression, BatchKind::Substitution, files.len());

    for path in files {
        let target = FileTarget::from_path(path);
        let applicable: Vec<&SubstitutionRule> =
            rules.iter().filter(|r| r.scope.allows(&target)).collect();
        if applicable.is_empty() {
            batch.out_of_scope += 1;
            continue;
        }

        match apply_rules(path, &applicable, mode) {
            SubstitutionOutcome::Missing => batch.skip(path, "missing"),
            SubstitutionOutcome::Unreadable { error } => batch.skip(path, error),
            SubstitutionOutcome::WriteFailed { error } => {
                batch.skip(path, format!("write failed: {}", error))
            }
            SubstitutionOutcome::Unchanged => batch.untouched += 1,
            SubstitutionOutcome::Rewritten {
                replacements,
                written,
            } => batch.changed.push(FileChange {
                path: path.clone(),
                replacements,
                written,
            }),
        }
    }

    Ok(batch)
}

fn reference_batch(
    config: &MigrationConfig,
    expression: &str,
    files: &[PathBuf],
    mode: WriteMode,
) -> BatchReport {
    let mut batch = BatchReport::new(expression, BatchKind::Reference, files.len());

    for path in files {
        match migrate_reference(path, &config.objects, mode) {
            Ok(migrated) => batch.migrated.push(migrated),
            Err(SkippedReason::NoMatchingReference) => batch.untouched += 1,
            Err(reason) => {
                log_status!("migrate", "Skipping {}: {}", path.display(), reason);
                batch.skip(path, reason.to_string());
            }
        }
    }

    batch
}

fn copy_overlay(source: &Path, input: &Path, mode: WriteMode) -> Result<OverlayReport> {
    if !source.is_dir() {
        return Err(Error::config_invalid_value(
            "sfdxProjectFolder",
            Some(source.display().to_string()),
            "project folder does not exist",
        ));
    }

    let files = if mode.writes() {
        io::copy_dir_recursive(source, input)?
    } else {
        io::count_files(source)?
    };
    log_status!(
        "overlay",
        "{} {} files from {}",
        if mode.writes() { "Copied" } else { "Would copy" },
        files,
        source.display()
    );

    Ok(OverlayReport {
        source: source.to_path_buf(),
        files,
        written: mode.writes(),
    })
}

/// Migrate the project under `options.input_folder`.
///
/// Expressions run in the order given, files in sorted order, so the same
/// input always produces the same output. Per-file problems, failed writes
/// included, end up in the report; configuration problems abort the run.
pub fn run(config: &MigrationConfig, options: &RunOptions) -> Result<RunReport> {
    let started = Instant::now();
    let mode = WriteMode::from_dry_run(options.dry_run);
    let raw_input = options.input_folder.to_string_lossy();
    let input = PathBuf::from(shellexpand::tilde(&raw_input).to_string());

    if !input.is_dir() {
        return Err(Error::validation_invalid_argument(
            "input",
            format!("Input folder not found: {}", input.display()),
            Some(input.display().to_string()),
            None,
        ));
    }
    config.validate()?;

    let mut batches = Vec::new();
    for expression in &options.fetch_expressions {
        let files = expand_expression(&input, expression)?;
        log_status!("migrate", "{} ({} files)", expression, files.len());

        let batch = if is_reference_expression(expression) {
            reference_batch(config, expression, &files, mode)
        } else {
            substitution_batch(config, expression, &files, mode)?
        };
        batches.push(batch);
    }

    let cleanup = match (&config.object_to_delete, options.delete_files) {
        (Some(target), true) => Some(delete_deprecated(&input, &target.prefixe, mode)?),
        _ => None,
    };

    let overlay = match (config.project_folder(), options.copy_project) {
        (Some(source), true) => Some(copy_overlay(&source, &input, mode)?),
        _ => None,
    };

    let report = RunReport {
        input_folder: input,
        dry_run: options.dry_run,
        batches,
        cleanup,
        overlay,
        elapsed_ms: started.elapsed().as_millis(),
    };
    log_status!(
        "migrate",
        "Done in {}ms: {} files rewritten, {} lookups migrated",
        report.elapsed_ms,
        report.changed_files(),
        report.migrated_files()
    );

    Ok(report)
}
