use clap::{ArgAction, Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use modelshift::config;
use modelshift::migrate::driver::{self, RunOptions, RunReport};
use modelshift::migrate::rules::{replacement_conflicts, RuleConflict};
use modelshift::migrate::{overlapping_templates, BoundaryTemplate, SubstitutionRule, TemplateSet};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    command: MigrateCommand,
}

#[derive(Subcommand)]
enum MigrateCommand {
    /// Rename objects and fields across a metadata project
    Run {
        /// JSON rename map
        #[arg(short, long)]
        config: String,
        /// Project folder to migrate
        #[arg(short, long, default_value = ".")]
        input: String,
        /// Comma-separated fetch expressions (an empty string selects none)
        #[arg(short, long)]
        fetch: Option<String>,
        /// Delete files still tied to the deprecated prefix
        #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
        delete_files: bool,
        /// Copy the configured project folder over the result
        #[arg(short = 's', long, default_value_t = true, action = ArgAction::Set)]
        copy_project: bool,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the ordered substitution rules compiled for one fetch expression
    Rules {
        /// JSON rename map
        #[arg(short, long)]
        config: String,
        /// Fetch expression the rules are resolved for
        #[arg(short, long)]
        fetch: String,
    },
    /// Show the boundary templates resolved for one fetch expression
    Catalog {
        /// JSON rename map
        #[arg(short, long)]
        config: String,
        /// Fetch expression the templates are resolved for
        #[arg(short, long)]
        fetch: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum MigrateOutput {
    #[serde(rename = "migrate.run", rename_all = "camelCase")]
    Run {
        config: String,
        dry_run: bool,
        changed_files: usize,
        migrated_files: usize,
        report: RunReport,
    },
    #[serde(rename = "migrate.rules", rename_all = "camelCase")]
    Rules {
        fetch: String,
        rule_count: usize,
        rules: Vec<SubstitutionRule>,
        conflicts: Vec<RuleConflict>,
    },
    #[serde(rename = "migrate.catalog", rename_all = "camelCase")]
    Catalog {
        fetch: String,
        templates: TemplateSet,
        overlapping: OverlapSummary,
    },
}

/// Template names whose adjacent occurrences need more than one pass.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapSummary {
    pub objects: Vec<String>,
    pub fields: Vec<String>,
}

pub fn run(args: MigrateArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<MigrateOutput> {
    match args.command {
        MigrateCommand::Run {
            config,
            input,
            fetch,
            delete_files,
            copy_project,
            dry_run,
        } => run_migration(
            &config,
            RunOptions {
                input_folder: PathBuf::from(input),
                fetch_expressions: driver::parse_fetch_expressions(fetch.as_deref()),
                delete_files,
                copy_project,
                dry_run,
            },
        ),
        MigrateCommand::Rules { config, fetch } => show_rules(&config, &fetch),
        MigrateCommand::Catalog { config, fetch } => show_catalog(&config, &fetch),
    }
}

fn run_migration(config_path: &str, options: RunOptions) -> CmdResult<MigrateOutput> {
    let migration = config::load(config_path)?;
    let report = driver::run(&migration, &options)?;

    Ok((
        MigrateOutput::Run {
            config: config_path.to_string(),
            dry_run: options.dry_run,
            changed_files: report.changed_files(),
            migrated_files: report.migrated_files(),
            report,
        },
        0,
    ))
}

fn show_rules(config_path: &str, fetch: &str) -> CmdResult<MigrateOutput> {
    let migration = config::load(config_path)?;
    let rules = driver::rules_for_expression(&migration, fetch)?;
    let conflicts = replacement_conflicts(&rules);

    Ok((
        MigrateOutput::Rules {
            fetch: fetch.to_string(),
            rule_count: rules.len(),
            rules,
            conflicts,
        },
        0,
    ))
}

fn overlapping_names(templates: &[BoundaryTemplate]) -> Vec<String> {
    overlapping_templates(templates)
        .into_iter()
        .map(|t| t.name.clone())
        .collect()
}

fn show_catalog(config_path: &str, fetch: &str) -> CmdResult<MigrateOutput> {
    let migration = config::load(config_path)?;
    let templates = TemplateSet::resolve(&migration.global_config, fetch);
    let overlapping = OverlapSummary {
        objects: overlapping_names(&templates.objects),
        fields: overlapping_names(&templates.fields),
    };

    Ok((
        MigrateOutput::Catalog {
            fetch: fetch.to_string(),
            templates,
            overlapping,
        },
        0,
    ))
}
