//! Object model migration: rename objects and fields across a metadata project.
//!
//! Free-text sources (classes, triggers, components, profiles...) are rewritten
//! line by line with boundary-aware substitution rules compiled from the rename
//! map. Lookup field definitions are migrated structurally: the reference is
//! retargeted and the file is re-emitted under the new object's name.

pub mod catalog;
pub mod cleanup;
pub mod driver;
pub mod reference;
pub mod rules;
pub mod scope;
pub mod substitute;
pub mod xml;

pub use catalog::{merge_templates, overlapping_templates, Boundary, BoundaryTemplate, TemplateSet};
pub use cleanup::{delete_deprecated, CleanupReport};
pub use driver::{run, RunOptions, RunReport};
pub use reference::{migrate_reference, Migrated, SkippedReason};
pub use rules::{compile_rules, replacement_conflicts, RuleCategory, SubstitutionRule};
pub use scope::{FileTarget, ScopeConstraint, ScopeList};
pub use substitute::{apply_rules, substitute_text, SubstitutionOutcome};

/// Whether a pass writes its changes to disk or only reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Apply,
    DryRun,
}

impl WriteMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            WriteMode::DryRun
        } else {
            WriteMode::Apply
        }
    }

    pub fn writes(self) -> bool {
        self == WriteMode::Apply
    }
}
