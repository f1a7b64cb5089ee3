//! Line substitution executor.

use serde::Serialize;
use std::path::Path;

use crate::utils::io;

use super::reference::error_text;
use super::rules::SubstitutionRule;
use super::WriteMode;

/// Lines starting with this marker (after leading whitespace) are left alone.
pub const LINE_COMMENT: &str = "//";

/// Result of running rules over a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub content: String,
    pub replacements: usize,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubstitutionOutcome {
    Missing,
    Unreadable { error: String },
    Unchanged,
    Rewritten { replacements: usize, written: bool },
    WriteFailed { error: String },
}

fn is_comment(line: &str) -> bool {
    line.trim().starts_with(LINE_COMMENT)
}

/// Apply `rules` in order to every non-comment line of `content`.
pub fn substitute_text(content: &str, rules: &[&SubstitutionRule]) -> Substitution {
    let mut replacements = 0;
    let mut lines = Vec::new();

    for line in content.split('\n') {
        if is_comment(line) {
            lines.push(line.to_string());
            continue;
        }

        let mut current = line.to_string();
        for rule in rules {
            let hits = rule.count_matches(&current);
            if hits == 0 {
                continue;
            }
            replacements += hits;
            current = rule.apply(&current).into_owned();
        }
        lines.push(current);
    }

    Substitution {
        content: lines.join("\n"),
        replacements,
    }
}

/// Rewrite the file at `path` with `rules` (already filtered for this file).
///
/// A missing file is nothing to do. Unreadable and unwritable files come back
/// as outcomes, never as errors. The file is replaced atomically, whole, and
/// only when its content changed, so a failed write leaves it as it was.
pub fn apply_rules(
    path: &Path,
    rules: &[&SubstitutionRule],
    mode: WriteMode,
) -> SubstitutionOutcome {
    if !path.exists() {
        return SubstitutionOutcome::Missing;
    }

    let original = match io::read_file(path, &format!("read {}", path.display())) {
        Ok(content) => content,
        Err(err) => {
            let error = error_text(&err);
            log_status!("migrate", "Skipping unreadable {}: {}", path.display(), error);
            return SubstitutionOutcome::Unreadable { error };
        }
    };

    let result = substitute_text(&original, rules);
    if result.content == original {
        return SubstitutionOutcome::Unchanged;
    }

    if mode.writes() {
        if let Err(err) =
            io::write_file_atomic(path, &result.content, &format!("write {}", path.display()))
        {
            let error = error_text(&err);
            log_status!("migrate", "Could not write {}: {}", path.display(), error);
            return SubstitutionOutcome::WriteFailed { error };
        }
    }

    SubstitutionOutcome::Rewritten {
        replacements: result.replacements,
        written: mode.writes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldRename, GlobalConfig, RenameEntry};
    use crate::migrate::catalog::TemplateSet;
    use crate::migrate::rules::compile_rules;
    use std::fs;

    fn default_rules() -> Vec<SubstitutionRule> {
        let entries = vec![RenameEntry {
            previous_object: "Legacy__c".to_string(),
            new_object: "Account".to_string(),
            fields_mapping: vec![FieldRename {
                previous_field: "Amount__c".to_string(),
                new_field: "AnnualRevenue".to_string(),
                ..FieldRename::default()
            }],
            ..RenameEntry::default()
        }];
        compile_rules(&entries, &TemplateSet::defaults(), &GlobalConfig::default()).unwrap()
    }

    fn run(content: &str) -> Substitution {
        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        substitute_text(content, &refs)
    }

    #[test]
    fn comment_lines_are_untouched() {
        let result = run("// Legacy__c reference\n  Legacy__c reference");
        assert_eq!(result.content, "// Legacy__c reference\n  Account reference");
    }

    #[test]
    fn indented_comment_lines_are_untouched() {
        let result = run("    // see 'Legacy__c'");
        assert_eq!(result.replacements, 0);
    }

    #[test]
    fn apex_idioms_are_rewritten() {
        let source = [
            "List<Legacy__c> rows = [SELECT Id, Amount__c FROM Legacy__c",
            "    WHERE Legacy__c.Amount__c > 0];",
            "    Legacy__c row = new Legacy__c(Amount__c=1);",
            "for (Legacy__c r : rows) { total += r.Amount__c; }",
            "Schema.SObjectType t = Schema.getGlobalDescribe().get('Legacy__c');",
        ]
        .join("\n");

        let expected = [
            "List<Account> rows = [SELECT Id, AnnualRevenue FROM Account",
            "    WHERE Account.AnnualRevenue > 0];",
            "    Account row = new Account(AnnualRevenue=1);",
            "for (Account r : rows) { total += r.AnnualRevenue; }",
            "Schema.SObjectType t = Schema.getGlobalDescribe().get('Account');",
        ]
        .join("\n");

        assert_eq!(run(&source).content, expected);
    }

    #[test]
    fn markup_idioms_are_rewritten() {
        let source = "<aura:attribute name=\"record\" type=\"Legacy__c\" />\n\
                      <object>Legacy__c</object>\n\
                      <field>Amount__c</field>";
        let expected = "<aura:attribute name=\"record\" type=\"Account\" />\n\
                        <object>Account</object>\n\
                        <field>AnnualRevenue</field>";
        assert_eq!(run(source).content, expected);
    }

    #[test]
    fn unbounded_substrings_are_left_alone() {
        let result = run("String s = MyLegacy__cHelper.build();");
        assert_eq!(result.replacements, 0);
        assert_eq!(result.content, "String s = MyLegacy__cHelper.build();");
    }

    #[test]
    fn line_structure_is_preserved() {
        let result = run("a\n\nb\n");
        assert_eq!(result.content, "a\n\nb\n");
    }

    #[test]
    fn isolated_occurrences_are_idempotent() {
        let once = run("    Legacy__c x = new Legacy__c();\nSELECT Amount__c FROM Legacy__c");
        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let twice = substitute_text(&once.content, &refs);
        assert_eq!(twice.replacements, 0);
        assert_eq!(twice.content, once.content);
    }

    #[test]
    fn adjacent_occurrences_sharing_a_space_need_a_second_pass() {
        // "space" bounds on both sides, so the middle space is consumed by the
        // first match and the second occurrence is left for the next pass.
        let once = run("a Legacy__c Legacy__c b");
        assert_eq!(once.content, "a Account Legacy__c b");

        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let twice = substitute_text(&once.content, &refs);
        assert_eq!(twice.content, "a Account Account b");
    }

    #[test]
    fn missing_file_is_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = apply_rules(&dir.path().join("Gone.cls"), &[], WriteMode::Apply);
        assert_eq!(outcome, SubstitutionOutcome::Missing);
    }

    #[test]
    fn non_utf8_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Binary.cls");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let outcome = apply_rules(&path, &refs, WriteMode::Apply);
        assert!(matches!(outcome, SubstitutionOutcome::Unreadable { .. }));
    }

    #[test]
    fn rewrites_file_when_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Service.cls");
        fs::write(&path, "    Legacy__c row = new Legacy__c();\n").unwrap();

        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let outcome = apply_rules(&path, &refs, WriteMode::Apply);

        assert_eq!(
            outcome,
            SubstitutionOutcome::Rewritten {
                replacements: 2,
                written: true
            }
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "    Account row = new Account();\n"
        );
    }

    #[test]
    fn dry_run_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Service.cls");
        fs::write(&path, "new Legacy__c();").unwrap();

        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let outcome = apply_rules(&path, &refs, WriteMode::DryRun);

        assert!(matches!(
            outcome,
            SubstitutionOutcome::Rewritten { written: false, .. }
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "new Legacy__c();");
    }

    #[test]
    fn unchanged_file_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Plain.cls");
        fs::write(&path, "Integer x = 1;\n").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));

        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let outcome = apply_rules(&path, &refs, WriteMode::Apply);

        assert_eq!(outcome, SubstitutionOutcome::Unchanged);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn failed_write_keeps_original_and_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Service.cls");
        fs::write(&path, "    Legacy__c row = new Legacy__c();\n").unwrap();
        fs::create_dir(dir.path().join("Service.cls.tmp")).unwrap();

        let rules = default_rules();
        let refs: Vec<&SubstitutionRule> = rules.iter().collect();
        let outcome = apply_rules(&path, &refs, WriteMode::Apply);

        assert!(matches!(outcome, SubstitutionOutcome::WriteFailed { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "    Legacy__c row = new Legacy__c();\n"
        );
    }
}
