//! Removal of metadata still tied to a deprecated object prefix.
//!
//! Anything under `<root>/<type>/` whose path carries the prefix goes, as do
//! lookup fields pointing at a prefixed object and layouts that still place a
//! prefixed field or action.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::io;

use super::reference::FIELD_FILE_SUFFIX;
use super::xml::{self, Document};
use super::WriteMode;

const LAYOUT_FILE_SUFFIX: &str = ".layout-meta.xml";

const LAYOUT_FIELD_PATH: [&str; 4] = ["layoutSections", "layoutColumns", "layoutItems", "field"];
const LAYOUT_ACTION_PATH: [&str; 3] = [
    "platformActionList",
    "platformActionListItems",
    "actionName",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub scanned: usize,
    /// Removed paths, or the paths that would be removed on a dry run.
    pub removed: Vec<PathBuf>,
    pub failures: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Remove,
    Descend,
    Keep,
}

fn list(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| {
            Error::validation_invalid_argument(
                "input",
                format!("Invalid glob pattern '{}': {}", pattern, e),
                Some(pattern.to_string()),
                None,
            )
        })?
        .filter_map(|entry| entry.ok())
        .collect();
    Ok(entries)
}

fn children_pattern(dir: &Path) -> String {
    format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()))
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(suffix))
        .unwrap_or(false)
}

fn references_prefix(document: &Document, prefix: &str) -> bool {
    document.roots.iter().any(|root| {
        root.first_value("referenceTo")
            .map(|target| target.contains(prefix))
            .unwrap_or(false)
    })
}

fn layout_places_prefix(document: &Document, prefix: &str) -> bool {
    document.roots.iter().any(|root| {
        root.descendants_at(&LAYOUT_FIELD_PATH)
            .into_iter()
            .chain(root.descendants_at(&LAYOUT_ACTION_PATH))
            .filter_map(|e| e.text.as_deref())
            .any(|value| value.contains(prefix))
    })
}

fn inspect_document(path: &Path, prefix: &str, check: fn(&Document, &str) -> bool) -> Verdict {
    let parsed = io::read_file(path, &format!("read {}", path.display()))
        .and_then(|content| xml::parse(&content));
    match parsed {
        Ok(document) if check(&document, prefix) => Verdict::Remove,
        Ok(_) => Verdict::Keep,
        Err(err) => {
            log_status!("cleanup", "Skipping {}: {}", path.display(), err.message);
            Verdict::Keep
        }
    }
}

fn judge(root: &Path, path: &Path, prefix: &str) -> Verdict {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative.to_string_lossy().contains(prefix) {
        return Verdict::Remove;
    }
    if path.is_dir() {
        return Verdict::Descend;
    }
    if has_suffix(path, FIELD_FILE_SUFFIX) {
        return inspect_document(path, prefix, references_prefix);
    }
    if has_suffix(path, LAYOUT_FILE_SUFFIX) {
        return inspect_document(path, prefix, layout_places_prefix);
    }
    Verdict::Keep
}

fn sweep(
    root: &Path,
    candidates: Vec<PathBuf>,
    prefix: &str,
    mode: WriteMode,
    report: &mut CleanupReport,
) -> Result<()> {
    for path in candidates {
        report.scanned += 1;
        match judge(root, &path, prefix) {
            Verdict::Remove => {
                if mode.writes() {
                    if let Err(err) = io::remove_path(&path, &format!("remove {}", path.display()))
                    {
                        report.failures.push(CleanupFailure {
                            path,
                            error: err.message,
                        });
                        continue;
                    }
                    log_status!("cleanup", "Removed {}", path.display());
                }
                report.removed.push(path);
            }
            Verdict::Descend => {
                let children = list(&children_pattern(&path))?;
                sweep(root, children, prefix, mode, report)?;
            }
            Verdict::Keep => {}
        }
    }
    Ok(())
}

/// Delete everything under `root` still tied to `prefix`.
///
/// The walk starts two levels down (`<root>/<type>/<entry>`), so the metadata
/// type folders themselves are never candidates. Failing removals are recorded
/// and the walk goes on.
pub fn delete_deprecated(root: &Path, prefix: &str, mode: WriteMode) -> Result<CleanupReport> {
    if prefix.is_empty() {
        return Err(Error::config_invalid_value(
            "objectToDelete.prefixe",
            Some(String::new()),
            "an empty prefix would match every file",
        ));
    }

    let mut report = CleanupReport::default();
    let pattern = format!("{}/*/*", glob::Pattern::escape(&root.to_string_lossy()));
    let candidates = list(&pattern)?;
    log_status!("cleanup", "Scanning {} entries for '{}'", candidates.len(), prefix);

    sweep(root, candidates, prefix, mode, &mut report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn lookup_to(target: &str) -> String {
        format!(
            "<CustomField><fullName>Ref__c</fullName><referenceTo>{}</referenceTo></CustomField>",
            target
        )
    }

    const LAYOUT_WITH_FIELD: &str = r#"<Layout>
        <layoutSections>
            <layoutColumns>
                <layoutItems><field>Name</field></layoutItems>
                <layoutItems><field>OLD_Amount__c</field></layoutItems>
            </layoutColumns>
        </layoutSections>
    </Layout>"#;

    const LAYOUT_WITH_ACTION: &str = r#"<Layout>
        <platformActionList>
            <platformActionListItems><actionName>OLD_Escalate</actionName></platformActionListItems>
        </platformActionList>
    </Layout>"#;

    const CLEAN_LAYOUT: &str = "<Layout><layoutSections><layoutColumns><layoutItems>\
        <field>Name</field></layoutItems></layoutColumns></layoutSections></Layout>";

    #[test]
    fn removes_prefixed_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "classes/OLD_Service.cls", "class");
        write(root, "classes/Keep.cls", "class");
        write(root, "objects/OLD_Thing__c/OLD_Thing__c.object-meta.xml", "<x/>");

        let report = delete_deprecated(root, "OLD_", WriteMode::Apply).unwrap();

        assert!(!root.join("classes/OLD_Service.cls").exists());
        assert!(!root.join("objects/OLD_Thing__c").exists());
        assert!(root.join("classes/Keep.cls").exists());
        assert_eq!(report.removed.len(), 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn removes_lookups_to_prefixed_objects() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let stale = write(
            root,
            "objects/Contact/fields/Ref__c.field-meta.xml",
            &lookup_to("OLD_Thing__c"),
        );
        let fresh = write(
            root,
            "objects/Contact/fields/Other__c.field-meta.xml",
            &lookup_to("Account"),
        );

        let report = delete_deprecated(root, "OLD_", WriteMode::Apply).unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        assert_eq!(report.removed, vec![stale]);
    }

    #[test]
    fn removes_layouts_placing_prefixed_fields_or_actions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let by_field = write(root, "layouts/Contact-Main.layout-meta.xml", LAYOUT_WITH_FIELD);
        let by_action = write(root, "layouts/Case-Main.layout-meta.xml", LAYOUT_WITH_ACTION);
        let clean = write(root, "layouts/Account-Main.layout-meta.xml", CLEAN_LAYOUT);

        delete_deprecated(root, "OLD_", WriteMode::Apply).unwrap();

        assert!(!by_field.exists());
        assert!(!by_action.exists());
        assert!(clean.exists());
    }

    #[test]
    fn type_folders_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "OLD_folder/Keep.cls", "class");

        let report = delete_deprecated(root, "OLD_", WriteMode::Apply).unwrap();

        // The entry's path relative to root contains the prefix through its
        // parent folder, so the entry goes but the folder stays.
        assert!(root.join("OLD_folder").exists());
        assert_eq!(report.removed, vec![root.join("OLD_folder/Keep.cls")]);
    }

    #[test]
    fn prefix_above_root_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("OLD_project");
        let keep = write(&root, "classes/Keep.cls", "class");

        let report = delete_deprecated(&root, "OLD_", WriteMode::Apply).unwrap();

        assert!(keep.exists());
        assert!(report.removed.is_empty());
        assert_eq!(report.scanned, 1);
    }

    #[test]
    fn dry_run_lists_without_removing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let stale = write(root, "classes/OLD_Service.cls", "class");

        let report = delete_deprecated(root, "OLD_", WriteMode::DryRun).unwrap();

        assert!(stale.exists());
        assert_eq!(report.removed, vec![stale]);
    }

    #[test]
    fn unparseable_metadata_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let broken = write(root, "objects/A/fields/B.field-meta.xml", "<CustomField>");

        let report = delete_deprecated(root, "OLD_", WriteMode::Apply).unwrap();

        assert!(broken.exists());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = delete_deprecated(dir.path(), "", WriteMode::Apply).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }
}
