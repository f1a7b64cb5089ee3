//! Lookup field migration.
//!
//! A lookup field definition (`objects/<Object>/fields/<Field>.field-meta.xml`)
//! points at its target through `referenceTo`. When that target is renamed the
//! definition is retargeted and re-emitted next to the original as
//! `<newObject>.field-meta.xml`. The source file is left in place.

use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::config::RenameEntry;
use crate::utils::io;

use super::xml::{self, Element};
use super::WriteMode;

/// Folder name marking where field definitions live.
pub const FIELDS_SEGMENT: &str = "fields";
pub const FIELD_FILE_SUFFIX: &str = ".field-meta.xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetargetedReference {
    pub previous_object: String,
    pub new_object: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Migrated {
    pub source: PathBuf,
    pub references: Vec<RetargetedReference>,
    pub written: bool,
}

/// Why a field definition was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkippedReason {
    Unreadable { error: String },
    Unparseable { error: String },
    NoMatchingReference,
    NoFieldsFolder,
    DestinationIsSource,
    SerializeFailed { error: String },
    WriteFailed { destination: PathBuf, error: String },
}

impl fmt::Display for SkippedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkippedReason::Unreadable { error } => write!(f, "unreadable: {}", error),
            SkippedReason::Unparseable { error } => write!(f, "not valid XML: {}", error),
            SkippedReason::NoMatchingReference => write!(f, "no renamed object referenced"),
            SkippedReason::NoFieldsFolder => {
                write!(f, "path has no '{}' folder", FIELDS_SEGMENT)
            }
            SkippedReason::DestinationIsSource => {
                write!(f, "destination would overwrite the source file")
            }
            SkippedReason::SerializeFailed { error } => write!(f, "serialize failed: {}", error),
            SkippedReason::WriteFailed { destination, error } => {
                write!(f, "write {} failed: {}", destination.display(), error)
            }
        }
    }
}

/// Path of the `fields` folder `path` sits under (first occurrence).
fn fields_folder(path: &Path) -> Option<PathBuf> {
    let mut folder = PathBuf::new();
    for component in path.components() {
        folder.push(component.as_os_str());
        if let Component::Normal(name) = component {
            if name == FIELDS_SEGMENT {
                return Some(folder);
            }
        }
    }
    None
}

fn retarget(element: &mut Element, candidate: &RenameEntry) {
    element.set_first_value("referenceTo", &candidate.new_object);
    if let Some(label) = &candidate.new_label {
        element.set_first_value("label", label);
    }
    element.set_first_value("fullName", &candidate.new_object);
    if let Some(relationship) = element
        .children
        .iter_mut()
        .find(|c| c.name == "relationshipName")
    {
        if let Some(name) = relationship.text.as_mut() {
            *name = name.replace('_', "");
        }
    }
}

pub(super) fn error_text(err: &crate::Error) -> String {
    err.details["error"]
        .as_str()
        .unwrap_or(&err.message)
        .to_string()
}

/// Retarget the lookup field at `path` to the renamed object it references.
///
/// For each top-level element, the first candidate whose `previousObject`
/// equals the element's `referenceTo` wins. Every failure is reported as a
/// [`SkippedReason`]; nothing here aborts a run.
pub fn migrate_reference(
    path: &Path,
    candidates: &[RenameEntry],
    mode: WriteMode,
) -> std::result::Result<Migrated, SkippedReason> {
    let content = io::read_file(path, &format!("read {}", path.display())).map_err(|e| {
        SkippedReason::Unreadable {
            error: error_text(&e),
        }
    })?;

    let mut document = xml::parse(&content).map_err(|e| SkippedReason::Unparseable {
        error: error_text(&e),
    })?;

    let mut matched: Vec<(usize, &RenameEntry)> = Vec::new();
    for (index, root) in document.roots.iter().enumerate() {
        let target = root.first_value("referenceTo");
        if let Some(candidate) = candidates
            .iter()
            .find(|c| target == Some(c.previous_object.as_str()))
        {
            matched.push((index, candidate));
        }
    }
    if matched.is_empty() {
        return Err(SkippedReason::NoMatchingReference);
    }

    let folder = fields_folder(path).ok_or(SkippedReason::NoFieldsFolder)?;

    let mut references = Vec::new();
    for (index, candidate) in &matched {
        let destination = folder.join(format!("{}{}", candidate.new_object, FIELD_FILE_SUFFIX));
        if destination == path {
            return Err(SkippedReason::DestinationIsSource);
        }
        retarget(&mut document.roots[*index], candidate);
        references.push(RetargetedReference {
            previous_object: candidate.previous_object.clone(),
            new_object: candidate.new_object.clone(),
            destination,
        });
    }

    let serialized = xml::to_string(&document).map_err(|e| SkippedReason::SerializeFailed {
        error: error_text(&e),
    })?;

    if mode.writes() {
        let mut written: Vec<&PathBuf> = Vec::new();
        for reference in &references {
            if written.contains(&&reference.destination) {
                continue;
            }
            io::write_file_atomic(
                &reference.destination,
                &serialized,
                &format!("write {}", reference.destination.display()),
            )
            .map_err(|e| SkippedReason::WriteFailed {
                destination: reference.destination.clone(),
                error: error_text(&e),
            })?;
            written.push(&reference.destination);
        }
    }

    Ok(Migrated {
        source: path.to_path_buf(),
        references,
        written: mode.writes(),
    })
}
