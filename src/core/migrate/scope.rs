//! Per-rule include/exclude scoping by file extension and class name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Trailing marker turning a scope pattern into a case-insensitive prefix.
pub const WILDCARD: char = '%';

/// Patterns per file extension, plus named exceptions.
///
/// In JSON the extension lists and the exception list share one object:
/// `{"cls": ["Account%"], "exceptionList": ["AccountHistory"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeList {
    #[serde(
        rename = "exceptionList",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub exception_list: Vec<String>,
    #[serde(flatten)]
    pub by_extension: BTreeMap<String, Vec<String>>,
}

impl ScopeList {
    pub fn patterns_for(&self, extension: &str) -> Option<&[String]> {
        self.by_extension.get(extension).map(Vec::as_slice)
    }
}

/// Scope attached to a compiled rule.
///
/// The include exception list is carried but not consulted: only exclude
/// wildcard matches can be overridden by an exception.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ScopeList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<ScopeList>,
}

/// The parts of a file path scoping looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    /// Text after the last `.` of the file name.
    pub extension: String,
    /// File name without its extension.
    pub class_name: String,
}

impl FileTarget {
    pub fn new(extension: &str, class_name: &str) -> Self {
        FileTarget {
            extension: extension.to_string(),
            class_name: class_name.to_string(),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let class_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        FileTarget {
            extension,
            class_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternMatch {
    Exact,
    Prefix,
    None,
}

fn match_pattern(pattern: &str, class_name: &str) -> PatternMatch {
    if pattern == class_name {
        return PatternMatch::Exact;
    }
    if let Some(cut) = pattern.find(WILDCARD) {
        if pattern.ends_with(WILDCARD)
            && class_name
                .to_uppercase()
                .starts_with(&pattern[..cut].to_uppercase())
        {
            return PatternMatch::Prefix;
        }
    }
    PatternMatch::None
}

impl ScopeConstraint {
    pub fn unrestricted() -> Self {
        ScopeConstraint::default()
    }

    /// Whether a rule with this scope applies to `target`.
    ///
    /// An exclude list for the extension takes precedence over an include
    /// list. The first matching exclude pattern decides: an exact match always
    /// excludes, a wildcard match excludes unless the class is a named
    /// exception. An include list admits only matching classes, so an empty
    /// one admits nothing.
    pub fn allows(&self, target: &FileTarget) -> bool {
        if let Some(exclude) = &self.exclude {
            if let Some(patterns) = exclude.patterns_for(&target.extension) {
                for pattern in patterns {
                    match match_pattern(pattern, &target.class_name) {
                        PatternMatch::Exact => return false,
                        PatternMatch::Prefix => {
                            return exclude
                                .exception_list
                                .iter()
                                .any(|exception| exception == &target.class_name);
                        }
                        PatternMatch::None => {}
                    }
                }
                return true;
            }
        }

        if let Some(include) = &self.include {
            if let Some(patterns) = include.patterns_for(&target.extension) {
                return patterns
                    .iter()
                    .any(|p| match_pattern(p, &target.class_name) != PatternMatch::None);
            }
        }

        true
    }
}
