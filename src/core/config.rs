//! Rename map configuration.
//!
//! The configuration is a JSON document describing which objects (and their
//! fields) are renamed, optional cleanup of a deprecated prefix, an optional
//! hand-maintained project folder to copy over the result, and per-run
//! overrides of the boundary template catalog.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::migrate::catalog::BoundaryTemplate;
use crate::migrate::scope::ScopeList;
use crate::utils::io;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    #[serde(default)]
    pub objects: Vec<RenameEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_to_delete: Option<ObjectToDelete>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sfdx_project_folder: Option<String>,
    #[serde(default)]
    pub global_config: GlobalConfig,
}

/// One object-level rename plus its nested field renames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameEntry {
    #[serde(default)]
    pub previous_object: String,
    #[serde(default)]
    pub new_object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_label: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ScopeList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<ScopeList>,
    #[serde(default)]
    pub fields_mapping: Vec<FieldRename>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRename {
    #[serde(default)]
    pub previous_field: String,
    #[serde(default)]
    pub new_field: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ScopeList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<ScopeList>,
}

/// Files and folders whose name (or lookup target) contains `prefixe` are removed
/// by the cleanup pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectToDelete {
    pub prefixe: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Raw regex fragment prepended to every compiled match pattern.
    #[serde(
        rename = "regexEpressionBeforeElement",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub regex_before: Option<String>,
    /// Raw regex fragment appended to every compiled match pattern.
    #[serde(
        rename = "regexEpressionAfterElement",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub regex_after: Option<String>,
    #[serde(default)]
    pub around_char_replace_object_list_override: Vec<BoundaryTemplate>,
    #[serde(default)]
    pub around_char_replace_field_list_override: Vec<BoundaryTemplate>,
}

impl RenameEntry {
    /// Check the identifiers a rename entry cannot do without.
    pub fn check(&self, index: usize) -> Result<()> {
        require(&self.previous_object, || format!("objects[{}].previousObject", index))?;
        require(&self.new_object, || format!("objects[{}].newObject", index))?;
        for (field_index, field) in self.fields_mapping.iter().enumerate() {
            require(&field.previous_field, || {
                format!("objects[{}].fieldsMapping[{}].previousField", index, field_index)
            })?;
            require(&field.new_field, || {
                format!("objects[{}].fieldsMapping[{}].newField", index, field_index)
            })?;
        }
        Ok(())
    }
}

fn require(value: &str, key: impl FnOnce() -> String) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config_missing_key(key(), None));
    }
    Ok(())
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<()> {
        for (index, entry) in self.objects.iter().enumerate() {
            entry.check(index)?;
        }
        if let Some(delete) = &self.object_to_delete {
            if delete.prefixe.is_empty() {
                return Err(Error::config_invalid_value(
                    "objectToDelete.prefixe",
                    Some(String::new()),
                    "an empty prefix would match every file",
                ));
            }
        }
        Ok(())
    }

    /// Overlay folder, tilde-expanded.
    pub fn project_folder(&self) -> Option<PathBuf> {
        self.sfdx_project_folder
            .as_deref()
            .filter(|folder| !folder.trim().is_empty())
            .map(|folder| PathBuf::from(shellexpand::tilde(folder).to_string()))
    }
}

/// Parse and validate a configuration document.
pub fn from_str(raw: &str, origin: &str) -> Result<MigrationConfig> {
    let config: MigrationConfig =
        serde_json::from_str(raw).map_err(|e| Error::config_invalid_json(origin, e))?;
    config.validate().map_err(|mut err| {
        if let Some(details) = err.details.as_object_mut() {
            details.insert("path".to_string(), serde_json::json!(origin));
        }
        err
    })?;
    Ok(config)
}

/// Load the configuration file at `path` (`~` is expanded).
pub fn load(path: &str) -> Result<MigrationConfig> {
    let expanded = shellexpand::tilde(path).to_string();
    let raw = io::read_file(Path::new(&expanded), &format!("read config {}", expanded))
        .map_err(|e| e.with_hint("Pass the rename map with --config <FILE>"))?;
    from_str(&raw, &expanded)
}
