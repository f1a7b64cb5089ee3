//! Boundary template catalog.
//!
//! A boundary template names the characters that typically sit immediately
//! before and after an identifier when it is a real reference: `'Legacy__c'`,
//! `<Legacy__c>`, `new Legacy__c(`, `record.Amount__c,` and so on. Object
//! identifiers and field identifiers get separate catalogs because fields are
//! usually reached through a `.` while objects stand alone.

use regex::escape;
use serde::{Deserialize, Serialize};

use crate::config::GlobalConfig;

/// `after` value that anchors a template at end of line.
pub const END_OF_LINE: &str = "$";

// ============================================================================
// Types
// ============================================================================

/// A before/after character pair bounding an identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryTemplate {
    pub name: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_suffix: Option<String>,
    /// Restricts an override to fetch expressions ending with this suffix.
    #[serde(
        rename = "affecteditems",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub affected_items: Option<String>,
}

/// Something that can bound an identifier: builds the regex source matching an
/// old identifier and the literal text replacing it.
pub trait Boundary {
    fn name(&self) -> &str;

    /// Regex source matching `old_id` between this boundary's characters.
    fn compile_matcher(&self, old_id: &str) -> String;

    /// Literal text substituted for a match.
    fn render_replacement(&self, new_id: &str) -> String;
}

impl BoundaryTemplate {
    pub fn new(name: &str, before: &str, after: &str) -> Self {
        BoundaryTemplate {
            name: name.to_string(),
            before: before.to_string(),
            after: after.to_string(),
            replacement_prefix: None,
            replacement_suffix: None,
            affected_items: None,
        }
    }

    pub fn is_end_of_line(&self) -> bool {
        self.after == END_OF_LINE
    }

    /// Whether this override applies to the given fetch expression.
    fn affects(&self, expression: &str) -> bool {
        match &self.affected_items {
            None => true,
            Some(suffix) => expression.ends_with(suffix.as_str()),
        }
    }
}

impl Boundary for BoundaryTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile_matcher(&self, old_id: &str) -> String {
        let mut pattern = escape(&self.before);
        pattern.push_str(&escape(old_id));
        if self.is_end_of_line() {
            pattern.push('$');
        } else {
            pattern.push_str(&escape(&self.after));
        }
        pattern
    }

    fn render_replacement(&self, new_id: &str) -> String {
        let mut text = String::new();
        if let Some(prefix) = &self.replacement_prefix {
            text.push_str(prefix);
        }
        text.push_str(&self.before);
        text.push_str(new_id);
        if !self.is_end_of_line() {
            text.push_str(&self.after);
        }
        if let Some(suffix) = &self.replacement_suffix {
            text.push_str(suffix);
        }
        text
    }
}

// ============================================================================
// Built-in catalogs
// ============================================================================

/// Templates bounding object names, in application order.
pub fn default_object_templates() -> Vec<BoundaryTemplate> {
    [
        ("simpleQuote", "'", "'"),
        ("tag", "<", ">"),
        ("xmlFile", ">", "</"),
        // Type.method('Legacy__c.Field__c')
        ("stringlist", "'", "."),
        ("space", " ", " "),
        // Database.upsert(records, Legacy__c.Fields.Name, false)
        ("spacePoint", " ", "."),
        ("parenthesis", "(", ")"),
        // for (Legacy__c record : records)
        ("loop", "(", " "),
        // new Legacy__c()
        ("newObject", " ", "("),
        // record instanceof Legacy__c)
        ("objectInParenthesis", " ", ")"),
        // value="Legacy__c.Field__c"
        ("object", "\"", "."),
        ("DeclarationObject", "\"", "\""),
        ("GetRecordtypeinjson", "\"", "@"),
        // SELECT Id FROM Legacy__c\n WHERE ...
        ("fieldEndline", " ", END_OF_LINE),
    ]
    .iter()
    .map(|(name, before, after)| BoundaryTemplate::new(name, before, after))
    .collect()
}

/// Templates bounding field names, in application order. Names may repeat.
pub fn default_field_templates() -> Vec<BoundaryTemplate> {
    [
        ("simpleQuote", "'", "'"),
        ("simpleQuoteFields", "'", "."),
        ("point", ".", "."),
        ("pointSpace", ".", " "),
        ("xmlFile", ">", "</"),
        ("xmlFile", ".", "</"),
        ("pointQuote", ".", "'"),
        ("spacePoint", " ", "."),
        ("pointEndLine", ".", ";"),
        // new Legacy__c(Amount__c=1)
        ("objectArgument", "(", "="),
        // toLabel(Amount__c)
        ("fieldParenthesis", "(", ")"),
        ("endOfstring", " ", "'"),
        ("selectfields", " ", ","),
        ("pointArgument", ".", ","),
        ("pointEndParenthesis", ".", ")"),
        // SELECT Id,Name,Lookup__r.Name
        ("SOQLRequest", ",", "."),
        ("newObjectInitialize", " ", "="),
        ("firstSOQLRequest", "SELECT ", " "),
        ("firstSOQLRequestofList", "SELECT ", ","),
        ("SOQLRequestofList", " ", ","),
        ("lastSOQLRequestofList", " ", " FROM"),
        ("lastSOQLRequestofList", ",", " FROM"),
        ("equality", ".", "="),
        // new List<String>{record.Amount__c}
        ("list", ".", "}"),
        ("inequality", ".", "!"),
        ("Concatenation", ".", "+"),
        ("comaComa", ",", ","),
        ("pointCalculator", ".", "*"),
        ("componentfield", ".", "\""),
        ("DeclarationField", "\"", "\""),
        ("fieldEndline", ".", END_OF_LINE),
    ]
    .iter()
    .map(|(name, before, after)| BoundaryTemplate::new(name, before, after))
    .collect()
}

// ============================================================================
// Override resolution
// ============================================================================

/// Merge configured overrides into a base catalog for one fetch expression.
///
/// An override replaces every base entry sharing its name, unless its
/// `affecteditems` suffix does not fit `expression`, in which case the base
/// entry stays. An override whose name is unknown is appended. Overrides are
/// processed in order, so a later override can replace an appended one.
pub fn merge_templates(
    base: &[BoundaryTemplate],
    overrides: &[BoundaryTemplate],
    expression: &str,
) -> Vec<BoundaryTemplate> {
    let mut merged = base.to_vec();

    for candidate in overrides {
        let mut known = false;
        for entry in merged.iter_mut() {
            if entry.name != candidate.name {
                continue;
            }
            known = true;
            if candidate.affects(expression) {
                *entry = candidate.clone();
            }
        }
        if !known {
            merged.push(candidate.clone());
        }
    }

    merged
}

/// Object and field templates resolved for one fetch expression.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSet {
    pub objects: Vec<BoundaryTemplate>,
    pub fields: Vec<BoundaryTemplate>,
}

impl TemplateSet {
    pub fn defaults() -> Self {
        TemplateSet {
            objects: default_object_templates(),
            fields: default_field_templates(),
        }
    }

    pub fn resolve(global: &GlobalConfig, expression: &str) -> Self {
        TemplateSet {
            objects: merge_templates(
                &default_object_templates(),
                &global.around_char_replace_object_list_override,
                expression,
            ),
            fields: merge_templates(
                &default_field_templates(),
                &global.around_char_replace_field_list_override,
                expression,
            ),
        }
    }
}

// ============================================================================
// Overlap analysis
// ============================================================================

/// Templates whose trailing boundary can double as their own leading boundary.
///
/// Two adjacent occurrences such as `' Legacy__c Legacy__c '` share the middle
/// space, and a single global replace consumes it with the first match, so the
/// second occurrence survives one pass and is only rewritten by the next.
pub fn overlapping_templates(templates: &[BoundaryTemplate]) -> Vec<&BoundaryTemplate> {
    templates
        .iter()
        .filter(|t| !t.is_end_of_line() && boundary_overlaps(&t.after, &t.before))
        .collect()
}

/// True when some non-empty suffix of `after` is a prefix of `before`.
fn boundary_overlaps(after: &str, before: &str) -> bool {
    if after.is_empty() || before.is_empty() {
        return false;
    }
    after
        .char_indices()
        .map(|(i, _)| &after[i..])
        .any(|suffix| before.starts_with(suffix))
}
