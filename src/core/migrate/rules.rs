//! Rule compiler: expand a rename map into ordered substitution rules.
//!
//! Every (identifier, boundary template) pair becomes one rule. Order is part of
//! the contract: objects in declaration order, each followed by its field
//! renames, each identifier walking its template list in catalog order. Rules
//! run in that order on the output of the previous rule.

use regex::{NoExpand, Regex, RegexBuilder};
use serde::Serialize;
use std::borrow::Cow;

use crate::config::{GlobalConfig, RenameEntry};
use crate::error::{Error, Result};

use super::catalog::{Boundary, TemplateSet};
use super::scope::{ScopeConstraint, ScopeList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Object,
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdPair {
    pub old_id: String,
    pub new_id: String,
}

/// One compiled match-and-replace step.
#[derive(Debug, Clone, Serialize)]
pub struct SubstitutionRule {
    pub category: RuleCategory,
    /// Name of the boundary template this rule came from.
    pub template: String,
    pub id_pair: IdPair,
    pub case_sensitive: bool,
    pub match_pattern: String,
    pub replacement: String,
    pub scope: ScopeConstraint,
    #[serde(skip)]
    matcher: Regex,
}

impl SubstitutionRule {
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    pub fn count_matches(&self, text: &str) -> usize {
        self.matcher.find_iter(text).count()
    }

    /// Replace every non-overlapping match with the literal replacement text.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.matcher.replace_all(text, NoExpand(&self.replacement))
    }
}

struct RuleSource<'a> {
    category: RuleCategory,
    old_id: &'a str,
    new_id: &'a str,
    case_sensitive: bool,
    exclude: &'a Option<ScopeList>,
    include: &'a Option<ScopeList>,
}

fn build_rule(
    source: &RuleSource<'_>,
    template: &dyn Boundary,
    global: &GlobalConfig,
) -> Result<SubstitutionRule> {
    let mut pattern = String::new();
    if let Some(before) = &global.regex_before {
        pattern.push_str(before);
    }
    pattern.push_str(&template.compile_matcher(source.old_id));
    if let Some(after) = &global.regex_after {
        pattern.push_str(after);
    }

    let matcher = RegexBuilder::new(&pattern)
        .case_insensitive(!source.case_sensitive)
        .build()
        .map_err(|e| {
            Error::config_invalid_value(
                "globalConfig",
                Some(pattern.clone()),
                format!("template '{}' does not compile: {}", template.name(), e),
            )
        })?;

    Ok(SubstitutionRule {
        category: source.category,
        template: template.name().to_string(),
        id_pair: IdPair {
            old_id: source.old_id.to_string(),
            new_id: source.new_id.to_string(),
        },
        case_sensitive: source.case_sensitive,
        match_pattern: pattern,
        replacement: template.render_replacement(source.new_id),
        scope: ScopeConstraint {
            exclude: source.exclude.clone(),
            include: source.include.clone(),
        },
        matcher,
    })
}

/// Compile the ordered rule list for one set of resolved templates.
pub fn compile_rules(
    entries: &[RenameEntry],
    templates: &TemplateSet,
    global: &GlobalConfig,
) -> Result<Vec<SubstitutionRule>> {
    let mut rules = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        entry.check(index)?;

        let object = RuleSource {
            category: RuleCategory::Object,
            old_id: &entry.previous_object,
            new_id: &entry.new_object,
            case_sensitive: entry.case_sensitive,
            exclude: &entry.exclude,
            include: &entry.include,
        };
        for template in &templates.objects {
            rules.push(build_rule(&object, template, global)?);
        }

        for field in &entry.fields_mapping {
            let source = RuleSource {
                category: RuleCategory::Field,
                old_id: &field.previous_field,
                new_id: &field.new_field,
                case_sensitive: field.case_sensitive,
                exclude: &field.exclude,
                include: &field.include,
            };
            for template in &templates.fields {
                rules.push(build_rule(&source, template, global)?);
            }
        }
    }

    Ok(rules)
}

/// A rule whose replacement text is itself matched by another rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleConflict {
    /// Index of the rule producing the text.
    pub producer: usize,
    /// Index of the rule matching it.
    pub consumer: usize,
}

/// Rule pairs that make a second pass over the same text change it again.
///
/// When the consumer comes after the producer the chain already fires within a
/// single pass.
pub fn replacement_conflicts(rules: &[SubstitutionRule]) -> Vec<RuleConflict> {
    let mut conflicts = Vec::new();
    for (producer, source) in rules.iter().enumerate() {
        for (consumer, rule) in rules.iter().enumerate() {
            if rule.is_match(&source.replacement) {
                conflicts.push(RuleConflict { producer, consumer });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldRename;
    use crate::migrate::catalog::BoundaryTemplate;

    fn entry(previous: &str, new: &str, fields: &[(&str, &str)]) -> RenameEntry {
        RenameEntry {
            previous_object: previous.to_string(),
            new_object: new.to_string(),
            new_label: Some(new.to_string()),
            fields_mapping: fields
                .iter()
                .map(|(p, n)| FieldRename {
                    previous_field: p.to_string(),
                    new_field: n.to_string(),
                    ..FieldRename::default()
                })
                .collect(),
            ..RenameEntry::default()
        }
    }

    fn small_set() -> TemplateSet {
        TemplateSet {
            objects: vec![
                BoundaryTemplate::new("tag", "<", ">"),
                BoundaryTemplate::new("space", " ", " "),
            ],
            fields: vec![BoundaryTemplate::new("point", ".", ".")],
        }
    }

    #[test]
    fn rules_follow_declaration_order() {
        let entries = vec![
            entry("A__c", "Alpha", &[("F1__c", "Field1"), ("F2__c", "Field2")]),
            entry("B__c", "Beta", &[]),
        ];
        let rules = compile_rules(&entries, &small_set(), &GlobalConfig::default()).unwrap();

        let order: Vec<(&str, &str)> = rules
            .iter()
            .map(|r| (r.id_pair.old_id.as_str(), r.template.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A__c", "tag"),
                ("A__c", "space"),
                ("F1__c", "point"),
                ("F2__c", "point"),
                ("B__c", "tag"),
                ("B__c", "space"),
            ]
        );
        assert_eq!(rules[2].category, RuleCategory::Field);
    }

    #[test]
    fn full_catalog_yields_one_rule_per_template() {
        let entries = vec![entry("A__c", "Alpha", &[("F__c", "Field")])];
        let rules =
            compile_rules(&entries, &TemplateSet::defaults(), &GlobalConfig::default()).unwrap();
        assert_eq!(rules.len(), 14 + 31);
    }

    #[test]
    fn pattern_and_replacement_text() {
        let entries = vec![entry("A__c", "Alpha", &[])];
        let rules = compile_rules(&entries, &small_set(), &GlobalConfig::default()).unwrap();
        assert_eq!(rules[0].match_pattern, "<A__c>");
        assert_eq!(rules[0].replacement, "<Alpha>");
        assert_eq!(rules[0].apply("x <a__c> y"), "x <Alpha> y");
    }

    #[test]
    fn case_sensitive_rules_skip_other_cases() {
        let mut sensitive = entry("A__c", "Alpha", &[]);
        sensitive.case_sensitive = true;
        let rules = compile_rules(&[sensitive], &small_set(), &GlobalConfig::default()).unwrap();
        assert!(!rules[0].is_match("<a__c>"));
        assert!(rules[0].is_match("<A__c>"));
    }

    #[test]
    fn identifier_is_matched_literally() {
        let entries = vec![entry("A.c", "Alpha", &[])];
        let rules = compile_rules(&entries, &small_set(), &GlobalConfig::default()).unwrap();
        assert!(!rules[0].is_match("<Abc>"));
    }

    #[test]
    fn replacement_dollar_signs_are_literal() {
        let entries = vec![entry("A__c", "$1Alpha", &[])];
        let rules = compile_rules(&entries, &small_set(), &GlobalConfig::default()).unwrap();
        assert_eq!(rules[0].apply("<A__c>"), "<$1Alpha>");
    }

    #[test]
    fn global_expressions_wrap_every_pattern() {
        let global = GlobalConfig {
            regex_before: Some(r"(?:\b)?".to_string()),
            regex_after: Some("(?:;)?".to_string()),
            ..GlobalConfig::default()
        };
        let rules = compile_rules(&[entry("A__c", "Alpha", &[])], &small_set(), &global).unwrap();
        assert_eq!(rules[0].match_pattern, r"(?:\b)?<A__c>(?:;)?");
        // The trailing fragment is consumed by the match, not echoed back.
        assert_eq!(rules[0].apply("<A__c>;"), "<Alpha>");
    }

    #[test]
    fn invalid_global_expression_is_a_config_error() {
        let global = GlobalConfig {
            regex_before: Some("(".to_string()),
            ..GlobalConfig::default()
        };
        let err = compile_rules(&[entry("A__c", "Alpha", &[])], &small_set(), &global).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn missing_previous_object_fails_compilation() {
        let err = compile_rules(
            &[entry("", "Alpha", &[])],
            &small_set(),
            &GlobalConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
        assert_eq!(err.details["key"], "objects[0].previousObject");
    }

    #[test]
    fn rules_carry_entry_scope() {
        let mut scoped = entry("A__c", "Alpha", &[]);
        scoped.exclude = Some(ScopeList::default());
        let rules = compile_rules(&[scoped], &small_set(), &GlobalConfig::default()).unwrap();
        assert!(rules.iter().all(|r| r.scope.exclude.is_some()));
    }

    #[test]
    fn default_catalog_has_no_replacement_conflicts_for_distinct_names() {
        let entries = vec![
            entry("Legacy__c", "Account", &[("Amount__c", "AnnualRevenue")]),
            entry("Bridge__c", "Contact", &[("Owner__c", "ReportsToId")]),
        ];
        let rules =
            compile_rules(&entries, &TemplateSet::defaults(), &GlobalConfig::default()).unwrap();
        assert!(replacement_conflicts(&rules).is_empty());
    }

    #[test]
    fn chained_renames_are_reported() {
        // A -> B followed by B -> C: the second rule rewrites what the first produced.
        let entries = vec![entry("A__c", "B__c", &[]), entry("B__c", "C__c", &[])];
        let rules = compile_rules(&entries, &small_set(), &GlobalConfig::default()).unwrap();
        let conflicts = replacement_conflicts(&rules);
        assert!(conflicts
            .iter()
            .any(|c| c.producer == 0 && c.consumer == 2));
    }
}
