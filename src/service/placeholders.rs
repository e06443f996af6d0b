//! `{{id}}`, `{{user_id}}` and `{{resource}}` substitution in rule strings.

use crate::config::FieldRuleSet;

/// Values substituted into rule strings for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placeholders {
    pub id: String,
    pub user_id: String,
    pub resource: String,
}

impl Placeholders {
    /// On store there is no record yet: `{{id}}` becomes `NULL`, which `unique` reads as no exception.
    pub fn for_store(user_id: String, resource: &str) -> Self {
        Self {
            id: "NULL".to_string(),
            user_id,
            resource: resource.to_string(),
        }
    }

    pub fn for_record(id: String, user_id: String, resource: &str) -> Self {
        Self {
            id,
            user_id,
            resource: resource.to_string(),
        }
    }

    fn apply(&self, rule: &str) -> String {
        if !rule.contains("{{") {
            return rule.to_string();
        }
        rule.replace("{{id}}", &self.id)
            .replace("{{user_id}}", &self.user_id)
            .replace("{{resource}}", &self.resource)
    }
}

/// Substitute in every rule string of every field.
pub fn substitute(mut rules: FieldRuleSet, vars: &Placeholders) -> FieldRuleSet {
    for (_, field_rules) in rules.iter_mut() {
        for rule in field_rules.iter_mut() {
            *rule = vars.apply(rule);
        }
    }
    rules
}
