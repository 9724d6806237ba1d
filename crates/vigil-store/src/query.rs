use tracing;
use vigil_common::types::Alert;

/// A parsed `field:value` query.
///
/// The grammar is deliberately small: zero or more whitespace-separated
/// clauses, each `field:value`, all of which must match (exact,
/// case-sensitive string equality against the alert's effective
/// properties). An empty query matches every alert; a malformed query
/// matches none, so management surfaces degrade to an empty result
/// instead of failing.
#[derive(Debug, Clone)]
pub struct Query {
    clauses: Option<Vec<(String, String)>>,
}

impl Query {
    /// Parse a query string. Never fails: syntax errors produce a query
    /// that matches nothing.
    pub fn parse(q: &str) -> Self {
        let mut clauses = Vec::new();
        for token in q.split_whitespace() {
            match token.split_once(':') {
                Some((field, value)) if !field.is_empty() => {
                    clauses.push((field.to_string(), value.to_string()));
                }
                _ => {
                    tracing::debug!(query = %q, clause = %token, "Malformed query clause, matching nothing");
                    return Self { clauses: None };
                }
            }
        }
        Self {
            clauses: Some(clauses),
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        match &self.clauses {
            None => false,
            Some(clauses) => clauses
                .iter()
                .all(|(field, value)| alert.property(field).as_deref() == Some(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use vigil_common::types::AlertLevel;

    fn alert() -> Alert {
        let mut properties = HashMap::new();
        properties.insert("hostName".to_string(), json!("web-01"));
        properties.insert("port".to_string(), json!(8101));
        Alert {
            uuid: "aaaa-bbbb".to_string(),
            level: AlertLevel::Error,
            attribute: "systemload.average".to_string(),
            pattern: "matches:.*[5-9][0-9]".to_string(),
            back_to_normal: false,
            rule_name: None,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            properties,
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(Query::parse("").matches(&alert()));
        assert!(Query::parse("   ").matches(&alert()));
    }

    #[test]
    fn single_clause_exact_match() {
        let a = alert();
        assert!(Query::parse("alertUUID:aaaa-bbbb").matches(&a));
        assert!(Query::parse("uuid:aaaa-bbbb").matches(&a));
        assert!(!Query::parse("alertUUID:aaaa").matches(&a), "no prefix match");
        assert!(!Query::parse("alertUUID:AAAA-BBBB").matches(&a), "case sensitive");
    }

    #[test]
    fn matches_typed_fields_and_side_map() {
        let a = alert();
        assert!(Query::parse("alertLevel:error").matches(&a));
        assert!(Query::parse("alertAttribute:systemload.average").matches(&a));
        assert!(Query::parse("hostName:web-01").matches(&a));
        // Non-string property values match on their JSON rendering.
        assert!(Query::parse("port:8101").matches(&a));
    }

    #[test]
    fn clauses_are_conjoined() {
        let a = alert();
        assert!(Query::parse("alertLevel:error hostName:web-01").matches(&a));
        assert!(!Query::parse("alertLevel:error hostName:web-02").matches(&a));
    }

    #[test]
    fn malformed_query_matches_nothing() {
        let a = alert();
        assert!(!Query::parse("no-colon-here").matches(&a));
        assert!(!Query::parse(":value").matches(&a));
        assert!(!Query::parse("alertLevel:error garbage").matches(&a));
    }

    #[test]
    fn value_containing_colon_splits_on_first() {
        let a = alert();
        assert!(Query::parse("alertPattern:matches:.*[5-9][0-9]").matches(&a));
    }

    #[test]
    fn absent_field_never_matches() {
        assert!(!Query::parse("noSuchField:x").matches(&alert()));
    }
}
