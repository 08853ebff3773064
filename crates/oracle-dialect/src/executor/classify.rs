//! Statement-error classification.
//!
//! An ordered table of message patterns maps raw driver errors onto the
//! constraint error types. First match wins; anything unmatched stays a
//! generic database error. The table is pure data so it can be tested
//! without a connection.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::connection::DriverError;
use crate::descriptor::Model;
use crate::error::DialectError;

#[derive(Debug, Clone, Copy)]
enum ErrorKind {
    Unique,
    ForeignKey,
    UnknownConstraint,
}

struct Rule {
    pattern: Regex,
    kind: ErrorKind,
}

fn rule(pattern: &str, kind: ErrorKind) -> Rule {
    Rule {
        // Patterns are constants; a failure here is a bug in the table.
        pattern: Regex::new(pattern).expect("valid classification pattern"),
        kind,
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            r"Violation of UNIQUE KEY constraint '(?P<constraint>(?s:.*?))'\. Cannot insert duplicate key in object '.*'\.(?: The duplicate key value is \((?P<values>.*)\)\.)?",
            ErrorKind::Unique,
        ),
        rule(
            r"Cannot insert duplicate key row in object .* with unique index '(?P<constraint>.*)'",
            ErrorKind::Unique,
        ),
        rule(
            r"ORA-00001: unique constraint \((?:[^.)]+\.)?(?P<constraint>[^)]+)\) violated",
            ErrorKind::Unique,
        ),
        rule(
            r"Failed on step '(?P<constraint>.*)'\.\s*Could not create constraint\. See previous errors\.",
            ErrorKind::ForeignKey,
        ),
        rule(
            r#"The DELETE statement conflicted with the REFERENCE constraint "(?P<constraint>.*)"\."#,
            ErrorKind::ForeignKey,
        ),
        rule(
            r#"The (?:INSERT|MERGE|UPDATE) statement conflicted with the FOREIGN KEY constraint "(?P<constraint>.*)"\."#,
            ErrorKind::ForeignKey,
        ),
        rule(
            r"ORA-02291: integrity constraint \((?:[^.)]+\.)?(?P<constraint>[^)]+)\) violated - parent key not found",
            ErrorKind::ForeignKey,
        ),
        rule(
            r"ORA-02292: integrity constraint \((?:[^.)]+\.)?(?P<constraint>[^)]+)\) violated - child record found",
            ErrorKind::ForeignKey,
        ),
        rule(
            r"Could not drop constraint\. See previous errors\.",
            ErrorKind::UnknownConstraint,
        ),
    ]
});

/// Classify a statement-level driver error.
///
/// For unique violations the offending values, when the message carries
/// them, are mapped back onto the violated key's declared field names via
/// `model.unique_keys`.
pub fn format_error(err: DriverError, model: Option<&Model>) -> DialectError {
    for rule in RULES.iter() {
        let Some(caps) = rule.pattern.captures(&err.message) else {
            continue;
        };
        let constraint = caps
            .name("constraint")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        match rule.kind {
            ErrorKind::Unique => {
                let unique_key = model.and_then(|m| m.unique_keys.get(&constraint));
                let message = unique_key
                    .and_then(|k| k.msg.clone())
                    .unwrap_or_else(|| "Validation error".to_string());

                let mut fields = BTreeMap::new();
                if let Some(values) = caps.name("values") {
                    match unique_key {
                        Some(key) => {
                            let parts = values.as_str().split(',').map(str::trim);
                            for (field, value) in key.fields.iter().zip(parts) {
                                fields.insert(field.clone(), value.to_string());
                            }
                        }
                        None => {
                            fields.insert(constraint.clone(), values.as_str().to_string());
                        }
                    }
                }
                return DialectError::UniqueConstraint {
                    constraint,
                    message,
                    fields,
                };
            }
            ErrorKind::ForeignKey => {
                return DialectError::ForeignKeyConstraint { index: constraint };
            }
            ErrorKind::UnknownConstraint => {
                return DialectError::UnknownConstraint { constraint };
            }
        }
    }
    DialectError::database(err)
}
