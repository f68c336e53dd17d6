//! SQL construction helpers for the durable cache.
//!
//! Predicates, sort keys and paging parameters arrive from the access layer
//! as structured request types and are lowered here into WHERE/ORDER BY
//! clauses with numbered parameters. Attribute names are resolved against
//! the entity schema before they reach SQL text, and LIKE operands have
//! their wildcards escaped, so no caller-controlled string is ever
//! interpolated into a query.

use crate::models::{bookkeeping, CompareOp, EntityDescription, Predicate, SortKey};
use crate::storage::sqlite::cache_row::value_to_sql;
use crate::{Error, Result};
use rusqlite::types::Value as SqlValue;

/// Escapes SQL LIKE wildcards in a string to make them literal.
///
/// `%` and `_` are LIKE wildcards and the backslash is the escape character;
/// all three must be escaped when they appear literally in an operand.
#[must_use]
pub fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            _ => result.push(c),
        }
    }
    result
}

/// Converts a glob-style pattern (`*`, `?`) to a SQL LIKE pattern.
///
/// Literal `%`, `_` and `\` in the pattern are escaped before the glob
/// wildcards are converted, so user patterns cannot smuggle extra LIKE
/// wildcards into the query.
#[must_use]
pub fn glob_to_like_pattern(pattern: &str) -> String {
    let mut result = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            '*' => result.push('%'),
            '?' => result.push('_'),
            _ => result.push(c),
        }
    }
    result
}

/// True when a name is usable as an unquoted-safe SQL identifier.
#[must_use]
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolves an attribute name to its quoted column, accepting declared
/// attributes, declared relationships and the bookkeeping fields.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for names the entity does not declare.
pub fn column_for(entity: &EntityDescription, attribute: &str) -> Result<String> {
    let known = attribute == bookkeeping::OBJECT_ID
        || attribute == bookkeeping::CREATED_AT
        || attribute == bookkeeping::UPDATED_AT
        || entity.attributes.contains_key(attribute)
        || entity.relationships.contains_key(attribute);
    if !known {
        return Err(Error::InvalidInput(format!(
            "entity '{}' declares no attribute '{attribute}'",
            entity.name
        )));
    }
    Ok(format!("\"{attribute}\""))
}

/// Builds a WHERE clause body for a predicate with numbered parameters.
///
/// Returns the clause (without the `WHERE` keyword), the parameter values in
/// order, and the next free parameter index. [`Predicate::All`] lowers to
/// `1=1` so callers can always emit `WHERE`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for undeclared attributes or operand
/// values the column cannot compare against.
pub fn build_predicate_clause(
    entity: &EntityDescription,
    predicate: &Predicate,
    start_param: usize,
) -> Result<(String, Vec<SqlValue>, usize)> {
    let mut params = Vec::new();
    let mut param_idx = start_param;
    let clause = lower_predicate(entity, predicate, &mut params, &mut param_idx)?;
    Ok((clause, params, param_idx))
}

fn lower_predicate(
    entity: &EntityDescription,
    predicate: &Predicate,
    params: &mut Vec<SqlValue>,
    param_idx: &mut usize,
) -> Result<String> {
    match predicate {
        Predicate::All => Ok("1=1".to_string()),
        Predicate::Compare {
            attribute,
            op,
            value,
        } => {
            let column = column_for(entity, attribute)?;
            if *op == CompareOp::Like {
                let Some(pattern) = value.as_text() else {
                    return Err(Error::InvalidInput(format!(
                        "LIKE on '{attribute}' requires a text operand"
                    )));
                };
                let clause = format!("{column} LIKE ?{param_idx} ESCAPE '\\'");
                params.push(SqlValue::Text(glob_to_like_pattern(pattern)));
                *param_idx += 1;
                return Ok(clause);
            }
            let operator = match op {
                CompareOp::Eq => "=",
                CompareOp::Ne => "!=",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
                CompareOp::Like => unreachable!(),
            };
            let clause = format!("{column} {operator} ?{param_idx}");
            params.push(value_to_sql(value));
            *param_idx += 1;
            Ok(clause)
        },
        Predicate::And(children) => lower_junction(entity, children, " AND ", params, param_idx),
        Predicate::Or(children) => lower_junction(entity, children, " OR ", params, param_idx),
        Predicate::Not(child) => {
            let inner = lower_predicate(entity, child, params, param_idx)?;
            Ok(format!("NOT ({inner})"))
        },
    }
}

fn lower_junction(
    entity: &EntityDescription,
    children: &[Predicate],
    joiner: &str,
    params: &mut Vec<SqlValue>,
    param_idx: &mut usize,
) -> Result<String> {
    if children.is_empty() {
        return Ok("1=1".to_string());
    }
    let parts: Vec<String> = children
        .iter()
        .map(|child| lower_predicate(entity, child, params, param_idx))
        .collect::<Result<_>>()?;
    Ok(format!("({})", parts.join(joiner)))
}

/// Builds an ORDER BY clause body from sort keys, or an empty string when
/// there are none.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for undeclared sort attributes.
pub fn build_order_clause(entity: &EntityDescription, sort: &[SortKey]) -> Result<String> {
    if sort.is_empty() {
        return Ok(String::new());
    }
    let keys: Vec<String> = sort
        .iter()
        .map(|key| {
            let column = column_for(entity, &key.attribute)?;
            let direction = if key.ascending { "ASC" } else { "DESC" };
            Ok(format!("{column} {direction}"))
        })
        .collect::<Result<_>>()?;
    Ok(format!(" ORDER BY {}", keys.join(", ")))
}

/// Builds a LIMIT/OFFSET clause. `SQLite` requires a LIMIT before OFFSET, so
/// an unbounded request with an offset uses `LIMIT -1`.
#[must_use]
pub fn build_paging_clause(offset: usize, limit: Option<usize>) -> String {
    match (limit, offset) {
        (None, 0) => String::new(),
        (None, offset) => format!(" LIMIT -1 OFFSET {offset}"),
        (Some(limit), 0) => format!(" LIMIT {limit}"),
        (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeKind, AttributeValue};

    fn band_entity() -> EntityDescription {
        EntityDescription::new("Band")
            .with_attribute("name", AttributeKind::Text)
            .with_attribute("formed", AttributeKind::Integer)
            .with_relationship("label", "Label", false)
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like_wildcards("normal"), "normal");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("user_name"), "user\\_name");
        assert_eq!(escape_like_wildcards("path\\file"), "path\\\\file");
    }

    #[test]
    fn test_glob_to_like_pattern() {
        assert_eq!(glob_to_like_pattern("Pru*"), "Pru%");
        assert_eq!(glob_to_like_pattern("test?.txt"), "test_.txt");
        assert_eq!(glob_to_like_pattern("100%*"), "100\\%%");
    }

    #[test]
    fn test_is_safe_identifier() {
        assert!(is_safe_identifier("Band"));
        assert!(is_safe_identifier("created_at"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("1band"));
        assert!(!is_safe_identifier("na me"));
        assert!(!is_safe_identifier("a\"b"));
    }

    #[test]
    fn test_build_predicate_all() {
        let (clause, params, next) =
            build_predicate_clause(&band_entity(), &Predicate::All, 1).unwrap();
        assert_eq!(clause, "1=1");
        assert!(params.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn test_build_predicate_compare() {
        let predicate = Predicate::eq("name", AttributeValue::Text("Pixies".into()));
        let (clause, params, next) = build_predicate_clause(&band_entity(), &predicate, 1).unwrap();
        assert_eq!(clause, "\"name\" = ?1");
        assert_eq!(params.len(), 1);
        assert_eq!(next, 2);
    }

    #[test]
    fn test_build_predicate_nested() {
        let predicate = Predicate::And(vec![
            Predicate::eq("name", AttributeValue::Text("Pixies".into())),
            Predicate::Not(Box::new(Predicate::Compare {
                attribute: "formed".to_string(),
                op: CompareOp::Lt,
                value: AttributeValue::Integer(1980),
            })),
        ]);
        let (clause, params, next) = build_predicate_clause(&band_entity(), &predicate, 1).unwrap();
        assert_eq!(clause, "(\"name\" = ?1 AND NOT (\"formed\" < ?2))");
        assert_eq!(params.len(), 2);
        assert_eq!(next, 3);
    }

    #[test]
    fn test_build_predicate_like_converts_glob() {
        let predicate = Predicate::Compare {
            attribute: "name".to_string(),
            op: CompareOp::Like,
            value: AttributeValue::Text("Pix*".into()),
        };
        let (clause, params, _) = build_predicate_clause(&band_entity(), &predicate, 1).unwrap();
        assert_eq!(clause, "\"name\" LIKE ?1 ESCAPE '\\'");
        assert_eq!(params[0], rusqlite::types::Value::Text("Pix%".into()));
    }

    #[test]
    fn test_build_predicate_rejects_unknown_attribute() {
        let predicate = Predicate::eq("genre", AttributeValue::Text("rock".into()));
        assert!(build_predicate_clause(&band_entity(), &predicate, 1).is_err());
    }

    #[test]
    fn test_build_predicate_accepts_bookkeeping_and_relationship() {
        let predicate = Predicate::And(vec![
            Predicate::eq("objectId", AttributeValue::Text("xK91aa".into())),
            Predicate::eq(
                "label",
                AttributeValue::Reference {
                    class_name: "Label".to_string(),
                    server_id: "L1".to_string(),
                },
            ),
        ]);
        let (clause, _, _) = build_predicate_clause(&band_entity(), &predicate, 1).unwrap();
        assert!(clause.contains("\"objectId\" = ?1"));
        assert!(clause.contains("\"label\" = ?2"));
    }

    #[test]
    fn test_build_order_clause() {
        let entity = band_entity();
        assert_eq!(build_order_clause(&entity, &[]).unwrap(), "");

        let clause = build_order_clause(
            &entity,
            &[SortKey::ascending("name"), SortKey::descending("formed")],
        )
        .unwrap();
        assert_eq!(clause, " ORDER BY \"name\" ASC, \"formed\" DESC");
    }

    #[test]
    fn test_build_paging_clause() {
        assert_eq!(build_paging_clause(0, None), "");
        assert_eq!(build_paging_clause(0, Some(20)), " LIMIT 20");
        assert_eq!(build_paging_clause(40, Some(20)), " LIMIT 20 OFFSET 40");
        assert_eq!(build_paging_clause(40, None), " LIMIT -1 OFFSET 40");
    }
}
