//! Query envelope: pagination, ordering and projection parameters
//!
//! Resources never accept end-user predicates. The only knobs a caller has
//! are `offset`, `limit`, `order_by` and `projection`.

use crate::core::error::{DocrestError, RequestError};
use crate::core::projection::{Projection, ProjectionError};
use crate::core::schema::grammar::ORDER_FIELD;
use crate::core::store::SortKey;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

static ORDER_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^(?:{})$", ORDER_FIELD)).expect("order field pattern is valid")
});

/// Raw query parameters
///
/// Values are kept as strings so malformed numbers surface as a
/// `query:invalid` error rather than a bare extractor rejection.
///
/// # Example
/// ```text
/// GET /items?offset=20&limit=10
/// GET /items?order_by=-created,name
/// GET /items?projection=name,price
/// GET /items?projection=-secret,internal
/// GET /items?projection={"secret":false}
/// GET /items/0123456789abcdef01234567?projection=*
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QueryParams {
    pub offset: Option<String>,
    pub limit: Option<String>,
    /// Comma separated field names, `-` prefix for descending
    pub order_by: Option<String>,
    /// JSON list or map, a comma list, `-a,b` to exclude, or `*` for none
    pub projection: Option<String>,
}

/// Resolved pagination for a list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub order_by: Vec<SortKey>,
    pub offset: u64,
    pub limit: u64,
}

fn invalid(parameter: &str, message: impl Into<String>) -> RequestError {
    RequestError::InvalidQuery {
        parameter: parameter.to_string(),
        message: message.into(),
    }
}

fn integer(parameter: &str, raw: &Option<String>) -> Result<Option<i64>, RequestError> {
    raw.as_deref()
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| invalid(parameter, format!("expected an integer, got {:?}", s)))
        })
        .transpose()
}

/// Parse a comma separated `order_by` value
pub fn parse_order_by(raw: &str) -> Result<Vec<SortKey>, RequestError> {
    raw.split(',')
        .map(str::trim)
        .map(|field| {
            if field.is_empty() {
                return Err(invalid("order_by", "empty field name"));
            }
            if !ORDER_FIELD_RE.is_match(field) {
                return Err(invalid("order_by", format!("invalid field name {:?}", field)));
            }
            SortKey::parse(field).ok_or_else(|| invalid("order_by", format!("invalid field name {:?}", field)))
        })
        .collect()
}

/// Parse a `projection` value
///
/// `Ok(None)` means "explicitly unprojected".
pub fn parse_projection(raw: &str) -> Result<Option<Projection>, ProjectionError> {
    let raw = raw.trim();
    if raw == "*" {
        return Ok(None);
    }
    if raw.starts_with('[') || raw.starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ProjectionError::Invalid(e.to_string()))?;
        let projection = Projection::from_value(&value)?;
        if let Some(projection) = &projection {
            check_names(projection.fields().iter().map(String::as_str))?;
        }
        return Ok(projection);
    }

    let (exclude, list) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let fields: Vec<&str> = list.split(',').map(str::trim).collect();
    check_names(fields.iter().copied())?;

    Ok(if exclude {
        Projection::exclude(fields)
    } else {
        Projection::include(fields)
    })
}

fn check_names<'a>(mut fields: impl Iterator<Item = &'a str>) -> Result<(), ProjectionError> {
    match fields.find(|f| f.is_empty() || f.starts_with('$')) {
        Some(bad) => Err(ProjectionError::Invalid(format!("invalid field name {:?}", bad))),
        None => Ok(()),
    }
}

impl From<&HashMap<String, String>> for QueryParams {
    fn from(raw: &HashMap<String, String>) -> Self {
        Self {
            offset: raw.get("offset").cloned(),
            limit: raw.get("limit").cloned(),
            order_by: raw.get("order_by").cloned(),
            projection: raw.get("projection").cloned(),
        }
    }
}

impl QueryParams {
    /// Resolve the pagination envelope
    ///
    /// `offset` below zero becomes zero; `limit` is clamped to
    /// `1..=max_results` and defaults to `max_results`.
    pub fn cursor(&self, max_results: u64, default_order: &[SortKey]) -> Result<Cursor, RequestError> {
        let max_results = max_results.max(1);
        let offset = integer("offset", &self.offset)?.map_or(0, |o| o.max(0) as u64);
        let limit = integer("limit", &self.limit)?
            .map_or(max_results, |l| (l.max(1) as u64).min(max_results));
        let order_by = match &self.order_by {
            Some(raw) => parse_order_by(raw)?,
            None => default_order.to_vec(),
        };
        Ok(Cursor {
            order_by,
            offset,
            limit,
        })
    }

    /// The projection to use: the caller's when given, otherwise `default`
    pub fn projection(&self, default: Option<&Projection>) -> Result<Option<Projection>, DocrestError> {
        match &self.projection {
            Some(raw) => Ok(parse_projection(raw)?),
            None => Ok(default.cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::SortDirection;

    fn params(offset: Option<&str>, limit: Option<&str>) -> QueryParams {
        QueryParams {
            offset: offset.map(String::from),
            limit: limit.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_cursor_defaults_and_clamping() {
        let cursor = params(None, None).cursor(20, &[]).unwrap();
        assert_eq!((cursor.offset, cursor.limit), (0, 20));

        let cursor = params(Some("20"), Some("10")).cursor(20, &[]).unwrap();
        assert_eq!((cursor.offset, cursor.limit), (20, 10));

        let cursor = params(Some("-5"), Some("500")).cursor(20, &[]).unwrap();
        assert_eq!((cursor.offset, cursor.limit), (0, 20));

        let cursor = params(None, Some("0")).cursor(20, &[]).unwrap();
        assert_eq!(cursor.limit, 1);
    }

    #[test]
    fn test_cursor_rejects_non_integers() {
        assert!(matches!(
            params(Some("ten"), None).cursor(20, &[]),
            Err(RequestError::InvalidQuery { ref parameter, .. }) if parameter == "offset"
        ));
        assert!(params(None, Some("1.5")).cursor(20, &[]).is_err());
    }

    #[test]
    fn test_order_by() {
        let keys = parse_order_by("-created, name").unwrap();
        assert_eq!(keys[0].direction, SortDirection::Descending);
        assert_eq!(keys[1].field, "name");
        assert!(parse_order_by("a,,b").is_err());
        assert!(parse_order_by("$where").is_err());

        let default = vec![SortKey::parse("-n").unwrap()];
        let cursor = QueryParams::default().cursor(20, &default).unwrap();
        assert_eq!(cursor.order_by, default);
    }

    #[test]
    fn test_projection_forms() {
        assert_eq!(parse_projection("*").unwrap(), None);
        assert_eq!(parse_projection("a,b").unwrap(), Projection::include(["a", "b"]));
        assert_eq!(parse_projection("-a,b").unwrap(), Projection::exclude(["a", "b"]));
        assert_eq!(parse_projection(r#"["a"]"#).unwrap(), Projection::include(["a"]));
        assert_eq!(
            parse_projection(r#"{"a": false}"#).unwrap(),
            Projection::exclude(["a"])
        );
        assert_eq!(
            parse_projection(r#"{"a": true, "b": false}"#),
            Err(ProjectionError::Conflict)
        );
        assert!(matches!(parse_projection("a,,b"), Err(ProjectionError::Invalid(_))));
        assert!(matches!(parse_projection("{not json"), Err(ProjectionError::Invalid(_))));
        assert!(matches!(parse_projection("$where"), Err(ProjectionError::Invalid(_))));
    }

    #[test]
    fn test_projection_default_applies_when_absent() {
        let default = Projection::include(["name"]);
        let params = QueryParams::default();
        assert_eq!(params.projection(default.as_ref()).unwrap(), default);

        let explicit = QueryParams {
            projection: Some("*".to_string()),
            ..Default::default()
        };
        assert_eq!(explicit.projection(default.as_ref()).unwrap(), None);
    }
}
