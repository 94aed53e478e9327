//! Record documents
//!
//! Caller-supplied tree-shaped documents with json-path addressing.
//! Identity is by content, not pointer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One step in a json-path: a map key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Render a path as `a.b[2].c`.
pub fn join_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            PathSegment::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            },
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            },
        }
    }
    out
}

/// Parse a path rendered by [`join_path`] back into segments.
///
/// Returns `None` on malformed input (unbalanced brackets, non-numeric index).
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        // Leading key portion before any bracket
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                let idx: usize = stripped[..close].parse().ok()?;
                segments.push(PathSegment::Index(idx));
                rest = &stripped[close + 1..];
            }
            if !rest.is_empty() {
                return None;
            }
        } else if !rest.is_empty() {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    Some(segments)
}

/// A tree-shaped document submitted for analysis.
///
/// Thin wrapper over `serde_json::Value` so the wire payload stays
/// unstructured while paths and traversal live in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Value);

impl Record {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Read the value at a parsed path.
    pub fn get_path(&self, segments: &[PathSegment]) -> Option<&Value> {
        let mut current = &self.0;
        for seg in segments {
            current = match seg {
                PathSegment::Key(k) => current.as_object()?.get(k)?,
                PathSegment::Index(i) => current.as_array()?.get(*i)?,
            };
        }
        Some(current)
    }

    /// Replace the value at a parsed path. Returns false if the path does
    /// not resolve; the record is unchanged in that case.
    pub fn set_path(&mut self, segments: &[PathSegment], value: Value) -> bool {
        let mut current = &mut self.0;
        for seg in segments {
            current = match seg {
                PathSegment::Key(k) => match current.as_object_mut().and_then(|m| m.get_mut(k)) {
                    Some(v) => v,
                    None => return false,
                },
                PathSegment::Index(i) => {
                    match current.as_array_mut().and_then(|a| a.get_mut(*i)) {
                        Some(v) => v,
                        None => return false,
                    }
                },
            };
        }
        *current = value;
        true
    }

    /// Visit every string leaf with its path, descending into maps and
    /// arrays. Scalars that are not strings are passed over.
    pub fn walk_strings<F>(&self, visitor: &mut F)
    where
        F: FnMut(&[PathSegment], &str),
    {
        let mut path = Vec::new();
        walk(&self.0, &mut path, visitor);
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn walk<F>(value: &Value, path: &mut Vec<PathSegment>, visitor: &mut F)
where
    F: FnMut(&[PathSegment], &str),
{
    match value {
        Value::String(s) => visitor(path, s),
        Value::Object(map) => {
            for (k, v) in map {
                path.push(PathSegment::Key(k.clone()));
                walk(v, path, visitor);
                path.pop();
            }
        },
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                walk(v, path, visitor);
                path.pop();
            }
        },
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        Record::new(json!({
            "customer_id": "C001",
            "name": "Tech Solutions Inc",
            "transactions": [
                {"amount": 5000, "type": "credit"},
                {"amount": 120, "type": "debit"},
            ],
        }))
    }

    #[test]
    fn test_path_round_trip() {
        let path = vec![
            PathSegment::Key("transactions".to_string()),
            PathSegment::Index(1),
            PathSegment::Key("type".to_string()),
        ];
        let rendered = join_path(&path);
        assert_eq!(rendered, "transactions[1].type");
        assert_eq!(parse_path(&rendered), Some(path));
    }

    #[test]
    fn test_parse_path_rejects_garbage() {
        assert!(parse_path("a[b]").is_none());
        assert!(parse_path("a[1").is_none());
    }

    #[test]
    fn test_get_and_set() {
        let mut record = sample();
        let path = parse_path("transactions[0].type").unwrap();
        assert_eq!(record.get_path(&path), Some(&json!("credit")));

        assert!(record.set_path(&path, json!("reversed")));
        assert_eq!(record.get_path(&path), Some(&json!("reversed")));

        let missing = parse_path("transactions[9].type").unwrap();
        assert!(!record.set_path(&missing, json!("x")));
    }

    #[test]
    fn test_walk_strings_visits_all_leaves() {
        let record = sample();
        let mut seen = Vec::new();
        record.walk_strings(&mut |path, s| {
            seen.push((join_path(path), s.to_string()));
        });

        assert!(seen.contains(&("customer_id".to_string(), "C001".to_string())));
        assert!(seen.contains(&("transactions[1].type".to_string(), "debit".to_string())));
        // Numbers are not string leaves
        assert!(!seen.iter().any(|(p, _)| p == "transactions[0].amount"));
    }

    #[test]
    fn test_identity_by_content() {
        assert_eq!(sample(), sample());
    }
}
