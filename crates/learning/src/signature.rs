//! Canonical input signatures
//!
//! A record's signature string is built deterministically: stable key
//! ordering, numeric magnitude buckets, dates truncated to the ISO day,
//! bounded length. Identical canonical signatures must embed to
//! byte-identical vectors, so everything here is pure.

use serde_json::Value;

use finsight_core::Record;

/// Hard cap on signature length. Long records contribute their structural
/// prefix; the tail is dropped deterministically.
const MAX_SIGNATURE_LEN: usize = 2048;

/// Per-string cap inside the signature.
const MAX_STRING_LEN: usize = 48;

/// Canonicalize a record into its signature string.
pub fn canonical_signature(record: &Record) -> String {
    let mut out = String::new();
    write_value(record.as_value(), &mut out);
    if out.len() > MAX_SIGNATURE_LEN {
        out.truncate(MAX_SIGNATURE_LEN);
    }
    out
}

fn write_value(value: &Value, out: &mut String) {
    if out.len() >= MAX_SIGNATURE_LEN {
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&bucket_number(n.as_f64().unwrap_or(0.0))),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        },
        Value::Object(map) => {
            // serde_json maps preserve insertion order; sort keys so two
            // records differing only in field order share a signature.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push('=');
                write_value(&map[*key], out);
            }
            out.push('}');
        },
    }
}

/// Bucket a number by sign and decimal magnitude: `num:+3` covers
/// [1000, 10000). Keeps signatures stable across small value jitter.
fn bucket_number(n: f64) -> String {
    if n == 0.0 || !n.is_finite() {
        return "num:0".to_string();
    }
    let sign = if n < 0.0 { '-' } else { '+' };
    let magnitude = n.abs().log10().floor() as i32;
    format!("num:{}{}", sign, magnitude)
}

fn write_string(s: &str, out: &mut String) {
    if let Some(date) = truncate_iso_date(s) {
        out.push_str("date:");
        out.push_str(date);
        return;
    }
    let trimmed: String = s.chars().take(MAX_STRING_LEN).collect();
    out.push_str(&trimmed);
}

/// If the string opens with an ISO date or datetime, keep only the day.
fn truncate_iso_date(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    let date = &bytes[..10];
    let is_date = date[0..4].iter().all(u8::is_ascii_digit)
        && date[4] == b'-'
        && date[5..7].iter().all(u8::is_ascii_digit)
        && date[7] == b'-'
        && date[8..10].iter().all(u8::is_ascii_digit);
    if !is_date {
        return None;
    }
    // Bare date or a datetime continuation
    if bytes.len() == 10 || bytes[10] == b'T' || bytes[10] == b' ' {
        Some(&s[..10])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_is_stable() {
        let a = Record::new(json!({"b": 1, "a": 2}));
        let b = Record::new(json!({"a": 2, "b": 1}));
        assert_eq!(canonical_signature(&a), canonical_signature(&b));
    }

    #[test]
    fn test_identical_records_identical_signatures() {
        let r = Record::new(json!({
            "customer": "CUST_abcd",
            "transactions": [{"amount": 5000, "type": "credit"}],
        }));
        assert_eq!(canonical_signature(&r), canonical_signature(&r.clone()));
    }

    #[test]
    fn test_numeric_buckets() {
        assert_eq!(bucket_number(5000.0), "num:+3");
        assert_eq!(bucket_number(9999.0), "num:+3");
        assert_eq!(bucket_number(10000.0), "num:+4");
        assert_eq!(bucket_number(-250.0), "num:-2");
        assert_eq!(bucket_number(0.0), "num:0");
        assert_eq!(bucket_number(0.05), "num:+-2");
    }

    #[test]
    fn test_amounts_in_same_bucket_share_signature() {
        let a = Record::new(json!({"amount": 5000}));
        let b = Record::new(json!({"amount": 7200}));
        assert_eq!(canonical_signature(&a), canonical_signature(&b));

        let c = Record::new(json!({"amount": 52_000}));
        assert_ne!(canonical_signature(&a), canonical_signature(&c));
    }

    #[test]
    fn test_datetime_truncated_to_day() {
        let a = Record::new(json!({"posted": "2026-03-14T09:30:00Z"}));
        let b = Record::new(json!({"posted": "2026-03-14T17:45:12Z"}));
        let c = Record::new(json!({"posted": "2026-03-15T09:30:00Z"}));
        assert_eq!(canonical_signature(&a), canonical_signature(&b));
        assert_ne!(canonical_signature(&a), canonical_signature(&c));
    }

    #[test]
    fn test_non_date_strings_kept() {
        let r = Record::new(json!({"type": "credit"}));
        assert!(canonical_signature(&r).contains("credit"));
    }

    #[test]
    fn test_bounded_length() {
        let big: Vec<Value> = (0..2000).map(|i| json!({"k": i})).collect();
        let r = Record::new(Value::Array(big));
        assert!(canonical_signature(&r).len() <= MAX_SIGNATURE_LEN);
    }
}
