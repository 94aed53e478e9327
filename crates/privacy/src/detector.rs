//! Two-channel PII detection
//!
//! Channel one matches field names against a fixed lexicon per kind.
//! Channel two runs per-kind content regexes over string leaves. A field is
//! flagged when either channel reaches the configured confidence.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use finsight_core::record::{join_path, PathSegment};
use finsight_core::{PiiKind, Record};

/// Which channel produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionChannel {
    FieldName,
    Content,
}

/// One flagged leaf.
#[derive(Debug, Clone)]
pub struct PiiMatch {
    pub path: Vec<PathSegment>,
    pub kind: PiiKind,
    pub confidence: f64,
    pub channel: DetectionChannel,
    /// Leaf value rendered as a string (numbers are stringified so they
    /// can be tokenized).
    pub value: String,
    /// True when the leaf was a JSON number.
    pub numeric: bool,
}

impl PiiMatch {
    pub fn path_string(&self) -> String {
        join_path(&self.path)
    }
}

const EXACT_NAME_CONFIDENCE: f64 = 0.95;
const PARTIAL_NAME_CONFIDENCE: f64 = 0.70;
const CONTENT_CONFIDENCE: f64 = 0.80;

/// Field-name lexicon. Names are compared after lowercasing and stripping
/// separator characters.
static FIELD_LEXICON: &[(&str, PiiKind)] = &[
    ("name", PiiKind::Name),
    ("fullname", PiiKind::Name),
    ("firstname", PiiKind::Name),
    ("lastname", PiiKind::Name),
    ("customername", PiiKind::Name),
    ("accountholder", PiiKind::Name),
    ("contactname", PiiKind::Name),
    ("email", PiiKind::Email),
    ("emailaddress", PiiKind::Email),
    ("contactemail", PiiKind::Email),
    ("phone", PiiKind::Phone),
    ("phonenumber", PiiKind::Phone),
    ("mobile", PiiKind::Phone),
    ("telephone", PiiKind::Phone),
    ("contactphone", PiiKind::Phone),
    ("ssn", PiiKind::Ssn),
    ("socialsecuritynumber", PiiKind::Ssn),
    ("passport", PiiKind::Passport),
    ("passportnumber", PiiKind::Passport),
    ("driverlicense", PiiKind::DriverLicense),
    ("driverslicense", PiiKind::DriverLicense),
    ("drivinglicense", PiiKind::DriverLicense),
    ("dlnumber", PiiKind::DriverLicense),
    ("nationalid", PiiKind::NationalId),
    ("taxid", PiiKind::NationalId),
    ("aadhaar", PiiKind::NationalId),
    ("address", PiiKind::StreetAddress),
    ("streetaddress", PiiKind::StreetAddress),
    ("addressline1", PiiKind::StreetAddress),
    ("homeaddress", PiiKind::StreetAddress),
    ("billingaddress", PiiKind::StreetAddress),
    ("mailingaddress", PiiKind::StreetAddress),
    ("postalcode", PiiKind::PostalCode),
    ("zip", PiiKind::PostalCode),
    ("zipcode", PiiKind::PostalCode),
    ("pincode", PiiKind::PostalCode),
    ("ip", PiiKind::Ip),
    ("ipaddress", PiiKind::Ip),
    ("clientip", PiiKind::Ip),
    ("sourceip", PiiKind::Ip),
    ("creditcard", PiiKind::CreditCard),
    ("cardnumber", PiiKind::CreditCard),
    ("ccnumber", PiiKind::CreditCard),
    ("bankaccount", PiiKind::BankAccount),
    ("accountnumber", PiiKind::BankAccount),
    ("accountno", PiiKind::BankAccount),
    ("acctnumber", PiiKind::BankAccount),
    ("routing", PiiKind::Routing),
    ("routingnumber", PiiKind::Routing),
    ("abanumber", PiiKind::Routing),
    ("iban", PiiKind::Iban),
    ("swift", PiiKind::Swift),
    ("swiftcode", PiiKind::Swift),
    ("bic", PiiKind::Swift),
    ("username", PiiKind::Username),
    ("login", PiiKind::Username),
    ("handle", PiiKind::Username),
    ("medicalrecordno", PiiKind::MedicalRecordNo),
    ("medicalrecordnumber", PiiKind::MedicalRecordNo),
    ("mrn", PiiKind::MedicalRecordNo),
    ("vin", PiiKind::Vin),
    ("vehicleidentificationnumber", PiiKind::Vin),
    ("gps", PiiKind::Gps),
    ("coordinates", PiiKind::Gps),
    ("latlong", PiiKind::Gps),
    ("biometric", PiiKind::Biometric),
    ("fingerprint", PiiKind::Biometric),
    ("biometrichash", PiiKind::Biometric),
    ("customerid", PiiKind::CustomerId),
    ("custid", PiiKind::CustomerId),
    ("clientid", PiiKind::CustomerId),
    ("employeeid", PiiKind::EmployeeId),
    ("empid", PiiKind::EmployeeId),
    ("staffid", PiiKind::EmployeeId),
];

/// Partial field-name stems checked when no exact match fires. Narrower set
/// to keep false positives down.
static FIELD_STEMS: &[(&str, PiiKind)] = &[
    ("email", PiiKind::Email),
    ("phone", PiiKind::Phone),
    ("address", PiiKind::StreetAddress),
    ("iban", PiiKind::Iban),
    ("passport", PiiKind::Passport),
];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

static IP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:25[0-5]|2[0-4]\d|1?\d?\d)(?:\.(?:25[0-5]|2[0-4]\d|1?\d?\d)){3}$").unwrap()
});

static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap());

static CREDIT_CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}$").unwrap());

static IBAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}\d{2}[A-Z0-9]{11,30}$").unwrap());

static SWIFT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?$").unwrap());

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?\d{1,3}[-. ]?(?:\(\d{2,4}\)[-. ]?)?\d{3,4}[-. ]?\d{4}$").unwrap()
});

static GPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,3}\.\d{3,},\s*-?\d{1,3}\.\d{3,}$").unwrap());

static VIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-HJ-NPR-Z0-9]{17}$").unwrap());

static ROUTING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}$").unwrap());

static ACCOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10,18}$").unwrap());

/// Content regexes in priority order: the most specific shapes first so a
/// nine-digit routing number is not swallowed by the account pattern.
static CONTENT_PATTERNS: Lazy<Vec<(PiiKind, &'static Regex)>> = Lazy::new(|| {
    vec![
        (PiiKind::Email, &*EMAIL_RE),
        (PiiKind::Ip, &*IP_RE),
        (PiiKind::Ssn, &*SSN_RE),
        (PiiKind::Iban, &*IBAN_RE),
        (PiiKind::Swift, &*SWIFT_RE),
        (PiiKind::CreditCard, &*CREDIT_CARD_RE),
        (PiiKind::Gps, &*GPS_RE),
        (PiiKind::Vin, &*VIN_RE),
        (PiiKind::Routing, &*ROUTING_RE),
        (PiiKind::BankAccount, &*ACCOUNT_RE),
        (PiiKind::Phone, &*PHONE_RE),
    ]
});

fn normalize_field(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Detector over record trees.
#[derive(Debug, Clone)]
pub struct PiiDetector {
    /// Minimum confidence before a match is reported.
    pub confidence_threshold: f64,
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
        }
    }
}

impl PiiDetector {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Scan a record, returning every flagged leaf in traversal order.
    pub fn detect(&self, record: &Record) -> Vec<PiiMatch> {
        let mut matches = Vec::new();
        let mut path = Vec::new();
        self.scan(record.as_value(), &mut path, &mut matches);
        matches
    }

    fn scan(&self, value: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<PiiMatch>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    path.push(PathSegment::Key(key.clone()));
                    match child {
                        Value::Object(_) | Value::Array(_) => self.scan(child, path, out),
                        _ => {
                            if let Some(m) = self.classify_leaf(key, child, path) {
                                if m.confidence >= self.confidence_threshold {
                                    out.push(m);
                                }
                            }
                        },
                    }
                    path.pop();
                }
            },
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    match child {
                        Value::Object(_) | Value::Array(_) => self.scan(child, path, out),
                        Value::String(s) => {
                            if let Some((kind, confidence)) = content_match(s) {
                                if confidence >= self.confidence_threshold {
                                    out.push(PiiMatch {
                                        path: path.clone(),
                                        kind,
                                        confidence,
                                        channel: DetectionChannel::Content,
                                        value: s.clone(),
                                        numeric: false,
                                    });
                                }
                            }
                        },
                        _ => {},
                    }
                    path.pop();
                }
            },
            _ => {},
        }
    }

    /// Classify a named scalar leaf. The field-name channel wins when both
    /// fire; it carries the caller's intent.
    fn classify_leaf(&self, key: &str, value: &Value, path: &[PathSegment]) -> Option<PiiMatch> {
        let (rendered, numeric) = render_scalar(value)?;

        if let Some((kind, confidence)) = field_name_match(key) {
            return Some(PiiMatch {
                path: path.to_vec(),
                kind,
                confidence,
                channel: DetectionChannel::FieldName,
                value: rendered,
                numeric,
            });
        }

        if let Value::String(s) = value {
            if let Some((kind, confidence)) = content_match(s) {
                return Some(PiiMatch {
                    path: path.to_vec(),
                    kind,
                    confidence,
                    channel: DetectionChannel::Content,
                    value: s.clone(),
                    numeric: false,
                });
            }
        }

        None
    }
}

fn render_scalar(value: &Value) -> Option<(String, bool)> {
    match value {
        Value::String(s) => Some((s.clone(), false)),
        Value::Number(n) => Some((n.to_string(), true)),
        _ => None,
    }
}

fn field_name_match(key: &str) -> Option<(PiiKind, f64)> {
    let normalized = normalize_field(key);
    if normalized.is_empty() {
        return None;
    }

    for (name, kind) in FIELD_LEXICON {
        if normalized == *name {
            return Some((*kind, EXACT_NAME_CONFIDENCE));
        }
    }

    for (stem, kind) in FIELD_STEMS {
        if normalized.contains(stem) {
            return Some((*kind, PARTIAL_NAME_CONFIDENCE));
        }
    }

    None
}

fn content_match(value: &str) -> Option<(PiiKind, f64)> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 256 {
        return None;
    }
    for (kind, regex) in CONTENT_PATTERNS.iter() {
        if regex.is_match(trimmed) {
            return Some((*kind, CONTENT_CONFIDENCE));
        }
    }
    None
}
