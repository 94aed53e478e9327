//! PII kinds and pseudonym mappings
//!
//! The closed set of recognized sensitive-field kinds, the per-request
//! mapping that makes pseudonymization reversible, and the summary shape
//! returned to callers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Kinds of sensitive fields the detector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Name,
    Email,
    Phone,
    Ssn,
    Passport,
    DriverLicense,
    NationalId,
    StreetAddress,
    PostalCode,
    Ip,
    CreditCard,
    BankAccount,
    Routing,
    Iban,
    Swift,
    Username,
    MedicalRecordNo,
    Vin,
    Gps,
    Biometric,
    CustomerId,
    EmployeeId,
}

impl PiiKind {
    /// All kinds, in declaration order.
    pub fn all() -> &'static [PiiKind] {
        &[
            PiiKind::Name,
            PiiKind::Email,
            PiiKind::Phone,
            PiiKind::Ssn,
            PiiKind::Passport,
            PiiKind::DriverLicense,
            PiiKind::NationalId,
            PiiKind::StreetAddress,
            PiiKind::PostalCode,
            PiiKind::Ip,
            PiiKind::CreditCard,
            PiiKind::BankAccount,
            PiiKind::Routing,
            PiiKind::Iban,
            PiiKind::Swift,
            PiiKind::Username,
            PiiKind::MedicalRecordNo,
            PiiKind::Vin,
            PiiKind::Gps,
            PiiKind::Biometric,
            PiiKind::CustomerId,
            PiiKind::EmployeeId,
        ]
    }

    /// Stable wire name (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Name => "name",
            PiiKind::Email => "email",
            PiiKind::Phone => "phone",
            PiiKind::Ssn => "ssn",
            PiiKind::Passport => "passport",
            PiiKind::DriverLicense => "driver_license",
            PiiKind::NationalId => "national_id",
            PiiKind::StreetAddress => "street_address",
            PiiKind::PostalCode => "postal_code",
            PiiKind::Ip => "ip",
            PiiKind::CreditCard => "credit_card",
            PiiKind::BankAccount => "bank_account",
            PiiKind::Routing => "routing",
            PiiKind::Iban => "iban",
            PiiKind::Swift => "swift",
            PiiKind::Username => "username",
            PiiKind::MedicalRecordNo => "medical_record_no",
            PiiKind::Vin => "vin",
            PiiKind::Gps => "gps",
            PiiKind::Biometric => "biometric",
            PiiKind::CustomerId => "customer_id",
            PiiKind::EmployeeId => "employee_id",
        }
    }

    /// Token prefix for this kind. Callers rely on the prefix to recognize
    /// token classes, so it never changes.
    pub fn token_prefix(&self) -> &'static str {
        match self {
            PiiKind::Name => "USER",
            PiiKind::Email => "EMAIL",
            PiiKind::Phone => "PHONE",
            PiiKind::Ssn => "SSN",
            PiiKind::Passport => "PASSPORT",
            PiiKind::DriverLicense => "DLIC",
            PiiKind::NationalId => "NATID",
            PiiKind::StreetAddress => "ADDR",
            PiiKind::PostalCode => "POSTAL",
            PiiKind::Ip => "IP",
            PiiKind::CreditCard => "CARD",
            PiiKind::BankAccount => "ACCT",
            PiiKind::Routing => "ROUTING",
            PiiKind::Iban => "IBAN",
            PiiKind::Swift => "SWIFT",
            PiiKind::Username => "UNAME",
            PiiKind::MedicalRecordNo => "MRN",
            PiiKind::Vin => "VIN",
            PiiKind::Gps => "GPS",
            PiiKind::Biometric => "BIO",
            PiiKind::CustomerId => "CUST",
            PiiKind::EmployeeId => "EMP",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque 128-bit pseudonym identifier, created once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PseudonymId(pub Uuid);

impl PseudonymId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PseudonymId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for PseudonymId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One reversible field substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTransform {
    /// Json-path of the transformed field (`a.b[2].c`).
    pub path: String,
    pub kind: PiiKind,
    /// Original cleartext value, rendered as a string. Never leaves the
    /// token store.
    pub original: String,
    /// Token substituted on the outbound side.
    pub token: String,
    /// True when the original leaf was a JSON number (reversal restores
    /// the numeric type).
    #[serde(default)]
    pub numeric: bool,
}

/// The sole reversal source for a pseudonymized request.
///
/// Invariants: for every path transformed on the outbound side an inverse
/// entry exists in `field_transforms`, and `redacted_record` is the exact
/// document handed to the caller, so reversal needs nothing but this
/// mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PseudonymMapping {
    pub pseudonym_id: PseudonymId,
    pub field_transforms: Vec<FieldTransform>,
    /// Snapshot of the redacted document.
    pub redacted_record: crate::record::Record,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    /// False when the token store was unreachable and the mapping only
    /// lives in process memory.
    pub durable: bool,
}

impl PseudonymMapping {
    pub fn new(
        field_transforms: Vec<FieldTransform>,
        redacted_record: crate::record::Record,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            pseudonym_id: PseudonymId::generate(),
            field_transforms,
            redacted_record,
            created_at: Utc::now(),
            ttl_seconds,
            durable: true,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.ttl_seconds)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Per-field summary entry exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiFieldInfo {
    pub path: String,
    pub kind: PiiKind,
    /// Truncated token, enough to recognize the class without echoing the
    /// full substitution.
    pub token_preview: String,
}

/// Summary of what pseudonymization touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiiSummary {
    pub counts_by_kind: BTreeMap<String, usize>,
    pub fields: Vec<PiiFieldInfo>,
    pub durable: bool,
}

impl PiiSummary {
    pub fn from_transforms(transforms: &[FieldTransform], durable: bool) -> Self {
        let mut counts_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let mut fields = Vec::with_capacity(transforms.len());

        for t in transforms {
            *counts_by_kind.entry(t.kind.as_str().to_string()).or_insert(0) += 1;
            let preview: String = t.token.chars().take(16).collect();
            fields.push(PiiFieldInfo {
                path: t.path.clone(),
                kind: t.kind,
                token_preview: preview,
            });
        }

        Self {
            counts_by_kind,
            fields,
            durable,
        }
    }

    pub fn total(&self) -> usize {
        self.counts_by_kind.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names_are_unique() {
        let mut names: Vec<_> = PiiKind::all().iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PiiKind::all().len());
    }

    #[test]
    fn test_prefixes_are_unique() {
        let mut prefixes: Vec<_> = PiiKind::all().iter().map(|k| k.token_prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), PiiKind::all().len());
    }

    #[test]
    fn test_mapping_expiry() {
        let record = crate::record::Record::new(serde_json::json!({}));
        let mapping = PseudonymMapping::new(vec![], record, 3600);
        assert!(!mapping.is_expired(Utc::now()));
        assert!(mapping.is_expired(Utc::now() + Duration::seconds(3601)));
    }

    #[test]
    fn test_summary_counts() {
        let transforms = vec![
            FieldTransform {
                path: "name".into(),
                kind: PiiKind::Name,
                original: "Jane".into(),
                token: "USER_abcd".into(),
                numeric: false,
            },
            FieldTransform {
                path: "contacts[0].email".into(),
                kind: PiiKind::Email,
                original: "j@x.com".into(),
                token: "EMAIL_ffff@anon.biz".into(),
                numeric: false,
            },
            FieldTransform {
                path: "alt_name".into(),
                kind: PiiKind::Name,
                original: "J. Doe".into(),
                token: "USER_eeee".into(),
                numeric: false,
            },
        ];
        let summary = PiiSummary::from_transforms(&transforms, true);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.counts_by_kind.get("name"), Some(&2));
        assert_eq!(summary.fields.len(), 3);
        assert!(summary.fields[0].token_preview.len() <= 16);
    }
}
