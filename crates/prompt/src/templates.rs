//! Context templates
//!
//! A fixed finite template set keyed by business context. Synthesis is
//! pure: the same context and record always produce the same prompt.

use serde::{Deserialize, Serialize};
use std::fmt;

use finsight_core::Record;

/// Placeholder re-filled with the current record at use time. Stored
/// patterns keep the placeholder so reuse parameterizes them again.
pub const RECORD_PLACEHOLDER: &str = "{{record}}";

/// Business context tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContextTag {
    Banking,
    Lending,
    Risk,
    CustomerService,
    DataAnalysis,
    #[default]
    Generic,
}

impl ContextTag {
    /// Parse a caller-supplied tag; anything unrecognized is generic.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "banking" => ContextTag::Banking,
            "lending" => ContextTag::Lending,
            "risk" => ContextTag::Risk,
            "customer-service" | "customer_service" => ContextTag::CustomerService,
            "data-analysis" | "data_analysis" => ContextTag::DataAnalysis,
            _ => ContextTag::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextTag::Banking => "banking",
            ContextTag::Lending => "lending",
            ContextTag::Risk => "risk",
            ContextTag::CustomerService => "customer-service",
            ContextTag::DataAnalysis => "data-analysis",
            ContextTag::Generic => "generic",
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            ContextTag::Banking => {
                "Focus on account activity: inflows versus outflows, balance \
                 trends, counterparty concentration, and fee exposure."
            },
            ContextTag::Lending => {
                "Focus on creditworthiness signals: repayment behavior, debt \
                 service coverage, collateral references, and delinquency \
                 indicators."
            },
            ContextTag::Risk => {
                "Focus on risk indicators: unusual transaction velocity, \
                 out-of-pattern amounts, new counterparties, and potential \
                 exposure concentrations."
            },
            ContextTag::CustomerService => {
                "Focus on the customer's situation: recent disputes, fee \
                 events, product usage, and concrete next actions a service \
                 agent can take."
            },
            ContextTag::DataAnalysis => {
                "Focus on the statistical shape of the data: distributions, \
                 trends over time, outliers, and data-quality gaps."
            },
            ContextTag::Generic => {
                "Focus on the most decision-relevant facts in the data and \
                 the actions they support."
            },
        }
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The response-format contract every template carries. The validator's
/// structural criterion checks for these sections literally.
const RESPONSE_FORMAT: &str = "Format the response as exactly two labeled sections, in this \
     order:\n\n## Insights\nWhat the data shows.\n\n## Recommendations\nWhat should be done \
     about it.\n\nBoth section headers must appear.";

/// Synthesize the template for a context. Contains the record placeholder;
/// call [`fill_template`] before sending it to a model.
pub fn synthesize_template(context: ContextTag) -> String {
    format!(
        "You are a financial records analyst. Analyze the following \
         record.\n\n{}\n\nRecord:\n{}\n\n{}",
        context.focus(),
        RECORD_PLACEHOLDER,
        RESPONSE_FORMAT
    )
}

/// Re-fill a template's parameters with the current record. Templates
/// without a placeholder get the record appended, so reused free-form
/// prompts still carry the data.
pub fn fill_template(template: &str, record: &Record) -> String {
    let record_json =
        serde_json::to_string_pretty(record.as_value()).unwrap_or_else(|_| "{}".to_string());

    if template.contains(RECORD_PLACEHOLDER) {
        template.replace(RECORD_PLACEHOLDER, &record_json)
    } else {
        format!("{}\n\nRecord:\n{}", template.trim_end(), record_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tags() {
        assert_eq!(ContextTag::parse("banking"), ContextTag::Banking);
        assert_eq!(ContextTag::parse("customer_service"), ContextTag::CustomerService);
        assert_eq!(ContextTag::parse("unknown"), ContextTag::Generic);
        assert_eq!(ContextTag::parse(""), ContextTag::Generic);
    }

    #[test]
    fn test_synthesis_is_pure() {
        assert_eq!(
            synthesize_template(ContextTag::Risk),
            synthesize_template(ContextTag::Risk)
        );
    }

    #[test]
    fn test_every_template_demands_both_sections() {
        for context in [
            ContextTag::Banking,
            ContextTag::Lending,
            ContextTag::Risk,
            ContextTag::CustomerService,
            ContextTag::DataAnalysis,
            ContextTag::Generic,
        ] {
            let template = synthesize_template(context);
            assert!(template.contains("## Insights"), "{} lacks insights", context);
            assert!(
                template.contains("## Recommendations"),
                "{} lacks recommendations",
                context
            );
            assert!(template.contains(RECORD_PLACEHOLDER));
        }
    }

    #[test]
    fn test_fill_replaces_placeholder() {
        let record = Record::new(json!({"amount": 42}));
        let filled = fill_template(&synthesize_template(ContextTag::Generic), &record);
        assert!(!filled.contains(RECORD_PLACEHOLDER));
        assert!(filled.contains("\"amount\": 42"));
    }

    #[test]
    fn test_fill_appends_when_no_placeholder() {
        let record = Record::new(json!({"amount": 42}));
        let filled = fill_template("A stored prompt without a slot.", &record);
        assert!(filled.contains("A stored prompt without a slot."));
        assert!(filled.contains("\"amount\": 42"));
    }

    #[test]
    fn test_templates_differ_by_context() {
        assert_ne!(
            synthesize_template(ContextTag::Risk),
            synthesize_template(ContextTag::Lending)
        );
    }
}
