//! Two-section analysis format
//!
//! Every generated answer must carry two labeled sections in order:
//! insights, then recommendations. The structural validation criterion
//! checks this literally.

use serde::{Deserialize, Serialize};

/// A parsed two-section analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub insights: String,
    pub recommendations: String,
    /// Full model output, unmodified.
    pub raw: String,
}

impl Analysis {
    /// Parse model output into the two labeled sections.
    ///
    /// A section header is a short line whose text, stripped of markdown
    /// decoration, starts with "insights"/"key insights" or
    /// "recommendations". The insights header must come first.
    pub fn parse(text: &str) -> Option<Analysis> {
        let lines: Vec<&str> = text.lines().collect();
        let mut insights_at = None;
        let mut recommendations_at = None;

        for (i, line) in lines.iter().enumerate() {
            if is_section_header(line, &["insights", "key insights", "key findings"]) {
                if insights_at.is_none() {
                    insights_at = Some(i);
                }
            } else if is_section_header(line, &["recommendations", "recommendation"]) {
                if recommendations_at.is_none() {
                    recommendations_at = Some(i);
                }
            }
        }

        let (ins, rec) = (insights_at?, recommendations_at?);
        if ins >= rec {
            return None;
        }

        let insights = lines[ins + 1..rec].join("\n").trim().to_string();
        let recommendations = lines[rec + 1..].join("\n").trim().to_string();
        if insights.is_empty() || recommendations.is_empty() {
            return None;
        }

        Some(Analysis {
            insights,
            recommendations,
            raw: text.to_string(),
        })
    }

    /// True when `text` satisfies the two-section contract.
    pub fn has_required_sections(text: &str) -> bool {
        Analysis::parse(text).is_some()
    }
}

fn is_section_header(line: &str, labels: &[&str]) -> bool {
    let stripped: String = line
        .trim()
        .trim_start_matches(['#', '*', '-', ' '])
        .trim_end_matches(['*', ':', ' '])
        .to_lowercase();
    if stripped.len() > 40 {
        return false;
    }
    labels
        .iter()
        .any(|label| stripped == *label || stripped.starts_with(&format!("{}:", label)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "\
## Insights
Credit volume is concentrated in a single counterparty.
Cash flow is seasonal.

## Recommendations
Diversify the counterparty base.
Maintain a liquidity buffer for the off-season.
";

    #[test]
    fn test_parse_well_formed() {
        let analysis = Analysis::parse(WELL_FORMED).expect("should parse");
        assert!(analysis.insights.contains("counterparty"));
        assert!(analysis.recommendations.contains("liquidity buffer"));
        assert_eq!(analysis.raw, WELL_FORMED);
    }

    #[test]
    fn test_parse_plain_labels() {
        let text = "INSIGHTS:\nrevenue up\n\nRECOMMENDATIONS:\nkeep going";
        assert!(Analysis::has_required_sections(text));
    }

    #[test]
    fn test_rejects_missing_section() {
        assert!(!Analysis::has_required_sections("## Insights\nonly one section"));
        assert!(!Analysis::has_required_sections("no sections at all"));
    }

    #[test]
    fn test_rejects_wrong_order() {
        let text = "## Recommendations\ndo x\n\n## Insights\nbecause y";
        assert!(!Analysis::has_required_sections(text));
    }

    #[test]
    fn test_rejects_empty_bodies() {
        let text = "## Insights\n\n## Recommendations\n";
        assert!(!Analysis::has_required_sections(text));
    }

    #[test]
    fn test_header_not_confused_with_prose() {
        // The word "insights" inside a long sentence is not a header.
        let text = "This analysis offers several insights into the data and \
                    some recommendations as well, but without section markers.";
        assert!(!Analysis::has_required_sections(text));
    }
}
