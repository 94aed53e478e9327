//! Criterion amendment blocks
//!
//! A fixed, deterministic text block per criterion. Blocks are concatenated
//! in alphabetical criterion order after a prompt's base instructions, so
//! the same weak verdict always produces the same improved template.

use finsight_core::CriterionName;

/// The amendment block for one criterion.
pub fn amendment_block(criterion: CriterionName) -> &'static str {
    match criterion {
        CriterionName::Accuracy => {
            "Ground every claim in the data provided. Quote the exact field \
             values you rely on, and do not state figures that cannot be \
             traced back to the record."
        },
        CriterionName::Completeness => {
            "Cover every part of the record before concluding: all \
             transactions, all counterparties, and any anomalies. Close with \
             a checklist confirming each area was addressed."
        },
        CriterionName::Clarity => {
            "Use short declarative sentences. Structure the answer with one \
             point per line, lead with the conclusion, and avoid nested \
             qualifications."
        },
        CriterionName::Relevance => {
            "Keep the analysis anchored to the financial context of this \
             record. Do not introduce general advice that does not follow \
             from the data at hand."
        },
        CriterionName::Structural => {
            "Format the response as exactly two labeled sections in this \
             order: first a section titled 'Insights', then a section titled \
             'Recommendations'. Both section headers must appear verbatim."
        },
    }
}

/// Append the amendment blocks for the given criteria to a base prompt.
/// Criteria are deduplicated and ordered alphabetically by name.
pub fn apply_amendments(base: &str, criteria: &[CriterionName]) -> String {
    let mut sorted: Vec<CriterionName> = criteria.to_vec();
    sorted.sort_by_key(|c| c.as_str());
    sorted.dedup();

    let mut out = base.trim_end().to_string();
    for criterion in sorted {
        out.push_str("\n\n");
        out.push_str(amendment_block(criterion));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_distinct() {
        let mut blocks: Vec<&str> = CriterionName::all()
            .iter()
            .map(|c| amendment_block(*c))
            .collect();
        blocks.sort();
        blocks.dedup();
        assert_eq!(blocks.len(), CriterionName::all().len());
    }

    #[test]
    fn test_alphabetical_order() {
        let amended = apply_amendments(
            "base",
            &[CriterionName::Structural, CriterionName::Accuracy],
        );
        let accuracy_at = amended.find(amendment_block(CriterionName::Accuracy)).unwrap();
        let structural_at = amended
            .find(amendment_block(CriterionName::Structural))
            .unwrap();
        assert!(accuracy_at < structural_at);
        assert!(amended.starts_with("base"));
    }

    #[test]
    fn test_deterministic_and_deduplicated() {
        let a = apply_amendments(
            "base",
            &[
                CriterionName::Clarity,
                CriterionName::Accuracy,
                CriterionName::Clarity,
            ],
        );
        let b = apply_amendments("base", &[CriterionName::Accuracy, CriterionName::Clarity]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_criteria_is_identity() {
        assert_eq!(apply_amendments("base", &[]), "base");
    }
}
