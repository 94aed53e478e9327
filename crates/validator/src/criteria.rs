//! Criterion prompts and score parsing

use once_cell::sync::Lazy;
use regex::Regex;

use finsight_core::CriterionName;

/// Build the fixed criterion-specific scoring prompt wrapping the redacted
/// record, the original prompt, and the candidate response.
pub fn criterion_prompt(
    criterion: CriterionName,
    record_json: &str,
    original_prompt: &str,
    response: &str,
) -> String {
    let question = match criterion {
        CriterionName::Accuracy => {
            "Score how factually accurate the response is with respect to \
             the record: are all stated figures and facts traceable to the \
             data?"
        },
        CriterionName::Completeness => {
            "Score how completely the response covers the record: are all \
             transactions, parties, and notable features addressed?"
        },
        CriterionName::Clarity => {
            "Score how clear the response is: direct sentences, logical \
             order, no ambiguity."
        },
        CriterionName::Relevance => {
            "Score how relevant the response is to the analysis request: \
             does it stay on the record's financial context?"
        },
        CriterionName::Structural => {
            "Score whether the response is formatted as two labeled \
             sections, insights first and recommendations second."
        },
    };

    format!(
        "You are scoring one quality criterion of an analysis.\n\n\
         {question}\n\n\
         Record:\n{record_json}\n\n\
         Original prompt:\n{original_prompt}\n\n\
         Candidate response:\n{response}\n\n\
         Reply with a single number between 0.0 and 1.0 and nothing else."
    )
}

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?\d*\.?\d+").unwrap());

/// Parse a single-number score out of a model reply.
///
/// Robust to whitespace and surrounding noise; scores given as percentages
/// are scaled down. Unparseable or out-of-range output fails closed to 0.
pub fn parse_score(raw: &str) -> f64 {
    let Some(m) = NUMBER_RE.find(raw.trim()) else {
        return 0.0;
    };
    let Ok(value) = m.as_str().parse::<f64>() else {
        return 0.0;
    };

    if (0.0..=1.0).contains(&value) {
        value
    } else if (1.0..=100.0).contains(&value) {
        value / 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_number() {
        assert_eq!(parse_score("0.85"), 0.85);
        assert_eq!(parse_score("1"), 1.0);
        assert_eq!(parse_score("0"), 0.0);
    }

    #[test]
    fn test_parse_with_noise() {
        assert_eq!(parse_score("  Score: 0.7 out of 1.0\n"), 0.7);
        assert_eq!(parse_score("I would rate this 0.45."), 0.45);
    }

    #[test]
    fn test_parse_percentage_scaled() {
        assert_eq!(parse_score("85"), 0.85);
        assert_eq!(parse_score("100"), 1.0);
    }

    #[test]
    fn test_fails_closed() {
        assert_eq!(parse_score("no number here"), 0.0);
        assert_eq!(parse_score(""), 0.0);
        assert_eq!(parse_score("-0.5"), 0.0);
        assert_eq!(parse_score("4000"), 0.0);
    }

    #[test]
    fn test_prompt_mentions_all_parts() {
        let p = criterion_prompt(CriterionName::Accuracy, "{\"a\":1}", "analyze", "result");
        assert!(p.contains("{\"a\":1}"));
        assert!(p.contains("analyze"));
        assert!(p.contains("result"));
        assert!(p.contains("single number"));
    }

    #[test]
    fn test_prompts_differ_per_criterion() {
        let a = criterion_prompt(CriterionName::Accuracy, "r", "p", "x");
        let b = criterion_prompt(CriterionName::Clarity, "r", "p", "x");
        assert_ne!(a, b);
    }
}
