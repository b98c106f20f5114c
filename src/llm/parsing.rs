use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::RawDealCandidate;
use super::RawTaskCandidate;

static LAKH_CRORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(lakh|lac|crore|cr)s?\s*$").expect("static pattern is valid"));

/// Normalizes an Indian numbering-system shorthand ("5 lakh", "1.2 Cr") to
/// an integer count of base currency units. Returns `None` if `raw` doesn't
/// match the shorthand, in which case the caller should fall back to
/// parsing `raw` as a plain number (§3, §4.E).
pub fn normalize_indian_shorthand(raw: &str) -> Option<i64> {
    let captures = LAKH_CRORE.captures(raw)?;
    let magnitude: f64 = captures[1].replace(',', "").parse().ok()?;
    let multiplier = match captures[2].to_lowercase().as_str() {
        "lakh" | "lac" => 100_000.0,
        "crore" | "cr" => 10_000_000.0,
        _ => return None,
    };
    Some((magnitude * multiplier).round() as i64)
}

/// Either a successfully normalized candidate, or why the raw JSON object
/// could not be turned into one (§4.D, §9 Design Note "Dynamic dict parsing
/// of LLM output ... a single normalization function returning a sum type").
#[derive(Debug, Clone)]
pub enum Parsed<T> {
    Accepted(T),
    Rejected(String),
}

const TASK_TITLE_ALIASES: &[&str] = &["title", "task", "text", "name", "action"];
const DEAL_TITLE_ALIASES: &[&str] = &["title", "deal", "name", "opportunity"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "desc", "details", "summary"];
const SNIPPET_ALIASES: &[&str] = &["snippet", "audit_snippet", "quote", "excerpt"];
const DUE_DATE_ALIASES: &[&str] = &["due_date", "due", "deadline"];
const VALUE_ALIASES: &[&str] = &["value", "amount", "deal_value"];
const CURRENCY_ALIASES: &[&str] = &["currency", "currency_code"];
const STAGE_ALIASES: &[&str] = &["stage", "deal_stage"];
const PROBABILITY_ALIASES: &[&str] = &["probability", "win_probability"];
const CONFIDENCE_ALIASES: &[&str] = &["confidence", "confidence_score"];

fn first_string(
    value: &Value,
    keys: &[&str],
) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_f64(
    value: &Value,
    keys: &[&str],
) -> Option<f64> {
    keys.iter().find_map(|key| match value.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Builds a [`RawTaskCandidate`] from whatever JSON object shape the model
/// emitted, accepting `title`/`task`/`text`/`name`/`action` interchangeably
/// for the one field every task candidate must have. Rejects entries with
/// none of those present rather than guessing a title (§4.D).
pub fn normalize_task_candidate(value: &Value) -> Parsed<RawTaskCandidate> {
    let Some(title) = first_string(value, TASK_TITLE_ALIASES) else {
        return Parsed::Rejected("task candidate has no name-like field (title/task/text/name)".to_string());
    };
    let description = first_string(value, DESCRIPTION_ALIASES).unwrap_or_default();
    let priority = first_string(value, &["priority"]).unwrap_or_default();
    let due_date = first_string(value, DUE_DATE_ALIASES).unwrap_or_default();
    let confidence = first_f64(value, CONFIDENCE_ALIASES).unwrap_or(0.5).clamp(0.0, 1.0);
    let snippet = first_string(value, SNIPPET_ALIASES).unwrap_or_default();
    Parsed::Accepted(RawTaskCandidate { title, description, priority, due_date, confidence, snippet })
}

/// As [`normalize_task_candidate`], for deals: `title`/`deal`/`name`/
/// `opportunity` for the name field, `value`/`amount`/`deal_value` for the
/// quoted amount (still a raw string here; [`normalize_indian_shorthand`]
/// and plain-number parsing both happen downstream in the engine once the
/// candidate is accepted).
pub fn normalize_deal_candidate(value: &Value) -> Parsed<RawDealCandidate> {
    let Some(title) = first_string(value, DEAL_TITLE_ALIASES) else {
        return Parsed::Rejected("deal candidate has no name-like field (title/deal/name/opportunity)".to_string());
    };
    let description = first_string(value, DESCRIPTION_ALIASES).unwrap_or_default();
    let deal_value = first_string(value, VALUE_ALIASES).unwrap_or_default();
    let currency = first_string(value, CURRENCY_ALIASES).unwrap_or_else(|| "USD".to_string());
    let stage = first_string(value, STAGE_ALIASES).unwrap_or_default();
    let probability = first_f64(value, PROBABILITY_ALIASES).unwrap_or(0.0).clamp(0.0, 100.0) as u8;
    let confidence = first_f64(value, CONFIDENCE_ALIASES).unwrap_or(0.5).clamp(0.0, 1.0);
    let snippet = first_string(value, SNIPPET_ALIASES).unwrap_or_default();
    Parsed::Accepted(RawDealCandidate { title, description, value: deal_value, currency, stage, probability, confidence, snippet })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::normalize_deal_candidate;
    use super::normalize_indian_shorthand;
    use super::normalize_task_candidate;
    use super::Parsed;

    #[test]
    fn normalizes_lakh() {
        assert_eq!(normalize_indian_shorthand("5 lakh"), Some(500_000));
        assert_eq!(normalize_indian_shorthand("2.5 Lakh"), Some(250_000));
    }

    #[test]
    fn normalizes_crore() {
        assert_eq!(normalize_indian_shorthand("1 crore"), Some(10_000_000));
        assert_eq!(normalize_indian_shorthand("1.2cr"), Some(12_000_000));
    }

    #[test]
    fn returns_none_for_plain_numbers() {
        assert_eq!(normalize_indian_shorthand("50000"), None);
    }

    #[test]
    fn task_accepts_task_alias_instead_of_title() {
        let value = json!({"task": "Send pricing", "confidence": 0.8});
        match normalize_task_candidate(&value) {
            Parsed::Accepted(c) => assert_eq!(c.title, "Send pricing"),
            Parsed::Rejected(r) => panic!("expected acceptance, got rejection: {r}"),
        }
    }

    #[test]
    fn task_rejects_when_no_name_like_field_present() {
        let value = json!({"confidence": 0.8, "priority": "high"});
        assert!(matches!(normalize_task_candidate(&value), Parsed::Rejected(_)));
    }

    #[test]
    fn deal_accepts_amount_alias_for_value() {
        let value = json!({"title": "Renewal", "amount": "5 lakh", "confidence": 0.7});
        match normalize_deal_candidate(&value) {
            Parsed::Accepted(c) => assert_eq!(c.value, "5 lakh"),
            Parsed::Rejected(r) => panic!("expected acceptance, got rejection: {r}"),
        }
    }
}
