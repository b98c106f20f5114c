use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::CanonicalMessage;

static SPAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(unsubscribe|opt[- ]?out|lottery|winner|congratulations|viagra|cialis|pharmacy|nigerian prince|inheritance)\b").expect("static pattern is valid")
});

static BUSINESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(proposal|quote|contract|agreement|deal|partnership|meeting|call|schedule|follow[- ]?up|project|requirements|budget|timeline|deadline|client|customer|vendor|supplier|service|purchase|order|invoice|payment|pricing|logistics|transport|shipping|delivery|freight|looking for|inquiry|request|need|require)\b",
    )
    .expect("static pattern is valid")
});

const MIN_CONTENT_LENGTH: usize = 20;
const BUSINESS_SCORE_THRESHOLD: f64 = 0.05;

/// Why the prefilter stage either let a message through or dropped it
/// before any LLM call, and at what content length it was truncated to
/// (§4.D). Cheap, deterministic, and runs ahead of every classify call so
/// obvious noise never reaches the LLM.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefilterOutcome {
    Passed { content: String },
    Skipped { reason: String },
}

/// Regex- and heuristic-based prefilter mirroring the original service's
/// spam/business-relevance scoring (§4.D). Business relevance is scored,
/// not hard-gated on a keyword match, so an email with no recognized
/// keyword but a plausible length still proceeds.
pub fn prefilter(
    message: &CanonicalMessage,
    max_content_length: usize,
) -> PrefilterOutcome {
    let content = message.text_body.trim();

    if content.chars().count() < MIN_CONTENT_LENGTH {
        return PrefilterOutcome::Skipped { reason: "content too short to be meaningful".to_string() };
    }

    if is_spam(content, &message.subject) {
        return PrefilterOutcome::Skipped { reason: "matched a spam/noise pattern".to_string() };
    }

    let truncated = smart_truncate(content, max_content_length);

    let score = business_score(&truncated, &message.subject);
    if score < BUSINESS_SCORE_THRESHOLD {
        return PrefilterOutcome::Skipped { reason: format!("business relevance score {score:.2} below threshold") };
    }

    PrefilterOutcome::Passed { content: truncated }
}

fn is_spam(
    content: &str,
    subject: &str,
) -> bool {
    if SPAM_PATTERN.is_match(content) || SPAM_PATTERN.is_match(subject) {
        return true;
    }
    let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    let caps = letters.iter().filter(|c| c.is_uppercase()).count();
    (caps as f64 / letters.len() as f64) > 0.5
}

fn business_score(
    content: &str,
    subject: &str,
) -> f64 {
    let mut score = 0.0;
    let content_matches = BUSINESS_PATTERN.find_iter(content).count();
    score += (content_matches as f64 * 0.1).min(0.5);

    let subject_matches = BUSINESS_PATTERN.find_iter(subject).count();
    score += (subject_matches as f64 * 0.2).min(0.3);

    score.min(1.0)
}

/// Keeps the first 60% and last 20% of `content` when it exceeds
/// `max_len`, joined by a truncation marker, so the part of an email most
/// likely to carry a signature or total value survives alongside the
/// opening paragraph.
fn smart_truncate(
    content: &str,
    max_len: usize,
) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }
    let chars: Vec<char> = content.chars().collect();
    let first_len = (max_len as f64 * 0.6) as usize;
    let last_len = (max_len as f64 * 0.2) as usize;
    let first: String = chars[..first_len.min(chars.len())].iter().collect();
    let last: String = chars[chars.len().saturating_sub(last_len)..].iter().collect();
    format!("{first}\n\n[... content truncated ...]\n\n{last}")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::prefilter;
    use super::PrefilterOutcome;
    use crate::domain::CanonicalMessage;
    use crate::domain::SenderAddress;

    fn msg(
        subject: &str,
        body: &str,
    ) -> CanonicalMessage {
        CanonicalMessage {
            message_id: "m1".to_string(),
            subject: subject.to_string(),
            sender_address: SenderAddress::parse("a@b.com").unwrap(),
            sender_display_name: None,
            text_body: body.to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn drops_short_content() {
        let outcome = prefilter(&msg("hi", "too short"), 5000);
        assert!(matches!(outcome, PrefilterOutcome::Skipped { .. }));
    }

    #[test]
    fn drops_spam_pattern() {
        let outcome = prefilter(&msg("Newsletter", "Click here to unsubscribe from our mailing list now!!"), 5000);
        assert!(matches!(outcome, PrefilterOutcome::Skipped { .. }));
    }

    #[test]
    fn passes_business_relevant_content() {
        let outcome = prefilter(&msg("Proposal request", "We would like to request a quote for your logistics service and discuss a contract."), 5000);
        assert!(matches!(outcome, PrefilterOutcome::Passed { .. }));
    }
}
