use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Heuristic intent taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TourRequest,
    PricingQuestion,
    AvailabilityQuestion,
    Unsubscribe,
    Unknown,
}

lazy_static! {
    static ref TOUR_REGEX: Regex =
        Regex::new(r"(?i)\b(tour|showing|see the (unit|place|apartment|room)|visit|walk.?through|come (by|see))\b").unwrap();
    static ref PRICING_REGEX: Regex =
        Regex::new(r"(?i)\b(price|rent|cost|how much|deposit|fee|monthly)\b").unwrap();
    static ref AVAILABILITY_REGEX: Regex =
        Regex::new(r"(?i)\b(available|avail(?:ability)?|still (open|available)|move.?in date|when (can|could) i)\b").unwrap();
    static ref UNSUBSCRIBE_REGEX: Regex =
        Regex::new(r"(?i)\b(stop (messaging|texting|contacting) me|unsubscribe|remove me|don'?t contact me|no longer interested in (messages|updates))\b").unwrap();
    static ref FOLLOW_UP_REGEX: Regex =
        Regex::new(r"(?i)\b(checking in|any update|still there|just following up|haven'?t heard back|bump)\b").unwrap();
}

/// Classifies the inbound body by keyword pattern. Order matters: unsubscribe
/// is checked first since it overrides any topical content in the same
/// message.
pub fn classify_intent(body: &str) -> Intent {
    if UNSUBSCRIBE_REGEX.is_match(body) {
        return Intent::Unsubscribe;
    }
    if TOUR_REGEX.is_match(body) {
        return Intent::TourRequest;
    }
    if PRICING_REGEX.is_match(body) {
        return Intent::PricingQuestion;
    }
    if AVAILABILITY_REGEX.is_match(body) {
        return Intent::AvailabilityQuestion;
    }
    Intent::Unknown
}

/// True only when the message reads as a check-in AND an outbound was
/// already sent earlier in the thread.
pub fn detect_follow_up(body: &str, has_recent_outbound: bool) -> bool {
    has_recent_outbound && FOLLOW_UP_REGEX.is_match(body)
}
