//! Maps raw chain-client failure payloads onto a closed set of user-facing
//! categories.
//!
//! Wallet extensions and RPC providers disagree on error shapes, so the
//! classification never branches on payload structure. It works on extracted
//! message text alone, checking known substrings in a fixed priority order;
//! the order matters because revert reasons can embed several markers at
//! once.

use crate::core::error::{ClassifiedError, ErrorCategory};
use crate::core::traits::ChainFailure;

/// Marker most EVM stacks prefix contract revert reasons with.
const REVERT_MARKER: &str = "execution reverted";

/// Shown when a failure carries no usable message at all.
const FALLBACK_MESSAGE: &str = "Transaction failed. Please try again";

/// Classify a raw failure payload.
///
/// Each candidate message in the payload is classified in turn; the first
/// one that lands on a specific category wins. Payloads whose candidates are
/// all unclassifiable fall back to `unknown` with the primary message,
/// cleaned of transport noise.
pub fn classify(failure: &ChainFailure) -> ClassifiedError {
    let candidates = failure.candidate_messages();
    for candidate in &candidates {
        let classified = classify_message(candidate);
        if classified.category != ErrorCategory::Unknown {
            return classified;
        }
    }
    match candidates.first() {
        Some(primary) => classify_message(primary),
        None => ClassifiedError::new(ErrorCategory::Unknown, FALLBACK_MESSAGE),
    }
}

/// Classify a single failure message.
pub fn classify_message(raw: &str) -> ClassifiedError {
    let lower = raw.to_lowercase();

    if lower.contains("user rejected")
        || lower.contains("rejected by user")
        || lower.contains("user denied")
    {
        return ClassifiedError::new(
            ErrorCategory::UserRejected,
            "Transaction was rejected by user",
        );
    }

    if lower.contains("insufficient balance")
        || lower.contains("insufficient funds")
        || lower.contains("exceeds balance")
    {
        return ClassifiedError::new(
            ErrorCategory::InsufficientBalance,
            "Insufficient balance for this transaction",
        );
    }

    // Inside a revert the contract's own reason is the message candidate;
    // otherwise the whole message is.
    let revert_reason = extract_revert_reason(raw);
    let candidate = revert_reason.as_deref().unwrap_or(raw);
    let candidate_lower = candidate.to_lowercase();

    if candidate_lower.contains("invalid option") {
        return ClassifiedError::new(ErrorCategory::InvalidOption, candidate.trim());
    }

    if candidate_lower.contains("exceeds allowance") {
        return ClassifiedError::new(
            ErrorCategory::InsufficientAllowance,
            "Please approve tokens before staking",
        );
    }

    if candidate_lower.contains("stake is locked") {
        return ClassifiedError::new(
            ErrorCategory::StakeLocked,
            "Stake is still locked. Please use frozen unstake or wait until lock period ends",
        );
    }

    if let Some(reason) = revert_reason {
        return ClassifiedError::new(ErrorCategory::ContractRevertOther, reason);
    }

    let cleaned = clean_message(raw);
    if cleaned.is_empty() {
        ClassifiedError::new(ErrorCategory::Unknown, FALLBACK_MESSAGE)
    } else {
        ClassifiedError::new(ErrorCategory::Unknown, cleaned)
    }
}

/// Pull the reason text following the revert marker, trimming separators and
/// the serialization noise that often trails it.
fn extract_revert_reason(raw: &str) -> Option<String> {
    let start = find_ignore_ascii_case(raw, REVERT_MARKER)? + REVERT_MARKER.len();
    let tail = raw[start..].trim_start_matches([':', ' ', '\t']);
    // Reasons embedded in serialized payloads end at the first quote,
    // escape or closing bracket.
    let end = tail.find(['"', '\\', '\n', '}', ']']).unwrap_or(tail.len());
    let reason = tail[..end].trim().trim_end_matches(['.', ',']);
    if reason.is_empty() {
        Some("Transaction reverted".to_string())
    } else {
        Some(reason.to_string())
    }
}

/// Byte-offset search that folds ASCII case only, so the offset stays valid
/// for slicing the original string.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Strip the bracket, quote and escape noise transports wrap messages in.
fn clean_message(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' | '\'' | '\\' | '{' | '}' | '[' | ']' => cleaned.push(' '),
            _ => cleaned.push(c),
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
