//! Phone-number normalization for the transport's addressing scheme.
//!
//! Only Sri Lankan mobile numbers are accepted; landlines, short strings,
//! and non-numeric input normalize to `None` so callers can record a
//! per-lead error instead of attempting a doomed send.

/// Transport address suffix for direct chats.
const CHAT_SUFFIX: &str = "@c.us";

/// Normalizes `raw` to the canonical `+947XXXXXXXX` form.
///
/// Accepted shapes: `+94 7X XXX XXXX` (spaces/dashes/parentheses ignored),
/// `947XXXXXXXX`, `07XXXXXXXX`, and a bare `7XXXXXXXX`.
pub fn normalize_mobile(raw: &str) -> Option<String> {
	let cleaned: String = raw.chars().filter(|c| !matches!(c, ' ' | '-' | '(' | ')')).collect();
	let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
	if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}

	match cleaned.len() {
		11 | 12 if cleaned.starts_with("947") => Some(format!("+{cleaned}")),
		10 if cleaned.starts_with("07") => Some(format!("+94{}", &cleaned[1..])),
		9 if cleaned.starts_with('7') => Some(format!("+94{cleaned}")),
		_ => None,
	}
}

/// Derives the transport chat id (`947XXXXXXXX@c.us`) from any accepted
/// mobile shape.
pub fn chat_id(raw: &str) -> Option<String> {
	normalize_mobile(raw).map(|normalized| format!("{}{CHAT_SUFFIX}", normalized.trim_start_matches('+')))
}
