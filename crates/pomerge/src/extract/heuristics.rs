//! Heuristic resolution of a PO identifier from raw extracted text.
//!
//! Strategies hand whatever text they produced to these functions; the
//! patterns encode the expected shape of the identifier rather than any
//! particular vendor layout.

use std::sync::OnceLock;

use regex::Regex;

/// Minimum digits a candidate must carry to be believable. Short tokens like
/// "PO" or "P.O." headers match the patterns but identify nothing.
const MIN_DIGITS: usize = 3;

fn labeled_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "Purchase Order No: ...", "P.O. #...", "PO Number ..." and the
        // punctuation variants scanners produce.
        Regex::new(
            r"(?i)\b(?:purchase\s+order|p\.?\s*o\.?)\s*(?:no\.?|number|num\.?|#)?\s*[:#=\-]?\s*([A-Z0-9][A-Z0-9/_.\-]{4,})",
        )
        .expect("labeled PO pattern is valid")
    })
}

fn bare_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Standalone tokens such as "PO-2024-0117" or "PO25/1882".
        Regex::new(r"(?i)\b(PO[-_/]?[0-9][0-9A-Z/_\-]{3,})\b").expect("bare PO pattern is valid")
    })
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(|c| c.is_ascii_digit()).count()
}

fn clean_candidate(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_end_matches(['.', ',', ':', ';', '-', '_', '/'])
        .to_ascii_uppercase();
    if cleaned.len() < 5 || digit_count(&cleaned) < MIN_DIGITS {
        return None;
    }
    Some(cleaned)
}

/// Scans free text for a PO identifier. Returns the first plausible
/// candidate, labeled occurrences taking precedence over bare tokens.
pub fn find_po_number(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    for caps in labeled_pattern().captures_iter(text) {
        if let Some(candidate) = clean_candidate(&caps[1]) {
            return Some(candidate);
        }
    }

    for caps in bare_pattern().captures_iter(text) {
        if let Some(candidate) = clean_candidate(&caps[1]) {
            return Some(candidate);
        }
    }

    None
}

/// Rescues a sniper crop reading.
///
/// A crop contains little besides the identifier itself, so this accepts
/// looser evidence than [`find_po_number`]: after a direct pattern match
/// fails, common OCR confusions (`O`→`0`, `I`/`l`→`1`) are repaired inside
/// digit runs and the remaining token is accepted if it still looks like an
/// identifier.
pub fn rescue_sniper_hit(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(candidate) = find_po_number(line) {
            return Some(candidate);
        }

        let repaired = repair_garble(line);
        if let Some(candidate) = find_po_number(&repaired) {
            return Some(candidate);
        }

        // Last resort: the crop IS the identifier, just unlabeled.
        let token: String = repaired
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_'))
            .collect();
        if token.len() >= 6 && digit_count(&token) >= 4 {
            return Some(token.to_ascii_uppercase());
        }
    }
    None
}

/// Repairs letter/digit confusions, but only where a digit sits next door —
/// rewriting every O in prose would corrupt legitimate text.
fn repair_garble(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
        let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
        let in_digit_context = prev_digit || next_digit;

        let repaired = match c {
            'O' | 'o' if in_digit_context => '0',
            'I' | 'l' if in_digit_context => '1',
            _ => c,
        };
        out.push(repaired);
    }
    out
}
