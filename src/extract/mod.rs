//! Extraction Heuristics
//!
//! Turns raw recognized text into a structured name/amount/memo record.
//! Pure functions, no I/O: the capture session runs this synchronously on
//! every recognition response.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ocr::RecognizedField;

/// Heuristically extracted record, seeding the editable draft
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecord {
    /// Donor name, honorific suffix stripped
    pub name: Option<String>,
    /// Amount in won
    pub amount: Option<i64>,
    /// Celebratory/condolence keyword found on the envelope
    pub memo: Option<String>,
    /// Derived extraction score (0-100), not the raw OCR confidence
    pub confidence: u8,
}

static HANGUL_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[가-힣]+").unwrap());

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)\s*(만원|만|천원|원)?").unwrap());

/// Honorific suffixes stripped from name candidates, longest first
const HONORIFICS: [&str; 6] = ["드림", "올림", "님", "씨", "군", "양"];

/// Celebratory/condolence keywords that become the memo and never the name
const MEMO_KEYWORDS: [&str; 8] = [
    "축결혼", "결혼", "축하", "축의", "화혼", "부의", "조의", "근조",
];

/// Extract a record from an ordered list of recognized fields
pub fn extract_record(fields: &[RecognizedField]) -> ExtractedRecord {
    let text = fields
        .iter()
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    extract_from_text(&text)
}

/// Extract a record from a single concatenated text blob
pub fn extract_from_text(text: &str) -> ExtractedRecord {
    let name = extract_name(text);
    let amount = extract_amount(text);
    let memo = extract_memo(text);

    let mut confidence = 0u8;
    if name.as_deref().map(|n| n.chars().count() >= 2).unwrap_or(false) {
        confidence += 50;
    }
    if amount.map(|a| a > 0).unwrap_or(false) {
        confidence += 50;
    }

    ExtractedRecord {
        name,
        amount,
        memo,
        confidence,
    }
}

/// Find the donor name: 2-4 contiguous Hangul syllables, optionally followed
/// by an honorific suffix which is stripped.
///
/// When several candidates exist the longest wins, ties broken by first
/// occurrence. Celebratory keywords are never name candidates.
pub fn extract_name(text: &str) -> Option<String> {
    let mut best: Option<&str> = None;

    for run in HANGUL_RUN_RE.find_iter(text) {
        let token = strip_honorific(run.as_str());
        let len = token.chars().count();
        if !(2..=4).contains(&len) {
            continue;
        }
        if MEMO_KEYWORDS.iter().any(|kw| token.contains(kw)) {
            continue;
        }
        // Strictly-greater keeps the first occurrence on ties
        if best.map(|b| len > b.chars().count()).unwrap_or(true) {
            best = Some(token);
        }
    }

    best.map(|s| s.to_string())
}

/// Strip one trailing honorific when the remainder still names a person
fn strip_honorific(token: &str) -> &str {
    for suffix in HONORIFICS {
        if let Some(stripped) = token.strip_suffix(suffix) {
            if stripped.chars().count() >= 2 {
                return stripped;
            }
        }
    }
    token
}

/// Find the monetary amount in won.
///
/// Thousands separators are stripped; a 만 unit scales by 10,000. A
/// unit-marked token anywhere in the text beats an earlier bare number;
/// bare numbers are the lowest-priority fallback. Scanning stops at the
/// first positive match of the winning class.
pub fn extract_amount(text: &str) -> Option<i64> {
    let mut bare_fallback: Option<i64> = None;

    for caps in AMOUNT_RE.captures_iter(text) {
        let digits = caps.get(1)?.as_str().replace(',', "");
        let Ok(value) = digits.parse::<i64>() else {
            continue;
        };
        if value <= 0 {
            continue;
        }

        match caps.get(2).map(|m| m.as_str()) {
            Some(unit) => {
                let scaled = if unit.starts_with('만') {
                    value * 10_000
                } else {
                    value
                };
                return Some(scaled);
            }
            None => {
                if bare_fallback.is_none() {
                    bare_fallback = Some(value);
                }
            }
        }
    }

    bare_fallback
}

/// Find a celebratory/condolence keyword to use as the memo
pub fn extract_memo(text: &str) -> Option<String> {
    MEMO_KEYWORDS
        .iter()
        .filter_map(|kw| text.find(kw).map(|pos| (pos, *kw)))
        .min_by_key(|&(pos, kw)| (pos, std::cmp::Reverse(kw.len())))
        .map(|(_, kw)| kw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::RecognizedField;

    fn field(text: &str) -> RecognizedField {
        RecognizedField {
            text: text.to_string(),
            confidence: 0.9,
            bounding_box: None,
        }
    }

    #[test]
    fn test_full_extraction() {
        let fields = vec![field("축 결혼"), field("김철수"), field("50,000원")];
        let record = extract_record(&fields);

        assert_eq!(record.name.as_deref(), Some("김철수"));
        assert_eq!(record.amount, Some(50_000));
        assert_eq!(record.memo.as_deref(), Some("결혼"));
        assert_eq!(record.confidence, 100);
    }

    #[test]
    fn test_empty_input() {
        let record = extract_record(&[]);
        assert_eq!(record.name, None);
        assert_eq!(record.amount, None);
        assert_eq!(record.memo, None);
        assert_eq!(record.confidence, 0);
    }

    #[test]
    fn test_amount_with_separator() {
        assert_eq!(extract_amount("50,000원"), Some(50_000));
    }

    #[test]
    fn test_amount_manwon_scaled() {
        assert_eq!(extract_amount("5만원"), Some(50_000));
        assert_eq!(extract_amount("10만원"), Some(100_000));
        assert_eq!(extract_amount("3만"), Some(30_000));
    }

    #[test]
    fn test_amount_cheonwon_not_scaled() {
        // 천원 is recognized as a unit but never multiplied
        assert_eq!(extract_amount("5천원"), Some(5));
    }

    #[test]
    fn test_amount_bare_number_fallback() {
        assert_eq!(extract_amount("100"), Some(100));
    }

    #[test]
    fn test_amount_unit_beats_earlier_bare_number() {
        // A unit-marked amount wins over a preceding bare number
        assert_eq!(extract_amount("2024 축의금 5만원"), Some(50_000));
    }

    #[test]
    fn test_amount_first_unit_match_wins() {
        assert_eq!(extract_amount("30,000원 또는 50,000원"), Some(30_000));
    }

    #[test]
    fn test_amount_absent() {
        assert_eq!(extract_amount("김철수 드림"), None);
    }

    #[test]
    fn test_name_honorific_stripped() {
        assert_eq!(extract_name("박철수님").as_deref(), Some("박철수"));
        assert_eq!(extract_name("김민수드림").as_deref(), Some("김민수"));
        assert_eq!(extract_name("이영희 올림").as_deref(), Some("이영희"));
    }

    #[test]
    fn test_name_longest_wins() {
        // 남궁민수 (4 syllables) beats 김철 (2)
        assert_eq!(extract_name("김철 남궁민수").as_deref(), Some("남궁민수"));
    }

    #[test]
    fn test_name_tie_keeps_first() {
        assert_eq!(extract_name("김철수 이영희").as_deref(), Some("김철수"));
    }

    #[test]
    fn test_name_skips_keywords() {
        // Celebratory text must not be mistaken for a name
        assert_eq!(extract_name("축결혼 김철수").as_deref(), Some("김철수"));
        assert_eq!(extract_name("부의 박영수").as_deref(), Some("박영수"));
    }

    #[test]
    fn test_name_absent_without_hangul() {
        assert_eq!(extract_name("50,000 WON"), None);
    }

    #[test]
    fn test_name_too_long_run_rejected() {
        assert_eq!(extract_name("축하합니다감사합니다"), None);
    }

    #[test]
    fn test_memo_first_occurrence() {
        assert_eq!(extract_memo("결혼 축하 김철수").as_deref(), Some("결혼"));
        assert_eq!(extract_memo("삼가 조의를 표합니다").as_deref(), Some("조의"));
        assert_eq!(extract_memo("김철수"), None);
    }

    #[test]
    fn test_partial_extraction_confidence() {
        let record = extract_from_text("김철수 드림");
        assert_eq!(record.name.as_deref(), Some("김철수"));
        assert_eq!(record.amount, None);
        assert_eq!(record.confidence, 50);

        let record = extract_from_text("50,000원");
        assert_eq!(record.name, None);
        assert_eq!(record.amount, Some(50_000));
        assert_eq!(record.confidence, 50);
    }
}
