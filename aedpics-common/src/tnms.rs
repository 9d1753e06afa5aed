//! TNMS: institution-name normalization and matching
//!
//! Target institutions and device records spell the same organization in
//! many ways ("(주)한빛병원", "한빛 병원", "주식회사 한빛병원"). Both sides are reduced
//! to a canonical form when written; candidates are then ranked by the
//! Levenshtein distance between canonical forms.

/// Legal-entity markers removed before comparison. Longer forms first so
/// "(주)" is not left behind as "()" by a shorter match.
const ENTITY_MARKERS: &[&str] = &[
    "사회복지법인",
    "주식회사",
    "재단법인",
    "사단법인",
    "의료법인",
    "학교법인",
    "(주)",
    "(재)",
    "(사)",
    "㈜",
];

/// Canonical form of an institution name
///
/// Lowercases, strips legal-entity markers and keeps only alphanumeric
/// characters (Hangul counts as alphanumeric).
pub fn normalize(name: &str) -> String {
    let mut text = name.to_lowercase();
    for marker in ENTITY_MARKERS {
        if text.contains(marker) {
            text = text.replace(marker, "");
        }
    }
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Edit distance between two canonical names
pub fn distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Similarity in `[0, 1]`; 1.0 means identical canonical names
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Largest distance still reported as a candidate for a canonical target name
pub fn max_candidate_distance(normalized_target: &str) -> usize {
    (normalized_target.chars().count() / 4).max(2)
}

/// A device name scored against a target
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub distance: usize,
    pub similarity: f64,
}

/// Score `candidate` against `target` (both already normalized)
///
/// Returns `None` when the pair is too far apart to be worth showing.
pub fn score(target: &str, candidate: &str) -> Option<MatchScore> {
    if target.is_empty() || candidate.is_empty() {
        return None;
    }
    let distance = distance(target, candidate);
    if distance > max_candidate_distance(target) {
        return None;
    }
    Some(MatchScore {
        distance,
        similarity: similarity(target, candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_entity_markers_and_punctuation() {
        assert_eq!(normalize("(주)한빛 병원"), "한빛병원");
        assert_eq!(normalize("주식회사 한빛병원"), "한빛병원");
        assert_eq!(normalize("㈜한빛-병원"), "한빛병원");
        assert_eq!(normalize("재단법인 서울아산병원 [본관]"), "서울아산병원본관");
    }

    #[test]
    fn test_normalize_lowercases_latin() {
        assert_eq!(normalize("KTX Seoul Station"), "ktxseoulstation");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" (주) "), "");
    }

    #[test]
    fn test_distance_counts_characters_not_bytes() {
        assert_eq!(distance("한빛병원", "한빛병원"), 0);
        assert_eq!(distance("한빛병원", "한빛의원"), 1);
        assert_eq!(distance("한빛병원", "한빛의원"), distance("한빛의원", "한빛병원"));
    }

    #[test]
    fn test_score_threshold() {
        assert_eq!(max_candidate_distance("한빛병원"), 2);
        assert_eq!(max_candidate_distance("서울특별시중구보건소본관"), 3);

        let close = score("한빛병원", "한빛의원").unwrap();
        assert_eq!(close.distance, 1);
        assert!(close.similarity > 0.7);

        assert!(score("한빛병원", "서울역사").is_none());
        assert!(score("", "서울역").is_none());
    }
}
