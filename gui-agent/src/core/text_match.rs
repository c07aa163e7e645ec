//! Literal matching between a decided target description and recognized widget text.

use crate::core::types::Element;

/// Lower-case, replace `, . : ; _` with spaces and trim.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ',' | '.' | ':' | ';' | '_' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Symmetric literal relation used to short-circuit vision matching.
///
/// Holds when both sides are non-empty after normalization, one is a prefix of the
/// other, and every token of the shorter appears among the tokens of the longer.
pub fn literally_related(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if !longer.starts_with(shorter.as_str()) {
        return false;
    }
    let longer_tokens: Vec<&str> = longer.split_whitespace().collect();
    shorter
        .split_whitespace()
        .all(|token| longer_tokens.contains(&token))
}

/// First element, in detector order, whose text is literally related to `description`.
pub fn find_literal_match<'a>(elements: &'a [Element], description: &str) -> Option<&'a Element> {
    elements.iter().find(|element| {
        element
            .text
            .as_deref()
            .is_some_and(|text| literally_related(text, description))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BoundingBox;

    fn element(id: i32, text: Option<&str>) -> Element {
        Element {
            id,
            bbox: BoundingBox::new(0, 0, 1, 1),
            text: text.map(str::to_string),
            description: None,
            parent: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn relation_is_symmetric() {
        let pairs = [
            ("Sign in", "sign in button"),
            ("Settings:", "settings"),
            ("log_in", "Log In now"),
            ("Cancel", "OK"),
            ("", "anything"),
            ("sign", "signature"),
        ];
        for (a, b) in pairs {
            assert_eq!(literally_related(a, b), literally_related(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn empty_after_normalization_never_matches() {
        assert!(!literally_related("", "Sign in"));
        assert!(!literally_related(" ...; ", "Sign in"));
        assert!(!literally_related("", ""));
    }

    #[test]
    fn prefix_with_token_subset_matches() {
        assert!(literally_related("Sign in", "sign in button"));
        assert!(literally_related("Settings.", "settings"));
        // Prefix but partial token.
        assert!(!literally_related("sign", "signature"));
        // Token subset but not a prefix.
        assert!(!literally_related("in", "sign in"));
    }

    #[test]
    fn finds_first_related_element_in_detector_order() {
        let elements = vec![
            element(0, None),
            element(1, Some("Search")),
            element(2, Some("Search settings")),
        ];
        let found = find_literal_match(&elements, "search").expect("match");
        assert_eq!(found.id, 1);
        assert!(find_literal_match(&elements, "profile").is_none());
    }
}
