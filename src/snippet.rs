//! Snippet extraction for search results.
//!
//! Picks the highest keyword-density window inside a chunk and pads it
//! with surrounding context so the result reads as prose. Windows slide in
//! `size - overlap` steps over whitespace-normalized text; the window with
//! the most query-term hits wins, earlier windows winning ties. Ellipses
//! mark truncation on either side.

/// Extract the most relevant snippet from `content` for the given query
/// terms. `size` and `overlap` are in characters.
pub fn extract_snippet(terms: &[String], content: &str, size: usize, overlap: usize) -> String {
    let plain = normalize_whitespace(content);
    if plain.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = plain.chars().collect();
    if chars.len() <= size {
        return plain;
    }

    // No terms: lead of the text.
    if terms.is_empty() {
        let head: String = chars[..size].iter().collect();
        return format!("{} ...", head.trim_end());
    }

    let lowered: Vec<char> = plain.to_lowercase().chars().collect();
    let needles: Vec<Vec<char>> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase().chars().collect())
        .collect();

    let step = size.saturating_sub(overlap).max(1);

    let mut best_start = 0;
    let mut best_score = window_score(&lowered, 0, size, &needles);

    let mut start = step;
    while start + size / 2 < chars.len() {
        let end = (start + size).min(chars.len());
        if end - start < size / 2 {
            break;
        }
        let score = window_score(&lowered, start, end, &needles);
        if score > best_score {
            best_score = score;
            best_start = start;
        }
        start += step;
    }

    let end = (best_start + size).min(chars.len());
    let window: String = chars[best_start..end].iter().collect();
    let window = window.trim();

    let prefix = if best_start > 0 { "... " } else { "" };
    let suffix = if end < chars.len() { " ..." } else { "" };
    format!("{prefix}{window}{suffix}")
}

/// Count query-term occurrences starting at word boundaries inside the
/// window.
fn window_score(lowered: &[char], start: usize, end: usize, needles: &[Vec<char>]) -> usize {
    let end = end.min(lowered.len());
    let mut score = 0;
    for i in start..end {
        let at_boundary = i == 0 || !lowered[i - 1].is_alphanumeric();
        if !at_boundary {
            continue;
        }
        for needle in needles {
            if i + needle.len() <= end && lowered[i..i + needle.len()] == needle[..] {
                score += 1;
            }
        }
    }
    score
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_short_content_returned_whole() {
        let snippet = extract_snippet(&terms(&["budget"]), "Kort tekst om budget.", 250, 50);
        assert_eq!(snippet, "Kort tekst om budget.");
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(extract_snippet(&terms(&["x"]), "", 250, 50), "");
        assert_eq!(extract_snippet(&terms(&["x"]), "   \n\t ", 250, 50), "");
    }

    #[test]
    fn test_whitespace_normalized() {
        let snippet = extract_snippet(&[], "et\n\nto   tre\tfire", 250, 50);
        assert_eq!(snippet, "et to tre fire");
    }

    #[test]
    fn test_picks_densest_window() {
        let filler = "Udvalget behandlede en række øvrige punkter på dagsordenen. ".repeat(10);
        let hot = "Budgettet for 2024 blev drøftet, og budget rammerne for budget perioden blev fastlagt.";
        let content = format!("{filler}{hot}");

        let snippet = extract_snippet(&terms(&["budget"]), &content, 120, 30);
        assert!(snippet.contains("budget") || snippet.contains("Budget"), "snippet was: {snippet}");
        // The dense window is in the tail, so the snippet is marked as
        // starting mid-text.
        assert!(snippet.starts_with("... "));
    }

    #[test]
    fn test_no_terms_returns_lead_with_ellipsis() {
        let content = "Første sætning i referatet. ".repeat(30);
        let snippet = extract_snippet(&[], &content, 100, 20);
        assert!(snippet.ends_with("..."));
        assert!(snippet.starts_with("Første sætning"));
    }

    #[test]
    fn test_terms_match_case_insensitively_at_word_starts() {
        let lowered: Vec<char> = "cykelstier og cykelsti i aarhus".chars().collect();
        let needles = vec!["cykelsti".to_lowercase().chars().collect::<Vec<char>>()];
        // Matches both "cykelstier" (prefix at boundary) and "cykelsti".
        assert_eq!(window_score(&lowered, 0, lowered.len(), &needles), 2);
        // "aarhus" does not contain a boundary-start match.
        let needles = vec!["hus".chars().collect::<Vec<char>>()];
        assert_eq!(window_score(&lowered, 0, lowered.len(), &needles), 0);
    }

    #[test]
    fn test_multibyte_content_does_not_panic() {
        let content = "æøå ".repeat(200);
        let snippet = extract_snippet(&terms(&["æøå"]), &content, 50, 10);
        assert!(!snippet.is_empty());
    }
}
