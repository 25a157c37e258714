//! Splitting raw documents into passages for loading.
//!
//! Paragraphs (separated by blank lines) are the natural unit. Short
//! neighbouring paragraphs are merged up to `max_chars`; paragraphs longer
//! than that are broken at word boundaries.

use unicode_segmentation::UnicodeSegmentation;

/// Default passage size in characters.
pub const DEFAULT_PASSAGE_CHARS: usize = 1000;

/// Split `text` into passages of at most `max_chars` characters.
///
/// A single word longer than `max_chars` is cut on grapheme boundaries.
pub fn split_passages(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = text.replace("\r\n", "\n");

    let mut pieces = Vec::new();
    for paragraph in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() <= max_chars {
            pieces.push(paragraph.to_string());
        } else {
            pieces.extend(split_long(paragraph, max_chars));
        }
    }

    merge_small(pieces, max_chars)
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            out.extend(cut_graphemes(word, max_chars));
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max_chars {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn cut_graphemes(word: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for g in word.graphemes(true) {
        let g_len = g.chars().count();
        if current_len + g_len > max_chars && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(g);
        current_len += g_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn merge_small(pieces: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();

    for piece in pieces {
        if let Some(last) = merged.last_mut() {
            if last.chars().count() + 2 + piece.chars().count() <= max_chars {
                last.push_str("\n\n");
                last.push_str(&piece);
                continue;
            }
        }
        merged.push(piece);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_paragraphs_are_merged() {
        let text = "Returns are accepted within 30 days.\n\nRefunds go to the original card.";
        let passages = split_passages(text, 1000);
        assert_eq!(passages.len(), 1);
        assert!(passages[0].contains("\n\nRefunds"));
    }

    #[test]
    fn test_paragraphs_split_when_over_limit() {
        let text = "first paragraph here\n\nsecond paragraph here";
        let passages = split_passages(text, 25);
        assert_eq!(passages, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_long_paragraph_breaks_on_words() {
        let text = "alpha beta gamma delta epsilon";
        let passages = split_passages(text, 12);
        assert_eq!(passages, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(passages.iter().all(|p| p.chars().count() <= 12));
    }

    #[test]
    fn test_oversized_word_cut_on_graphemes() {
        let passages = split_passages("ééééé", 2);
        assert_eq!(passages, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        assert!(split_passages("  \n\n \r\n\r\n ", 100).is_empty());
    }
}
