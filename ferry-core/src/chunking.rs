// ABOUTME: Safe splitting of final text into message-sized chunks.
// ABOUTME: Prefers paragraph, then line, then word boundaries past the window midpoint.

/// Room kept free in each chunk for the part/continuation annotations
pub const ANNOTATION_RESERVE: usize = 40;

const CONTINUED_SUFFIX: &str = "\n\n_(continued...)_";

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Lengths are counted in `char`s, so a split never lands inside a
/// multi-byte character. Concatenating the chunks gives back `text`.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    loop {
        if rest.chars().count() <= max_chars {
            if chunks.is_empty() || !rest.is_empty() {
                chunks.push(rest.to_string());
            }
            return chunks;
        }
        let (head, tail) = rest.split_at(split_point(rest, max_chars));
        chunks.push(head.to_string());
        rest = tail;
    }
}

/// Byte offset to cut at; `text` is known to be longer than `max_chars`
fn split_point(text: &str, max_chars: usize) -> usize {
    let window_end = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let window = &text[..window_end];
    let midpoint = max_chars / 2;

    for separator in ["\n\n", "\n", " "] {
        if let Some(pos) = window.rfind(separator) {
            if window[..pos].chars().count() > midpoint {
                return pos + separator.len();
            }
        }
    }

    window_end
}

/// Label parts of a multi-message answer so readers can follow the sequence.
///
/// A single chunk is returned untouched.
pub fn annotate_parts(chunks: Vec<String>) -> Vec<String> {
    let total = chunks.len();
    if total <= 1 {
        return chunks;
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let part = i + 1;
            if part == 1 {
                format!("{}{}", chunk, CONTINUED_SUFFIX)
            } else if part == total {
                format!("_(part {})_\n\n{}", part, chunk)
            } else {
                format!("_(part {})_\n\n{}{}", part, chunk, CONTINUED_SUFFIX)
            }
        })
        .collect()
}
