//! Bracket, quote and edge-punctuation handling around a generation call.
//!
//! `strip` removes the decoration a game line carries (wrapping brackets,
//! unmatched quotes, leading and trailing punctuation) so the model only sees
//! the sentence itself. `restore` puts the source's decoration back onto the
//! generated text, discarding whatever edge punctuation the model chose.

/// Bracket and quote pairs, tested in this order.
pub const PAIRS: &[(char, char)] = &[
    ('「', '」'),
    ('『', '』'),
    ('（', '）'),
    ('"', '"'),
    ('(', ')'),
    ('“', '”'),
];

const EDGE_PUNCTUATION: &[char] = &[
    '，', '。', '？', '！', '、', '…', '—', '~', '～', ',', '.', '?', '!', ' ', '♡',
];

/// One piece of decoration removed by [`strip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedSymbol {
    /// The whole text was wrapped by `open` .. `close`
    Pair { open: char, close: char },
    /// An opening character at the start without a matching closer
    LeadingUnmatched(char),
    /// A closing character at the end without a matching opener
    TrailingUnmatched(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedText {
    /// Text with no wrapping symbols and no edge punctuation
    pub core: String,
    /// Removed symbols in strip order
    pub removed: Vec<RemovedSymbol>,
    /// Leading punctuation run, left to right
    pub leading: String,
    /// Trailing punctuation run, left to right
    pub trailing: String,
}

/// Characters that make up an edge punctuation run.
pub fn is_edge_char(c: char) -> bool {
    EDGE_PUNCTUATION.contains(&c) || PAIRS.iter().any(|&(open, close)| c == open || c == close)
}

pub fn strip(text: &str) -> StrippedText {
    let (unwrapped, removed) = strip_paired_symbols(text);
    let (leading, core, trailing) = split_edges(&unwrapped);

    StrippedText {
        core: core.to_string(),
        removed,
        leading: leading.to_string(),
        trailing: trailing.to_string(),
    }
}

pub fn restore(translated_core: &str, stripped: &StrippedText) -> String {
    let (_, core, _) = split_edges(translated_core);

    let mut text = String::with_capacity(
        stripped.leading.len() + core.len() + stripped.trailing.len() + stripped.removed.len() * 3,
    );
    text.push_str(&stripped.leading);
    text.push_str(core);
    text.push_str(&stripped.trailing);

    for symbol in stripped.removed.iter().rev() {
        text = match *symbol {
            RemovedSymbol::Pair { open, close } => format!("{}{}{}", open, text, close),
            RemovedSymbol::LeadingUnmatched(c) => format!("{}{}", c, text),
            RemovedSymbol::TrailingUnmatched(c) => {
                text.push(c);
                text
            }
        };
    }

    text
}

fn strip_paired_symbols(text: &str) -> (String, Vec<RemovedSymbol>) {
    let mut text = text.to_string();
    let mut removed = Vec::new();

    loop {
        if let Some((open, close)) = wrapping_pair(&text) {
            text = trim_one(&text, true, true);
            removed.push(RemovedSymbol::Pair { open, close });
            continue;
        }

        let mut changed = false;

        if let Some(open) = leading_unmatched(&text) {
            text = trim_one(&text, true, false);
            removed.push(RemovedSymbol::LeadingUnmatched(open));
            changed = true;
        }

        if let Some(close) = trailing_unmatched(&text) {
            text = trim_one(&text, false, true);
            removed.push(RemovedSymbol::TrailingUnmatched(close));
            changed = true;
        }

        if !changed {
            break;
        }
    }

    (text, removed)
}

fn wrapping_pair(text: &str) -> Option<(char, char)> {
    let mut chars = text.chars();
    let first = chars.next()?;
    // A lone character must not count as both ends of a pair.
    let last = chars.next_back()?;

    PAIRS
        .iter()
        .copied()
        .find(|&(open, close)| first == open && last == close)
}

fn leading_unmatched(text: &str) -> Option<char> {
    let first = text.chars().next()?;

    PAIRS.iter().find_map(|&(open, close)| {
        if first != open {
            return None;
        }
        let unmatched = if open == close {
            count(text, open) % 2 == 1
        } else {
            count(text, open) > count(text, close)
        };
        unmatched.then_some(open)
    })
}

fn trailing_unmatched(text: &str) -> Option<char> {
    let last = text.chars().next_back()?;

    PAIRS.iter().find_map(|&(open, close)| {
        if last != close {
            return None;
        }
        let unmatched = if open == close {
            count(text, close) % 2 == 1
        } else {
            count(text, close) > count(text, open)
        };
        unmatched.then_some(close)
    })
}

fn count(text: &str, c: char) -> usize {
    text.chars().filter(|&ch| ch == c).count()
}

fn trim_one(text: &str, front: bool, back: bool) -> String {
    let mut chars = text.chars();
    if front {
        chars.next();
    }
    if back {
        chars.next_back();
    }
    chars.as_str().to_string()
}

/// Split `text` into (leading run, core, trailing run). The trailing run is
/// taken from what remains after the leading run, so the two never overlap.
fn split_edges(text: &str) -> (&str, &str, &str) {
    let lead_end = text
        .char_indices()
        .find(|&(_, c)| !is_edge_char(c))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let (leading, rest) = text.split_at(lead_end);

    let core_end = rest
        .char_indices()
        .rev()
        .find(|&(_, c)| !is_edge_char(c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let (core, trailing) = rest.split_at(core_end);

    (leading, core, trailing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) -> String {
        let stripped = strip(text);
        restore(&stripped.core, &stripped)
    }

    #[test]
    fn test_nested_pairs_strip_outer_first() {
        let stripped = strip("「『x』」");
        assert_eq!(stripped.core, "x");
        assert_eq!(
            stripped.removed,
            vec![
                RemovedSymbol::Pair { open: '「', close: '」' },
                RemovedSymbol::Pair { open: '『', close: '』' },
            ]
        );
        assert_eq!(restore("x", &stripped), "「『x』」");
    }

    #[test]
    fn test_round_trip_on_untouched_core() {
        let samples = [
            "",
            "x",
            "\"",
            "「",
            "……",
            "「こんにちは。」",
            "『ふふっ♡』……",
            "\"Hello,\" she said.",
            "\"Hello",
            "World\"",
            "(（あ）",
            "あ」",
            "「あ」「い」",
            "  空白  ",
            "…ねえ、聞いてる？！",
            "“引用”。",
            "~～—！？",
        ];
        for sample in samples {
            assert_eq!(round_trip(sample), sample, "round trip failed for {:?}", sample);
        }
    }

    #[test]
    fn test_edge_punctuation_is_captured() {
        let stripped = strip("…ねえ、聞いてる？！");
        assert_eq!(stripped.leading, "…");
        assert_eq!(stripped.core, "ねえ、聞いてる");
        assert_eq!(stripped.trailing, "？！");
    }

    #[test]
    fn test_source_punctuation_overrides_model_output() {
        let stripped = strip("こんにちは。");
        assert_eq!(stripped.trailing, "。");
        assert_eq!(restore("你好！", &stripped), "你好。");
        assert_eq!(restore("……你好！！", &stripped), "你好。");
    }

    #[test]
    fn test_model_decoration_is_discarded_inside_pairs() {
        let stripped = strip("「おはよう！」");
        assert_eq!(stripped.core, "おはよう");
        assert_eq!(restore("「早上好。」", &stripped), "「早上好！」");
    }

    #[test]
    fn test_odd_double_quote_is_stripped_as_unmatched() {
        let stripped = strip("\"Hello");
        assert_eq!(stripped.removed, vec![RemovedSymbol::LeadingUnmatched('"')]);
        assert_eq!(stripped.core, "Hello");

        let stripped = strip("World\"");
        assert_eq!(stripped.removed, vec![RemovedSymbol::TrailingUnmatched('"')]);
        assert_eq!(stripped.core, "World");
    }

    #[test]
    fn test_even_double_quote_inside_text_is_kept() {
        let stripped = strip("\"Hi\" and \"bye\" ok");
        assert!(stripped.removed.is_empty());
        assert_eq!(stripped.leading, "\"");
        assert_eq!(stripped.core, "Hi\" and \"bye\" ok");
    }

    #[test]
    fn test_excess_opener_is_stripped() {
        let stripped = strip("（ちょっと（待って）ね");
        assert_eq!(stripped.removed, vec![RemovedSymbol::LeadingUnmatched('（')]);
        assert_eq!(stripped.core, "ちょっと（待って）ね");
    }

    #[test]
    fn test_lone_quote_is_not_consumed_twice() {
        let stripped = strip("\"");
        assert_eq!(stripped.removed, vec![RemovedSymbol::LeadingUnmatched('"')]);
        assert_eq!(stripped.core, "");
        assert_eq!(restore("", &stripped), "\"");
    }

    #[test]
    fn test_punctuation_only_text_is_not_duplicated() {
        let stripped = strip("……");
        assert_eq!(stripped.leading, "……");
        assert_eq!(stripped.trailing, "");
        assert_eq!(stripped.core, "");
    }

    #[test]
    fn test_restore_replays_unmatched_in_reverse() {
        let stripped = StrippedText {
            core: "x".to_string(),
            removed: vec![
                RemovedSymbol::Pair { open: '「', close: '」' },
                RemovedSymbol::LeadingUnmatched('（'),
                RemovedSymbol::TrailingUnmatched('"'),
            ],
            leading: String::new(),
            trailing: "。".to_string(),
        };
        assert_eq!(restore("y", &stripped), "「（y。\"」");
    }
}
