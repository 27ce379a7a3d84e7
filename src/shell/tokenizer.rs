//! Quote-aware tokeniser and chain/pipeline splitter.

/// A chain operator joining two pipeline segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    And,
    Or,
    Seq,
}

/// One `&&`/`||`/`;`-separated segment of an input line, itself a
/// `|`-separated pipeline of commands.
#[derive(Debug, Clone)]
pub struct ChainSegment {
    pub pipeline: Vec<Vec<String>>,
    /// The operator that follows this segment, `None` for the last one.
    pub next_op: Option<ChainOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Default,
    Single,
    Double,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a single command word sequence into tokens, honouring single and
/// double quoting plus backslash escapes. The apostrophe-inside-single-quote
/// heuristic treats a `'` immediately followed by a word character as a
/// literal character (so `don't` tokenises as one word) rather than the
/// closing quote.
pub fn tokenize(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut have_current = false;
    let mut state = QuoteState::Default;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            QuoteState::Default => match c {
                ' ' | '\t' | '\n' => {
                    if have_current {
                        tokens.push(std::mem::take(&mut current));
                        have_current = false;
                    }
                }
                '\'' => {
                    state = QuoteState::Single;
                    have_current = true;
                }
                '"' => {
                    state = QuoteState::Double;
                    have_current = true;
                }
                '\\' => {
                    if i + 1 < chars.len() {
                        current.push(chars[i + 1]);
                        have_current = true;
                        i += 1;
                    }
                }
                other => {
                    current.push(other);
                    have_current = true;
                }
            },
            QuoteState::Single => match c {
                '\'' => {
                    let next_is_word = chars.get(i + 1).copied().map(is_word_char).unwrap_or(false);
                    if next_is_word {
                        current.push('\'');
                    } else {
                        state = QuoteState::Default;
                    }
                }
                other => current.push(other),
            },
            QuoteState::Double => match c {
                '"' => state = QuoteState::Default,
                '\\' if i + 1 < chars.len() && matches!(chars[i + 1], '"' | '\\' | '$') => {
                    current.push(chars[i + 1]);
                    i += 1;
                }
                other => current.push(other),
            },
        }
        i += 1;
    }

    if have_current {
        tokens.push(current);
    }
    tokens
}

/// Splits `input` on top-level (outside quotes) `&&`, `||`, `;`, then
/// splits each segment's tokens on top-level `|` into a pipeline.
pub fn split_chain(input: &str) -> Vec<ChainSegment> {
    let chars: Vec<char> = input.chars().collect();
    let mut segments = Vec::new();
    let mut state = QuoteState::Default;
    let mut seg_start = 0;
    let mut i = 0;

    let mut push_segment = |raw: &str, op: Option<ChainOp>, out: &mut Vec<ChainSegment>| {
        let pipeline = split_pipeline(raw);
        if !pipeline.is_empty() {
            out.push(ChainSegment { pipeline, next_op: op });
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match state {
            QuoteState::Default => match c {
                '\'' => state = QuoteState::Single,
                '"' => state = QuoteState::Double,
                '&' if chars.get(i + 1) == Some(&'&') => {
                    let raw: String = chars[seg_start..i].iter().collect();
                    push_segment(&raw, Some(ChainOp::And), &mut segments);
                    i += 1;
                    seg_start = i + 1;
                }
                '|' if chars.get(i + 1) == Some(&'|') => {
                    let raw: String = chars[seg_start..i].iter().collect();
                    push_segment(&raw, Some(ChainOp::Or), &mut segments);
                    i += 1;
                    seg_start = i + 1;
                }
                ';' => {
                    let raw: String = chars[seg_start..i].iter().collect();
                    push_segment(&raw, Some(ChainOp::Seq), &mut segments);
                    seg_start = i + 1;
                }
                _ => {}
            },
            QuoteState::Single => {
                if c == '\'' {
                    let next_is_word = chars.get(i + 1).copied().map(is_word_char).unwrap_or(false);
                    if !next_is_word {
                        state = QuoteState::Default;
                    }
                }
            }
            QuoteState::Double => {
                if c == '"' {
                    state = QuoteState::Default;
                }
            }
        }
        i += 1;
    }

    let raw: String = chars[seg_start..].iter().collect();
    push_segment(&raw, None, &mut segments);
    segments
}

/// Splits a chain segment's raw text on top-level `|` into commands, each
/// tokenised.
fn split_pipeline(raw: &str) -> Vec<Vec<String>> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut state = QuoteState::Default;
    let mut start = 0;

    for (i, &c) in chars.iter().enumerate() {
        match state {
            QuoteState::Default => match c {
                '\'' => state = QuoteState::Single,
                '"' => state = QuoteState::Double,
                '|' => {
                    let part: String = chars[start..i].iter().collect();
                    parts.push(part);
                    start = i + 1;
                }
                _ => {}
            },
            QuoteState::Single => {
                if c == '\'' {
                    let next_is_word = chars.get(i + 1).copied().map(is_word_char).unwrap_or(false);
                    if !next_is_word {
                        state = QuoteState::Default;
                    }
                }
            }
            QuoteState::Double => {
                if c == '"' {
                    state = QuoteState::Default;
                }
            }
        }
    }
    parts.push(chars[start..].iter().collect());

    parts
        .into_iter()
        .map(|p| tokenize(p.trim()))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apostrophe_inside_word_stays_literal() {
        assert_eq!(tokenize("echo don't"), vec!["echo", "don't"]);
    }

    #[test]
    fn double_quotes_group_spaces() {
        assert_eq!(tokenize(r#"echo "a b" c"#), vec!["echo", "a b", "c"]);
    }

    #[test]
    fn chain_split_respects_operators() {
        let segs = split_chain("echo a && echo b || echo c; echo d");
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[0].next_op, Some(ChainOp::And));
        assert_eq!(segs[1].next_op, Some(ChainOp::Or));
        assert_eq!(segs[2].next_op, Some(ChainOp::Seq));
        assert_eq!(segs[3].next_op, None);
    }

    #[test]
    fn pipeline_split_within_segment() {
        let segs = split_chain("cat a | grep x | wc -l");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].pipeline.len(), 3);
    }
}
