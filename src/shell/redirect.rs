//! Redirection parsing within a single pipeline stage.

#[derive(Debug, Clone, Default)]
pub struct Redirections {
    pub stdout_file: Option<(String, bool)>,
    pub stderr_file: Option<(String, bool)>,
    pub stderr_to_stdout: bool,
    pub stdin_file: Option<String>,
}

/// Strips redirection tokens (`>`, `>>`, `2>`, `2>>`, `<`, `2>&1`) from
/// `tokens`, returning the remaining command words and the parsed
/// redirections. Targets may be attached (`2>/dev/null`) or the following
/// token. A trailing bare `&` is discarded (no background job modelling).
pub fn parse_redirections(tokens: &[String]) -> (Vec<String>, Redirections) {
    let mut words = Vec::new();
    let mut redir = Redirections::default();
    let mut i = 0;

    while i < tokens.len() {
        let tok = tokens[i].as_str();

        if tok == "&" && i + 1 == tokens.len() {
            i += 1;
            continue;
        }
        if tok == "2>&1" {
            redir.stderr_to_stdout = true;
            i += 1;
            continue;
        }
        if let Some(rest) = tok.strip_prefix("2>>") {
            let (target, advance) = take_target(rest, tokens, i);
            redir.stderr_file = Some((target, true));
            i += advance;
            continue;
        }
        if let Some(rest) = tok.strip_prefix("2>") {
            let (target, advance) = take_target(rest, tokens, i);
            redir.stderr_file = Some((target, false));
            i += advance;
            continue;
        }
        if let Some(rest) = tok.strip_prefix(">>") {
            let (target, advance) = take_target(rest, tokens, i);
            redir.stdout_file = Some((target, true));
            i += advance;
            continue;
        }
        if let Some(rest) = tok.strip_prefix('>') {
            let (target, advance) = take_target(rest, tokens, i);
            redir.stdout_file = Some((target, false));
            i += advance;
            continue;
        }
        if let Some(rest) = tok.strip_prefix('<') {
            let (target, advance) = take_target(rest, tokens, i);
            redir.stdin_file = Some(target);
            i += advance;
            continue;
        }

        words.push(tok.to_string());
        i += 1;
    }

    (words, redir)
}

fn take_target(attached: &str, tokens: &[String], i: usize) -> (String, usize) {
    if !attached.is_empty() {
        (attached.to_string(), 1)
    } else {
        (tokens.get(i + 1).cloned().unwrap_or_default(), 2)
    }
}

/// Strips ANSI SGR escape sequences (`ESC [ ... m`) from `text`, emulating
/// the real terminal `isatty` check when piping downstream. Other CSI
/// sequences pass through untouched.
pub fn strip_sgr(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\u{1b}' && chars.get(i + 1) == Some(&'[') {
            let mut j = i + 2;
            while j < chars.len() && !chars[j].is_ascii_alphabetic() {
                j += 1;
            }
            if j < chars.len() && chars[j] == 'm' {
                i = j + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attached_and_separate_targets() {
        let (words, redir) = parse_redirections(&["echo".into(), "hi".into(), ">".into(), "/tmp/a".into()]);
        assert_eq!(words, vec!["echo", "hi"]);
        assert_eq!(redir.stdout_file, Some(("/tmp/a".to_string(), false)));

        let (_, redir2) = parse_redirections(&["cmd".into(), "2>/dev/null".into()]);
        assert_eq!(redir2.stderr_file, Some(("/dev/null".to_string(), false)));
    }

    #[test]
    fn strips_sgr_but_keeps_text() {
        assert_eq!(strip_sgr("\u{1b}[31mred\u{1b}[0m plain"), "red plain");
    }
}
