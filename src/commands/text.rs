//! Stdin/file text filters.

use crate::shell::context::ShellContext;

use super::CommandResult;

fn read_input(ctx: &ShellContext, args: &[String], stdin: Option<&str>) -> (String, Vec<String>) {
    let files: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
    if files.is_empty() {
        (stdin.unwrap_or_default().to_string(), Vec::new())
    } else {
        let mut content = String::new();
        for f in &files {
            match ctx.vfs.read_file(f, &ctx.cwd) {
                Ok(bytes) => content.push_str(&String::from_utf8_lossy(&bytes)),
                Err(_) => {}
            }
        }
        (content, files.into_iter().cloned().collect())
    }
}

/// A minimal basic-regex matcher: literal characters, `.` (any char), `*`
/// (zero or more of the previous atom), and `^`/`$` anchors. Falls back to
/// a literal substring search when the pattern cannot be compiled as a
/// regex.
fn basic_regex_is_match(pattern: &str, text: &str) -> bool {
    fn match_here(p: &[char], t: &[char]) -> bool {
        if p.is_empty() {
            return true;
        }
        if p.len() >= 2 && p[1] == '*' {
            return match_star(p[0], &p[2..], t);
        }
        if p[0] == '$' && p.len() == 1 {
            return t.is_empty();
        }
        if !t.is_empty() && (p[0] == '.' || p[0] == t[0]) {
            return match_here(&p[1..], &t[1..]);
        }
        false
    }
    fn match_star(c: char, p: &[char], t: &[char]) -> bool {
        let mut i = 0;
        loop {
            if match_here(p, &t[i..]) {
                return true;
            }
            if i < t.len() && (c == '.' || c == t[i]) {
                i += 1;
            } else {
                return false;
            }
        }
    }

    let pat: Vec<char> = pattern.chars().collect();
    if pat.first() == Some(&'^') {
        return match_here(&pat[1..], &text.chars().collect::<Vec<_>>());
    }
    let text_chars: Vec<char> = text.chars().collect();
    for start in 0..=text_chars.len() {
        if match_here(&pat, &text_chars[start..]) {
            return true;
        }
    }
    false
}

pub fn grep(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let mut ignore_case = false;
    let mut count_only = false;
    let mut recursive = false;
    let mut invert = false;
    let mut pattern = None;
    let mut files = Vec::new();

    for a in args {
        match a.as_str() {
            "-i" => ignore_case = true,
            "-c" => count_only = true,
            "-r" | "-R" => recursive = true,
            "-v" => invert = true,
            "-E" => {}
            other if pattern.is_none() => pattern = Some(other.to_string()),
            other => files.push(other.to_string()),
        }
    }
    let Some(pattern) = pattern else {
        return ("grep: missing pattern\n".to_string(), 2);
    };
    let needle = if ignore_case { pattern.to_lowercase() } else { pattern.clone() };

    let test_line = |line: &str| -> bool {
        let hay = if ignore_case { line.to_lowercase() } else { line.to_string() };
        let matched = basic_regex_is_match(&needle, &hay) || hay.contains(&needle);
        matched != invert
    };

    let mut out = String::new();
    let mut total_matches = 0usize;
    let mut any_matched = false;

    if files.is_empty() {
        let input = stdin.unwrap_or_default();
        let mut count = 0;
        for line in input.lines() {
            if test_line(line) {
                count += 1;
                any_matched = true;
                if !count_only {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        total_matches += count;
    } else {
        let mut all_files = Vec::new();
        if recursive {
            for f in &files {
                if let Ok(found) = ctx.vfs.find(f, &crate::vfs::FindCriteria { file_type: Some(crate::vfs::Type::File), ..Default::default() }, &ctx.cwd) {
                    all_files.extend(found);
                }
            }
        } else {
            all_files = files.clone();
        }

        for f in &all_files {
            let content = match ctx.vfs.read_file(f, &ctx.cwd) {
                Ok(b) => String::from_utf8_lossy(&b).to_string(),
                Err(_) => continue,
            };
            let mut count = 0;
            for line in content.lines() {
                if test_line(line) {
                    count += 1;
                    any_matched = true;
                    if !count_only {
                        if all_files.len() > 1 || recursive {
                            out.push_str(&format!("{f}:{line}\n"));
                        } else {
                            out.push_str(line);
                            out.push('\n');
                        }
                    }
                }
            }
            if count_only {
                out.push_str(&format!("{f}:{count}\n"));
            }
            total_matches += count;
        }
    }

    if count_only && files.is_empty() {
        out = format!("{total_matches}\n");
    }

    (out, if any_matched { 0 } else { 1 })
}

pub fn head(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let n = extract_count(args, "-n").unwrap_or(10);
    let files = strip_flag_value(args, "-n");
    let (content, _) = read_input(ctx, &files, stdin);
    let out: String = content.lines().take(n).map(|l| format!("{l}\n")).collect();
    (out, 0)
}

pub fn tail(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let n = extract_count(args, "-n").unwrap_or(10);
    let files = strip_flag_value(args, "-n");
    let (content, _) = read_input(ctx, &files, stdin);
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    let out: String = lines[start..].iter().map(|l| format!("{l}\n")).collect();
    (out, 0)
}

fn extract_count(args: &[String], flag: &str) -> Option<usize> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).and_then(|s| s.parse().ok());
        }
        if let Some(n) = args[i].strip_prefix(flag) {
            return n.parse().ok();
        }
        i += 1;
    }
    None
}

/// Drops `flag` and the value token immediately following it, leaving the
/// remaining arguments (file operands) untouched.
fn strip_flag_value(args: &[String], flag: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            i += 2;
            continue;
        }
        if args[i].starts_with(flag) && args[i].len() > flag.len() {
            i += 1;
            continue;
        }
        out.push(args[i].clone());
        i += 1;
    }
    out
}

pub fn wc(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let (content, _) = read_input(ctx, args, stdin);
    let lines = content.lines().count();
    let words = content.split_whitespace().count();
    let bytes = content.len();

    if args.iter().any(|a| a == "-l") {
        return (format!("{lines}\n"), 0);
    }
    if args.iter().any(|a| a == "-w") {
        return (format!("{words}\n"), 0);
    }
    if args.iter().any(|a| a == "-c") {
        return (format!("{bytes}\n"), 0);
    }
    (format!("{lines:>7} {words:>7} {bytes:>7}\n"), 0)
}

pub fn sort(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let reverse = args.iter().any(|a| a == "-r");
    let numeric = args.iter().any(|a| a == "-n");
    let unique = args.iter().any(|a| a == "-u");
    let (content, _) = read_input(ctx, args, stdin);
    let mut lines: Vec<&str> = content.lines().collect();

    if numeric {
        lines.sort_by(|a, b| {
            let na: f64 = a.trim().parse().unwrap_or(0.0);
            let nb: f64 = b.trim().parse().unwrap_or(0.0);
            na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        lines.sort();
    }
    if reverse {
        lines.reverse();
    }
    if unique {
        lines.dedup();
    }
    let out: String = lines.iter().map(|l| format!("{l}\n")).collect();
    (out, 0)
}

pub fn cut(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let mut delim = "\t".to_string();
    let mut field: Option<usize> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-d" => {
                delim = args.get(i + 1).cloned().unwrap_or(delim);
                i += 1;
            }
            "-f" => {
                field = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    let files = strip_flag_value(&strip_flag_value(args, "-d"), "-f");
    let (content, _) = read_input(ctx, &files, stdin);
    let Some(field) = field else {
        return ("cut: you must specify a list of fields\n".to_string(), 1);
    };
    let out: String = content
        .lines()
        .map(|line| line.split(delim.as_str()).nth(field.saturating_sub(1)).unwrap_or("").to_string() + "\n")
        .collect();
    (out, 0)
}

pub fn uniq(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let count = args.iter().any(|a| a == "-c");
    let (content, _) = read_input(ctx, args, stdin);
    let mut out = String::new();
    let mut last: Option<&str> = None;
    let mut run = 0usize;
    for line in content.lines() {
        if Some(line) == last {
            run += 1;
        } else {
            if let Some(prev) = last {
                if count {
                    out.push_str(&format!("{run:>7} {prev}\n"));
                } else {
                    out.push_str(&format!("{prev}\n"));
                }
            }
            last = Some(line);
            run = 1;
        }
    }
    if let Some(prev) = last {
        if count {
            out.push_str(&format!("{run:>7} {prev}\n"));
        } else {
            out.push_str(&format!("{prev}\n"));
        }
    }
    (out, 0)
}

pub fn tr(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
    let delete = args.iter().any(|a| a == "-d");
    let (content, _) = read_input(ctx, &[], stdin);

    if delete {
        let Some(set) = positional.first() else {
            return ("tr: missing operand\n".to_string(), 1);
        };
        let set: std::collections::HashSet<char> = set.chars().collect();
        return (content.chars().filter(|c| !set.contains(c)).collect(), 0);
    }

    let (Some(from), Some(to)) = (positional.first(), positional.get(1)) else {
        return ("tr: missing operand\n".to_string(), 1);
    };
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    let out: String = content
        .chars()
        .map(|c| match from.iter().position(|&f| f == c) {
            Some(idx) => *to.get(idx).or(to.last()).unwrap_or(&c),
            None => c,
        })
        .collect();
    (out, 0)
}

/// A reduced `awk`: `BEGIN`/`END` blocks, `print`, field references (`$1`),
/// simple numeric field comparisons, and `+=` accumulation.
pub fn awk(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let Some(program) = args.first() else {
        return ("awk: missing program\n".to_string(), 1);
    };
    let (content, _) = read_input(ctx, &args[1..], stdin);

    let mut begin = Vec::new();
    let mut main_block: Vec<(Option<String>, String)> = Vec::new();
    let mut end = Vec::new();
    let mut rest = program.trim();
    loop {
        rest = rest.trim();
        if let Some(body) = rest.strip_prefix("BEGIN") {
            let (block, tail) = take_braced(body.trim_start());
            begin.push(block);
            rest = tail;
        } else if let Some(body) = rest.strip_prefix("END") {
            let (block, tail) = take_braced(body.trim_start());
            end.push(block);
            rest = tail;
        } else if rest.starts_with('{') {
            let (block, tail) = take_braced(rest);
            main_block.push((None, block));
            rest = tail;
        } else if let Some(brace) = rest.find('{') {
            // A pattern guard before the action, e.g. `$2 > 30 { print }`.
            let condition = rest[..brace].trim().to_string();
            let (block, tail) = take_braced(&rest[brace..]);
            main_block.push((Some(condition), block));
            rest = tail;
        } else {
            break;
        }
    }

    let mut vars: std::collections::BTreeMap<String, f64> = std::collections::BTreeMap::new();
    let mut out = String::new();

    for block in &begin {
        run_awk_block(block, &[], &mut vars, &mut out);
    }
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        for (condition, block) in &main_block {
            let selected = match condition {
                Some(cond) => awk_condition_holds(cond, &fields),
                None => true,
            };
            if selected {
                run_awk_block(block, &fields, &mut vars, &mut out);
            }
        }
    }
    for block in &end {
        run_awk_block(block, &[], &mut vars, &mut out);
    }
    (out, 0)
}

/// Evaluates a `$N op value` comparison; an unparseable condition selects
/// nothing.
fn awk_condition_holds(cond: &str, fields: &[&str]) -> bool {
    for op in ["==", "!=", ">=", "<=", ">", "<"] {
        if let Some((lhs, rhs)) = cond.split_once(op) {
            let lhs = lhs.trim();
            let rhs = rhs.trim();
            if let (Some(left), Ok(right)) = (field_value(fields, lhs), rhs.parse::<f64>()) {
                return match op {
                    "==" => left == right,
                    "!=" => left != right,
                    ">=" => left >= right,
                    "<=" => left <= right,
                    ">" => left > right,
                    "<" => left < right,
                    _ => false,
                };
            }
            // String comparison on the raw field.
            let raw = field_str(fields, lhs).unwrap_or("");
            let rhs = rhs.trim_matches('"');
            return match op {
                "==" => raw == rhs,
                "!=" => raw != rhs,
                _ => false,
            };
        }
    }
    false
}

fn take_braced(s: &str) -> (String, &str) {
    let s = s.trim_start();
    if !s.starts_with('{') {
        return (String::new(), s);
    }
    let mut depth = 0;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return (s[1..i].to_string(), &s[i + 1..]);
                }
            }
            _ => {}
        }
    }
    (s[1..].to_string(), "")
}

fn field_value(fields: &[&str], spec: &str) -> Option<f64> {
    let idx: usize = spec.strip_prefix('$')?.parse().ok()?;
    if idx == 0 {
        return None;
    }
    fields.get(idx - 1)?.parse().ok()
}

fn field_str<'a>(fields: &[&'a str], spec: &str) -> Option<&'a str> {
    let idx: usize = spec.strip_prefix('$')?.parse().ok()?;
    fields.get(idx.wrapping_sub(1)).copied()
}

fn run_awk_block(
    block: &str,
    fields: &[&str],
    vars: &mut std::collections::BTreeMap<String, f64>,
    out: &mut String,
) {
    for stmt in block.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        if let Some(rest) = stmt.strip_prefix("print") {
            let rest = rest.trim();
            if rest.is_empty() {
                out.push_str(&fields.join(" "));
            } else {
                let parts: Vec<String> = rest
                    .split(',')
                    .map(|p| {
                        let p = p.trim();
                        if p.starts_with('$') {
                            field_str(fields, p).unwrap_or("").to_string()
                        } else if let Some(v) = vars.get(p) {
                            format_awk_number(*v)
                        } else {
                            p.trim_matches('"').to_string()
                        }
                    })
                    .collect();
                out.push_str(&parts.join(" "));
            }
            out.push('\n');
        } else if let Some((lhs, rhs)) = stmt.split_once("+=") {
            let lhs = lhs.trim();
            let delta = field_value(fields, rhs.trim()).unwrap_or_else(|| rhs.trim().parse().unwrap_or(0.0));
            *vars.entry(lhs.to_string()).or_insert(0.0) += delta;
        } else if let Some((lhs, rhs)) = stmt.split_once('=') {
            let lhs = lhs.trim();
            let value = field_value(fields, rhs.trim()).unwrap_or_else(|| rhs.trim().parse().unwrap_or(0.0));
            vars.insert(lhs.to_string(), value);
        }
    }
}

fn format_awk_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_regex_handles_anchors_and_star() {
        assert!(basic_regex_is_match("^ab*c", "abbbc"));
        assert!(basic_regex_is_match("a.c$", "xabc"));
        assert!(!basic_regex_is_match("^b", "abc"));
    }

    #[test]
    fn awk_condition_compares_numeric_fields() {
        let fields = ["bob", "42"];
        assert!(awk_condition_holds("$2 > 30", &fields));
        assert!(!awk_condition_holds("$2 < 30", &fields));
        assert!(awk_condition_holds("$1 == \"bob\"", &fields));
        assert!(!awk_condition_holds("garbage", &fields));
    }

    #[test]
    fn take_braced_returns_body_and_tail() {
        let (block, tail) = take_braced("{ print $1 } END { print }");
        assert_eq!(block.trim(), "print $1");
        assert_eq!(tail.trim(), "END { print }");
    }
}
