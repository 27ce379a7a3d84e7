//! Script Executor: shebang/comments/assignment/arithmetic/if/for/while/case.

use super::context::ShellContext;
use super::exec;

const MAX_WHILE_ITERATIONS: u32 = 100;

/// Runs `path` as a shell script, with `args` bound to `$1.. / $@ / $#`.
pub fn run_script(ctx: &mut ShellContext, path: &str, args: &[String]) -> (String, i32) {
    let content = match ctx.vfs.read_file(path, &ctx.cwd) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(e) => return (format!("{path}: {e}\n"), 1),
    };

    let mut positional: Vec<String> = vec![path.to_string()];
    positional.extend(args.iter().cloned());

    let lines: Vec<&str> = content.lines().collect();
    let mut out = String::new();
    let mut code = 0;
    run_block(ctx, &lines, &mut 0, lines.len(), &positional, &mut out, &mut code);
    (out, code)
}

fn substitute_positional(line: &str, positional: &[String]) -> String {
    let mut out = line.to_string();
    out = out.replace("$#", &(positional.len().saturating_sub(1)).to_string());
    out = out.replace("$@", &positional[1..].join(" "));
    out = out.replace("$$", "1");
    for i in (0..10).rev() {
        out = out.replace(&format!("${i}"), positional.get(i).cloned().unwrap_or_default().as_str());
    }
    out
}

/// Evaluates a simple `$((expr))` integer expression: `+ - * /` over
/// literals and environment variable names, left to right with no
/// operator precedence.
fn eval_arithmetic(ctx: &ShellContext, expr: &str) -> i64 {
    let operand = |token: &str| -> i64 {
        let token = token.trim_start_matches('$');
        token
            .parse()
            .ok()
            .or_else(|| ctx.env.get(token).and_then(|v| v.parse().ok()))
            .unwrap_or(0)
    };

    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.is_empty() {
        return operand(expr.trim());
    }
    let mut acc = operand(tokens[0]);
    let mut i = 1;
    while i + 1 < tokens.len() {
        let op = tokens[i];
        let rhs = operand(tokens[i + 1]);
        acc = match op {
            "+" => acc + rhs,
            "-" => acc - rhs,
            "*" => acc * rhs,
            "/" if rhs != 0 => acc / rhs,
            _ => acc,
        };
        i += 2;
    }
    acc
}

fn find_matching(lines: &[&str], start: usize, open: &str, close: &str) -> usize {
    let mut depth = 1;
    let mut i = start;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.starts_with(open) {
            depth += 1;
        } else if trimmed == close || trimmed.starts_with(close) {
            depth -= 1;
            if depth == 0 {
                return i;
            }
        }
        i += 1;
    }
    lines.len()
}

/// Runs `lines[*cursor..end]`, advancing `*cursor` past what it consumed.
fn run_block(
    ctx: &mut ShellContext,
    lines: &[&str],
    cursor: &mut usize,
    end: usize,
    positional: &[String],
    out: &mut String,
    code: &mut i32,
) {
    while *cursor < end {
        let raw = lines[*cursor].trim();
        *cursor += 1;

        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let line = substitute_positional(raw, positional);

        if let Some(rest) = line.strip_prefix("if ") {
            let cond = rest.trim_end_matches("; then").trim();
            let then_start = *cursor;
            let else_idx = find_branch(lines, then_start, end, "else");
            let fi_idx = find_branch(lines, then_start, end, "fi");
            let cond_ok = eval_condition(ctx, cond);

            if cond_ok {
                run_block(ctx, lines, &mut { then_start }, else_idx.min(fi_idx), positional, out, code);
            } else if else_idx < fi_idx {
                run_block(ctx, lines, &mut { else_idx + 1 }, fi_idx, positional, out, code);
            }
            *cursor = fi_idx + 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("for ") {
            if let Some((var, list)) = parse_for_header(rest) {
                let body_start = *cursor;
                let done_idx = find_matching(lines, body_start, "for ", "done");
                for item in list {
                    ctx.env.insert(var.clone(), item);
                    let mut body_cursor = body_start;
                    run_block(ctx, lines, &mut body_cursor, done_idx, positional, out, code);
                }
                *cursor = done_idx + 1;
                continue;
            }
        }

        if let Some(rest) = line.strip_prefix("while ") {
            let cond = rest.trim_end_matches("; do").trim().to_string();
            let body_start = *cursor;
            let done_idx = find_matching(lines, body_start, "while ", "done");
            let mut iterations = 0;
            while eval_condition(ctx, &cond) && iterations < MAX_WHILE_ITERATIONS {
                let mut body_cursor = body_start;
                run_block(ctx, lines, &mut body_cursor, done_idx, positional, out, code);
                iterations += 1;
            }
            *cursor = done_idx + 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("case ") {
            let subject = rest.split_whitespace().next().unwrap_or("").to_string();
            let esac_idx = find_matching(lines, *cursor, "case ", "esac");
            run_case(ctx, lines, *cursor, esac_idx, &subject, positional, out, code);
            *cursor = esac_idx + 1;
            continue;
        }

        if line.starts_with("#!") {
            continue;
        }

        if let Some((var, value)) = parse_arithmetic_assignment(&line) {
            let result = eval_arithmetic(ctx, &value);
            ctx.env.insert(var, result.to_string());
            continue;
        }

        if let Some((var, value)) = parse_plain_assignment(&line) {
            ctx.env.insert(var, value);
            continue;
        }

        let (seg_out, seg_code) = exec::execute_line(ctx, &line);
        out.push_str(&seg_out);
        *code = seg_code;
    }
}

fn find_branch(lines: &[&str], start: usize, limit: usize, marker: &str) -> usize {
    let mut depth = 1;
    let mut i = start;
    while i < limit {
        let trimmed = lines[i].trim();
        if trimmed.starts_with("if ") {
            depth += 1;
        } else if trimmed == "fi" {
            if depth == 1 && marker == "fi" {
                return i;
            }
            depth -= 1;
        } else if trimmed == "else" && depth == 1 && marker == "else" {
            return i;
        }
        i += 1;
    }
    limit
}

fn parse_for_header(rest: &str) -> Option<(String, Vec<String>)> {
    let (var, tail) = rest.split_once(" in ")?;
    let list_part = tail.trim_end_matches("; do").trim();
    Some((var.trim().to_string(), list_part.split_whitespace().map(|s| s.to_string()).collect()))
}

fn parse_plain_assignment(line: &str) -> Option<(String, String)> {
    let (var, value) = line.split_once('=')?;
    if var.is_empty() || !var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    if !var.chars().next()?.is_ascii_alphabetic() && var.chars().next()? != '_' {
        return None;
    }
    Some((var.to_string(), value.to_string()))
}

fn parse_arithmetic_assignment(line: &str) -> Option<(String, String)> {
    let (var, value) = line.split_once('=')?;
    let value = value.strip_prefix("$((")?.strip_suffix("))")?;
    Some((var.to_string(), value.to_string()))
}

fn eval_condition(ctx: &mut ShellContext, cond: &str) -> bool {
    let (_, code) = exec::execute_line(ctx, cond);
    code == 0
}

#[allow(clippy::too_many_arguments)]
fn run_case(
    ctx: &mut ShellContext,
    lines: &[&str],
    start: usize,
    end: usize,
    subject: &str,
    positional: &[String],
    out: &mut String,
    code: &mut i32,
) {
    let mut i = start;
    while i < end {
        let trimmed = lines[i].trim();
        if let Some(pattern) = trimmed.strip_suffix(')') {
            let matches = pattern.split('|').any(|p| p.trim() == subject || p.trim() == "*");
            let body_start = i + 1;
            let body_end = (body_start..end).find(|&j| lines[j].trim().ends_with(";;")).unwrap_or(end);
            if matches {
                let mut cursor = body_start;
                run_block(ctx, lines, &mut cursor, body_end + 1, positional, out, code);
                return;
            }
            i = body_end + 1;
            continue;
        }
        i += 1;
    }
}
