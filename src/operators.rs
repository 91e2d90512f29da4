/// Single-line textual mutation operators.
///
/// Each operator rewrites the first targeted token on one line. String literals
/// and comments are never touched.
use similar::TextDiff;

use crate::mutants::{MutationRecord, OperatorKind};
use crate::parser;

pub struct MutationOp {
    pub original: &'static str,
    pub replacement: &'static str,
}

pub const ARITHMETIC: &[MutationOp] = &[
    MutationOp { original: "+", replacement: "-" },
    MutationOp { original: "-", replacement: "+" },
    MutationOp { original: "*", replacement: "/" },
    MutationOp { original: "/", replacement: "*" },
];

pub const COMPARISON: &[MutationOp] = &[
    MutationOp { original: "==", replacement: "!=" },
    MutationOp { original: ">", replacement: "<" },
    MutationOp { original: "<", replacement: ">=" },
];

// Multi-character tokens containing a targeted character that must be left alone.
const ARITHMETIC_GUARDS: &[&str] = &["**", "//", "->"];
const COMPARISON_GUARDS: &[&str] = &[">=", "<=", "!=", ">>", "<<", "->"];

/// Mutate one line. Returns the line unchanged when no targeted token is present.
pub fn mutate_line(line: &str, kind: OperatorKind) -> String {
    match kind {
        OperatorKind::ArithmeticReplace => replace_first(line, ARITHMETIC, ARITHMETIC_GUARDS),
        OperatorKind::ComparisonReplace => replace_first(line, COMPARISON, COMPARISON_GUARDS),
        OperatorKind::ConstantReplace => flip_constant(line),
    }
}

fn replace_first(line: &str, table: &[MutationOp], guards: &[&str]) -> String {
    let mut found = None;
    scan_code(line, |bytes, i| {
        if let Some(guard) = guards.iter().find(|g| bytes[i..].starts_with(g.as_bytes())) {
            return Scan::Skip(guard.len());
        }
        if let Some(op) = table.iter().find(|op| bytes[i..].starts_with(op.original.as_bytes())) {
            found = Some((i, op));
            return Scan::Stop;
        }
        Scan::Skip(1)
    });

    match found {
        Some((i, op)) => format!(
            "{}{}{}",
            &line[..i],
            op.replacement,
            &line[i + op.original.len()..]
        ),
        None => line.to_string(),
    }
}

fn flip_constant(line: &str) -> String {
    let mut boolean = None;
    scan_code(line, |bytes, i| {
        if i > 0 && is_ident_byte(bytes[i - 1]) {
            return Scan::Skip(1);
        }
        for (word, replacement) in [("True", "False"), ("False", "True")] {
            let end = i + word.len();
            if bytes[i..].starts_with(word.as_bytes())
                && bytes.get(end).is_none_or(|b| !is_ident_byte(*b))
            {
                boolean = Some((i, word.len(), replacement));
                return Scan::Stop;
            }
        }
        Scan::Skip(1)
    });

    if let Some((i, len, replacement)) = boolean {
        return format!("{}{}{}", &line[..i], replacement, &line[i + len..]);
    }

    // No boolean literal: swap 0 and 1 in every numeric literal.
    let mut positions = Vec::new();
    scan_code(line, |bytes, i| {
        let starts_literal = bytes[i].is_ascii_digit() && (i == 0 || !is_ident_byte(bytes[i - 1]));
        if !starts_literal {
            return Scan::Skip(1);
        }
        let mut end = i;
        while end < bytes.len() && (is_ident_byte(bytes[end]) || bytes[end] == b'.') {
            end += 1;
        }
        positions.extend((i..end).filter(|&j| bytes[j] == b'0' || bytes[j] == b'1'));
        Scan::Skip(end - i)
    });

    let mut out = line.as_bytes().to_vec();
    for j in positions {
        out[j] = if out[j] == b'0' { b'1' } else { b'0' };
    }
    // Only ASCII digits were swapped, so the buffer is still valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|_| line.to_string())
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

enum Scan {
    Skip(usize),
    Stop,
}

/// Visit byte offsets of `line` outside string literals and comments.
fn scan_code(line: &str, mut visit: impl FnMut(&[u8], usize) -> Scan) {
    let bytes = line.as_bytes();
    let mut quote: Option<&'static [u8]> = None;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(q) = quote {
            if bytes[i] == b'\\' {
                i += 2;
            } else if bytes[i..].starts_with(q) {
                i += q.len();
                quote = None;
            } else {
                i += 1;
            }
            continue;
        }

        let opened = [&b"\"\"\""[..], b"'''", b"\"", b"'"]
            .into_iter()
            .find(|q| bytes[i..].starts_with(q));
        if let Some(q) = opened {
            quote = Some(q);
            i += q.len();
            continue;
        }
        if bytes[i] == b'#' {
            break;
        }

        match visit(bytes, i) {
            Scan::Skip(n) => i += n.max(1),
            Scan::Stop => break,
        }
    }
}

/// Unified line diff with `original`/`mutated` headers; empty for identical input.
pub fn unified_diff(original: &str, mutated: &str) -> String {
    if original == mutated {
        return String::new();
    }
    TextDiff::from_lines(original, mutated)
        .unified_diff()
        .context_radius(3)
        .header("original", "mutated")
        .to_string()
}

/// Apply `kind` to 1-based `line_number` of `source`, returning the whole
/// mutated text. `None` only when the line does not exist.
pub fn apply_mutation(
    source: &str,
    module_path: &str,
    line_number: usize,
    kind: OperatorKind,
) -> Option<(String, MutationRecord)> {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let target = *lines.get(line_number.checked_sub(1)?)?;

    let content = target.trim_end_matches(['\n', '\r']);
    let ending = &target[content.len()..];
    let mutated_line = mutate_line(content, kind);

    let mut mutated = String::with_capacity(source.len() + 4);
    for (idx, line) in lines.iter().enumerate() {
        if idx + 1 == line_number {
            mutated.push_str(&mutated_line);
            mutated.push_str(ending);
        } else {
            mutated.push_str(line);
        }
    }

    let record = MutationRecord {
        source_module_path: module_path.to_string(),
        line_number,
        operator_kind: kind,
        original_text: content.to_string(),
        mutated_text: mutated_line,
        diff: unified_diff(source, &mutated),
    };
    Some((mutated, record))
}

/// Pick the first mutation that actually changes a line: parser candidates
/// first, then a plain scan of every code line with every operator.
pub fn select_mutation(source: &str, module_path: &str) -> Option<(String, MutationRecord)> {
    for candidate in parser::mutation_candidates(source) {
        if let Some((mutated, record)) = apply_mutation(source, module_path, candidate.line, candidate.kind) {
            if record.is_applied() {
                return Some((mutated, record));
            }
        }
    }

    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for kind in OperatorKind::ALL {
            if let Some((mutated, record)) = apply_mutation(source, module_path, idx + 1, kind) {
                if record.is_applied() {
                    return Some((mutated, record));
                }
            }
        }
    }

    tracing::debug!(module = module_path, "no applicable mutation");
    None
}
