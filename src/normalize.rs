//! Source text normalization.
//!
//! Dictionary keys and runtime lookups go through the same function so that
//! text coming out of the host matches keys produced by external tooling
//! regardless of stray spacing, line breaks or ellipsis styles.

const NBSP: char = '\u{00A0}';

/// Normalizes a source string into its dictionary key form.
///
/// Applied in order:
/// 1. non-breaking spaces become regular spaces,
/// 2. whitespace runs of two or more characters collapse to one space,
/// 3. remaining single CR/LF characters are removed,
/// 4. runs of three or more dots collapse to `...`,
/// 5. leading and trailing whitespace is trimmed.
///
/// The result is a fixed point: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut chars = text.chars().map(|c| if c == NBSP { ' ' } else { c }).peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            let mut run = 1usize;
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
                run += 1;
            }
            if run >= 2 {
                collapsed.push(' ');
            } else if c != '\r' && c != '\n' {
                collapsed.push(c);
            }
        } else {
            collapsed.push(c);
        }
    }

    let mut out = String::with_capacity(collapsed.len());
    let mut dots = 0usize;
    for c in collapsed.chars() {
        if c == '.' {
            dots += 1;
            continue;
        }
        flush_dots(&mut out, dots);
        dots = 0;
        out.push(c);
    }
    flush_dots(&mut out, dots);

    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

#[inline]
fn flush_dots(out: &mut String, dots: usize) {
    match dots {
        0 => {}
        1 | 2 => out.extend(std::iter::repeat_n('.', dots)),
        _ => out.push_str("..."),
    }
}

/// Returns true when the text normalizes to nothing.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace())
}
