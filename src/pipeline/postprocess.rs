//! Post-processing: deterministic cleanup of recognizer LaTeX output.
//!
//! Recognizers disagree on presentation. Pix2Text wraps formulas in
//! `$$ … $$`, command-line models sometimes print a fenced block, and web
//! APIs occasionally leak zero-width characters from their JSON encoders.
//! The HTTP client wants the bare formula, so every strategy's raw output is
//! passed through [`clean_latex`] before the pipeline judges it.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the fence regex sees `\n` only;
//! fences are stripped before math delimiters because a fence may contain
//! a delimited formula; whitespace is collapsed last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw recognizer output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer code fences (```` ```latex ```` … ```` ``` ````)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Strip one pair of outer math delimiters (`$$`, `$`, `\[ \]`, `\( \)`)
/// 5. Trim each line, drop blank lines, collapse runs of spaces and tabs
pub fn clean_latex(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = remove_invisible_chars(&s);
    let s = strip_math_delimiters(s.trim());
    collapse_whitespace(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:latex|tex|math)?\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Strip outer math delimiters ─────────────────────────────────────

const DELIMITERS: [(&str, &str); 4] = [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")];

fn strip_math_delimiters(input: &str) -> String {
    for (open, close) in DELIMITERS {
        if input.len() >= open.len() + close.len()
            && input.starts_with(open)
            && input.ends_with(close)
        {
            let inner = &input[open.len()..input.len() - close.len()];
            // `$a$ + $b$` or `$$a$$ + $$b$$` is two formulas, not one wrapped formula.
            if inner.contains(open) || inner.contains(close) {
                continue;
            }
            return inner.trim().to_string();
        }
    }
    input.to_string()
}

// ── Rule 5: Collapse whitespace ─────────────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn collapse_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| RE_SPACES.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```latex\n\\frac{a}{b}\n```";
        assert_eq!(strip_code_fences(input), "\\frac{a}{b}");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("x^2"), "x^2");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "x\u{200B}^2\u{FEFF}";
        assert_eq!(remove_invisible_chars(input), "x^2");
    }

    #[test]
    fn test_display_delimiters() {
        assert_eq!(strip_math_delimiters("$$ E = mc^2 $$"), "E = mc^2");
        assert_eq!(strip_math_delimiters("\\[x+1\\]"), "x+1");
        assert_eq!(strip_math_delimiters("\\(y\\)"), "y");
    }

    #[test]
    fn test_inline_delimiters() {
        assert_eq!(strip_math_delimiters("$a+b$"), "a+b");
        assert_eq!(strip_math_delimiters("$a$ + $b$"), "$a$ + $b$");
    }

    #[test]
    fn test_adjacent_display_formulas_untouched() {
        assert_eq!(strip_math_delimiters("$$a$$ + $$b$$"), "$$a$$ + $$b$$");
        assert_eq!(strip_math_delimiters("\\[a\\] = \\[b\\]"), "\\[a\\] = \\[b\\]");
        assert_eq!(clean_latex("$$a$$ + $$b$$"), "$$a$$ + $$b$$");
    }

    #[test]
    fn test_lone_dollar_untouched() {
        assert_eq!(strip_math_delimiters("$"), "$");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("  a  +\t\tb \n\n  = c  "),
            "a + b\n= c"
        );
    }

    #[test]
    fn test_clean_latex_full_pipeline() {
        let input = "```latex\r\n$$ \\int_0^1   x\u{200B}\\,dx $$\r\n```";
        assert_eq!(clean_latex(input), "\\int_0^1 x\\,dx");
    }

    #[test]
    fn test_clean_latex_empty() {
        assert_eq!(clean_latex("  \n \r\n"), "");
    }
}
