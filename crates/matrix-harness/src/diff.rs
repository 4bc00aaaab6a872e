//! Diff rendering for captured streams.

use std::fmt::Write;

/// Render a line diff between expected and observed stream bytes.
///
/// Bytes are decoded lossily; the exact values are reported separately by
/// [`escape_bytes`].
#[must_use]
pub fn render_diff(expected: &[u8], observed: &[u8]) -> String {
    if expected == observed {
        return String::from("[identical]");
    }

    let expected = String::from_utf8_lossy(expected);
    let observed = String::from_utf8_lossy(observed);
    let expected: Vec<&str> = expected.lines().collect();
    let observed: Vec<&str> = observed.lines().collect();

    let mut out = String::new();
    out.push_str("--- expected\n");
    out.push_str("+++ observed\n");
    for i in 0..expected.len().max(observed.len()) {
        let (e, o) = (expected.get(i), observed.get(i));
        if e == o {
            continue;
        }
        let _ = writeln!(out, "@@ line {} @@", i + 1);
        if let Some(e) = e {
            let _ = writeln!(out, "-{e}");
        }
        if let Some(o) = o {
            let _ = writeln!(out, "+{o}");
        }
    }
    if out.lines().count() == 2 {
        // Same lines, different bytes: line endings or a trailing newline.
        out.push_str("@@ line endings or trailing newline differ @@\n");
    }
    out
}

/// Byte-string literal rendering (`b"..."`) that survives non-UTF-8 output.
#[must_use]
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b\"");
    for &b in bytes {
        out.extend(std::ascii::escape_default(b).map(char::from));
    }
    out.push('"');
    out
}
