//! Whitespace/comment-insensitive content hashing for C/C++ sources.
//!
//! Preprocessor lines are trimmed but kept verbatim, block and line
//! comments are discarded but newline counts inside block comments are
//! preserved, string/char literals are kept verbatim with escape
//! awareness, and runs of spaces/tabs collapse to a single space only
//! between two identifier characters.

use std::fmt;
use std::fs;
use std::path::Path;

use blake2::Blake2b;
use blake2::digest::{Digest, consts::U8};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::repo_path::RepoPath;

/// 16-hex-char encoding of a 64-bit BLAKE2b digest over normalized source
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash an in-memory byte buffer, applying the normalization rules.
    pub fn of_normalized_source(bytes: &[u8]) -> Self {
        let normalized = normalize_source(bytes);
        Self(hash_bytes(&normalized))
    }

    /// Hash an arbitrary byte buffer with no normalization (used for the
    /// dep-hash over `"path:hash"` strings, not for source content).
    pub fn of_raw(bytes: &[u8]) -> Self {
        Self(hash_bytes(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Blake2b::<U8>::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a source file on disk via [`RepoPath`].
pub fn hash_cpp_source(repo_path: &RepoPath, repo_root: &Path) -> Result<ContentHash> {
    let abs = repo_path.to_absolute(repo_root);
    let bytes = fs::read(&abs).map_err(|e| CacheError::io(format!("read {abs:?}"), e))?;
    Ok(ContentHash::of_normalized_source(&bytes))
}

fn is_ident(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Normalize C/C++ source bytes per the rules documented on the module.
///
/// Operates over the whole buffer at once (lossily decoded as UTF-8, so
/// invalid sequences are replaced rather than rejected) rather than a line
/// iterator; string/char literals and block comments may still span raw
/// newlines, handled by scanning forward past them.
pub fn normalize_source(bytes: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(bytes);
    let buf = text.as_bytes();
    let len = buf.len();

    let mut out = Vec::with_capacity(len);
    let mut i = 0usize;

    while i < len {
        let line_start = i;
        let line_end = find_line_end(buf, i);
        let raw_line = &buf[line_start..line_end];
        let stripped = trim_ascii_ws(raw_line);

        if stripped.first() == Some(&b'#') {
            out.extend_from_slice(stripped);
            out.push(b'\n');
            i = skip_newline(buf, line_end);
            continue;
        }

        let mut line_out: Vec<u8> = Vec::with_capacity(stripped.len());
        // `j` indexes into the full buffer starting just past this line's
        // leading whitespace (trailing whitespace is trimmed separately by
        // `trim_trailing_ws_inplace` below, after tokenizing, so it must
        // not be subtracted here too).
        let leading_ws = raw_line
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(raw_line.len());
        let mut j = line_start + leading_ws;

        loop {
            if j >= len {
                break;
            }
            // Stop scanning this logical line once we reach its own
            // newline, unless we're in the middle of a token that was
            // told to keep consuming (those advance `j` past the
            // newline themselves via the skip helpers below).
            if buf[j] == b'\r' && j + 1 < len && buf[j + 1] == b'\n' {
                j += 1;
                continue;
            }
            if buf[j] == b'\n' {
                break;
            }

            if buf[j..].starts_with(b"/*") {
                line_out.extend_from_slice(b"/*");
                let (newlines, after) = skip_block_comment(buf, j + 2);
                for _ in 0..newlines {
                    line_out.push(b'\n');
                }
                line_out.extend_from_slice(b"*/");
                j = after;
                continue;
            }

            if buf[j..].starts_with(b"//") {
                line_out.extend_from_slice(b"//");
                j = find_line_end(buf, j);
                break;
            }

            if buf[j] == b'"' || buf[j] == b'\'' {
                let delim = buf[j];
                line_out.push(delim);
                let (body, after) = skip_literal(buf, j + 1, delim);
                line_out.extend_from_slice(&body);
                line_out.push(delim);
                j = after;
                continue;
            }

            if buf[j] == b' ' || buf[j] == b'\t' {
                let mut k = j;
                while k < len && (buf[k] == b' ' || buf[k] == b'\t') {
                    k += 1;
                }
                let prev = line_out.last().copied().unwrap_or(0);
                let next = if k < len { buf[k] } else { 0 };
                if is_ident(prev) && is_ident(next) {
                    line_out.push(b' ');
                }
                j = k;
                continue;
            }

            line_out.push(buf[j]);
            j += 1;
        }

        trim_trailing_ws_inplace(&mut line_out);
        out.extend_from_slice(&line_out);
        out.push(b'\n');

        i = skip_newline(buf, j);
    }

    out
}

/// Index just past the next `\n` (or `len` if none remains). Does not
/// itself skip `\r` — callers handle CRLF when they encounter it.
fn find_line_end(buf: &[u8], from: usize) -> usize {
    match buf[from..].iter().position(|&b| b == b'\n') {
        Some(pos) => from + pos,
        None => buf.len(),
    }
}

fn skip_newline(buf: &[u8], at: usize) -> usize {
    if at < buf.len() && buf[at] == b'\n' { at + 1 } else { at }
}

fn trim_ascii_ws(bytes: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = bytes.len();
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &bytes[start..end]
}

fn trim_trailing_ws_inplace(bytes: &mut Vec<u8>) {
    while matches!(bytes.last(), Some(b) if b.is_ascii_whitespace()) {
        bytes.pop();
    }
}

/// Scan a block comment body starting just after `/*`, returning the
/// number of embedded newlines and the index just past the closing `*/`.
/// May cross raw newlines.
fn skip_block_comment(buf: &[u8], from: usize) -> (usize, usize) {
    let mut i = from;
    let mut newlines = 0;
    let len = buf.len();
    while i < len {
        if buf[i..].starts_with(b"*/") {
            return (newlines, i + 2);
        }
        if buf[i] == b'\n' {
            newlines += 1;
        }
        i += 1;
    }
    (newlines, len)
}

/// Scan a string/char literal body starting just after its opening
/// delimiter, honoring backslash escapes so an escaped delimiter does not
/// terminate the literal early. May cross raw newlines; a `\r` immediately
/// preceding a `\n` is dropped, same as the top-level tokenizer, so CRLF
/// and LF checkouts of a multi-line literal hash identically.
fn skip_literal(buf: &[u8], from: usize, delim: u8) -> (Vec<u8>, usize) {
    let mut i = from;
    let len = buf.len();
    let mut content = Vec::new();
    while i < len {
        if buf[i] == b'\r' && i + 1 < len && buf[i + 1] == b'\n' {
            i += 1;
            continue;
        }
        let c = buf[i];
        if c == b'\\' {
            if i + 1 < len {
                content.push(c);
                content.push(buf[i + 1]);
                i += 2;
            } else {
                content.push(c);
                i += 1;
            }
            continue;
        }
        if c == delim {
            return (content, i + 1);
        }
        content.push(c);
        i += 1;
    }
    (content, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        String::from_utf8(normalize_source(s.as_bytes())).unwrap()
    }

    #[test]
    fn collapses_reindentation() {
        let a = norm("int main() {\n    return 0;\n}\n");
        let b = norm("int main() {\nreturn 0;\n}\n");
        assert_eq!(a, b);
    }

    #[test]
    fn collapses_unnecessary_spaces() {
        assert_eq!(norm("if (x)\n"), norm("if(x)\n"));
    }

    #[test]
    fn blank_line_changes_hash() {
        assert_ne!(norm("a;\n\nb;\n"), norm("a;\nb;\n"));
    }

    #[test]
    fn comment_body_edit_is_ignored() {
        assert_eq!(norm("int x/*old*/;\n"), norm("int x/*new text*/;\n"));
    }

    #[test]
    fn comment_line_count_change_is_detected() {
        let one_line = norm("int x/*a*/;\n");
        let two_line = norm("int x/*a\nb*/;\n");
        assert_ne!(one_line, two_line);
    }

    #[test]
    fn string_literal_edit_changes_hash() {
        assert_ne!(norm("char *s = \"a\";\n"), norm("char *s = \"b\";\n"));
    }

    #[test]
    fn string_literal_escaped_quote_does_not_terminate() {
        let out = norm("char *s = \"a\\\"b\";\n");
        assert!(out.contains("a\\\"b"));
    }

    #[test]
    fn preprocessor_line_preserves_interior_spacing() {
        let out = norm("#  define   FOO(x)   (x)\n");
        assert_eq!(out.trim_end_matches('\n'), "#  define   FOO(x)   (x)");
    }

    #[test]
    fn determinism() {
        let bytes = b"int x = 1;\n".to_vec();
        assert_eq!(
            ContentHash::of_normalized_source(&bytes),
            ContentHash::of_normalized_source(&bytes)
        );
    }

    #[test]
    fn crlf_and_lf_hash_identically() {
        assert_eq!(norm("int x;\r\n"), norm("int x;\n"));
    }

    #[test]
    fn crlf_inside_multiline_literal_hashes_same_as_lf() {
        let crlf = norm("char *s = \"a\r\nb\";\r\n");
        let lf = norm("char *s = \"a\nb\";\n");
        assert_eq!(crlf, lf);
    }

    #[test]
    fn trailing_whitespace_does_not_eat_line_content() {
        let out = norm("  int x;   \n");
        assert_eq!(out.trim_end_matches('\n'), "int x;");
    }
}
