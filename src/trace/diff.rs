use crate::error::PiTraceError;
use crate::git::repository::Repository;
use crate::git::snapshots;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkKind {
    Equal,
    Add,
    Delete,
}

/// A maximal run of same-typed lines in a file diff. Applying the hunk
/// sequence of a file to its before-version yields its after-version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub kind: HunkKind,
    pub lines: Vec<String>,
}

impl DiffHunk {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Undo git's C-style path quoting: surrounding double quotes with
/// backslash escapes for `\t \n \r \" \\` and 1-3 digit octal byte values.
/// Unquoted input is returned as-is.
pub fn unquote_git_path(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
        return raw.to_string();
    }

    let inner = &raw.as_bytes()[1..raw.len() - 1];
    let mut bytes: Vec<u8> = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let b = inner[i];
        if b != b'\\' {
            bytes.push(b);
            i += 1;
            continue;
        }
        i += 1;
        if i >= inner.len() {
            bytes.push(b'\\');
            break;
        }
        match inner[i] {
            b't' => {
                bytes.push(b'\t');
                i += 1;
            }
            b'n' => {
                bytes.push(b'\n');
                i += 1;
            }
            b'r' => {
                bytes.push(b'\r');
                i += 1;
            }
            b'"' => {
                bytes.push(b'"');
                i += 1;
            }
            b'\\' => {
                bytes.push(b'\\');
                i += 1;
            }
            digit if digit.is_ascii_digit() => {
                let mut value: u32 = 0;
                let mut consumed = 0;
                while consumed < 3 && i < inner.len() && inner[i].is_ascii_digit() {
                    value = value * 8 + (inner[i] - b'0') as u32;
                    i += 1;
                    consumed += 1;
                }
                bytes.push(value as u8);
            }
            other => {
                // Unknown escape; keep the character and move on.
                bytes.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&bytes).to_string()
}

/// Parse a `---`/`+++` header path. None for /dev/null (add-only or
/// delete-only file); otherwise the path with its a/ or b/ prefix dropped.
fn parse_header_path(raw: &str) -> Option<String> {
    let unquoted = unquote_git_path(raw);
    if unquoted == "/dev/null" {
        return None;
    }
    let stripped = unquoted
        .strip_prefix("a/")
        .or_else(|| unquoted.strip_prefix("b/"))
        .unwrap_or(&unquoted);
    Some(stripped.to_string())
}

struct FileAccumulator {
    before_path: Option<String>,
    after_path: Option<String>,
    hunks: Vec<DiffHunk>,
    in_hunk: bool,
}

impl FileAccumulator {
    fn new() -> Self {
        FileAccumulator {
            before_path: None,
            after_path: None,
            hunks: Vec::new(),
            in_hunk: false,
        }
    }

    fn push_line(&mut self, kind: HunkKind, line: &str) {
        match self.hunks.last_mut() {
            Some(hunk) if hunk.kind == kind => hunk.lines.push(line.to_string()),
            _ => self.hunks.push(DiffHunk {
                kind,
                lines: vec![line.to_string()],
            }),
        }
    }

    fn flush_into(self, files: &mut HashMap<String, Vec<DiffHunk>>) {
        if self.hunks.is_empty() {
            return;
        }
        // Deleted files have no after-path; everything else keys on it.
        if let Some(path) = self.after_path.or(self.before_path) {
            files.insert(path, self.hunks);
        }
    }
}

/// Parse full-context unified diff output (possibly covering many files)
/// into per-file hunk sequences.
pub fn parse_unified_diff(output: &str) -> HashMap<String, Vec<DiffHunk>> {
    let mut files = HashMap::new();
    let mut current = FileAccumulator::new();

    for line in output.lines() {
        if line.starts_with("diff ") {
            std::mem::replace(&mut current, FileAccumulator::new()).flush_into(&mut files);
            continue;
        }

        if !current.in_hunk {
            if let Some(rest) = line.strip_prefix("--- ") {
                current.before_path = parse_header_path(rest);
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                current.after_path = parse_header_path(rest);
            } else if line.starts_with("@@") {
                current.in_hunk = true;
            }
            // index lines, mode lines, "Binary files ... differ" are skipped.
            continue;
        }

        if line.starts_with('\\') {
            // "\ No newline at end of file" carries no content.
            continue;
        }
        if line.starts_with("@@") {
            continue;
        }
        if let Some(rest) = line.strip_prefix('+') {
            current.push_line(HunkKind::Add, rest);
        } else if let Some(rest) = line.strip_prefix('-') {
            current.push_line(HunkKind::Delete, rest);
        } else if let Some(rest) = line.strip_prefix(' ') {
            current.push_line(HunkKind::Equal, rest);
        } else if line.is_empty() {
            // Some transports strip the trailing space off empty context lines.
            current.push_line(HunkKind::Equal, "");
        }
    }
    current.flush_into(&mut files);

    files
}

/// Hunk lookup service over snapshot pairs.
///
/// A miss fetches and parses the whole pair once; subsequent per-file
/// lookups on the pair are served from the cached map.
pub struct DiffService {
    cache: HashMap<(String, String), HashMap<String, Vec<DiffHunk>>>,
}

impl DiffService {
    pub fn new() -> Self {
        DiffService {
            cache: HashMap::new(),
        }
    }

    /// Hunks for one file between two snapshots. Identical snapshots, and
    /// files untouched by the pair, yield an empty sequence (the identity
    /// for attribution projection).
    pub fn hunks_for_file(
        &mut self,
        repo: &Repository,
        before: &str,
        after: &str,
        path: &str,
    ) -> Result<Vec<DiffHunk>, PiTraceError> {
        if before == after {
            return Ok(Vec::new());
        }

        let key = (before.to_string(), after.to_string());
        if !self.cache.contains_key(&key) {
            let raw = snapshots::diff_snapshots(repo, before, after)?;
            self.cache.insert(key.clone(), parse_unified_diff(&raw));
        }

        Ok(self
            .cache
            .get(&key)
            .and_then(|map| map.get(path))
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for DiffService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote_plain_path() {
        assert_eq!(unquote_git_path("a/src/lib.rs"), "a/src/lib.rs");
    }

    #[test]
    fn test_unquote_escaped_path() {
        assert_eq!(unquote_git_path(r#""a/sp ace.rs""#), "a/sp ace.rs");
        assert_eq!(unquote_git_path(r#""a/tab\there""#), "a/tab\there");
        assert_eq!(unquote_git_path(r#""a/quote\"d""#), "a/quote\"d");
        assert_eq!(unquote_git_path(r#""a/back\\slash""#), r"a/back\slash");
    }

    #[test]
    fn test_unquote_octal_bytes() {
        // "ä" in UTF-8 is 0303 0244.
        assert_eq!(unquote_git_path(r#""a/\303\244.rs""#), "a/ä.rs");
    }

    #[test]
    fn test_parse_single_file_diff() {
        let output = "\
diff --git a/foo.txt b/foo.txt
index 000000..111111 100644
--- a/foo.txt
+++ b/foo.txt
@@ -1,3 +1,4 @@
 a
 b
+x
 c
";
        let files = parse_unified_diff(output);
        let hunks = files.get("foo.txt").expect("foo.txt parsed");
        assert_eq!(hunks.len(), 3);
        assert_eq!(hunks[0].kind, HunkKind::Equal);
        assert_eq!(hunks[0].lines, vec!["a", "b"]);
        assert_eq!(hunks[1].kind, HunkKind::Add);
        assert_eq!(hunks[1].lines, vec!["x"]);
        assert_eq!(hunks[2].kind, HunkKind::Equal);
        assert_eq!(hunks[2].lines, vec!["c"]);
    }

    #[test]
    fn test_parse_add_only_file() {
        let output = "\
diff --git a/new.txt b/new.txt
new file mode 100644
--- /dev/null
+++ b/new.txt
@@ -0,0 +1,2 @@
+one
+two
";
        let files = parse_unified_diff(output);
        let hunks = files.get("new.txt").expect("new.txt parsed");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Add);
        assert_eq!(hunks[0].lines, vec!["one", "two"]);
    }

    #[test]
    fn test_parse_delete_only_file_keys_on_before_path() {
        let output = "\
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
--- a/gone.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-one
-two
";
        let files = parse_unified_diff(output);
        let hunks = files.get("gone.txt").expect("gone.txt parsed");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Delete);
    }

    #[test]
    fn test_parse_multiple_files() {
        let output = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1 +1 @@
-old
+new
diff --git a/b.txt b/b.txt
--- a/b.txt
+++ b/b.txt
@@ -1 +1,2 @@
 kept
+added
";
        let files = parse_unified_diff(output);
        assert_eq!(files.len(), 2);
        assert_eq!(files["a.txt"].len(), 2);
        assert_eq!(files["b.txt"].len(), 2);
    }

    #[test]
    fn test_parse_skips_no_newline_sentinel() {
        let output = "\
diff --git a/f.txt b/f.txt
--- a/f.txt
+++ b/f.txt
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_unified_diff(output);
        let hunks = files.get("f.txt").expect("f.txt parsed");
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].lines, vec!["old"]);
        assert_eq!(hunks[1].lines, vec!["new"]);
    }

    #[test]
    fn test_parse_quoted_header_paths() {
        let output = "\
diff --git \"a/sp ace.txt\" \"b/sp ace.txt\"
--- \"a/sp ace.txt\"
+++ \"b/sp ace.txt\"
@@ -1 +1 @@
-x
+y
";
        let files = parse_unified_diff(output);
        assert!(files.contains_key("sp ace.txt"));
    }

    #[test]
    fn test_parse_binary_file_yields_nothing() {
        let output = "\
diff --git a/blob.bin b/blob.bin
Binary files a/blob.bin and b/blob.bin differ
";
        let files = parse_unified_diff(output);
        assert!(files.is_empty());
    }

    #[test]
    fn test_empty_context_line_without_space_prefix() {
        let output = "\
diff --git a/f.txt b/f.txt
--- a/f.txt
+++ b/f.txt
@@ -1,3 +1,3 @@
 a

-b
+B
";
        let files = parse_unified_diff(output);
        let hunks = files.get("f.txt").expect("f.txt parsed");
        assert_eq!(hunks[0].kind, HunkKind::Equal);
        assert_eq!(hunks[0].lines, vec!["a", ""]);
    }
}
