use std::fmt;
use std::path::{Path, PathBuf};

/// Source location of a block or attribute: file plus 1-based inclusive lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Range {
    pub filename: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

impl Range {
    pub fn new(filename: impl Into<PathBuf>, start_line: usize, end_line: usize) -> Self {
        Self {
            filename: filename.into(),
            start_line,
            end_line,
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Returns the covered lines of `source` together with the comment lines
    /// directly above the range (comment markers stripped).
    pub fn read_lines(&self, source: &str) -> (Vec<String>, Vec<String>) {
        let all: Vec<&str> = source.lines().collect();
        if self.start_line == 0 || self.start_line > all.len() {
            return (Vec::new(), Vec::new());
        }
        let end = self.end_line.clamp(self.start_line, all.len());
        let lines = all[self.start_line - 1..end]
            .iter()
            .map(|l| l.to_string())
            .collect();

        let mut comments = Vec::new();
        for line in all[..self.start_line - 1].iter().rev() {
            match strip_comment(line) {
                Some(text) => comments.push(text.to_string()),
                None => break,
            }
        }
        comments.reverse();
        (lines, comments)
    }
}

fn strip_comment(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    ["#", "//"]
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
        .map(str::trim)
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}",
            self.filename.display(),
            self.start_line,
            self.end_line
        )
    }
}

/// Maps byte offsets of one source file to 1-based line numbers.
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub(crate) fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    pub(crate) fn range(&self, filename: &Path, span: std::ops::Range<usize>) -> Range {
        let end = if span.end > span.start { span.end - 1 } else { span.end };
        Range::new(filename, self.line_of(span.start), self.line_of(end))
    }

    pub(crate) fn line_count(&self) -> usize {
        self.starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "# first\n# the web server\nresource \"a\" \"b\" {\n  x = 1\n}\n";

    #[test]
    fn reads_lines_and_leading_comments() {
        let range = Range::new("main.tf", 3, 5);
        let (lines, comments) = range.read_lines(SOURCE);
        assert_eq!(lines, vec!["resource \"a\" \"b\" {", "  x = 1", "}"]);
        assert_eq!(comments, vec!["first", "the web server"]);
    }

    #[test]
    fn comments_stop_at_code() {
        let source = "locals {}\n// note\nresource \"a\" \"b\" {}\n";
        let (_, comments) = Range::new("main.tf", 3, 3).read_lines(source);
        assert_eq!(comments, vec!["note"]);
    }

    #[test]
    fn out_of_range_is_empty() {
        let (lines, comments) = Range::new("main.tf", 40, 42).read_lines(SOURCE);
        assert!(lines.is_empty());
        assert!(comments.is_empty());
    }

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new(SOURCE);
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(8), 2);
        let start = SOURCE.find("resource").unwrap();
        let end = SOURCE.rfind('}').unwrap() + 1;
        let range = index.range(Path::new("main.tf"), start..end);
        assert_eq!((range.start_line, range.end_line), (3, 5));
    }
}
