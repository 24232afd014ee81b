//! Source location tracking

/// A span represents a range in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// File ID
    pub file_id: usize,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, file_id: usize) -> Self {
        Self { start, end, file_id }
    }

    /// Create a dummy span (for testing)
    pub fn dummy() -> Self {
        Self { start: 0, end: 0, file_id: 0 }
    }

    /// Merge two spans
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            file_id: self.file_id,
        }
    }

    /// Get the length of the span
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

/// One loaded source file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(path: &str, text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { path: path.to_string(), text: text.to_string(), line_starts }
    }

    /// 1-based line and column of a byte offset
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self.text[line_start..offset.min(self.text.len())].chars().count() + 1;
        (line + 1, column)
    }
}

/// All source files of a compilation, addressed by `Span::file_id`
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file and return its id
    pub fn add(&mut self, path: &str, text: &str) -> usize {
        self.files.push(SourceFile::new(path, text));
        self.files.len() - 1
    }

    pub fn file(&self, file_id: usize) -> Option<&SourceFile> {
        self.files.get(file_id)
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Exact source text covered by a span
    pub fn slice(&self, span: Span) -> Option<&str> {
        self.files.get(span.file_id)?.text.get(span.start..span.end)
    }

    /// `path:line:column` for a span
    pub fn describe(&self, span: Span) -> String {
        match self.files.get(span.file_id) {
            Some(file) => {
                let (line, column) = file.line_col(span.start);
                format!("{}:{}:{}", file.path, line, column)
            }
            None => "<unknown>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let a = Span::new(4, 8, 0);
        let b = Span::new(10, 12, 0);
        assert_eq!(a.merge(&b), Span::new(4, 12, 0));
        assert_eq!(a.merge(&b).len(), 8);
    }

    #[test]
    fn test_slice_and_line_col() {
        let mut map = SourceMap::new();
        let id = map.add("a.pg", "class A\n{\n    int x;\n}\n");
        let span = Span::new(14, 20, id);
        assert_eq!(map.slice(span), Some("int x;"));
        assert_eq!(map.describe(span), "a.pg:3:5");
    }
}
