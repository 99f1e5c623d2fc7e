/// Accumulates the raw lines of one multiline record
#[derive(Debug, Default)]
pub struct RecordBuffer {
    /// Raw lines joined with `\n`
    text: String,

    /// Number of lines buffered
    lines: usize,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw line, normalizing its terminator to `\n`
    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line.trim_end_matches(['\r', '\n']));
        self.text.push('\n');
        self.lines += 1;
    }

    /// Take the buffered record, leaving the buffer empty
    pub fn take(&mut self) -> Option<String> {
        if self.lines == 0 {
            return None;
        }
        self.lines = 0;
        Some(std::mem::take(&mut self.text))
    }

    /// Drop the buffered record
    pub fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    pub fn len(&self) -> usize {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joins_lines() {
        let mut buffer = RecordBuffer::new();
        buffer.push_line("first\n");
        buffer.push_line("  second\r\n");
        buffer.push_line("third");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.take().as_deref(), Some("first\n  second\nthird\n"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.take(), None);
    }

    #[test]
    fn test_clear() {
        let mut buffer = RecordBuffer::new();
        buffer.push_line("partial\n");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.take(), None);
    }
}
