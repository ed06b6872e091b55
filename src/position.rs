/// Offset to 1-based (line, column) conversion over an immutable line-start
/// index. Built once per source; lookups are a binary search.
#[derive(Clone, Debug)]
pub struct SourcePositionMapper {
    line_starts: Vec<u32>,
    source_len: u32,
}

impl SourcePositionMapper {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        let bytes = source.as_bytes();
        let mut index = 0;
        while index < bytes.len() {
            match bytes[index] {
                b'\n' => line_starts.push(index as u32 + 1),
                b'\r' => {
                    if bytes.get(index + 1) == Some(&b'\n') {
                        index += 1;
                    }
                    line_starts.push(index as u32 + 1);
                }
                _ => {}
            }
            index += 1;
        }
        Self {
            line_starts,
            source_len: source.len() as u32,
        }
    }

    /// Both line and column are 1-based; the column counts bytes from the
    /// preceding line start, leaving tab rendering to the caller.
    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.source_len);
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        (line as u32, offset - line_start + 1)
    }

    pub fn offset(&self, line: u32, column: u32) -> u32 {
        let line_start = self.line_starts[(line as usize - 1).min(self.line_starts.len() - 1)];
        (line_start + column - 1).min(self.source_len)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_start(&self, line: u32) -> u32 {
        self.line_starts[line as usize - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_offset_is_line_one_column_one() {
        let mapper = SourcePositionMapper::new("abc\ndef");
        assert_eq!(mapper.line_column(0), (1, 1));
        assert_eq!(mapper.line_column(2), (1, 3));
        assert_eq!(mapper.line_column(4), (2, 1));
        assert_eq!(mapper.line_column(6), (2, 3));
    }

    #[test]
    fn crlf_counts_as_one_terminator() {
        let mapper = SourcePositionMapper::new("ab\r\ncd");
        assert_eq!(mapper.line_column(4), (2, 1));
        assert_eq!(mapper.line_count(), 2);
    }

    #[test]
    fn every_offset_round_trips() {
        let source = "class A {\n  int x;\r\n}\n";
        let mapper = SourcePositionMapper::new(source);
        for offset in 0..=source.len() as u32 {
            let (line, column) = mapper.line_column(offset);
            assert_eq!(mapper.offset(line, column), offset, "offset {offset}");
        }
    }

    #[test]
    fn empty_source_has_one_line() {
        let mapper = SourcePositionMapper::new("");
        assert_eq!(mapper.line_count(), 1);
        assert_eq!(mapper.line_column(0), (1, 1));
    }
}
