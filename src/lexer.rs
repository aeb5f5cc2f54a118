//! Stream Lexer (spec §4.1): splits the byte stream into lines, preserving
//! whichever of `\n`, `\r\n`, or bare `\r` terminates each one, then splits
//! each line at the first `%` into a pass-through prefix and a comment
//! suffix.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Lf,
    Cr,
    CrLf,
    /// Final line of the stream had no terminator at all.
    None,
}

impl Terminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Lf => b"\n",
            Terminator::Cr => b"\r",
            Terminator::CrLf => b"\r\n",
            Terminator::None => b"",
        }
    }
}

/// One physical line, terminator stripped off `content`.
#[derive(Debug, Clone, Copy)]
pub struct RawLine<'a> {
    pub content: &'a [u8],
    pub terminator: Terminator,
}

/// Reads at most one line ahead of the caller (spec §4.1: "never buffers
/// more than one input line").
pub struct StreamLexer<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> StreamLexer<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for StreamLexer<'a> {
    type Item = RawLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let start = self.pos;
        let mut i = start;
        let (end, terminator, next_pos) = loop {
            match self.buf.get(i) {
                None => break (i, Terminator::None, i),
                Some(b'\n') => break (i, Terminator::Lf, i + 1),
                Some(b'\r') => {
                    if self.buf.get(i + 1) == Some(&b'\n') {
                        break (i, Terminator::CrLf, i + 2);
                    }
                    break (i, Terminator::Cr, i + 1);
                }
                Some(_) => i += 1,
            }
        };
        self.pos = next_pos;
        Some(RawLine {
            content: &self.buf[start..end],
            terminator,
        })
    }
}

/// A line split at its first `%` (spec §4.1). `comment` does not include
/// the terminator; callers that need the exact original bytes re-append
/// `terminator.as_bytes()` themselves.
#[derive(Debug, Clone, Copy)]
pub struct SplitLine<'a> {
    pub passthrough: &'a [u8],
    pub comment: Option<&'a [u8]>,
    pub terminator: Terminator,
}

pub fn split_line<'a>(line: &RawLine<'a>) -> SplitLine<'a> {
    match line.content.iter().position(|&b| b == b'%') {
        Some(idx) => SplitLine {
            passthrough: &line.content[..idx],
            comment: Some(&line.content[idx..]),
            terminator: line.terminator,
        },
        None => SplitLine {
            passthrough: line.content,
            comment: None,
            terminator: line.terminator,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_mixed_terminators() {
        let buf = b"abc\r\ndef\rghi\njkl";
        let lines: Vec<_> = StreamLexer::new(buf).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].content, b"abc");
        assert_eq!(lines[0].terminator, Terminator::CrLf);
        assert_eq!(lines[1].content, b"def");
        assert_eq!(lines[1].terminator, Terminator::Cr);
        assert_eq!(lines[2].content, b"ghi");
        assert_eq!(lines[2].terminator, Terminator::Lf);
        assert_eq!(lines[3].content, b"jkl");
        assert_eq!(lines[3].terminator, Terminator::None);
    }

    #[test]
    fn splits_comment_from_passthrough() {
        let line = RawLine {
            content: b"1 0 0 1 0 0 cm %%ImageFileName: (foo.tif)",
            terminator: Terminator::Lf,
        };
        let split = split_line(&line);
        assert_eq!(split.passthrough, b"1 0 0 1 0 0 cm ");
        assert_eq!(split.comment, Some(&b"%%ImageFileName: (foo.tif)"[..]));
    }

    #[test]
    fn no_percent_is_all_passthrough() {
        let line = RawLine {
            content: b"1 0 0 1 0 0 cm",
            terminator: Terminator::Lf,
        };
        let split = split_line(&line);
        assert_eq!(split.passthrough, b"1 0 0 1 0 0 cm");
        assert!(split.comment.is_none());
    }

    #[test]
    fn empty_stream_yields_no_lines() {
        assert_eq!(StreamLexer::new(b"").count(), 0);
    }
}
