//! OPI State Machine (spec §4.2): drives Analyze / Pass-through / Discard
//! around `BeginOPI`/`EndOPI`/`BeginObject`/`BeginIncludedImage`.

use crate::comment_parser::{self, RawDirective};
use crate::lexer::{SplitLine, Terminator};
use crate::model::ImagePlacementRecord;

/// Bytes accumulated between an OPI object's first triggering comment and
/// its `%%BeginObject`, replayed by the emitter as pre-setup (spec §9
/// "Graphics-state buffering").
#[derive(Debug, Clone, Default)]
pub struct GfxStateBuffer {
    pub raw: Vec<u8>,
    pub procset_lines: Vec<String>,
}

impl GfxStateBuffer {
    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.raw.extend_from_slice(bytes);
    }

    pub fn append_procset_line(&mut self, line: impl Into<String>) {
        self.procset_lines.push(line.into());
    }
}

#[derive(Debug)]
struct PendingObject {
    ipr: ImagePlacementRecord,
    gfx: GfxStateBuffer,
    last_key: Option<String>,
}

#[derive(Debug)]
pub enum Event {
    /// Bytes to write to the output stream unchanged.
    PassThrough(Vec<u8>),
    /// An OPI object's nesting closed; the engine should condition the
    /// image and emit the substitution.
    ObjectReady {
        ipr: ImagePlacementRecord,
        gfx: GfxStateBuffer,
    },
}

const OPI_START_KEYS: [&str; 4] = ["ALDImageFileName", "ALDImageID", "ImageFileName", "MainImage"];

fn is_opi_start_key(key: &str) -> bool {
    OPI_START_KEYS.contains(&key)
}

fn block_end_key(begin_key: &str) -> Option<String> {
    if matches!(begin_key, "BeginObject" | "BeginIncludedImage" | "BeginOPI") {
        return None;
    }
    begin_key
        .strip_prefix("Begin")
        .map(|suffix| format!("End{suffix}"))
}

fn reconstruct_line(split: &SplitLine<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        split.passthrough.len()
            + split.comment.map_or(0, |c| c.len())
            + split.terminator.as_bytes().len(),
    );
    out.extend_from_slice(split.passthrough);
    if let Some(comment) = split.comment {
        out.extend_from_slice(comment);
    }
    out.extend_from_slice(split.terminator.as_bytes());
    out
}

pub struct StateMachine {
    /// Depth of nested `%%BeginObject` / `%%BeginIncludedImage`; non-zero
    /// means the current bytes are the FPO stand-in and must be discarded.
    object_stack: Vec<&'static str>,
    /// Verbatim pass-through blocks (`%%BeginData`, …); active only while
    /// `object_stack` is empty, since the Discard branch already drops
    /// everything regardless of block tokens inside it.
    block_stack: Vec<String>,
    pending: Option<PendingObject>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            object_stack: Vec::new(),
            block_stack: Vec::new(),
            pending: None,
        }
    }

    pub fn feed(&mut self, split: &SplitLine<'_>) -> Option<Event> {
        if !self.object_stack.is_empty() {
            return self.feed_discard(split);
        }
        if !self.block_stack.is_empty() {
            return self.feed_block(split);
        }
        self.feed_normal(split)
    }

    /// Flush whatever is buffered without emitting a substitution (e.g. at
    /// end of stream with an unterminated OPI envelope).
    pub fn finish(&mut self) -> Option<Event> {
        self.pending.take().map(|p| {
            log::warn!("OPI object never reached %%BeginObject; flushing buffered bytes unsubstituted");
            Event::PassThrough(p.gfx.raw)
        })
    }

    fn feed_discard(&mut self, split: &SplitLine<'_>) -> Option<Event> {
        if let Some(comment) = split.comment {
            if let Some(directive) = comment_parser::tokenize(comment) {
                match directive.key {
                    "BeginObject" | "BeginIncludedImage" => {
                        self.object_stack.push(if directive.key == "BeginObject" {
                            "EndObject"
                        } else {
                            "EndIncludedImage"
                        });
                    }
                    "EndObject" | "EndIncludedImage" => {
                        if let Some(expected) = self.object_stack.last() {
                            if *expected == directive.key {
                                self.object_stack.pop();
                            }
                        }
                        if self.object_stack.is_empty() {
                            if let Some(pending) = self.pending.take() {
                                return Some(Event::ObjectReady {
                                    ipr: pending.ipr,
                                    gfx: pending.gfx,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }

    fn feed_block(&mut self, split: &SplitLine<'_>) -> Option<Event> {
        if let Some(comment) = split.comment {
            if let Some(directive) = comment_parser::tokenize(comment) {
                if self.block_stack.last().map(String::as_str) == Some(directive.key) {
                    self.block_stack.pop();
                }
            }
        }
        Some(Event::PassThrough(reconstruct_line(split)))
    }

    fn feed_normal(&mut self, split: &SplitLine<'_>) -> Option<Event> {
        let Some(comment) = split.comment else {
            // Plain content line: either graphics-state setup to buffer, or
            // ordinary pass-through.
            return self.route_non_comment_line(split);
        };

        if comment_parser::is_continuation_line(comment) {
            if let Some(pending) = &mut self.pending {
                let payload = comment_parser::continuation_payload(comment);
                let payload = std::str::from_utf8(payload).unwrap_or("").trim();
                if let Some(key) = pending.last_key.clone() {
                    let directive = RawDirective { key: &key, rest: payload };
                    comment_parser::apply_directive(&mut pending.ipr, &directive);
                }
                pending.gfx.append_raw(&reconstruct_line(split));
                return None;
            }
            return Some(Event::PassThrough(reconstruct_line(split)));
        }

        let Some(directive) = comment_parser::tokenize(comment) else {
            return self.route_non_comment_line(split);
        };

        if let Some(end_key) = block_end_key(directive.key) {
            self.block_stack.push(end_key);
            return self.route_non_comment_line(split);
        }

        if directive.key == "BeginObject" || directive.key == "BeginIncludedImage" {
            self.object_stack.push(if directive.key == "BeginObject" {
                "EndObject"
            } else {
                "EndIncludedImage"
            });
            // The triggering line itself belongs to the discarded region.
            return None;
        }

        if directive.key == "EndOPI" {
            // OPI-2.0 envelope close with no object ever opened: nothing to
            // substitute, just drop the marker.
            return None;
        }

        if self.pending.is_none() && is_opi_start_key(directive.key) {
            let mut ipr = ImagePlacementRecord::default();
            comment_parser::apply_directive(&mut ipr, &directive);
            let mut gfx = GfxStateBuffer::default();
            gfx.append_raw(&reconstruct_line(split));
            self.pending = Some(PendingObject {
                ipr,
                gfx,
                last_key: Some(directive.key.to_string()),
            });
            return None;
        }

        if let Some(pending) = &mut self.pending {
            comment_parser::apply_directive(&mut pending.ipr, &directive);
            pending.last_key = Some(directive.key.to_string());
            pending.gfx.append_raw(&reconstruct_line(split));
            return None;
        }

        Some(Event::PassThrough(reconstruct_line(split)))
    }

    fn route_non_comment_line(&mut self, split: &SplitLine<'_>) -> Option<Event> {
        if let Some(pending) = &mut self.pending {
            pending.gfx.append_raw(&reconstruct_line(split));
            None
        } else {
            Some(Event::PassThrough(reconstruct_line(split)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{split_line, RawLine, StreamLexer};

    fn run(input: &[u8]) -> Vec<Event> {
        let mut sm = StateMachine::new();
        let mut events = Vec::new();
        for line in StreamLexer::new(input) {
            let split = split_line(&line);
            if let Some(ev) = sm.feed(&split) {
                events.push(ev);
            }
        }
        if let Some(ev) = sm.finish() {
            events.push(ev);
        }
        events
    }

    #[test]
    fn passes_through_unrelated_lines() {
        let events = run(b"1 0 0 1 0 0 cm\nshowpage\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Event::PassThrough(b) if b == b"1 0 0 1 0 0 cm\n"));
    }

    #[test]
    fn minimal_object_fires_substitution() {
        let input = b"%%ImageFileName: (foo.tif)\n%%BeginObject: image\nlowres junk\n%%EndObject\n";
        let events = run(input);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ObjectReady { ipr, gfx } => {
                assert_eq!(ipr.image_file_name, "foo.tif");
                assert!(gfx.raw.starts_with(b"%%ImageFileName"));
            }
            _ => panic!("expected ObjectReady"),
        }
    }

    #[test]
    fn nested_begin_object_only_fires_at_depth_zero() {
        let input = b"%%ImageFileName: (foo.tif)\n%%BeginObject: image\n%%BeginObject: image\ninner\n%%EndObject\nouter junk\n%%EndObject\n";
        let events = run(input);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::ObjectReady { .. }));
    }

    #[test]
    fn verbatim_block_passes_through_without_opi_parsing() {
        let input = b"%%BeginData: 10 Binary\n%%ImageFileName: (not real)\n%%EndData\n";
        let events = run(input);
        assert_eq!(events.len(), 3);
        for ev in &events {
            assert!(matches!(ev, Event::PassThrough(_)));
        }
    }

    #[test]
    fn flushes_unterminated_object_at_finish() {
        let input = b"%%ImageFileName: (foo.tif)\nsome setup\n";
        let events = run(input);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::PassThrough(bytes) => {
                assert!(bytes.starts_with(b"%%ImageFileName"));
            }
            _ => panic!("expected flushed pass-through"),
        }
    }
}
