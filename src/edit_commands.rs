use regex::Regex;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn cursor(pos: usize) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn is_cursor(self) -> bool {
        self.start == self.end
    }

    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }
}

/// Editor text plus the current selection, in byte offsets. The DOM layer
/// converts from the textarea's UTF-16 offsets at the boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditBuffer {
    pub text: String,
    pub selection: Selection,
}

impl EditBuffer {
    pub fn new(text: impl Into<String>, selection: Selection) -> Self {
        let text = text.into();
        let selection = selection.clamp(text.len());
        Self { text, selection }
    }

    fn splice(&mut self, start: usize, end: usize, insert: &str, after: Selection) {
        let mut next = String::with_capacity(self.text.len() + insert.len());
        next.push_str(&self.text[..start]);
        next.push_str(insert);
        next.push_str(&self.text[end..]);
        self.text = next;
        self.selection = after.clamp(self.text.len());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Wrap { open: &'static str, close: &'static str },
    PrefixLine { prefix: &'static str },
    Link,
    ContinueBlock,
}

pub const BOLD: Command = Command::Wrap { open: "**", close: "**" };
pub const ITALIC: Command = Command::Wrap { open: "*", close: "*" };
pub const STRIKETHROUGH: Command = Command::Wrap { open: "~~", close: "~~" };
pub const INLINE_CODE: Command = Command::Wrap { open: "`", close: "`" };
pub const HEADING: Command = Command::PrefixLine { prefix: "## " };
pub const QUOTE: Command = Command::PrefixLine { prefix: "> " };
pub const BULLET_LIST: Command = Command::PrefixLine { prefix: "- " };

/// Applies a toolbar command to the buffer. Returns false when the command
/// does not apply at the current position (the caller then lets the
/// browser's default behavior through).
pub fn apply(buffer: &mut EditBuffer, command: Command) -> bool {
    match command {
        Command::Wrap { open, close } => {
            wrap(buffer, open, close);
            true
        }
        Command::PrefixLine { prefix } => {
            prefix_line(buffer, prefix);
            true
        }
        Command::Link => {
            link(buffer);
            true
        }
        Command::ContinueBlock => continue_block(buffer),
    }
}

fn wrap(buffer: &mut EditBuffer, open: &str, close: &str) {
    let selection = buffer.selection.clamp(buffer.text.len());
    let inner = &buffer.text[selection.start..selection.end];
    let insert = format!("{open}{inner}{close}");
    let after = if selection.is_cursor() {
        Selection::cursor(selection.start + open.len())
    } else {
        // Collapse after the closing token instead of keeping a range that
        // would sit invisibly in the transparent textarea layer.
        Selection::cursor(selection.end + open.len() + close.len())
    };
    buffer.splice(selection.start, selection.end, &insert, after);
}

fn prefix_line(buffer: &mut EditBuffer, prefix: &str) {
    let selection = buffer.selection.clamp(buffer.text.len());
    let start = line_start(&buffer.text, selection.start);
    let after = Selection::new(selection.start + prefix.len(), selection.end + prefix.len());
    buffer.splice(start, start, prefix, after);
}

fn link(buffer: &mut EditBuffer) {
    let selection = buffer.selection.clamp(buffer.text.len());
    let label = &buffer.text[selection.start..selection.end];
    let insert = format!("[{label}](url)");
    // Select the placeholder so typing replaces it.
    let url_start = selection.start + 1 + label.len() + 2;
    let after = Selection::new(url_start, url_start + 3);
    buffer.splice(selection.start, selection.end, &insert, after);
}

fn continue_block(buffer: &mut EditBuffer) -> bool {
    let selection = buffer.selection.clamp(buffer.text.len());
    if !selection.is_cursor() {
        return false;
    }

    static RE_TASK: OnceLock<Regex> = OnceLock::new();
    static RE_ORDERED: OnceLock<Regex> = OnceLock::new();
    static RE_BULLET: OnceLock<Regex> = OnceLock::new();
    static RE_QUOTE: OnceLock<Regex> = OnceLock::new();

    let re_task =
        RE_TASK.get_or_init(|| Regex::new(r"^(\s*[-*+]\s+)\[(?: |x|X)\]\s+(.*)$").unwrap());
    let re_ordered = RE_ORDERED.get_or_init(|| Regex::new(r"^(\s*)(\d+)\.\s+(.*)$").unwrap());
    let re_bullet = RE_BULLET.get_or_init(|| Regex::new(r"^(\s*[-*+]\s+)(.*)$").unwrap());
    let re_quote = RE_QUOTE.get_or_init(|| Regex::new(r"^(\s*>\s+)(.*)$").unwrap());

    let ls = line_start(&buffer.text, selection.start);
    let le = line_end(&buffer.text, selection.start);
    let line = &buffer.text[ls..le];

    let continuation = if let Some(cap) = re_task.captures(line) {
        block_continuation(&cap, 2, |prefix| format!("\n{prefix}[ ] "))
    } else if let Some(cap) = re_ordered.captures(line) {
        let body = cap.get(3).map_or("", |m| m.as_str());
        if body.trim().is_empty() {
            Some("\n".to_string())
        } else {
            let indent = cap.get(1).map_or("", |m| m.as_str());
            let number = cap
                .get(2)
                .map_or("1", |m| m.as_str())
                .parse::<u64>()
                .unwrap_or(1);
            Some(format!("\n{indent}{}. ", number + 1))
        }
    } else if let Some(cap) = re_bullet.captures(line) {
        block_continuation(&cap, 2, |prefix| format!("\n{prefix}"))
    } else if let Some(cap) = re_quote.captures(line) {
        block_continuation(&cap, 2, |prefix| format!("\n{prefix}"))
    } else {
        None
    };

    let Some(insert) = continuation else {
        return false;
    };
    let after = Selection::cursor(selection.start + insert.len());
    buffer.splice(selection.start, selection.end, &insert, after);
    true
}

fn block_continuation(
    cap: &regex::Captures<'_>,
    body_group: usize,
    make: impl Fn(&str) -> String,
) -> Option<String> {
    let body = cap.get(body_group).map_or("", |m| m.as_str());
    if body.trim().is_empty() {
        // An empty item means the author is done with the block.
        Some("\n".to_string())
    } else {
        let prefix = cap.get(1).map_or("", |m| m.as_str());
        Some(make(prefix))
    }
}

fn line_start(text: &str, pos: usize) -> usize {
    let clamped = pos.min(text.len());
    text[..clamped].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn line_end(text: &str, pos: usize) -> usize {
    let clamped = pos.min(text.len());
    text[clamped..]
        .find('\n')
        .map(|i| clamped + i)
        .unwrap_or(text.len())
}

// Textarea selectionStart/selectionEnd count UTF-16 code units, not bytes;
// everything above works in bytes, so the DOM layer converts through these.

pub fn utf16_to_byte_index(text: &str, utf16_index: usize) -> usize {
    let mut units = 0;
    for (byte_index, ch) in text.char_indices() {
        if units >= utf16_index {
            return byte_index;
        }
        units += ch.len_utf16();
    }
    text.len()
}

pub fn byte_to_utf16_index(text: &str, byte_index: usize) -> usize {
    text[..byte_index.min(text.len())].encode_utf16().count()
}

pub fn selection_from_utf16(text: &str, start: usize, end: usize) -> Selection {
    Selection::new(
        utf16_to_byte_index(text, start),
        utf16_to_byte_index(text, end),
    )
}

pub fn selection_to_utf16(text: &str, selection: Selection) -> (usize, usize) {
    (
        byte_to_utf16_index(text, selection.start),
        byte_to_utf16_index(text, selection.end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(text: &str, start: usize, end: usize) -> EditBuffer {
        EditBuffer::new(text, Selection::new(start, end))
    }

    #[test]
    fn wraps_a_selection_and_collapses_after() {
        let mut buf = buffer("make this bold", 10, 14);
        assert!(apply(&mut buf, BOLD));
        assert_eq!(buf.text, "make this **bold**");
        assert_eq!(buf.selection, Selection::cursor(18));
    }

    #[test]
    fn wrap_at_a_cursor_leaves_the_caret_inside() {
        let mut buf = buffer("code: ", 6, 6);
        assert!(apply(&mut buf, INLINE_CODE));
        assert_eq!(buf.text, "code: ``");
        assert_eq!(buf.selection, Selection::cursor(7));
    }

    #[test]
    fn prefix_line_shifts_the_selection() {
        let mut buf = buffer("first\nsecond", 8, 8);
        assert!(apply(&mut buf, QUOTE));
        assert_eq!(buf.text, "first\n> second");
        assert_eq!(buf.selection, Selection::cursor(10));
    }

    #[test]
    fn link_selects_the_url_placeholder() {
        let mut buf = buffer("see docs", 4, 8);
        assert!(apply(&mut buf, Command::Link));
        assert_eq!(buf.text, "see [docs](url)");
        assert_eq!(buf.selection, Selection::new(11, 14));
    }

    #[test]
    fn continues_bullet_and_ordered_lists() {
        let mut buf = buffer("- item", 6, 6);
        assert!(apply(&mut buf, Command::ContinueBlock));
        assert_eq!(buf.text, "- item\n- ");

        let mut buf = buffer("2. step", 7, 7);
        assert!(apply(&mut buf, Command::ContinueBlock));
        assert_eq!(buf.text, "2. step\n3. ");
    }

    #[test]
    fn continues_task_items_unchecked() {
        let mut buf = buffer("- [x] done", 10, 10);
        assert!(apply(&mut buf, Command::ContinueBlock));
        assert_eq!(buf.text, "- [x] done\n- [ ] ");
    }

    #[test]
    fn empty_item_ends_the_block() {
        let mut buf = buffer("- ", 2, 2);
        assert!(apply(&mut buf, Command::ContinueBlock));
        assert_eq!(buf.text, "- \n");
    }

    #[test]
    fn plain_text_does_not_continue() {
        let mut buf = buffer("just prose", 10, 10);
        assert!(!apply(&mut buf, Command::ContinueBlock));
        assert_eq!(buf.text, "just prose");
    }

    #[test]
    fn utf16_offsets_round_trip_through_multibyte_text() {
        let text = "a\u{1f980}b";
        // The crab takes two UTF-16 units and four bytes.
        assert_eq!(utf16_to_byte_index(text, 0), 0);
        assert_eq!(utf16_to_byte_index(text, 1), 1);
        assert_eq!(utf16_to_byte_index(text, 3), 5);
        assert_eq!(utf16_to_byte_index(text, 4), 6);
        assert_eq!(byte_to_utf16_index(text, 5), 3);

        let selection = selection_from_utf16(text, 1, 3);
        assert_eq!(selection, Selection::new(1, 5));
        assert_eq!(selection_to_utf16(text, selection), (1, 3));
    }
}
