use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::geometry::MoveRequest;

/// Option bits accepted by [`ProgressBox::start`](crate::ProgressBox::start).
///
/// The set replaces the previously stored one whenever a non-empty set is passed
/// to `start`; an empty set leaves the stored options untouched.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartOptions(u32);

impl StartOptions {
    /// Gray out the cancel button so the user cannot cancel.
    pub const DISABLE_CANCEL: Self = Self(1);
    /// Show the progress bar even when no range has been set.
    pub const SHOW_PROGRESSBAR: Self = Self(2);
    /// Append new note text as a line instead of replacing the note.
    pub const APPEND_TO_NOTE: Self = Self(4);
    /// Run the progress bar in marquee (indeterminate) mode.
    pub const MARQUEE: Self = Self(8);

    const ALL: u32 = 1 | 2 | 4 | 8;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for StartOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StartOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::DISABLE_CANCEL, "DISABLE_CANCEL"),
            (Self::SHOW_PROGRESSBAR, "SHOW_PROGRESSBAR"),
            (Self::APPEND_TO_NOTE, "APPEND_TO_NOTE"),
            (Self::MARQUEE, "MARQUEE"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "StartOptions(empty)")
        } else {
            write!(f, "StartOptions({})", set.join(" | "))
        }
    }
}

/// Color of the progress bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarColor {
    /// Whatever the view's toolkit draws by default.
    #[default]
    SystemDefault,
    Rgb { r: u8, g: u8, b: u8 },
}

impl BarColor {
    /// COLORREF value meaning "use the default color".
    pub const COLORREF_DEFAULT: u32 = 0xFF00_0000;

    /// Decode a COLORREF (`0x00BBGGRR`). The default sentinel, and any value with
    /// a nonzero high byte, maps to [`BarColor::SystemDefault`].
    pub fn from_colorref(value: u32) -> Self {
        if value & 0xFF00_0000 != 0 {
            return Self::SystemDefault;
        }
        Self::Rgb {
            r: (value & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: ((value >> 16) & 0xFF) as u8,
        }
    }

    pub fn to_colorref(self) -> u32 {
        match self {
            Self::SystemDefault => Self::COLORREF_DEFAULT,
            Self::Rgb { r, g, b } => u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16),
        }
    }
}

/// Text fields the view displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Caption,
    Message,
    Note,
}

/// One end of the progress range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeBound {
    Lower,
    Upper,
}

/// Multi-line note text.
///
/// In append mode every entry is terminated with `\n`; embedded `\r\n` or bare
/// `\r` line breaks are normalized to `\n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteBuffer {
    text: String,
    revision: u64,
}

impl NoteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Bumped on every mutation, so callers can detect changes without
    /// comparing the whole text.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn replace(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.revision += 1;
    }

    pub fn append_line(&mut self, text: &str) {
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    self.text.push('\n');
                }
                other => self.text.push(other),
            }
        }
        self.text.push('\n');
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.replace("");
    }

    /// Number of `\n`-terminated entries.
    pub fn line_count(&self) -> usize {
        self.text.matches('\n').count()
    }

    /// Byte offset where the most recent entry starts. A view scrolls its caret
    /// there so the newest line stays visible.
    pub fn last_entry_offset(&self) -> usize {
        let body = self.text.strip_suffix('\n').unwrap_or(&self.text);
        body.rfind('\n').map_or(0, |i| i + 1)
    }
}

/// Everything the caller threads and the UI worker share.
///
/// The `lower_bound <= position <= upper_bound` relation is advisory: nothing
/// enforces it and the view only clamps what it draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressInfo {
    pub caption: String,
    pub message: String,
    pub note: NoteBuffer,
    pub lower_bound: i32,
    pub upper_bound: i32,
    pub position: i32,
    pub options: StartOptions,
    /// Marquee update interval in milliseconds; 0 selects the view's default.
    pub marquee_interval: u32,
    pub bar_color: BarColor,
    pub canceled: bool,
    pub visible: bool,
    pub move_request: MoveRequest,
}

impl Default for ProgressInfo {
    fn default() -> Self {
        Self {
            caption: String::new(),
            message: String::new(),
            note: NoteBuffer::new(),
            lower_bound: 0,
            upper_bound: 0,
            position: 0,
            options: StartOptions::empty(),
            marquee_interval: 0,
            bar_color: BarColor::SystemDefault,
            canceled: false,
            visible: false,
            move_request: MoveRequest::default(),
        }
    }
}

impl ProgressInfo {
    /// The cancel button is live unless disabled by option or already used.
    pub fn cancel_enabled(&self) -> bool {
        !self.options.contains(StartOptions::DISABLE_CANCEL) && !self.canceled
    }

    pub fn progress_bar_shown(&self) -> bool {
        self.options.contains(StartOptions::SHOW_PROGRESSBAR)
    }

    pub fn marquee(&self) -> bool {
        self.options.contains(StartOptions::MARQUEE)
    }

    /// Cheap copy used for change detection; the note is represented by its
    /// revision so long append-mode notes are never cloned per update.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            caption: self.caption.clone(),
            message: self.message.clone(),
            note_revision: self.note.revision(),
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            position: self.position,
            options: self.options,
            marquee_interval: self.marquee_interval,
            bar_color: self.bar_color,
            canceled: self.canceled,
            visible: self.visible,
            move_request: self.move_request,
        }
    }
}

/// See [`ProgressInfo::fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub caption: String,
    pub message: String,
    pub note_revision: u64,
    pub lower_bound: i32,
    pub upper_bound: i32,
    pub position: i32,
    pub options: StartOptions,
    pub marquee_interval: u32,
    pub bar_color: BarColor,
    pub canceled: bool,
    pub visible: bool,
    pub move_request: MoveRequest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_start_options_bits() {
        let mut options = StartOptions::SHOW_PROGRESSBAR | StartOptions::APPEND_TO_NOTE;
        assert!(options.contains(StartOptions::APPEND_TO_NOTE));
        assert!(!options.contains(StartOptions::MARQUEE));

        options.set(StartOptions::MARQUEE, true);
        options.remove(StartOptions::SHOW_PROGRESSBAR);
        assert_eq!(options.bits(), 4 | 8);
        assert_eq!(StartOptions::from_bits_truncate(0xFF).bits(), 15);
    }

    #[test]
    fn test_start_options_debug() {
        let options = StartOptions::DISABLE_CANCEL | StartOptions::MARQUEE;
        assert_eq!(format!("{:?}", options), "StartOptions(DISABLE_CANCEL | MARQUEE)");
        assert_eq!(format!("{:?}", StartOptions::empty()), "StartOptions(empty)");
    }

    #[test]
    fn test_bar_color_colorref() {
        assert_eq!(
            BarColor::from_colorref(BarColor::COLORREF_DEFAULT),
            BarColor::SystemDefault
        );
        let green = BarColor::from_colorref(0x0000_FF00);
        assert_eq!(green, BarColor::Rgb { r: 0, g: 255, b: 0 });
        assert_eq!(green.to_colorref(), 0x0000_FF00);
    }

    #[test]
    fn test_note_append_terminates_entries() {
        let mut note = NoteBuffer::new();
        note.append_line("A");
        note.append_line("B");
        assert_eq!(note.as_str(), "A\nB\n");
        assert_eq!(note.line_count(), 2);

        note.replace("C");
        assert_eq!(note.as_str(), "C");
    }

    #[test]
    fn test_note_append_normalizes_line_breaks() {
        let mut note = NoteBuffer::new();
        note.append_line("one\r\ntwo\rthree");
        assert_eq!(note.as_str(), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_note_last_entry_offset() {
        let mut note = NoteBuffer::new();
        assert_eq!(note.last_entry_offset(), 0);
        note.append_line("first");
        assert_eq!(note.last_entry_offset(), 0);
        note.append_line("second");
        assert_eq!(note.last_entry_offset(), "first\n".len());
    }

    #[test]
    fn test_note_revision_changes() {
        let mut note = NoteBuffer::new();
        let r0 = note.revision();
        note.replace("x");
        note.clear();
        assert_eq!(note.revision(), r0 + 2);
        assert!(note.is_empty());
    }

    #[test]
    fn test_cancel_enabled() {
        let mut info = ProgressInfo::default();
        assert!(info.cancel_enabled());
        info.canceled = true;
        assert!(!info.cancel_enabled());
        info.canceled = false;
        info.options = StartOptions::DISABLE_CANCEL;
        assert!(!info.cancel_enabled());
    }

    proptest! {
        #[test]
        fn prop_append_adds_one_entry_per_call(lines in proptest::collection::vec("[a-z ]{0,12}", 0..20)) {
            let mut note = NoteBuffer::new();
            for line in &lines {
                note.append_line(line);
            }
            prop_assert_eq!(note.line_count(), lines.len());
            prop_assert_eq!(note.as_str(), lines.iter().map(|l| format!("{l}\n")).collect::<String>());
        }
    }
}
