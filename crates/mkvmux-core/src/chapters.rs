//! Automatic chapter generation.

/// When chapters are generated automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum ChapterGeneration {
    #[default]
    None,
    /// At the start of every appended source file and at every appended part.
    WhenAppending,
    /// Every `n` nanoseconds of the reference track.
    Interval(i64),
}

/// Default name template for generated chapters.
pub const DEFAULT_NAME_TEMPLATE: &str = "Chapter <NUM:2>";

/// Receives generated chapters.
pub trait ChapterSink {
    fn generate_chapter(&mut self, timestamp: i64, name: &str);
}

/// A generated chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedChapter {
    pub timestamp: i64,
    pub name: String,
}

/// Collects generated chapters in memory.
#[derive(Debug, Default, Clone)]
pub struct GeneratedChapters {
    chapters: Vec<GeneratedChapter>,
}

impl GeneratedChapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chapters(&self) -> &[GeneratedChapter] {
        &self.chapters
    }
}

impl ChapterSink for GeneratedChapters {
    fn generate_chapter(&mut self, timestamp: i64, name: &str) {
        tracing::debug!(timestamp, name, "Generated chapter");
        self.chapters.push(GeneratedChapter {
            timestamp,
            name: name.to_string(),
        });
    }
}

/// Format nanoseconds as `HH:MM:SS.nnnnnnnnn`.
pub fn format_timestamp(timestamp: i64) -> String {
    let sign = if timestamp < 0 { "-" } else { "" };
    let ns = timestamp.unsigned_abs();
    let seconds = ns / 1_000_000_000;
    format!(
        "{sign}{:02}:{:02}:{:02}.{:09}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        ns % 1_000_000_000
    )
}

/// Expand a chapter name template.
///
/// `<NUM>` is the chapter number, `<NUM:n>` the number zero-padded to `n`
/// digits and `<START>` the start timestamp.
pub fn format_chapter_name(template: &str, number: usize, timestamp: i64) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('>') else {
            out.push_str(tail);
            return out;
        };

        let tag = &tail[1..close];
        let width = tag
            .strip_prefix("NUM:")
            .and_then(|w| w.parse::<usize>().ok());
        match (tag, width) {
            ("NUM", _) => out.push_str(&number.to_string()),
            ("START", _) => out.push_str(&format_timestamp(timestamp)),
            (_, Some(width)) => out.push_str(&format!("{number:0width$}")),
            _ => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}
