//! Output files.
//!
//! A [`MuxOutput`] owns the file(s) clusters are written to. Starting a file
//! writes the EBML head, an unknown-size Segment, a Void reserved for the
//! SeekHead, Info and Tracks. Finishing it fills in the SeekHead, the
//! segment size and the duration, then patches the EBML head versions.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use mkvmux_ebml::vint::{write_vint, UNKNOWN_SIZE_MARKER};
use mkvmux_ebml::{EbmlElement, ElementId, ElementSink};

use crate::doc_version::{DocTypeVersionTracker, HeadUpdateResult};
use crate::seek::{seek_head_element, SeekEntry};
use crate::track::TrackRegistry;
use crate::{Error, Result};

/// Bytes reserved right after the Segment header for the primary SeekHead.
pub const SEEK_HEAD_RESERVE: u64 = 160;

/// Anything clusters can be written to and the EBML head read back from.
pub trait OutputFile: Read + Write + Seek {}

impl<T: Read + Write + Seek + ?Sized> OutputFile for T {}

/// Destination of the muxed data.
pub trait MuxOutput {
    /// The currently open file.
    fn file(&mut self) -> Result<&mut dyn OutputFile>;

    /// Whether a file is open.
    fn is_open(&self) -> bool;

    /// Absolute position of the current Segment's data.
    fn segment_data_start(&self) -> u64;

    /// Open the next file and write its headers. Returns the number of
    /// header bytes written.
    fn start_file(
        &mut self,
        tracks: &TrackRegistry,
        versions: &mut DocTypeVersionTracker,
    ) -> Result<u64>;

    /// Finalize the current file. `duration` is the file's duration in
    /// nanoseconds.
    fn finish_file(
        &mut self,
        entries: Vec<SeekEntry>,
        versions: &mut DocTypeVersionTracker,
        duration: Option<i64>,
    ) -> Result<HeadUpdateResult>;
}

/// Segment level settings written into every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSettings {
    pub doc_type: String,
    pub timestamp_scale: u64,
    pub muxing_app: String,
    pub writing_app: String,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        let app = format!("mkvmux {}", env!("CARGO_PKG_VERSION"));
        Self {
            doc_type: "matroska".to_string(),
            timestamp_scale: crate::config::DEFAULT_TIMESTAMP_SCALE,
            muxing_app: app.clone(),
            writing_app: app,
        }
    }
}

impl SegmentSettings {
    /// Settings matching a mux configuration.
    pub fn for_config(config: &crate::config::MuxConfig) -> Self {
        Self {
            doc_type: config.doc_type.clone(),
            timestamp_scale: config.timestamp_scale,
            ..Self::default()
        }
    }
}

/// Positions recorded while writing a file's headers.
#[derive(Debug, Clone, Copy, Default)]
struct SegmentState {
    size_position: u64,
    data_start: u64,
    seek_head_position: u64,
    info_position: u64,
    duration_position: u64,
    tracks_position: u64,
}

fn begin_segment(
    file: &mut dyn OutputFile,
    settings: &SegmentSettings,
    tracks: &TrackRegistry,
    versions: &mut DocTypeVersionTracker,
) -> Result<SegmentState> {
    let start = file.position()?;

    let mut tracks_element = tracks.to_element();
    versions.prune(&mut tracks_element);
    versions.account(&tracks_element, false);

    file.write_element(&versions.ebml_head(&settings.doc_type).with_size_length(8))?;

    file.write_body(&ElementId::SEGMENT.to_bytes())?;
    let size_position = file.position()?;
    file.write_body(&UNKNOWN_SIZE_MARKER)?;
    let data_start = file.position()?;

    let seek_head_position = data_start;
    let void = EbmlElement::void(SEEK_HEAD_RESERVE)
        .ok_or_else(|| Error::invariant("SeekHead reserve too small"))?;
    file.write_element(&void)?;

    let info_position = file.position()?;
    let mut info = EbmlElement::master(
        ElementId::INFO,
        vec![
            EbmlElement::uint(ElementId::TIMESTAMP_SCALE, settings.timestamp_scale),
            EbmlElement::float(ElementId::DURATION, 0.0),
            EbmlElement::string(ElementId::MUXING_APP, settings.muxing_app.clone()),
            EbmlElement::string(ElementId::WRITING_APP, settings.writing_app.clone()),
        ],
    );
    let duration_position =
        info_position + info.header_size() + info.children()[0].total_size() + 3;
    versions.render(&mut info, file, false)?;

    let tracks_position = file.position()?;
    versions.render(&mut tracks_element, file, false)?;

    tracing::debug!(
        data_start,
        header_bytes = file.position()? - start,
        "Started segment"
    );

    Ok(SegmentState {
        size_position,
        data_start,
        seek_head_position,
        info_position,
        duration_position,
        tracks_position,
    })
}

fn end_segment(
    file: &mut dyn OutputFile,
    state: &SegmentState,
    settings: &SegmentSettings,
    entries: Vec<SeekEntry>,
    versions: &mut DocTypeVersionTracker,
    duration: Option<i64>,
) -> Result<HeadUpdateResult> {
    let relative = |position: u64| position - state.data_start;

    let (clusters, others): (Vec<SeekEntry>, Vec<SeekEntry>) = entries
        .into_iter()
        .partition(|e| e.id == ElementId::CLUSTER);

    let mut primary = vec![
        SeekEntry {
            id: ElementId::INFO,
            position: relative(state.info_position),
        },
        SeekEntry {
            id: ElementId::TRACKS,
            position: relative(state.tracks_position),
        },
    ];
    primary.extend(others);

    file.seek(SeekFrom::End(0))?;
    if !clusters.is_empty() {
        let secondary_position = file.position()?;
        let mut secondary = seek_head_element(&clusters);
        versions.render(&mut secondary, file, false)?;
        primary.push(SeekEntry {
            id: ElementId::SEEK_HEAD,
            position: relative(secondary_position),
        });
    }
    let end = file.position()?;

    let primary = seek_head_element(&primary);
    versions.account(&primary, false);
    let encoded = primary
        .encode_into_space(SEEK_HEAD_RESERVE)?
        .ok_or_else(|| Error::invariant("primary SeekHead does not fit its reserved space"))?;
    file.seek(SeekFrom::Start(state.seek_head_position))?;
    file.write_body(&encoded)?;

    file.seek(SeekFrom::Start(state.size_position))?;
    let mut size = Vec::with_capacity(8);
    write_vint(&mut size, end - state.data_start, 8)?;
    file.write_body(&size)?;

    if let Some(duration) = duration {
        let units = duration as f64 / settings.timestamp_scale as f64;
        file.seek(SeekFrom::Start(state.duration_position))?;
        file.write_body(&units.to_be_bytes())?;
    }

    file.seek(SeekFrom::Start(end))?;
    let result = versions.update_ebml_head(file);
    match result {
        HeadUpdateResult::NoUpdateNeeded | HeadUpdateResult::Updated => {}
        HeadUpdateResult::ReadWriteFailure => {
            return Err(Error::Io(std::io::Error::other(
                "failed to rewrite the EBML head",
            )))
        }
        other => tracing::warn!(
            result = ?other,
            version = versions.version(),
            read_version = versions.read_version(),
            "EBML head keeps its original DocType versions"
        ),
    }
    file.flush()?;

    tracing::debug!(segment_size = end - state.data_start, "Finished segment");
    Ok(result)
}

/// Writes one file, or numbered files when splitting.
#[derive(Debug)]
pub struct FileOutput {
    path: PathBuf,
    numbered: bool,
    settings: SegmentSettings,
    current: Option<(File, SegmentState)>,
    written: Vec<PathBuf>,
}

impl FileOutput {
    /// Write to `path`. With `numbered` set, files are named
    /// `stem-001.ext`, `stem-002.ext` and so on.
    pub fn new(path: impl Into<PathBuf>, numbered: bool, settings: SegmentSettings) -> Self {
        Self {
            path: path.into(),
            numbered,
            settings,
            current: None,
            written: Vec::new(),
        }
    }

    /// Paths of all files started so far.
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    fn next_path(&self) -> PathBuf {
        if !self.numbered {
            return self.path.clone();
        }
        numbered_path(&self.path, self.written.len() + 1)
    }
}

/// `dir/stem-NNN.ext` for file number `number`.
pub fn numbered_path(path: &Path, number: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{number:03}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{number:03}"),
    };
    path.with_file_name(name)
}

impl MuxOutput for FileOutput {
    fn file(&mut self) -> Result<&mut dyn OutputFile> {
        match self.current.as_mut() {
            Some((file, _)) => Ok(file),
            None => Err(Error::invariant("no output file open")),
        }
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }

    fn segment_data_start(&self) -> u64 {
        self.current.as_ref().map_or(0, |(_, state)| state.data_start)
    }

    fn start_file(
        &mut self,
        tracks: &TrackRegistry,
        versions: &mut DocTypeVersionTracker,
    ) -> Result<u64> {
        if self.current.is_some() {
            return Err(Error::invariant("previous output file still open"));
        }

        let path = self.next_path();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        tracing::info!(path = %path.display(), "Opened output file");

        let state = begin_segment(&mut file, &self.settings, tracks, versions)?;
        let header_bytes = file.stream_position()?;
        self.written.push(path);
        self.current = Some((file, state));
        Ok(header_bytes)
    }

    fn finish_file(
        &mut self,
        entries: Vec<SeekEntry>,
        versions: &mut DocTypeVersionTracker,
        duration: Option<i64>,
    ) -> Result<HeadUpdateResult> {
        let (mut file, state) = self
            .current
            .take()
            .ok_or_else(|| Error::invariant("no output file open"))?;
        let result = end_segment(&mut file, &state, &self.settings, entries, versions, duration)?;
        file.sync_all()?;
        Ok(result)
    }
}

/// Keeps every file in memory. Used by tests and benchmarks.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    settings: SegmentSettings,
    current: Option<(Cursor<Vec<u8>>, SegmentState)>,
    finished: Vec<Vec<u8>>,
}

impl MemoryOutput {
    pub fn new(settings: SegmentSettings) -> Self {
        Self {
            settings,
            current: None,
            finished: Vec::new(),
        }
    }

    /// Finished files in order.
    pub fn files(&self) -> &[Vec<u8>] {
        &self.finished
    }

    pub fn into_files(self) -> Vec<Vec<u8>> {
        self.finished
    }
}

impl MuxOutput for MemoryOutput {
    fn file(&mut self) -> Result<&mut dyn OutputFile> {
        match self.current.as_mut() {
            Some((cursor, _)) => Ok(cursor),
            None => Err(Error::invariant("no output file open")),
        }
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }

    fn segment_data_start(&self) -> u64 {
        self.current.as_ref().map_or(0, |(_, state)| state.data_start)
    }

    fn start_file(
        &mut self,
        tracks: &TrackRegistry,
        versions: &mut DocTypeVersionTracker,
    ) -> Result<u64> {
        if self.current.is_some() {
            return Err(Error::invariant("previous output file still open"));
        }
        let mut cursor = Cursor::new(Vec::new());
        let state = begin_segment(&mut cursor, &self.settings, tracks, versions)?;
        let header_bytes = cursor.position();
        self.current = Some((cursor, state));
        Ok(header_bytes)
    }

    fn finish_file(
        &mut self,
        entries: Vec<SeekEntry>,
        versions: &mut DocTypeVersionTracker,
        duration: Option<i64>,
    ) -> Result<HeadUpdateResult> {
        let (mut cursor, state) = self
            .current
            .take()
            .ok_or_else(|| Error::invariant("no output file open"))?;
        let result = end_segment(&mut cursor, &state, &self.settings, entries, versions, duration)?;
        self.finished.push(cursor.into_inner());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{TrackConfig, TrackType};
    use mkvmux_ebml::{read_element, read_element_header};

    fn tracks() -> TrackRegistry {
        let mut tracks = TrackRegistry::new();
        tracks
            .register(TrackConfig::new(1, TrackType::Video, "V_VP9"))
            .unwrap();
        tracks
    }

    #[test]
    fn test_numbered_path() {
        assert_eq!(
            numbered_path(Path::new("/tmp/out.mkv"), 2),
            PathBuf::from("/tmp/out-002.mkv")
        );
        assert_eq!(numbered_path(Path::new("movie"), 10), PathBuf::from("movie-010"));
    }

    #[test]
    fn test_empty_segment_layout() {
        let mut output = MemoryOutput::new(SegmentSettings::default());
        let mut versions = DocTypeVersionTracker::new();
        let header_bytes = output.start_file(&tracks(), &mut versions).unwrap();
        assert!(header_bytes > SEEK_HEAD_RESERVE);
        assert!(output.is_open());

        output
            .finish_file(Vec::new(), &mut versions, Some(2_000_000_000))
            .unwrap();
        assert!(!output.is_open());

        let mut file = Cursor::new(output.files()[0].clone());
        let head = read_element(&mut file).unwrap();
        assert_eq!(head.id, ElementId::EBML);
        assert_eq!(head.size_length, Some(8));

        let segment = read_element_header(&mut file).unwrap();
        assert_eq!(segment.id, ElementId::SEGMENT);
        let data_start = file.position();
        assert_eq!(
            segment.size,
            Some(output.files()[0].len() as u64 - data_start)
        );

        let seek_head = read_element(&mut file).unwrap();
        assert_eq!(seek_head.id, ElementId::SEEK_HEAD);
        let info = read_element(&mut file).unwrap();
        assert_eq!(info.id, ElementId::INFO);
        assert_eq!(
            info.child(ElementId::DURATION).map(|d| d.value.clone()),
            Some(mkvmux_ebml::ElementValue::Float(2_000.0))
        );
    }

    #[test]
    fn test_file_output_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = FileOutput::new(dir.path().join("out.mkv"), true, SegmentSettings::default());
        let mut versions = DocTypeVersionTracker::new();

        for _ in 0..2 {
            output.start_file(&tracks(), &mut versions).unwrap();
            output.finish_file(Vec::new(), &mut versions, None).unwrap();
        }

        let names: Vec<_> = output
            .written_files()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["out-001.mkv", "out-002.mkv"]);
        assert!(output.written_files().iter().all(|p| p.exists()));
    }
}
