//! Running a packet script through a mux session into files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mkvmux_core::output::numbered_path;
use mkvmux_core::track::TrackStatistics;
use mkvmux_core::{FileOutput, HeadUpdateResult, MuxSession, SegmentSettings};
use serde::Serialize;

use crate::config::Config;
use crate::script::PacketScript;

#[derive(Debug, Clone, Serialize)]
pub struct ChapterReport {
    pub timestamp: i64,
    pub name: String,
}

/// What a mux run produced.
#[derive(Debug, Clone, Serialize)]
pub struct MuxReport {
    pub files: Vec<PathBuf>,
    pub packets: u64,
    pub clusters: u64,
    pub doc_type_version: u64,
    pub doc_type_read_version: u64,
    pub head_update: String,
    pub discarded_range: Option<(i64, i64)>,
    pub chapters: Vec<ChapterReport>,
    pub tracks: BTreeMap<u64, TrackStatistics>,
}

fn head_update_label(result: HeadUpdateResult) -> &'static str {
    match result {
        HeadUpdateResult::NoUpdateNeeded => "no_update_needed",
        HeadUpdateResult::Updated => "updated",
        HeadUpdateResult::NoHeadFound => "no_head_found",
        HeadUpdateResult::NotEnoughSpace => "not_enough_space",
        HeadUpdateResult::ReadWriteFailure => "read_write_failure",
    }
}

/// Mux every packet of `script` into `output`.
pub fn mux_script(script: &PacketScript, output: &Path, config: &Config) -> Result<MuxReport> {
    let numbered =
        config.output.numbered_when_splitting && !config.mux.splitting.points.is_empty();

    let first_file = if numbered {
        numbered_path(output, 1)
    } else {
        output.to_path_buf()
    };
    if !config.output.overwrite && first_file.exists() {
        anyhow::bail!("Output file already exists: {:?}", first_file);
    }

    let mut settings = SegmentSettings::for_config(&config.mux);
    if let Some(app) = &config.output.writing_app {
        settings.writing_app = app.clone();
    }

    let file_output = FileOutput::new(output, numbered, settings);
    let mut session = MuxSession::new(config.mux.clone(), file_output)
        .context("Failed to create mux session")?;

    for track in script.track_configs()? {
        let number = track.number;
        session
            .register_track(track)
            .with_context(|| format!("Failed to register track {}", number))?;
    }

    let packets = script.packets()?;
    tracing::info!(
        tracks = script.tracks.len(),
        packets = packets.len(),
        output = %output.display(),
        "Muxing packet script"
    );

    for (index, packet) in packets.into_iter().enumerate() {
        session
            .add_packet(packet)
            .with_context(|| format!("Failed to mux packet {}", index))?;
    }
    let head_update = session.finish().context("Failed to finish muxing")?;

    Ok(MuxReport {
        files: session.output().written_files().to_vec(),
        packets: session.packets(),
        clusters: session.assembler().clusters_written(),
        doc_type_version: session.versions().version(),
        doc_type_read_version: session.versions().read_version(),
        head_update: head_update_label(head_update).to_string(),
        discarded_range: session.assembler().discarded_range(),
        chapters: session
            .chapters()
            .chapters()
            .iter()
            .map(|c| ChapterReport {
                timestamp: c.timestamp,
                name: c.name.clone(),
            })
            .collect(),
        tracks: session.tracks().statistics(),
    })
}
