//! End-to-end muxing scenarios: packets in, Matroska bytes out, and the
//! written file parsed back.

use mkvmux_core::block::decode_block;
use mkvmux_core::config::MuxConfig;
use mkvmux_core::output::{FileOutput, MemoryOutput, SegmentSettings};
use mkvmux_core::split::SplitPoint;
use mkvmux_core::{
    BlockBlobMode, DocTypeVersionTracker, HeadUpdateResult, MuxSession, Packet, TrackConfig,
    TrackType,
};
use mkvmux_ebml::{parse_element, EbmlElement, ElementId};

const MS: i64 = 1_000_000;

struct ParsedFile {
    head: EbmlElement,
    /// Segment children with their segment-relative positions.
    children: Vec<(u64, EbmlElement)>,
}

impl ParsedFile {
    fn parse(bytes: &[u8]) -> Self {
        let (head, used) = parse_element(bytes).unwrap();
        assert_eq!(head.id, ElementId::EBML);
        let (segment, consumed) = parse_element(&bytes[used..]).unwrap();
        assert_eq!(segment.id, ElementId::SEGMENT);
        assert_eq!(used + consumed, bytes.len());

        let mut position = 0;
        let children = segment
            .children()
            .iter()
            .map(|child| {
                let at = position;
                position += child.total_size();
                (at, child.clone())
            })
            .collect();
        Self { head, children }
    }

    fn top_level(&self, id: ElementId) -> impl Iterator<Item = &(u64, EbmlElement)> {
        self.children.iter().filter(move |(_, e)| e.id == id)
    }

    fn element_at(&self, position: u64) -> Option<&EbmlElement> {
        self.children
            .iter()
            .find(|(at, _)| *at == position)
            .map(|(_, e)| e)
    }

    fn blocks(&self) -> Vec<WrittenBlock> {
        let mut blocks = Vec::new();
        for (position, cluster) in self.top_level(ElementId::CLUSTER) {
            let base = cluster.child_uint(ElementId::CLUSTER_TIMESTAMP).unwrap() as i64;
            let mut offset = 0;
            for child in cluster.children() {
                let relative_position = offset;
                offset += child.total_size();

                let (payload, group) = match child.id {
                    ElementId::SIMPLE_BLOCK => (child.as_binary().unwrap().clone(), None),
                    ElementId::BLOCK_GROUP => (
                        child.child(ElementId::BLOCK).unwrap().as_binary().unwrap().clone(),
                        Some(child),
                    ),
                    _ => continue,
                };
                let decoded = decode_block(&payload).unwrap();
                let timestamp = (base + i64::from(decoded.relative_timestamp)) * MS;
                let references: Vec<i64> = group
                    .map(|g| {
                        g.children()
                            .iter()
                            .filter(|c| c.id == ElementId::REFERENCE_BLOCK)
                            .map(|c| timestamp + c.as_int().unwrap() * MS)
                            .collect()
                    })
                    .unwrap_or_default();

                blocks.push(WrittenBlock {
                    track: decoded.track,
                    timestamp,
                    key: if group.is_some() {
                        references.is_empty()
                    } else {
                        decoded.key_frame
                    },
                    discardable: decoded.discardable,
                    simple: group.is_none(),
                    frames: decoded.frames.len(),
                    references,
                    cluster_position: *position,
                    relative_position,
                });
            }
        }
        blocks
    }

    fn cue_points(&self) -> Vec<WrittenCue> {
        let Some((_, cues)) = self.top_level(ElementId::CUES).next() else {
            return Vec::new();
        };
        cues.children()
            .iter()
            .map(|point| {
                let positions = point.child(ElementId::CUE_TRACK_POSITIONS).unwrap();
                WrittenCue {
                    timestamp: point.child_uint(ElementId::CUE_TIME).unwrap() as i64 * MS,
                    track: positions.child_uint(ElementId::CUE_TRACK).unwrap(),
                    cluster_position: positions.child_uint(ElementId::CUE_CLUSTER_POSITION).unwrap(),
                    relative_position: positions.child_uint(ElementId::CUE_RELATIVE_POSITION),
                    duration: positions.child_uint(ElementId::CUE_DURATION),
                    codec_state: positions.child_uint(ElementId::CUE_CODEC_STATE),
                }
            })
            .collect()
    }

    fn doc_type_versions(&self) -> (u64, u64) {
        (
            self.head.child_uint(ElementId::DOC_TYPE_VERSION).unwrap(),
            self.head.child_uint(ElementId::DOC_TYPE_READ_VERSION).unwrap(),
        )
    }
}

#[derive(Debug)]
struct WrittenBlock {
    track: u64,
    timestamp: i64,
    key: bool,
    discardable: bool,
    simple: bool,
    frames: usize,
    references: Vec<i64>,
    cluster_position: u64,
    relative_position: u64,
}

#[derive(Debug)]
struct WrittenCue {
    timestamp: i64,
    track: u64,
    cluster_position: u64,
    relative_position: Option<u64>,
    duration: Option<u64>,
    codec_state: Option<u64>,
}

fn session(config: MuxConfig, tracks: &[TrackConfig]) -> MuxSession<MemoryOutput> {
    let output = MemoryOutput::new(SegmentSettings::for_config(&config));
    let mut session = MuxSession::new(config, output).unwrap();
    for track in tracks {
        session.register_track(track.clone()).unwrap();
    }
    session
}

fn video() -> TrackConfig {
    TrackConfig::new(1, TrackType::Video, "V_MPEG4/ISO/AVC")
}

fn mux(config: MuxConfig, tracks: &[TrackConfig], packets: Vec<Packet>) -> (Vec<Vec<u8>>, HeadUpdateResult) {
    let mut session = session(config, tracks);
    for packet in packets {
        session.add_packet(packet).unwrap();
    }
    let result = session.finish().unwrap();
    (session.into_output().into_files(), result)
}

#[test]
fn test_every_packet_written_once() {
    let config = MuxConfig {
        lacing: false,
        ..Default::default()
    };
    let tracks = [video(), TrackConfig::new(2, TrackType::Audio, "A_AAC")];

    let mut packets = Vec::new();
    let mut expected = Vec::new();
    for i in 0..200i64 {
        packets.push(Packet::new(1, i * 40 * MS, vec![1u8; 100]).with_duration(40 * MS));
        expected.push((1, i * 40 * MS));
        for j in 0..2 {
            let ts = i * 40 * MS + j * 20 * MS;
            packets.push(Packet::new(2, ts, vec![2u8; 30]).with_duration(20 * MS));
            expected.push((2, ts));
        }
    }

    let (files, _) = mux(config, &tracks, packets);
    assert_eq!(files.len(), 1);
    let parsed = ParsedFile::parse(&files[0]);

    let mut written: Vec<_> = parsed.blocks().iter().map(|b| (b.track, b.timestamp)).collect();
    written.sort();
    expected.sort();
    assert_eq!(written, expected);

    // 8 s of content with the default 5 s cluster limit
    assert!(parsed.top_level(ElementId::CLUSTER).count() >= 2);
}

#[test]
fn test_reference_round_trip() {
    let packets = vec![
        Packet::new(1, 0, vec![0u8; 50]),
        Packet::new(1, 120 * MS, vec![0u8; 20]).with_bref(0),
        Packet::new(1, 40 * MS, vec![0u8; 10]).with_bref(0).with_fref(120 * MS),
        Packet::new(1, 80 * MS, vec![0u8; 10]).with_bref(40 * MS).with_fref(120 * MS),
    ];
    let (files, _) = mux(MuxConfig::default(), &[video()], packets);
    let blocks = ParsedFile::parse(&files[0]).blocks();

    let refs: Vec<_> = blocks
        .iter()
        .map(|b| (b.timestamp, b.references.clone()))
        .collect();
    assert_eq!(
        refs,
        vec![
            (0, vec![]),
            (120 * MS, vec![0]),
            (40 * MS, vec![0, 120 * MS]),
            (80 * MS, vec![40 * MS, 120 * MS]),
        ]
    );
    assert!(blocks[0].simple && blocks[0].key);
    assert!(blocks[1..].iter().all(|b| !b.simple && !b.key));
}

#[test]
fn test_always_simple_flags() {
    let config = MuxConfig {
        block_mode: BlockBlobMode::AlwaysSimple,
        ..Default::default()
    };
    let packets = vec![
        Packet::new(1, 0, vec![0u8; 50]),
        Packet::new(1, 80 * MS, vec![0u8; 20]).with_bref(0),
        Packet::new(1, 40 * MS, vec![0u8; 10]).with_bref(0).with_fref(80 * MS),
    ];
    let (files, _) = mux(config, &[video()], packets);
    let blocks = ParsedFile::parse(&files[0]).blocks();

    assert!(blocks.iter().all(|b| b.simple));
    assert!(blocks[0].key && !blocks[0].discardable);
    assert!(!blocks[1].key && !blocks[1].discardable);
    assert!(!blocks[2].key && blocks[2].discardable);
}

#[test]
fn test_key_frames_in_one_cluster() {
    let packets = (0..3)
        .map(|i| Packet::new(1, i * 40 * MS, vec![0u8; 64]))
        .collect();
    let (files, _) = mux(MuxConfig::default(), &[video()], packets);
    let parsed = ParsedFile::parse(&files[0]);

    assert_eq!(parsed.top_level(ElementId::CLUSTER).count(), 1);
    let cues = parsed.cue_points();
    assert_eq!(cues.len(), 3);
    assert_eq!(
        cues.iter().map(|c| c.timestamp).collect::<Vec<_>>(),
        vec![0, 40 * MS, 80 * MS]
    );

    let relative: Vec<u64> = cues.iter().filter_map(|c| c.relative_position).collect();
    assert_eq!(relative.len(), 3);
    assert!(relative.windows(2).all(|w| w[0] < w[1]));

    let blocks = parsed.blocks();
    for (cue, block) in cues.iter().zip(&blocks) {
        assert_eq!(cue.cluster_position, block.cluster_position);
        assert_eq!(cue.relative_position, Some(block.relative_position));
    }
}

#[test]
fn test_cues_sorted_and_resolvable() {
    let tracks = [
        video(),
        TrackConfig::new(2, TrackType::Subtitle, "S_TEXT/UTF8"),
    ];
    let mut packets = Vec::new();
    for i in 0..300i64 {
        let ts = i * 40 * MS;
        let packet = Packet::new(1, ts, vec![0u8; 200]);
        packets.push(if i % 25 == 0 { packet } else { packet.with_bref(ts - 40 * MS) });
        if i % 50 == 0 {
            packets.push(Packet::new(2, ts, b"subtitle".to_vec()).with_duration(1_500 * MS));
        }
    }
    let (files, _) = mux(MuxConfig::default(), &tracks, packets);
    let parsed = ParsedFile::parse(&files[0]);
    let cues = parsed.cue_points();

    assert!(cues.len() >= 12 + 6);
    assert!(cues
        .windows(2)
        .all(|w| (w[0].timestamp, w[0].track) <= (w[1].timestamp, w[1].track)));
    for cue in &cues {
        let cluster = parsed.element_at(cue.cluster_position).unwrap();
        assert_eq!(cluster.id, ElementId::CLUSTER);
    }

    let subtitle_durations: Vec<_> = cues
        .iter()
        .filter(|c| c.track == 2)
        .map(|c| c.duration)
        .collect();
    assert!(subtitle_durations.iter().all(|d| *d == Some(1_500)));
    assert!(cues.iter().filter(|c| c.track == 1).all(|c| c.duration.is_none()));
}

#[test]
fn test_identical_timestamps_on_two_tracks() {
    let tracks = [
        video(),
        TrackConfig::new(2, TrackType::Subtitle, "S_TEXT/UTF8"),
    ];
    let packets = vec![
        Packet::new(1, 0, vec![0u8; 32]),
        Packet::new(2, 0, b"hello".to_vec()),
    ];
    let (files, _) = mux(MuxConfig::default(), &tracks, packets);
    let cues = ParsedFile::parse(&files[0]).cue_points();

    assert_eq!(cues.len(), 2);
    assert_eq!((cues[0].track, cues[1].track), (1, 2));
    assert_eq!(cues[0].cluster_position, cues[1].cluster_position);
    assert_ne!(cues[0].relative_position, cues[1].relative_position);
}

#[test]
fn test_delta_overflow_starts_new_cluster() {
    let mut config = MuxConfig::default();
    config.cluster.max_duration = 100_000 * MS;
    let packets = vec![
        Packet::new(1, 0, vec![0u8; 8]),
        Packet::new(1, 40_000 * MS, vec![0u8; 8]),
    ];
    let (files, _) = mux(config, &[video()], packets);
    let parsed = ParsedFile::parse(&files[0]);

    let clusters: Vec<_> = parsed
        .top_level(ElementId::CLUSTER)
        .map(|(_, c)| c.child_uint(ElementId::CLUSTER_TIMESTAMP).unwrap())
        .collect();
    assert_eq!(clusters, vec![0, 40_000]);
    assert_eq!(
        parsed.blocks().iter().map(|b| b.timestamp).collect::<Vec<_>>(),
        vec![0, 40_000 * MS]
    );
}

#[test]
fn test_split_by_size_at_key_frames() {
    let mut config = MuxConfig::default();
    config.splitting.points = vec![SplitPoint::size(20_000)];

    let packets = (0..60i64)
        .map(|i| {
            let packet = Packet::new(1, i * 40 * MS, vec![0u8; 1_000]);
            if i % 5 == 0 {
                packet
            } else {
                packet.with_bref((i - 1) * 40 * MS)
            }
        })
        .collect();
    let (files, _) = mux(config, &[video()], packets);

    assert_eq!(files.len(), 3);
    for file in &files {
        let blocks = ParsedFile::parse(file).blocks();
        assert_eq!(blocks.len(), 20);
        assert!(blocks[0].key);
        assert_eq!(blocks[0].timestamp, 0);
    }
}

#[test]
fn test_head_versions_follow_content() {
    let (files, result) = mux(
        MuxConfig::default(),
        &[video()],
        vec![Packet::new(1, 0, vec![0u8; 8])],
    );
    assert_eq!(result, HeadUpdateResult::Updated);

    // SimpleBlock needs (2, 2), CueRelativePosition needs version 4
    let parsed = ParsedFile::parse(&files[0]);
    assert_eq!(parsed.doc_type_versions(), (4, 2));
}

#[test]
fn test_version_limit_keeps_version_one() {
    let config = MuxConfig {
        version_limit: Some(1),
        ..Default::default()
    };
    let (files, result) = mux(config, &[video()], vec![Packet::new(1, 0, vec![0u8; 8])]);
    assert_eq!(result, HeadUpdateResult::NoUpdateNeeded);

    let parsed = ParsedFile::parse(&files[0]);
    assert_eq!(parsed.doc_type_versions(), (1, 1));
    assert!(parsed.blocks().iter().all(|b| !b.simple));
    assert!(parsed.cue_points().iter().all(|c| c.relative_position.is_none()));
}

#[test]
fn test_codec_state_cue_position() {
    let packets = vec![
        Packet::new(1, 0, vec![0u8; 16]).with_codec_state(vec![9u8; 4]),
        Packet::new(1, 40 * MS, vec![0u8; 16]),
    ];
    let (files, _) = mux(MuxConfig::default(), &[video()], packets);
    let parsed = ParsedFile::parse(&files[0]);
    let cues = parsed.cue_points();

    let position = cues[0].codec_state.unwrap();
    assert!(cues[1].codec_state.is_none());

    let (cluster_position, cluster) = parsed.top_level(ElementId::CLUSTER).next().unwrap();
    let relative = cues[0].relative_position.unwrap();
    let group = cluster
        .children()
        .iter()
        .scan(0u64, |offset, child| {
            let at = *offset;
            *offset += child.total_size();
            Some((at, child))
        })
        .find(|(at, _)| *at == relative)
        .map(|(_, child)| child)
        .unwrap();
    assert_eq!(group.id, ElementId::BLOCK_GROUP);

    let block = group.child(ElementId::BLOCK).unwrap();
    let expected = cluster_position + cluster.header_size() + relative + group.header_size() + block.total_size();
    assert_eq!(position, expected);
}

#[test]
fn test_audio_lacing() {
    let tracks = [TrackConfig::new(2, TrackType::Audio, "A_VORBIS").with_default_duration(20_000_000)];
    let packets = (0..10)
        .map(|i| Packet::new(2, i * 20 * MS, vec![i as u8; 40 + i as usize]).with_duration(20 * MS))
        .collect();
    let (files, _) = mux(MuxConfig::default(), &tracks, packets);
    let blocks = ParsedFile::parse(&files[0]).blocks();

    assert_eq!(blocks.iter().map(|b| b.frames).collect::<Vec<_>>(), vec![8, 2]);
    assert_eq!(blocks[1].timestamp, 160 * MS);
    // sparse cues without a video track: the first block only
    let cues = ParsedFile::parse(&files[0]).cue_points();
    assert_eq!(cues.len(), 1);
}

#[test]
fn test_version_accounting_is_idempotent() {
    let (files, _) = mux(
        MuxConfig::default(),
        &[video()],
        vec![Packet::new(1, 0, vec![0u8; 8])],
    );
    let parsed = ParsedFile::parse(&files[0]);
    let (_, cluster) = parsed.top_level(ElementId::CLUSTER).next().unwrap();

    let mut once = DocTypeVersionTracker::new();
    once.account(cluster, false);
    let mut twice = once.clone();
    twice.account(cluster, false);
    assert_eq!(once, twice);
    assert_eq!((once.version(), once.read_version()), (2, 2));
}

#[test]
fn test_file_output_split_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MuxConfig::default();
    config.splitting.points = vec![SplitPoint::duration(1_000 * MS)];

    let output = FileOutput::new(dir.path().join("movie.mkv"), true, SegmentSettings::for_config(&config));
    let mut session = MuxSession::new(config, output).unwrap();
    session.register_track(video()).unwrap();
    for i in 0..75 {
        session
            .add_packet(Packet::new(1, i * 40 * MS, vec![0u8; 100]))
            .unwrap();
    }
    session.finish().unwrap();

    let output = session.into_output();
    assert_eq!(output.written_files().len(), 3);
    for path in output.written_files() {
        let bytes = std::fs::read(path).unwrap();
        let parsed = ParsedFile::parse(&bytes);
        assert_eq!(parsed.blocks().len(), 25);
    }
}

#[test]
fn test_unlinked_split_with_older_audio() {
    let mut config = MuxConfig::default();
    config.splitting.points = vec![SplitPoint::timestamp(80 * MS)];
    let tracks = [video(), TrackConfig::new(2, TrackType::Audio, "A_OPUS")];
    // The audio at 70ms is muxed after the video key frame the split happens on
    let packets = vec![
        Packet::new(1, 0, vec![0u8; 64]).with_duration(40 * MS),
        Packet::new(2, 0, vec![1u8; 16]),
        Packet::new(1, 40 * MS, vec![0u8; 64]).with_duration(40 * MS),
        Packet::new(2, 35 * MS, vec![1u8; 16]),
        Packet::new(1, 80 * MS, vec![0u8; 64]).with_duration(40 * MS),
        Packet::new(2, 70 * MS, vec![1u8; 16]),
        Packet::new(1, 120 * MS, vec![0u8; 64]).with_duration(40 * MS),
        Packet::new(2, 105 * MS, vec![1u8; 16]),
    ];
    let (files, _) = mux(config, &tracks, packets);
    assert_eq!(files.len(), 2);

    let sorted = |bytes: &[u8]| {
        let mut blocks: Vec<_> = ParsedFile::parse(bytes)
            .blocks()
            .iter()
            .map(|b| (b.timestamp, b.track))
            .collect();
        blocks.sort();
        blocks
    };
    assert_eq!(
        sorted(&files[0]),
        vec![(0, 1), (0, 2), (35 * MS, 2), (40 * MS, 1)]
    );
    // The second file starts at its earliest block, 70ms
    assert_eq!(
        sorted(&files[1]),
        vec![(0, 2), (10 * MS, 1), (35 * MS, 2), (50 * MS, 1)]
    );

    let second = ParsedFile::parse(&files[1]);
    for (_, cluster) in second.top_level(ElementId::CLUSTER) {
        assert!(cluster.child_uint(ElementId::CLUSTER_TIMESTAMP).unwrap() < 1_000);
    }
    let cues = second.cue_points();
    assert_eq!(cues.iter().map(|c| c.timestamp).collect::<Vec<_>>(), vec![10 * MS, 50 * MS]);
}

#[test]
fn test_group_data_on_laced_track() {
    let tracks = [TrackConfig::new(2, TrackType::Audio, "A_OPUS")];
    let mut prioritized = Packet::new(2, 60 * MS, vec![4u8; 30]).with_duration(20 * MS);
    prioritized.reference_priority = 2;
    let packets = vec![
        Packet::new(2, 0, vec![1u8; 30]).with_duration(20 * MS),
        Packet::new(2, 20 * MS, vec![2u8; 30])
            .with_duration(20 * MS)
            .with_block_addition(4, vec![0xab, 0xcd]),
        Packet::new(2, 40 * MS, vec![3u8; 30]).with_duration(20 * MS),
        prioritized,
        Packet::new(2, 80 * MS, vec![5u8; 30]).with_duration(20 * MS),
        Packet::new(2, 100 * MS, vec![6u8; 30]).with_duration(20 * MS),
    ];
    let (files, _) = mux(MuxConfig::default(), &tracks, packets);
    let parsed = ParsedFile::parse(&files[0]);

    let blocks = parsed.blocks();
    assert_eq!(blocks.iter().map(|b| b.frames).sum::<usize>(), 6);
    // Group data neither joins a lace nor lets one continue past it
    assert_eq!(
        blocks.iter().map(|b| (b.timestamp, b.frames)).collect::<Vec<_>>(),
        vec![(0, 1), (20 * MS, 1), (40 * MS, 1), (60 * MS, 1), (80 * MS, 2)]
    );

    let (_, cluster) = parsed.top_level(ElementId::CLUSTER).next().unwrap();
    let groups: Vec<_> = cluster
        .children()
        .iter()
        .filter(|e| e.id == ElementId::BLOCK_GROUP)
        .collect();
    assert_eq!(groups.len(), 2);

    let more = groups[0]
        .child(ElementId::BLOCK_ADDITIONS)
        .and_then(|a| a.child(ElementId::BLOCK_MORE))
        .unwrap();
    assert_eq!(more.child_uint(ElementId::BLOCK_ADD_ID), Some(4));
    assert_eq!(
        more.child(ElementId::BLOCK_ADDITIONAL).and_then(|e| e.as_binary()).map(|b| &b[..]),
        Some(&[0xab, 0xcd][..])
    );
    assert_eq!(groups[1].child_uint(ElementId::REFERENCE_PRIORITY), Some(2));
}

#[test]
fn test_lacing_needs_known_duration() {
    let tracks = [
        TrackConfig::new(2, TrackType::Audio, "A_OPUS"),
        TrackConfig::new(3, TrackType::Audio, "A_AC3").with_default_duration(32_000_000),
    ];
    let packets = vec![
        Packet::new(2, 0, vec![1u8; 20]),
        Packet::new(3, 0, vec![2u8; 20]),
        Packet::new(3, 32 * MS, vec![2u8; 20]),
        Packet::new(3, 64 * MS, vec![2u8; 20]),
        Packet::new(3, 200 * MS, vec![2u8; 20]),
        Packet::new(2, 500 * MS, vec![1u8; 20]),
        Packet::new(2, 1_900 * MS, vec![1u8; 20]),
    ];
    let (files, _) = mux(MuxConfig::default(), &tracks, packets);
    let blocks = ParsedFile::parse(&files[0]).blocks();

    let lace = |track: u64| {
        blocks
            .iter()
            .filter(|b| b.track == track)
            .map(|b| (b.timestamp, b.frames))
            .collect::<Vec<_>>()
    };
    // No durations at all: every frame gets its own block
    assert_eq!(lace(2), vec![(0, 1), (500 * MS, 1), (1_900 * MS, 1)]);
    // DefaultDuration stands in, and a gap still ends the lace
    assert_eq!(lace(3), vec![(0, 3), (200 * MS, 1)]);
}
