//! End-to-end Reader/Writer scenarios, run over `std::io::Cursor` byte
//! buffers rather than real files or sockets.

use oggopus::page::Page;
use oggopus::{Error, Reader, Writer, WriterConfig};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mono_config() -> WriterConfig {
    WriterConfig {
        channels: 1,
        ..Default::default()
    }
}

fn stereo_config() -> WriterConfig {
    WriterConfig {
        channels: 2,
        ..Default::default()
    }
}

/// S1: an empty stream still carries a valid header and tags, and the
/// first read is a clean EOF.
#[test]
fn s1_empty_stream() {
    init();
    let mut bytes = Vec::new();
    let mut writer = Writer::open(&mut bytes, mono_config()).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::open(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(reader.channels(), 1);
    assert_eq!(reader.sample_rate(), 48000);
    assert_eq!(reader.pre_skip(), 312);
    assert!(reader.read_packet().unwrap().is_none());
}

/// S2: a single small packet round-trips with its granule intact.
#[test]
fn s2_single_packet_round_trip() {
    init();
    let packet: Vec<u8> = (0..100).map(|i| 0xFCu8.wrapping_add(i)).collect();

    let mut bytes = Vec::new();
    let mut writer = Writer::open(&mut bytes, stereo_config()).unwrap();
    writer.write_packet(&packet, 960).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::open(std::io::Cursor::new(bytes)).unwrap();
    let (got, granule) = reader.read_packet().unwrap().unwrap();
    assert_eq!(got, packet);
    assert_eq!(granule, 960);
    assert!(reader.read_packet().unwrap().is_none());
}

/// S3: a 600-byte packet segments as [255, 255, 90] and still recovers
/// byte-exact.
#[test]
fn s3_large_packet_paging() {
    init();
    let packet = vec![0x42u8; 600];

    let mut bytes = Vec::new();
    let mut writer = Writer::open(&mut bytes, mono_config()).unwrap();
    writer.write_packet(&packet, 960).unwrap();
    writer.close().unwrap();

    // The audio page is the 3rd page (BOS, tags, audio, EOS).
    let mut cursor = &bytes[..];
    let mut pages = Vec::new();
    loop {
        match Page::parse(cursor) {
            Ok((page, consumed)) => {
                cursor = &cursor[consumed..];
                pages.push(page);
            }
            Err(_) => break,
        }
    }
    assert_eq!(pages[2].segments, vec![255, 255, 90]);

    let mut reader = Reader::open(std::io::Cursor::new(bytes)).unwrap();
    let (got, granule) = reader.read_packet().unwrap().unwrap();
    assert_eq!(got, packet);
    assert_eq!(granule, 960);
}

/// S4: granules are the running sum of sample counts, in order.
#[test]
fn s4_multi_packet_granule_monotonicity() {
    init();
    let mut bytes = Vec::new();
    let mut writer = Writer::open(&mut bytes, mono_config()).unwrap();
    for samples in [480u64, 960, 1920, 480, 960] {
        writer.write_packet(&[0x01, 0x02, 0x03], samples).unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::open(std::io::Cursor::new(bytes)).unwrap();
    let mut granules = Vec::new();
    while let Some((_, granule)) = reader.read_packet().unwrap() {
        granules.push(granule);
    }
    assert_eq!(granules, vec![480, 1440, 3360, 3840, 4800]);
    assert_eq!(reader.last_granule(), 4800);
}

/// S5: an explicit 5.1 surround header round-trips its family, stream
/// counts and mapping table.
#[test]
fn s5_surround_5_1_header() {
    init();
    let config = WriterConfig {
        channels: 6,
        mapping_family: 1,
        stream_count: 4,
        coupled_count: 2,
        channel_mapping: vec![0, 4, 1, 2, 3, 5],
        ..Default::default()
    };
    let packet = vec![0x55u8; 200];

    let mut bytes = Vec::new();
    let mut writer = Writer::open(&mut bytes, config).unwrap();
    writer.write_packet(&packet, 960).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::open(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(reader.head().mapping_family, 1);
    assert_eq!(reader.head().stream_count, 4);
    assert_eq!(reader.head().coupled_count, 2);
    assert_eq!(reader.head().channel_mapping, vec![0, 4, 1, 2, 3, 5]);

    let (got, granule) = reader.read_packet().unwrap().unwrap();
    assert_eq!(got.len(), 200);
    assert_eq!(granule, 960);
}

/// S6: flipping a bit in the CRC field is detected, not silently accepted.
#[test]
fn s6_crc_corruption_detected() {
    init();
    let page = Page {
        version: 0,
        header_type: 0,
        granule_position: 0,
        serial_number: 7,
        page_sequence: 0,
        segments: vec![3],
        payload: vec![1, 2, 3],
    };
    let mut bytes = page.encode();
    bytes[22] ^= 0x01;

    let err = Page::parse(&bytes).unwrap_err();
    assert!(matches!(err, Error::BadCrc { .. }));
}

#[test]
fn header_page_replay_matches_what_was_written() {
    init();
    let mut bytes = Vec::new();
    let mut writer = Writer::open(&mut bytes, mono_config()).unwrap();
    let replay = writer.encode_header_pages().to_vec();
    writer.write_packet(&[1, 2, 3], 480).unwrap();
    writer.close().unwrap();

    assert_eq!(&bytes[..replay.len()], &replay[..]);
}
