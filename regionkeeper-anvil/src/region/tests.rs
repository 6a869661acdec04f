use super::*;
use proptest::prelude::*;
use std::collections::HashMap;
use tempfile::tempdir;

fn options() -> RegionOptions {
    RegionOptions { sync_writes: false }
}

fn raw_chunk(len: usize, seed: u8, timestamp: i32) -> ChunkData {
    let data: Vec<u8> = (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    ChunkData::with_compression(data, Compression::None, timestamp)
}

fn patch(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    write_at(&mut file, offset, bytes).unwrap();
}

/// Largest payload that still fits in 255 sectors together with its record header.
const MAX_INLINE: usize = 255 * 4096 - 5;

#[test]
fn test_new_file_has_empty_header() {
    let dir = tempdir().unwrap();
    let region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();

    assert!(region.is_empty());
    assert_eq!(region.used_sectors(), 2);
    let bytes = fs::read(dir.path().join("r.0.0.mca")).unwrap();
    assert_eq!(bytes.len(), 8192);
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn test_short_file_is_reinitialized() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("r.0.0.mca"), [0xAB; 100]).unwrap();

    let region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    assert!(region.is_empty());
    let bytes = fs::read(region.path()).unwrap();
    assert_eq!(bytes.len(), 8192);
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn test_first_chunk_lands_after_header() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(0, 0);
    let data = ChunkData::with_compression(b"0123456789".to_vec(), Compression::None, 1000);

    region.write(chunk, Some(&data)).unwrap();

    assert_eq!(region.location(chunk), ChunkLocation::new(2, 1));
    let read = region.read(chunk).unwrap().unwrap();
    assert_eq!(read.raw_data(), b"0123456789");
    assert_eq!(read.compression(), Compression::None);
    assert_eq!(read.timestamp(), 1000);

    let bytes = fs::read(region.path()).unwrap();
    assert_eq!(bytes.len(), 3 * 4096);
    assert_eq!(&bytes[0..4], &[0, 0, 2, 1]);
    assert_eq!(&bytes[4096..4100], &1000i32.to_be_bytes());
    assert_eq!(&bytes[8192..8197], &[0, 0, 0, 11, 3]);
    assert_eq!(&bytes[8197..8207], b"0123456789");
}

#[test]
fn test_read_absent_chunk() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(-1, -1), options()).unwrap();
    assert!(region.read(ChunkPos::new(-5, -5)).unwrap().is_none());
}

#[test]
fn test_round_trip_keeps_type_and_timestamp() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(2, -3), options()).unwrap();
    let chunk = ChunkPos::new(64 + 7, -96 + 30);

    let zlib = ChunkData::compress(&[7u8; 9000], Compression::Zlib, -123).unwrap();
    region.write(chunk, Some(&zlib)).unwrap();
    assert_eq!(region.read(chunk).unwrap(), Some(zlib));

    let unknown = ChunkData::with_compression(vec![1, 2, 3], Compression::Unknown(99), 5);
    region.write(chunk, Some(&unknown)).unwrap();
    let read = region.read(chunk).unwrap().unwrap();
    assert_eq!(read, unknown);
    assert!(matches!(read.decompress(), Err(RegionError::UnsupportedCompression(99))));
}

#[test]
fn test_rejects_tag_with_external_bit() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let data = ChunkData::with_compression(vec![1], Compression::Unknown(0x81), 0);
    assert!(matches!(
        region.write(ChunkPos::new(0, 0), Some(&data)),
        Err(RegionError::UnsupportedCompression(0x81))
    ));
    assert!(!region.contains(ChunkPos::new(0, 0)));
}

#[test]
fn test_rewrite_reuses_own_sectors() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let a = ChunkPos::new(0, 0);
    let b = ChunkPos::new(1, 0);
    let c = ChunkPos::new(2, 0);

    region.write(a, Some(&raw_chunk(100, 1, 1))).unwrap();
    region.write(b, Some(&raw_chunk(100, 2, 1))).unwrap();
    assert_eq!(region.location(a), ChunkLocation::new(2, 1));
    assert_eq!(region.location(b), ChunkLocation::new(3, 1));

    // Same sector count: freed then found again at the same place
    region.write(a, Some(&raw_chunk(200, 3, 2))).unwrap();
    assert_eq!(region.location(a), ChunkLocation::new(2, 1));

    // Grows to two sectors: sector 2 alone is too small, 3 is taken
    region.write(a, Some(&raw_chunk(5000, 4, 3))).unwrap();
    assert_eq!(region.location(a), ChunkLocation::new(4, 2));

    region.write(c, Some(&raw_chunk(10, 5, 4))).unwrap();
    assert_eq!(region.location(c), ChunkLocation::new(2, 1));

    assert_eq!(region.read(a).unwrap().unwrap(), raw_chunk(5000, 4, 3));
    assert_eq!(region.read(b).unwrap().unwrap(), raw_chunk(100, 2, 1));
}

#[test]
fn test_delete_frees_sectors() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let a = ChunkPos::new(3, 4);
    let b = ChunkPos::new(9, 9);

    region.write(a, Some(&raw_chunk(10_000, 1, 50))).unwrap();
    assert_eq!(region.location(a), ChunkLocation::new(2, 3));

    region.delete(a).unwrap();
    assert!(region.read(a).unwrap().is_none());
    assert_eq!(region.timestamp(a), 0);
    assert_eq!(region.used_sectors(), 2);

    let bytes = fs::read(region.path()).unwrap();
    let slot = a.slot();
    assert_eq!(&bytes[slot * 4..slot * 4 + 4], &[0; 4]);
    assert_eq!(&bytes[4096 + slot * 4..4096 + slot * 4 + 4], &[0; 4]);
    assert_eq!(bytes.len() % 4096, 0);

    region.write(b, Some(&raw_chunk(6000, 2, 51))).unwrap();
    assert_eq!(region.location(b), ChunkLocation::new(2, 2));
}

#[test]
fn test_delete_absent_chunk_is_harmless() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    region.write(ChunkPos::new(1, 1), None).unwrap();
    assert!(region.is_empty());
}

#[test]
fn test_largest_inline_chunk() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(0, 0);
    let data = raw_chunk(MAX_INLINE, 9, 9);

    region.write(chunk, Some(&data)).unwrap();
    assert_eq!(region.location(chunk), ChunkLocation::new(2, 255));
    assert!(!region.external_path(chunk).exists());
    assert_eq!(region.read(chunk).unwrap().unwrap(), data);
    assert_eq!(region.file_len().unwrap(), (2 + 255) * 4096);
}

#[test]
fn test_external_boundary() {
    assert!(!is_external(0));
    assert!(!is_external(MAX_INLINE));
    assert!(is_external(MAX_INLINE + 1));
}

#[test]
fn test_oversized_chunk_goes_external() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(4, 0);
    let data = raw_chunk(MAX_INLINE + 1, 7, 77);

    region.write(chunk, Some(&data)).unwrap();
    assert_eq!(region.location(chunk), ChunkLocation::new(2, 1));

    let external = dir.path().join("c.4.0.mcc");
    assert_eq!(fs::read(&external).unwrap(), data.raw_data());

    let bytes = fs::read(region.path()).unwrap();
    assert_eq!(bytes.len(), 3 * 4096);
    assert_eq!(&bytes[8192..8197], &[0, 0, 0, 1, 0x80 | 3]);
    assert!(bytes[8197..].iter().all(|&b| b == 0));

    assert_eq!(region.read(chunk).unwrap().unwrap(), data);

    // Shrinking back inline drops the sidecar
    region.write(chunk, Some(&raw_chunk(10, 1, 78))).unwrap();
    assert!(!external.exists());
    assert_eq!(region.read(chunk).unwrap().unwrap(), raw_chunk(10, 1, 78));

    region.write(chunk, Some(&data)).unwrap();
    assert!(external.exists());
    region.delete(chunk).unwrap();
    assert!(!external.exists());
}

#[test]
fn test_reopen_restores_state() {
    let dir = tempdir().unwrap();
    let pos = RegionPos::new(1, 1);
    let a = pos.local_to_world(0, 0);
    let b = pos.local_to_world(5, 7);
    {
        let mut region = RegionFile::open(dir.path(), pos, options()).unwrap();
        region.write(a, Some(&raw_chunk(100, 1, 10))).unwrap();
        region.write(b, Some(&raw_chunk(5000, 2, 20))).unwrap();
        region.delete(a).unwrap();
        region.close().unwrap();
    }

    let mut region = RegionFile::open(dir.path(), pos, options()).unwrap();
    assert_eq!(region.len(), 1);
    assert_eq!(region.used_sectors(), 4);
    assert_eq!(region.read(b).unwrap().unwrap(), raw_chunk(5000, 2, 20));
    assert!(region.read(a).unwrap().is_none());

    // Sector 2 was freed before closing and is handed out again
    region.write(a, Some(&raw_chunk(10, 3, 30))).unwrap();
    assert_eq!(region.location(a), ChunkLocation::new(2, 1));
    assert_eq!(region.location(b), ChunkLocation::new(3, 2));
}

#[test]
fn test_chunks_listing() {
    let dir = tempdir().unwrap();
    let pos = RegionPos::new(-1, 2);
    let mut region = RegionFile::open(dir.path(), pos, options()).unwrap();
    let first = pos.chunk_at(5);
    let second = pos.chunk_at(1000);
    region.write(second, Some(&raw_chunk(1, 0, 0))).unwrap();
    region.write(first, Some(&raw_chunk(1, 0, 0))).unwrap();

    assert_eq!(region.chunks(true).unwrap(), vec![first, second]);

    let all = region.chunks(false).unwrap();
    assert_eq!(all.len(), 1024);
    assert_eq!(all[0], ChunkPos::new(-32, 64));
    assert_eq!(all[1023], ChunkPos::new(-1, 95));
}

#[test]
fn test_closed_region_rejects_operations() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(0, 0);
    region.write(chunk, Some(&raw_chunk(1, 0, 0))).unwrap();
    region.close().unwrap();

    assert!(region.is_closed());
    assert!(matches!(region.read(chunk), Err(RegionError::Closed)));
    assert!(matches!(region.write(chunk, Some(&raw_chunk(1, 0, 0))), Err(RegionError::Closed)));
    assert!(matches!(region.delete(chunk), Err(RegionError::Closed)));
    assert!(matches!(region.chunks(false), Err(RegionError::Closed)));
    assert!(matches!(region.erase_free_space(), Err(RegionError::Closed)));
    assert!(region.close().is_ok());
}

#[test]
fn test_oversized_length_is_format_error() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(0, 0);
    region.write(chunk, Some(&raw_chunk(10, 0, 0))).unwrap();

    patch(region.path(), 8192, &65_536u32.to_be_bytes());
    assert!(matches!(region.read(chunk), Err(RegionError::Format(_))));

    patch(region.path(), 8192, &0u32.to_be_bytes());
    assert!(matches!(region.read(chunk), Err(RegionError::Format(_))));
}

#[test]
fn test_location_past_end_of_file_is_format_error() {
    let dir = tempdir().unwrap();
    let mut header = Header::new();
    header.set(0, ChunkLocation::new(10, 1), 0);
    fs::write(dir.path().join("r.0.0.mca"), header.encode()).unwrap();

    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    assert!(region.contains(ChunkPos::new(0, 0)));
    assert!(matches!(region.read(ChunkPos::new(0, 0)), Err(RegionError::Format(_))));
}

#[test]
fn test_entry_inside_header_is_never_freed() {
    let dir = tempdir().unwrap();
    let mut header = Header::new();
    header.set(5, ChunkLocation::new(1, 1), 0);
    fs::write(dir.path().join("r.0.0.mca"), header.encode()).unwrap();

    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let bad = ChunkPos::new(5, 0);
    assert_eq!(region.used_sectors(), 2);
    assert!(matches!(region.read(bad), Err(RegionError::Format(_))));

    region.delete(bad).unwrap();
    assert_eq!(region.used_sectors(), 2);

    let chunk = ChunkPos::new(0, 1);
    region.write(chunk, Some(&raw_chunk(100, 3, 77))).unwrap();
    assert_eq!(region.location(chunk), ChunkLocation::new(2, 1));
    // Timestamp table intact
    assert_eq!(region.timestamp(chunk), 77);
    let bytes = fs::read(region.path()).unwrap();
    assert!(bytes[4096..8192]
        .chunks(4)
        .enumerate()
        .all(|(slot, entry)| slot == chunk.slot() || entry == [0; 4]));
}

#[test]
fn test_overlapping_entries_keep_shared_sectors() {
    let dir = tempdir().unwrap();
    let mut header = Header::new();
    header.set(0, ChunkLocation::new(2, 2), 0);
    header.set(1, ChunkLocation::new(3, 1), 0);
    let mut bytes = header.encode();
    bytes.resize(5 * 4096, 0);
    fs::write(dir.path().join("r.0.0.mca"), bytes).unwrap();

    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    assert_eq!(region.used_sectors(), 4);

    // Slot 0 still covers sector 3
    region.delete(ChunkPos::new(1, 0)).unwrap();
    assert_eq!(region.used_sectors(), 4);

    let chunk = ChunkPos::new(2, 0);
    region.write(chunk, Some(&raw_chunk(100, 1, 1))).unwrap();
    assert_eq!(region.location(chunk).sector, 4);
}

#[test]
fn test_rejects_chunk_from_other_region() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let stranger = ChunkPos::new(32, 0);

    assert!(matches!(
        region.write(stranger, Some(&raw_chunk(10, 0, 0))),
        Err(RegionError::WrongRegion { .. })
    ));
    assert!(matches!(region.read(stranger), Err(RegionError::WrongRegion { .. })));
    assert!(matches!(region.delete(stranger), Err(RegionError::WrongRegion { .. })));
    assert!(region.is_empty());
}

#[test]
fn test_missing_external_file_is_format_error() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(1, 2);
    region.write(chunk, Some(&raw_chunk(MAX_INLINE + 1, 0, 0))).unwrap();

    fs::remove_file(region.external_path(chunk)).unwrap();
    assert!(matches!(region.read(chunk), Err(RegionError::Format(_))));
}

#[test]
fn test_erase_free_space() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let a = ChunkPos::new(0, 0);
    let b = ChunkPos::new(1, 0);
    let c = ChunkPos::new(2, 0);
    region.write(a, Some(&raw_chunk(100, 1, 1))).unwrap();
    region.write(b, Some(&raw_chunk(5000, 2, 2))).unwrap();
    region.write(c, Some(&raw_chunk(100, 3, 3))).unwrap();
    assert_eq!(region.location(c), ChunkLocation::new(5, 1));
    assert_eq!(region.file_len().unwrap(), 6 * 4096);

    // Interior hole: scrubbed, file keeps its size
    region.delete(b).unwrap();
    region.erase_free_space().unwrap();
    let bytes = fs::read(region.path()).unwrap();
    assert_eq!(bytes.len(), 6 * 4096);
    assert!(bytes[3 * 4096..5 * 4096].iter().all(|&b| b == 0));
    assert_eq!(region.read(c).unwrap().unwrap(), raw_chunk(100, 3, 3));

    // Trailing hole: cut back to the sector after chunk a
    region.delete(c).unwrap();
    region.erase_free_space().unwrap();
    let bytes = fs::read(region.path()).unwrap();
    assert_eq!(bytes.len(), 3 * 4096);
    assert!(bytes[8192 + 105..].iter().all(|&b| b == 0));
    assert_eq!(region.read(a).unwrap().unwrap(), raw_chunk(100, 1, 1));

    region.delete(a).unwrap();
    region.erase_free_space().unwrap();
    assert_eq!(region.file_len().unwrap(), 8192);
}

#[test]
fn test_erase_free_space_keeps_external_stub() {
    let dir = tempdir().unwrap();
    let mut region = RegionFile::open(dir.path(), RegionPos::new(0, 0), options()).unwrap();
    let chunk = ChunkPos::new(0, 3);
    let data = raw_chunk(MAX_INLINE + 10, 4, 4);
    region.write(chunk, Some(&data)).unwrap();

    region.erase_free_space().unwrap();
    assert_eq!(region.file_len().unwrap(), 3 * 4096);
    assert_eq!(region.read(chunk).unwrap().unwrap(), data);
}

#[derive(Debug, Clone)]
enum Op {
    Write { slot: usize, len: usize, seed: u8 },
    Delete { slot: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..16, 0usize..20_000, any::<u8>())
            .prop_map(|(slot, len, seed)| Op::Write { slot, len, seed }),
        1 => (0usize..16).prop_map(|slot| Op::Delete { slot }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_live_chunks_never_overlap(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let dir = tempdir().unwrap();
        let pos = RegionPos::new(0, 0);
        let mut region = RegionFile::open(dir.path(), pos, options()).unwrap();
        let mut model: HashMap<ChunkPos, ChunkData> = HashMap::new();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Write { slot, len, seed } => {
                    let chunk = pos.chunk_at(slot);
                    let data = raw_chunk(len, seed, i as i32);
                    region.write(chunk, Some(&data)).unwrap();
                    model.insert(chunk, data);
                }
                Op::Delete { slot } => {
                    let chunk = pos.chunk_at(slot);
                    region.delete(chunk).unwrap();
                    model.remove(&chunk);
                }
            }
            prop_assert_eq!(region.file_len().unwrap() % 4096, 0);
        }

        let mut ranges: Vec<(u32, u32)> = model
            .keys()
            .map(|chunk| {
                let location = region.location(*chunk);
                (location.sector, location.sector + u32::from(location.count))
            })
            .collect();
        ranges.sort();
        for (start, _) in &ranges {
            prop_assert!(*start >= 2);
        }
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0, "overlap: {:?}", pair);
        }

        prop_assert_eq!(region.len(), model.len());
        for (chunk, data) in &model {
            let stored = region.read(*chunk).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(data));
        }
    }
}
