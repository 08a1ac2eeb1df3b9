use super::*;
use crate::render::params::{PixelFormat, RenderParams};

fn params() -> RenderParams {
    RenderParams {
        width: 4,
        height: 2,
        format: PixelFormat::Rgba8,
        divider: 1,
        time_base: Time::new(1, 24).unwrap(),
        audio: None,
    }
}

fn hash(n: u64) -> ContentHash {
    ContentHash { hi: n, lo: !n }
}

#[test]
fn write_then_read_through_time_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FrameCache::new(dir.path());
    cache.set_cache_id(Some("ns".into()));
    let p = params();
    let payload: Vec<u8> = (0..p.buffer_size() as u8).collect();

    let path = cache.write_frame("ns", hash(1), &payload).unwrap();
    assert_eq!(path, dir.path().join("ns").join(format!("{}.frame", hash(1))));
    assert!(cache.has_hash("ns", hash(1)));

    let t = Time::from_secs(1);
    let mut buf = vec![0u8; p.buffer_size()];
    assert!(!cache.read_frame(t, &mut buf).unwrap());

    cache.set_hash(t, hash(1));
    assert!(cache.has_frame(t));
    assert!(cache.read_frame(t, &mut buf).unwrap());
    assert_eq!(buf, payload);
}

#[test]
fn identical_content_is_shared_between_times() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FrameCache::new(dir.path());
    cache.set_cache_id(Some("ns".into()));
    cache.set_hash(Time::ZERO, hash(9));
    cache.set_hash(Time::from_secs(3), hash(9));
    assert_eq!(
        cache.cache_path_name(cache.time_to_hash(Time::ZERO).unwrap()),
        cache.cache_path_name(cache.time_to_hash(Time::from_secs(3)).unwrap())
    );
}

#[test]
fn mismatched_layout_is_an_error_not_a_hit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FrameCache::new(dir.path());
    cache.set_cache_id(Some("ns".into()));
    let p = params();
    cache
        .write_frame("ns", hash(2), &vec![0; p.buffer_size()])
        .unwrap();
    cache.set_hash(Time::ZERO, hash(2));

    let bigger = RenderParams { width: 8, ..p };
    let mut buf = vec![0u8; bigger.buffer_size()];
    assert!(cache.read_frame(Time::ZERO, &mut buf).is_err());
}

#[test]
fn truncate_drops_mappings_but_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FrameCache::new(dir.path());
    cache.set_cache_id(Some("ns".into()));
    let p = params();
    cache
        .write_frame("ns", hash(3), &vec![0; p.buffer_size()])
        .unwrap();
    for s in 0..5 {
        cache.set_hash(Time::from_secs(s), hash(3));
    }

    cache.truncate(Time::from_secs(2));
    assert_eq!(
        cache.mapped_times(),
        vec![Time::ZERO, Time::from_secs(1), Time::from_secs(2)]
    );
    assert!(cache.has_hash("ns", hash(3)));
}

#[test]
fn namespaces_isolate_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FrameCache::new(dir.path());
    let p = params();
    cache
        .write_frame("a", hash(4), &vec![0; p.buffer_size()])
        .unwrap();
    cache.set_hash(Time::ZERO, hash(4));

    assert!(!cache.has_frame(Time::ZERO));
    cache.set_cache_id(Some("a".into()));
    assert!(cache.has_frame(Time::ZERO));
    cache.set_cache_id(Some("b".into()));
    assert!(!cache.has_frame(Time::ZERO));
}

#[test]
fn claims_are_exclusive_per_namespace() {
    let cache = FrameCache::new("unused");
    assert!(cache.try_claim("a", hash(5)));
    assert!(!cache.try_claim("a", hash(5)));
    assert!(cache.try_claim("b", hash(5)));
    cache.release("a", hash(5));
    assert!(cache.try_claim("a", hash(5)));
}

#[test]
fn audio_blocks_read_back_until_forgotten_or_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FrameCache::new(dir.path());
    cache.set_cache_id(Some("ns".into()));
    let samples = [0.25f32, -1.0, 0.5];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let path = cache.write_audio("ns", 1, &bytes).unwrap();
    assert_eq!(path, dir.path().join("ns").join("audio").join("1.pcm"));
    // Written but not marked ready yet.
    assert_eq!(cache.read_audio(1).unwrap(), None);

    cache.set_audio_ready(1);
    cache.set_audio_ready(3);
    assert_eq!(cache.read_audio(1).unwrap(), Some(samples.to_vec()));
    assert_eq!(cache.read_audio(3).unwrap(), None);

    cache.truncate(Time::new(3, 2).unwrap());
    assert_eq!(cache.ready_audio_blocks(), vec![1]);
    cache.forget_audio(1);
    assert_eq!(cache.read_audio(1).unwrap(), None);

    std::fs::write(cache.audio_path_in("ns", 2), [0u8; 3]).unwrap();
    cache.set_audio_ready(2);
    assert!(cache.read_audio(2).is_err());
}
