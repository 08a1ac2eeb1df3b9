use super::*;
use crate::foundation::time::Time;
use crate::render::params::{AudioParams, PixelFormat};

fn params() -> RenderParams {
    RenderParams {
        width: 1280,
        height: 720,
        format: PixelFormat::Rgba8,
        divider: 1,
        time_base: Time::new(1, 30).unwrap(),
        audio: None,
    }
}

#[test]
fn id_is_stable_sha256_hex() {
    let a = generate_cache_id(&params(), "seq", 1_700_000_000_000).unwrap();
    let b = generate_cache_id(&params(), "seq", 1_700_000_000_000).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn every_input_separates_namespaces() {
    let base = generate_cache_id(&params(), "seq", 42).unwrap();
    let variants = [
        generate_cache_id(&RenderParams { width: 640, ..params() }, "seq", 42),
        generate_cache_id(&RenderParams { divider: 2, ..params() }, "seq", 42),
        generate_cache_id(
            &RenderParams {
                format: PixelFormat::Rgba16,
                ..params()
            },
            "seq",
            42,
        ),
        generate_cache_id(
            &RenderParams {
                audio: Some(AudioParams {
                    sample_rate: 48_000,
                    channel_layout: 3,
                }),
                ..params()
            },
            "seq",
            42,
        ),
        generate_cache_id(&params(), "other", 42),
        generate_cache_id(&params(), "seq", 43),
    ];
    for v in variants {
        assert_ne!(v.unwrap(), base);
    }
}

#[test]
fn missing_inputs_clear_the_id() {
    assert!(generate_cache_id(&params(), "", 42).is_none());
    assert!(generate_cache_id(&params(), "seq", 0).is_none());
    assert!(generate_cache_id(&RenderParams::default(), "seq", 42).is_none());
}
