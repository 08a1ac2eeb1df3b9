use super::*;

#[test]
fn partial_json_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kinema.json");
    std::fs::write(&path, r#"{ "worker_count": 2, "pixel_format": "rgba16" }"#).unwrap();

    let cfg = BackendConfig::load(&path).unwrap();
    assert_eq!(cfg.worker_count, Some(2));
    assert_eq!(cfg.pixel_format, PixelFormat::Rgba16);
    assert_eq!(cfg.behind_penalty, 5);
    assert_eq!(cfg.resolved_worker_count(), 2);
}

#[test]
fn unknown_keys_and_bad_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kinema.json");

    std::fs::write(&path, r#"{ "workers": 2 }"#).unwrap();
    assert!(matches!(
        BackendConfig::load(&path),
        Err(KinemaError::Config(_))
    ));

    std::fs::write(&path, r#"{ "divider": 0 }"#).unwrap();
    assert!(BackendConfig::load(&path).is_err());

    assert!(matches!(
        BackendConfig::load(&dir.path().join("missing.json")),
        Err(KinemaError::Io { .. })
    ));
}

#[test]
fn default_worker_count_is_positive() {
    assert!(BackendConfig::default().resolved_worker_count() >= 1);
    assert_eq!(
        BackendConfig::default().startup_timeout(),
        Duration::from_secs(10)
    );
}

#[test]
fn audio_key_is_parsed_and_checked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kinema.json");

    std::fs::write(
        &path,
        r#"{ "audio": { "sample_rate": 48000, "channel_layout": 3 } }"#,
    )
    .unwrap();
    let audio = BackendConfig::load(&path).unwrap().audio.unwrap();
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels(), 2);

    std::fs::write(
        &path,
        r#"{ "audio": { "sample_rate": 0, "channel_layout": 3 } }"#,
    )
    .unwrap();
    assert!(matches!(
        BackendConfig::load(&path),
        Err(KinemaError::Config(_))
    ));
    assert!(BackendConfig::default().audio.is_none());
}
