mod common;

use std::path::Path;

use common::{all_secrets, lookup, registry, track, FakeMusic, FakeVideo};
use mediadl::downloader::models::{Bitrate, Collection, CollectionKind, DownloadObject, Single};
use mediadl::Error;

#[tokio::test]
async fn test_collection_download_is_rejected_without_io() {
    let dir = tempfile::tempdir().unwrap();
    let music = FakeMusic::new(dir.path());
    let counters = music.counters.clone();
    let starts = music.starts.clone();
    // no secrets: touching the registry would fail with a configuration error
    let registry = registry(FakeVideo::default(), music, lookup(&[]));

    let album = DownloadObject::Collection(Collection {
        kind: CollectionKind::Album,
        id: "2".to_string(),
        title: "Tel Aviv".to_string(),
        artist: "Skeler".to_string(),
        link: "https://www.deezer.com/album/2".to_string(),
        tracks: vec![track(1, "One"), track(2, "Two")],
        bitrate: Some(Bitrate::Flac),
    });

    let err = registry.music().download(&album, Path::new("/tmp/out")).await.unwrap_err();

    assert!(matches!(err, Error::Precondition(_)));
    assert!(!registry.music_client_ready());
    assert_eq!(FakeMusic::count(&counters.api_builds), 0);
    assert!(starts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_download_starts_with_destination() {
    let dir = tempfile::tempdir().unwrap();
    let music = FakeMusic::new(dir.path());
    let starts = music.starts.clone();
    let registry = registry(FakeVideo::default(), music, all_secrets());
    let dest = tempfile::tempdir().unwrap();

    let single = DownloadObject::Single(Single {
        track: track(894382952, "Pale Light"),
        bitrate: Some(Bitrate::Mp3_320),
    });
    registry.music().download(&single, dest.path()).await.unwrap();

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 1);
    let (arl, object, settings) = &starts[0];
    assert_eq!(arl, "arl-secret");
    assert_eq!(object, &single);
    assert_eq!(settings["downloadLocation"], &*dest.path().to_string_lossy());
    // everything else keeps the routine's defaults
    assert_eq!(settings["fallbackBitrate"], true);
}

#[tokio::test]
async fn test_resolve_track_link() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeVideo::default(), FakeMusic::new(dir.path()), all_secrets());

    let object = registry
        .music()
        .resolve("https://www.deezer.com/track/894382952", "flac")
        .await
        .unwrap();

    assert_eq!(object.artist(), "Skeler");
    assert_eq!(object.title(), "Pale Light");
    assert_eq!(object.bitrate(), Some(Bitrate::Flac));
    assert!(object.as_single().is_some());
}

#[tokio::test]
async fn test_resolve_short_link_expands_first() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeVideo::default(), FakeMusic::new(dir.path()), all_secrets());

    let object = registry.music().resolve("https://deezer.page.link/abc", "128").await.unwrap();

    assert_eq!(object.link(), "https://www.deezer.com/track/894382952");
    assert_eq!(object.bitrate(), Some(Bitrate::Mp3_128));
}

#[tokio::test]
async fn test_resolve_linked_platform_goes_through_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let music = FakeMusic::new(dir.path());
    let counters = music.counters.clone();
    let registry = registry(FakeVideo::default(), music, all_secrets());

    let object = registry
        .music()
        .resolve("https://open.spotify.com/track/64F0tid5vwapfuC4ERAHyA", "320")
        .await
        .unwrap();

    assert_eq!(FakeMusic::count(&counters.plugin_resolves), 1);
    assert_eq!(object.title(), "Pale Light");
    assert_eq!(object.bitrate(), Some(Bitrate::Mp3_320));
}

#[tokio::test]
async fn test_resolve_album_link_is_a_collection() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeVideo::default(), FakeMusic::new(dir.path()), all_secrets());

    let object = registry.music().resolve("https://www.deezer.com/en/album/2", "flac").await.unwrap();

    match object {
        DownloadObject::Collection(collection) => {
            assert_eq!(collection.kind, CollectionKind::Album);
            assert_eq!(collection.title, "Tel Aviv");
            assert_eq!(collection.tracks.len(), 1);
        }
        other => panic!("expected a collection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_bitrate_label_leaves_engine_default() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeVideo::default(), FakeMusic::new(dir.path()), all_secrets());

    let object = registry
        .music()
        .resolve("https://www.deezer.com/track/1", "opus")
        .await
        .unwrap();

    assert_eq!(object.bitrate(), None);
}

#[tokio::test]
async fn test_unrecognized_link_is_a_backend_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeVideo::default(), FakeMusic::new(dir.path()), all_secrets());

    let err = registry.music().resolve("https://example.com/song", "flac").await.unwrap_err();

    assert!(matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn test_backend_api_errors_surface_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeVideo::default(), FakeMusic::new(dir.path()), all_secrets());

    let err = registry
        .music()
        .resolve("https://www.deezer.com/playlist/5", "flac")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "api error 800: no data");
}

#[tokio::test]
async fn test_search_and_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let music = FakeMusic::new(dir.path());
    let starts = music.starts.clone();
    let registry = registry(FakeVideo::default(), music, all_secrets());
    let dest = tempfile::tempdir().unwrap();

    let info = registry.music().search("Skeler").await.unwrap();
    assert_eq!(info["data"].as_array().map(Vec::len), Some(1));

    let tracks = registry.music().search_tracks("Skeler").await.unwrap();
    assert_eq!(tracks[0].id, 894382952);

    let track = registry
        .music()
        .fetch("https://www.deezer.com/track/894382952", "flac", dest.path())
        .await
        .unwrap();
    assert_eq!(track.title, "Pale Light");
    assert_eq!(starts.lock().unwrap().len(), 1);
}
