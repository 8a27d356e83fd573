mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;

use common::{info, lookup, registry, FakeMusic, FakeVideo};
use mediadl::downloader::format_selector::{presets, SelectFn};
use mediadl::downloader::video::CONCURRENT_FRAGMENTS;
use mediadl::downloader::EnrichedContext;
use mediadl::{Error, Params};

fn item(title: &str) -> mediadl::downloader::Info {
    info(json!({
        "title": title,
        "webpage_url": format!("https://www.youtube.com/watch?v={}", title),
        "formats": [
            {"format_id": "18", "ext": "mp4", "protocol": "https", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360},
            {"format_id": "137", "ext": "mp4", "protocol": "https", "vcodec": "avc1.640028", "acodec": "none", "height": 1080},
            {"format_id": "140", "ext": "m4a", "protocol": "https", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5}
        ]
    }))
}

fn setup(video: FakeVideo) -> mediadl::BackendRegistry {
    registry(video, FakeMusic::new(std::path::Path::new("/nonexistent")), lookup(&[]))
}

#[tokio::test]
async fn test_download_merges_defaults_destination_and_overrides() {
    let video = FakeVideo::with_items(vec![item("a")]);
    let registry = setup(video.clone());
    let dest = tempfile::tempdir().unwrap();

    let overrides = Params::new().with("verbose", false).with("noplaylist", true);
    let result = registry
        .video()
        .download("https://youtu.be/a", dest.path(), None, overrides)
        .await
        .unwrap();

    let calls = video.take_calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.query, "https://youtu.be/a");
    assert!(call.download && call.process);

    let params = &call.params;
    assert!(!params.get_bool("verbose"));
    assert!(params.get_bool("noplaylist"));
    assert!(params.get_bool("restrictfilenames"));
    assert!(params.logger().is_some());
    assert_eq!(params.get_u64("concurrent_fragment_downloads"), Some(CONCURRENT_FRAGMENTS));
    assert_eq!(params.value("postprocessors"), Some(&json!([{"key": "FFmpegMetadata"}])));
    assert_eq!(
        params.value("paths"),
        Some(&json!({"home": dest.path().to_string_lossy()}))
    );
    assert!(params.selector().is_none());
    assert!(params.match_filter().is_none());

    // returned as the engine produced it
    assert_eq!(result["entries"][0]["title"], "a");
}

#[tokio::test]
async fn test_override_replaces_destination_wholesale() {
    let video = FakeVideo::with_items(vec![]);
    let registry = setup(video.clone());
    let dest = tempfile::tempdir().unwrap();

    let overrides = Params::from_json(json!({"paths": {"temp": "/scratch"}}));
    registry.video().download("u", dest.path(), None, overrides).await.unwrap();

    let calls = video.take_calls();
    assert_eq!(calls[0].params.value("paths"), Some(&json!({"temp": "/scratch"})));
}

#[tokio::test]
async fn test_selector_sees_captured_info_per_item() {
    let video = FakeVideo::with_items(vec![item("first"), item("second")]);
    let registry = setup(video.clone());
    let dest = tempfile::tempdir().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_selector = seen.clone();
    let select: Box<SelectFn> = Box::new(move |ctx: &EnrichedContext| {
        seen_by_selector
            .lock()
            .unwrap()
            .push(ctx.title().unwrap_or_default().to_string());
        vec!["137".to_string(), "140".to_string()]
    });

    let result = registry
        .video()
        .download("https://www.youtube.com/playlist?list=x", dest.path(), Some(select), Params::new())
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);

    let entries = result["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["format_id"], "137+140");
    let composite = &entries[0]["chosen"][0];
    assert_eq!(composite["ext"], "mp4");
    assert_eq!(composite["protocol"], "https+https");
    assert_eq!(composite["requested_formats"][0]["format_id"], "137");
    assert_eq!(composite["requested_formats"][1]["format_id"], "140");

    let calls = video.take_calls();
    assert!(calls[0].params.selector().is_some());
    assert!(calls[0].params.match_filter().is_some());
}

#[tokio::test]
async fn test_single_selection_is_not_wrapped() {
    let video = FakeVideo::with_items(vec![item("a")]);
    let registry = setup(video);
    let dest = tempfile::tempdir().unwrap();

    let select: Box<SelectFn> = Box::new(|_: &EnrichedContext| vec!["18".to_string()]);
    let result = registry
        .video()
        .download("u", dest.path(), Some(select), Params::new())
        .await
        .unwrap();

    let chosen = &result["entries"][0]["chosen"][0];
    assert_eq!(chosen["format_id"], "18");
    assert!(chosen.get("requested_formats").is_none());
}

#[tokio::test]
async fn test_unknown_format_id_is_a_lookup_error() {
    let video = FakeVideo::with_items(vec![item("a")]);
    let registry = setup(video);
    let dest = tempfile::tempdir().unwrap();

    let select: Box<SelectFn> = Box::new(|_: &EnrichedContext| vec!["137".to_string(), "999".to_string()]);
    let err = registry
        .video()
        .download("u", dest.path(), Some(select), Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lookup(ref msg) if msg.contains("999")));
}

#[tokio::test]
async fn test_preset_through_facade() {
    let video = FakeVideo::with_items(vec![item("a")]);
    let registry = setup(video);
    let dest = tempfile::tempdir().unwrap();

    let result = registry
        .video()
        .download("u", dest.path(), Some(Box::new(presets::best())), Params::new())
        .await
        .unwrap();

    assert_eq!(result["entries"][0]["format_id"], "137+140");
}

#[tokio::test]
async fn test_search_is_flat_and_normalized() {
    let listing = info(json!({
        "id": "Skeler",
        "entries": [
            {"url": "u1", "title": "no channel", "channel": null},
            {"url": "u2", "title": "two", "channel": "B"},
            {"url": "u1", "title": "dup", "channel": "A"},
            {"url": "u3", "title": "three", "channel": "C"}
        ]
    }));
    let video = FakeVideo::with_listing(listing);
    let registry = setup(video.clone());

    let result = registry.video().search("Skeler", 5, Params::new()).await.unwrap();

    let calls = video.take_calls();
    assert_eq!(calls[0].query, "ytsearch5:Skeler");
    assert!(!calls[0].download && !calls[0].process);
    assert_eq!(calls[0].params.get_str("extract_flat"), Some("in_playlist"));

    let urls: Vec<_> = result["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["u2", "u3", "u1"]);
    assert_eq!(result["id"], "Skeler");
}

#[tokio::test]
async fn test_search_entries_are_typed() {
    let listing = info(json!({"entries": [{"url": "u1", "title": "t", "channel": "c"}]}));
    let registry = setup(FakeVideo::with_listing(listing));

    let entries = registry.video().search_entries("t", 1).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].channel.as_deref(), Some("c"));
}
