// Search result normalization

use serde_json::Value;

use super::models::Info;
use super::utils::unique_by;

/// Deduplicate `entries` by `url` (first occurrence wins), then move entries
/// without a `channel` behind the ones that have one. Entries with no `url`
/// (or a null one) are never treated as duplicates. Order within each group
/// is preserved; every other key of `info` passes through.
pub fn normalize(info: Info) -> Info {
    let mut info = info;
    let entries = match info.remove("entries") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            info.insert("entries".to_string(), other);
            return info;
        }
        None => return info,
    };

    let mut entries = unique_by(entries, |e| {
        e.get("url").filter(|url| !url.is_null()).map(Value::to_string)
    });
    // sort_by_key is stable
    entries.sort_by_key(|e| e.get("channel").map_or(true, Value::is_null));

    info.insert("entries".to_string(), Value::Array(entries));
    info
}
