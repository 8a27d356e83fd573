// Format selection adapter
//
// Turns a plain selection function over an enriched context into the pair of
// hooks the video engine understands:
// - a match filter, run per item, that only captures the item's full info
// - a format selector, run per item after its match filter, that resolves
//   the chosen ids and merges them into one composite format when needed
//
// Both hooks share one session. The engine runs the match filter for an item
// strictly before that item's selector; the session relies on that order and
// does not enforce it. Before the first match filter call the captured info is
// empty, so selection functions must tolerate missing info fields.
//
// A session belongs to one download call. Never share it between concurrent
// downloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::errors::{Error, Result};
use super::models::{EnrichedContext, Format, FormatSelectorContext, Info, Param, Params};
use super::traits::{FormatSelectorHook, MatchFilterHook};

/// Caller-supplied selection: ordered format ids for one item
pub type SelectFn = dyn Fn(&EnrichedContext) -> Vec<String> + Send + Sync;

/// Shared state of one selection session
pub struct SelectionSession {
    captured: Mutex<Info>,
    select: Box<SelectFn>,
}

impl SelectionSession {
    pub fn new<F>(select: F) -> Self
    where
        F: Fn(&EnrichedContext) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            captured: Mutex::new(Info::new()),
            select: Box::new(select),
        }
    }

    /// Most recent info seen by the match filter
    pub fn captured(&self) -> Info {
        self.captured.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn enrich(&self, ctx: &FormatSelectorContext) -> EnrichedContext {
        let captured = self.captured.lock().unwrap_or_else(PoisonError::into_inner);
        EnrichedContext::new(ctx, &captured)
    }
}

impl MatchFilterHook for SelectionSession {
    fn filter(&self, info: &Info, _incomplete: bool) -> Option<String> {
        *self.captured.lock().unwrap_or_else(PoisonError::into_inner) = info.clone();
        None
    }
}

impl FormatSelectorHook for SelectionSession {
    fn select(&self, ctx: &FormatSelectorContext) -> Result<Vec<Format>> {
        let by_id: HashMap<&str, &Format> = ctx.formats.iter().map(|f| (f.format_id.as_str(), f)).collect();

        let enriched = self.enrich(ctx);
        let ids = (self.select)(&enriched);
        tracing::debug!(?ids, title = enriched.title().unwrap_or_default(), "format selector: selected");

        let formats = ids
            .iter()
            .map(|id| {
                by_id
                    .get(id.as_str())
                    .map(|f| (*f).clone())
                    .ok_or_else(|| Error::Lookup(format!("format {} is not available", id)))
            })
            .collect::<Result<Vec<_>>>()?;

        match formats.len() {
            0 => Err(Error::Lookup("no formats were selected".to_string())),
            1 => Ok(formats),
            _ => Ok(vec![merge_formats(&formats)?]),
        }
    }
}

/// Engine parameters installing `select` as the format selector.
///
/// Yields the `match_filter` and `format` keys, to be merged into the
/// engine's parameter map.
pub fn wrap_format_selector<F>(select: F) -> Params
where
    F: Fn(&EnrichedContext) -> Vec<String> + Send + Sync + 'static,
{
    let session = Arc::new(SelectionSession::new(select));
    Params::new()
        .with("match_filter", Param::MatchFilter(session.clone()))
        .with("format", Param::Selector(session))
}

/// Merge two or more formats into one composite format.
///
/// Ids and protocols are `+`-joined in the given order; the extension comes
/// from the first constituent.
pub fn merge_formats(formats: &[Format]) -> Result<Format> {
    if formats.len() < 2 {
        return Err(Error::Precondition(format!(
            "merging needs at least two formats, got {}",
            formats.len()
        )));
    }

    let ids: Vec<&str> = formats.iter().map(|f| f.format_id.as_str()).collect();
    let protocols: Vec<&str> = formats.iter().map(|f| f.protocol.as_str()).collect();

    Ok(Format {
        format_id: ids.join("+"),
        ext: formats[0].ext.clone(),
        protocol: protocols.join("+"),
        requested_formats: Some(formats.to_vec()),
        extra: Default::default(),
    })
}

/// Ready-made selection functions
pub mod presets {
    use super::super::models::{EnrichedContext, Format};

    /// Best video stream plus best audio stream, or the best single stream
    /// when the item offers no separate ones
    pub fn best() -> impl Fn(&EnrichedContext) -> Vec<String> + Send + Sync + 'static {
        |ctx| pick(ctx.formats(), None)
    }

    /// Like [`best`], limited to streams at or under `height` pixels
    pub fn max_height(height: u32) -> impl Fn(&EnrichedContext) -> Vec<String> + Send + Sync + 'static {
        move |ctx| pick(ctx.formats(), Some(height))
    }

    /// Best audio-only stream
    pub fn audio_only() -> impl Fn(&EnrichedContext) -> Vec<String> + Send + Sync + 'static {
        |ctx| {
            let audio: Vec<&Format> = ctx.formats().iter().filter(|f| f.is_audio()).collect();
            find_best_audio(&audio).map(|a| vec![a.format_id.clone()]).unwrap_or_default()
        }
    }

    fn pick(formats: &[Format], max_height: Option<u32>) -> Vec<String> {
        let video: Vec<&Format> = formats
            .iter()
            .filter(|f| f.is_video())
            .filter(|f| max_height.map_or(true, |max| f.height().is_some_and(|h| h <= max)))
            .collect();
        let audio: Vec<&Format> = formats.iter().filter(|f| f.is_audio()).collect();

        match (find_best_video(&video), find_best_audio(&audio)) {
            (Some(v), Some(a)) => vec![v.format_id.clone(), a.format_id.clone()],
            (Some(v), None) => vec![v.format_id.clone()],
            _ => {
                // muxed streams only
                let muxed: Vec<&Format> = formats
                    .iter()
                    .filter(|f| !f.is_audio() && !f.is_video())
                    .filter(|f| max_height.map_or(true, |max| f.height().map_or(true, |h| h <= max)))
                    .collect();
                match muxed.iter().max_by_key(|f| (f.height().unwrap_or(0), bitrate_key(f.tbr()))) {
                    Some(m) => vec![m.format_id.clone()],
                    None => find_best_audio(&audio).map(|a| vec![a.format_id.clone()]).unwrap_or_default(),
                }
            }
        }
    }

    fn bitrate_key(rate: Option<f64>) -> u64 {
        rate.map(|r| (r * 100.0) as u64).unwrap_or(0)
    }

    /// Highest resolution, H.264 preferred unless another codec is much taller
    fn find_best_video<'a>(formats: &[&'a Format]) -> Option<&'a Format> {
        let tallest = formats
            .iter()
            .copied()
            .max_by_key(|f| (f.height().unwrap_or(0), bitrate_key(f.tbr())));
        let best_h264 = formats
            .iter()
            .copied()
            .filter(|f| f.is_h264())
            .max_by_key(|f| (f.height().unwrap_or(0), bitrate_key(f.tbr())));

        match (best_h264, tallest) {
            (Some(h264), Some(any)) => {
                let h264_height = h264.height().unwrap_or(0);
                if any.height().unwrap_or(0) > h264_height * 3 / 2 {
                    Some(any)
                } else {
                    Some(h264)
                }
            }
            (None, any) => any,
            (Some(h264), None) => Some(h264),
        }
    }

    /// AAC preferred, then highest bitrate
    fn find_best_audio<'a>(formats: &[&'a Format]) -> Option<&'a Format> {
        formats
            .iter()
            .copied()
            .filter(|f| f.is_aac())
            .max_by_key(|f| bitrate_key(f.abr()))
            .or_else(|| formats.iter().copied().max_by_key(|f| bitrate_key(f.abr())))
    }
}
