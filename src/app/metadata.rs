use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::config::Config;
use crate::http::{RequestPolicy, post_json_with_retries};

const MEDIA_TITLE_QUERY: &str =
    "query ($id: Int) { Media(id: $id, type: ANIME) { id title { english romaji } } }";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MediaTitle {
    pub(crate) english: Option<String>,
    pub(crate) romaji: Option<String>,
}

/// Looks up titles for a host media id.
///
/// `Ok(None)` means the id exists but is not a trackable anime; errors cover
/// lookups that could not be completed. Callers treat both as a miss.
pub(crate) trait MediaResolver {
    fn resolve(&self, media_id: u64) -> Result<Option<MediaTitle>>;
}

/// Prefers the English title, falls back to romaji and strips one pair of
/// wrapping double quotes. `None` when nothing usable is left.
pub(crate) fn display_name(title: &MediaTitle) -> Option<String> {
    let raw = title.english.as_deref().or(title.romaji.as_deref())?;
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(raw);
    let name = unquoted.trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub(crate) struct AnilistResolver {
    endpoint: String,
    policy: RequestPolicy,
}

impl AnilistResolver {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.anilist_endpoint.clone(),
            policy: config.request_policy(),
        }
    }
}

impl MediaResolver for AnilistResolver {
    fn resolve(&self, media_id: u64) -> Result<Option<MediaTitle>> {
        let body = json!({
            "query": MEDIA_TITLE_QUERY,
            "variables": { "id": media_id },
        })
        .to_string();

        match post_json_with_retries(&self.endpoint, &body, &self.policy) {
            Ok(raw) => parse_media_title(&raw),
            // AniList answers unknown ids and non-anime media with 404.
            Err(failure) if failure.status() == Some(404) => Ok(None),
            Err(failure) => Err(anyhow!("AniList lookup for media {media_id} failed: {failure}")),
        }
    }
}

pub(crate) fn parse_media_title(raw: &str) -> Result<Option<MediaTitle>> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|err| anyhow!("AniList returned invalid JSON: {err}"))?;
    let Some(media) = parsed.pointer("/data/Media").filter(|media| !media.is_null()) else {
        return Ok(None);
    };

    let text = |field: &str| {
        media
            .pointer(&format!("/title/{field}"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Ok(Some(MediaTitle {
        english: text("english"),
        romaji: text("romaji"),
    }))
}
