//! The YouTube metadata extractor: an external collaborator specified
//! only as a contract (spec §6) — `url -> {name, videos[]}` or a
//! failure message recorded verbatim in the owning Source's DLQ row.

/// One video yielded by extracting a Source's URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedVideo {
    /// YouTube video id. Rejected before appending if its length isn't
    /// the canonical 11 characters (spec §8 boundary behavior) — that
    /// rejection is per-entry, not a whole-source failure.
    pub id: String,
    pub url: String,
    pub title: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSource {
    pub name: String,
    pub videos: Vec<ExtractedVideo>,
}

pub trait Extractor: Send + Sync {
    /// Resolve a Source URL to its name and constituent videos.
    /// `Err` is DLQ-worthy: the message is recorded on the Source row.
    fn extract(&self, url: &str) -> Result<ExtractedSource, String>;
}

/// Real, network-backed extractor: resolves a playlist or channel URL
/// against the YouTube Data API v3. This is the reference
/// implementation the binary ships (spec §10.6); any embedding program
/// may supply its own `Extractor` instead.
pub struct YoutubeDataApiExtractor {
    api_key: String,
    client: reqwest::blocking::Client,
}

#[derive(serde::Deserialize)]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
    #[serde(rename = "contentDetails")]
    content_details: Option<PlaylistItemContentDetails>,
}

#[derive(serde::Deserialize)]
struct PlaylistItemSnippet {
    title: String,
}

#[derive(serde::Deserialize)]
struct PlaylistItemContentDetails {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(serde::Deserialize)]
struct PlaylistResponse {
    items: Vec<PlaylistMeta>,
}

#[derive(serde::Deserialize)]
struct PlaylistMeta {
    snippet: PlaylistMetaSnippet,
}

#[derive(serde::Deserialize)]
struct PlaylistMetaSnippet {
    title: String,
}

impl YoutubeDataApiExtractor {
    pub fn new(api_key: impl Into<String>) -> Self {
        YoutubeDataApiExtractor {
            api_key: api_key.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn playlist_id_from_url(url: &str) -> Option<String> {
        url.split_once("list=")
            .map(|(_, rest)| rest.split('&').next().unwrap_or(rest).to_string())
    }

    fn playlist_title(&self, playlist_id: &str) -> Result<String, String> {
        let resp = self
            .client
            .get("https://www.googleapis.com/youtube/v3/playlists")
            .query(&[
                ("part", "snippet"),
                ("id", playlist_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("playlists.list returned {}", resp.status()));
        }
        let body: PlaylistResponse = resp.json().map_err(|e| e.to_string())?;
        Ok(body
            .items
            .into_iter()
            .next()
            .map(|p| p.snippet.title)
            .unwrap_or_default())
    }
}

impl Extractor for YoutubeDataApiExtractor {
    fn extract(&self, url: &str) -> Result<ExtractedSource, String> {
        let playlist_id =
            Self::playlist_id_from_url(url).ok_or_else(|| format!("no playlist id in url: {url}"))?;
        let name = self.playlist_title(&playlist_id)?;

        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("part", "snippet,contentDetails"),
                ("playlistId", playlist_id.as_str()),
                ("maxResults", "50"),
                ("key", self.api_key.as_str()),
            ];
            if let Some(tok) = page_token.as_deref() {
                query.push(("pageToken", tok));
            }
            let resp = self
                .client
                .get("https://www.googleapis.com/youtube/v3/playlistItems")
                .query(&query)
                .send()
                .map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                return Err(format!("playlistItems.list returned {}", resp.status()));
            }
            let body: PlaylistItemsResponse = resp.json().map_err(|e| e.to_string())?;
            for item in body.items {
                let Some(details) = item.content_details else {
                    continue;
                };
                videos.push(ExtractedVideo {
                    id: details.video_id.clone(),
                    url: format!("https://www.youtube.com/watch?v={}", details.video_id),
                    title: item.snippet.title,
                    duration: String::new(),
                });
            }
            match body.next_page_token {
                Some(tok) => page_token = Some(tok),
                None => break,
            }
        }

        Ok(ExtractedSource { name, videos })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub struct StubExtractor {
    result: Result<ExtractedSource, String>,
}

#[cfg(any(test, feature = "test-util"))]
impl StubExtractor {
    pub fn ok(name: impl Into<String>, videos: Vec<ExtractedVideo>) -> Self {
        StubExtractor {
            result: Ok(ExtractedSource {
                name: name.into(),
                videos,
            }),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        StubExtractor {
            result: Err(message.into()),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Extractor for StubExtractor {
    fn extract(&self, _url: &str) -> Result<ExtractedSource, String> {
        self.result.clone()
    }
}
