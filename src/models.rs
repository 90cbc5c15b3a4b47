//! Typed views onto the API's per-route JSON response shapes.
//!
//! Per design note: dynamic response shapes are modeled as tagged structs
//! decoded with `serde`, rather than navigated as untyped `serde_json::Value`
//! maps in the dispatch handlers.

use serde::Deserialize;

/// An artist reference as it appears embedded in tracks, playlists, or
/// related-artist lists. Only `/artists?ids=...` responses are guaranteed to
/// carry full detail — elsewhere `name`/`popularity`/`genres` may be absent.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ArtistRef {
    pub id: String,
    pub name: Option<String>,
    pub popularity: Option<u8>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

impl ArtistRef {
    /// True when `name`, `popularity`, and `genres` are all present — the
    /// precondition for writing this reference to storage.
    pub fn has_complete_detail(&self) -> bool {
        self.name.is_some() && self.popularity.is_some() && self.genres.is_some()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AlbumRef {
    pub id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenreSeedsResponse {
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ArtistsResponse {
    #[serde(default)]
    pub artists: Vec<Option<ArtistRef>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecTrack {
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecommendationsResponse {
    #[serde(default)]
    pub tracks: Vec<RecTrack>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AlbumDetail {
    pub id: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AlbumsResponse {
    #[serde(default)]
    pub albums: Vec<Option<AlbumDetail>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct IdItem {
    pub id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct Page<T> {
    #[serde(default)]
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CategoriesResponse {
    #[serde(default)]
    pub categories: Page<IdItem>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CategoryPlaylistsResponse {
    #[serde(default)]
    pub playlists: Page<IdItem>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PlaylistTrack {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PlaylistItem {
    pub track: Option<PlaylistTrack>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PlaylistResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchArtistsPage {
    #[serde(default)]
    pub items: Vec<ArtistRef>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchResponse {
    #[serde(default)]
    pub artists: SearchArtistsPage,
}

#[derive(Debug, Deserialize, Default)]
pub struct RelatedArtistsResponse {
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

/// Extract the path relative to the API version token from a `next` URL:
/// locate the substring `v1` and take everything after it.
pub fn pagination_path(next: &str) -> Option<String> {
    next.find("v1").map(|idx| next[idx + 2..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_path_strips_up_to_version_token() {
        let next = "https://api.spotify.com/v1/browse/categories/rock/playlists?offset=20";
        assert_eq!(
            pagination_path(next),
            Some("/browse/categories/rock/playlists?offset=20".to_string())
        );
    }

    #[test]
    fn artist_ref_requires_all_three_fields() {
        let complete = ArtistRef {
            id: "A".into(),
            name: Some("Alpha".into()),
            popularity: Some(50),
            genres: Some(vec!["rock".into()]),
        };
        assert!(complete.has_complete_detail());

        let incomplete = ArtistRef {
            id: "B".into(),
            ..Default::default()
        };
        assert!(!incomplete.has_complete_detail());
    }
}
