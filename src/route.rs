//! Route kinds and the endpoint unit of work.

use std::collections::BTreeMap;
use std::fmt;

/// One of the nine closed categories of endpoint the crawler knows how to
/// dispatch. Each kind owns a unique path prefix and response handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteKind {
    GenreSeeds,
    Artists,
    Recommendations,
    Albums,
    Categories,
    CategoryPlaylists,
    Playlist,
    ArtistRelatedArtists,
    Search,
}

impl RouteKind {
    /// All route kinds, in a fixed (non-priority) order. Used to seed the
    /// prioritizer's staging queues and initial priority list.
    pub const ALL: [RouteKind; 9] = [
        RouteKind::GenreSeeds,
        RouteKind::Artists,
        RouteKind::Recommendations,
        RouteKind::Albums,
        RouteKind::Categories,
        RouteKind::CategoryPlaylists,
        RouteKind::Playlist,
        RouteKind::ArtistRelatedArtists,
        RouteKind::Search,
    ];

    /// The unique path prefix identifying this route kind, used both to
    /// classify inbound paths and to build a handler lookup table.
    pub fn prefix(self) -> &'static str {
        match self {
            RouteKind::GenreSeeds => "/recommendations/available-genre-seeds",
            RouteKind::Artists => "/artists",
            RouteKind::Recommendations => "/recommendations",
            RouteKind::Albums => "/albums",
            RouteKind::Categories => "/browse/categories",
            RouteKind::CategoryPlaylists => "/browse/categories/",
            RouteKind::Playlist => "/playlists",
            RouteKind::ArtistRelatedArtists => "/artists/",
            RouteKind::Search => "/search",
        }
    }

    /// Classify a path into the route kind whose handler should process it.
    /// Longer, more specific prefixes are checked before their shorter,
    /// more general counterparts (e.g. `artist_related_artists` before
    /// `artists`, `category_playlists` before `categories`).
    pub fn classify(path: &str) -> Option<RouteKind> {
        if path == RouteKind::GenreSeeds.prefix() {
            return Some(RouteKind::GenreSeeds);
        }
        if path.starts_with("/artists/") && path.ends_with("/related-artists") {
            return Some(RouteKind::ArtistRelatedArtists);
        }
        if path.starts_with("/artists") {
            return Some(RouteKind::Artists);
        }
        if path.starts_with("/recommendations") {
            return Some(RouteKind::Recommendations);
        }
        if path.starts_with("/albums") {
            return Some(RouteKind::Albums);
        }
        if path.starts_with("/browse/categories/") && path.contains("/playlists") {
            return Some(RouteKind::CategoryPlaylists);
        }
        if path.starts_with("/browse/categories") {
            return Some(RouteKind::Categories);
        }
        if path.starts_with("/playlists/") {
            return Some(RouteKind::Playlist);
        }
        if path.starts_with("/search") {
            return Some(RouteKind::Search);
        }
        None
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteKind::GenreSeeds => "genre_seeds",
            RouteKind::Artists => "artists",
            RouteKind::Recommendations => "recommendations",
            RouteKind::Albums => "albums",
            RouteKind::Categories => "categories",
            RouteKind::CategoryPlaylists => "category_playlists",
            RouteKind::Playlist => "playlist",
            RouteKind::ArtistRelatedArtists => "artist_related_artists",
            RouteKind::Search => "search",
        };
        f.write_str(s)
    }
}

/// A single prospective HTTP call, created at discovery and immutable
/// thereafter. Destroyed when its fetch permanently succeeds or is dropped.
///
/// I1: `path` is always non-empty — enforced at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    path: String,
    params: BTreeMap<String, String>,
    route_kind: RouteKind,
}

impl Endpoint {
    /// Build an endpoint, inferring its route kind from `path`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty or does not match any known route prefix —
    /// both indicate a bug in a discovery handler, not a runtime condition.
    pub fn new(path: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        let path = path.into();
        assert!(!path.is_empty(), "endpoint path must not be empty");
        let route_kind =
            RouteKind::classify(&path).unwrap_or_else(|| panic!("unroutable path: {path}"));
        Self {
            path,
            params,
            route_kind,
        }
    }

    /// Build an endpoint with an explicit route kind, bypassing classification.
    /// Used for follow-up/pagination requests, which must stay on the same
    /// route kind as the response they were derived from regardless of the
    /// literal path shape.
    pub fn with_route_kind(
        path: impl Into<String>,
        params: BTreeMap<String, String>,
        route_kind: RouteKind,
    ) -> Self {
        let path = path.into();
        assert!(!path.is_empty(), "endpoint path must not be empty");
        Self {
            path,
            params,
            route_kind,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn route_kind(&self) -> RouteKind {
        self.route_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_related_artists_before_artists() {
        assert_eq!(
            RouteKind::classify("/artists/abc123/related-artists"),
            Some(RouteKind::ArtistRelatedArtists)
        );
        assert_eq!(RouteKind::classify("/artists/abc123"), Some(RouteKind::Artists));
        assert_eq!(RouteKind::classify("/artists"), Some(RouteKind::Artists));
    }

    #[test]
    fn classifies_category_playlists_before_categories() {
        assert_eq!(
            RouteKind::classify("/browse/categories/rock/playlists"),
            Some(RouteKind::CategoryPlaylists)
        );
        assert_eq!(
            RouteKind::classify("/browse/categories/rock"),
            Some(RouteKind::Categories)
        );
    }

    #[test]
    fn classifies_genre_seeds() {
        assert_eq!(
            RouteKind::classify("/recommendations/available-genre-seeds"),
            Some(RouteKind::GenreSeeds)
        );
        assert_eq!(
            RouteKind::classify("/recommendations"),
            Some(RouteKind::Recommendations)
        );
    }

    #[test]
    #[should_panic(expected = "endpoint path must not be empty")]
    fn rejects_empty_path() {
        Endpoint::new("", BTreeMap::new());
    }
}
