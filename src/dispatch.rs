//! Response dispatch: parses each route kind's payload, discovers new
//! entities, suppresses duplicates via the cache, and feeds the artist
//! pipeline and batch coalescer.

use crate::cache::CacheState;
use crate::models::{
    self, AlbumRef, ArtistRef, ArtistsResponse, CategoriesResponse, CategoryPlaylistsResponse,
    GenreSeedsResponse, PlaylistResponse, RecommendationsResponse, RelatedArtistsResponse,
    SearchResponse,
};
use crate::orchestrator::Shared;
use crate::route::{Endpoint, RouteKind};
use serde_json::Value;
use std::collections::BTreeMap;

/// Dispatch a successful response by its endpoint's route kind. Returns the
/// `(added, batched)` counts charged to that route's metrics.
pub async fn dispatch(shared: &Shared, endpoint: &Endpoint, data: Value) -> (u64, u64) {
    match endpoint.route_kind() {
        RouteKind::GenreSeeds => handle_genre_seeds(shared, data).await,
        RouteKind::Artists => handle_artists(shared, data).await,
        RouteKind::Recommendations => handle_recommendations(shared, data).await,
        RouteKind::Albums => handle_albums(shared, data).await,
        RouteKind::Categories => handle_categories(shared, data).await,
        RouteKind::CategoryPlaylists => handle_category_playlists(shared, data).await,
        RouteKind::Playlist => handle_playlist(shared, data).await,
        RouteKind::ArtistRelatedArtists => handle_related_artists(shared, data).await,
        RouteKind::Search => handle_search(shared, data).await,
    }
}

fn decode<T: Default + serde::de::DeserializeOwned>(data: Value, route: &str) -> T {
    serde_json::from_value(data).unwrap_or_else(|err| {
        tracing::warn!(route, error = %err, "payload shape error, skipping");
        T::default()
    })
}

async fn handle_genre_seeds(shared: &Shared, data: Value) -> (u64, u64) {
    let body: GenreSeedsResponse = decode(data, "genre_seeds");
    let mut added = 0u64;
    for genre in &body.genres {
        let mut seed_params = BTreeMap::new();
        seed_params.insert("seed_genres".to_string(), genre.clone());
        if expand_genre(shared, genre, seed_params).await {
            added += 1;
        }
    }
    (added, 0)
}

async fn handle_artists(shared: &Shared, data: Value) -> (u64, u64) {
    let body: ArtistsResponse = decode(data, "artists");
    let refs: Vec<ArtistRef> = body.artists.into_iter().flatten().collect();
    run_artist_pipeline(shared, refs).await
}

async fn handle_recommendations(shared: &Shared, data: Value) -> (u64, u64) {
    let body: RecommendationsResponse = decode(data, "recommendations");
    let mut artists = Vec::new();
    let mut albums = Vec::new();
    for track in body.tracks {
        artists.extend(track.artists);
        if let Some(album) = track.album {
            albums.push(album);
        }
    }
    stage_album_discovery(shared, albums).await;
    run_artist_pipeline(shared, artists).await
}

async fn handle_albums(shared: &Shared, data: Value) -> (u64, u64) {
    let body = decode::<crate::models::AlbumsResponse>(data, "albums");
    let mut artists = Vec::new();
    for album in body.albums.into_iter().flatten() {
        if let Err(err) = shared.cache.mark_written(&album.id).await {
            tracing::warn!(error = %err, "cache error marking album written");
        }
        artists.extend(album.artists);
    }
    run_artist_pipeline(shared, artists).await
}

async fn handle_categories(shared: &Shared, data: Value) -> (u64, u64) {
    let body: CategoriesResponse = decode(data, "categories");
    let mut added = 0u64;
    for item in &body.categories.items {
        if stage_next_level(shared, &item.id, RouteKind::CategoryPlaylists, |id| {
            format!("/browse/categories/{id}/playlists")
        })
        .await
        {
            added += 1;
        }
    }
    paginate(shared, RouteKind::Categories, body.categories.next.as_deref()).await;
    (added, 0)
}

async fn handle_category_playlists(shared: &Shared, data: Value) -> (u64, u64) {
    let body: CategoryPlaylistsResponse = decode(data, "category_playlists");
    let mut added = 0u64;
    for item in &body.playlists.items {
        if stage_next_level(shared, &item.id, RouteKind::Playlist, |id| {
            format!("/playlists/{id}/tracks")
        })
        .await
        {
            added += 1;
        }
    }
    // REDESIGN FLAG (§9c): paginate from the playlists object actually
    // fetched here, not the categories object.
    paginate(shared, RouteKind::CategoryPlaylists, body.playlists.next.as_deref()).await;
    (added, 0)
}

async fn handle_playlist(shared: &Shared, data: Value) -> (u64, u64) {
    let body: PlaylistResponse = decode(data, "playlist");
    let mut artists = Vec::new();
    let mut albums = Vec::new();
    for item in body.items {
        let Some(track) = item.track else { continue };
        if track.kind.as_deref() != Some("track") {
            continue;
        }
        artists.extend(track.artists);
        if let Some(album) = track.album {
            albums.push(album);
        }
    }
    stage_album_discovery(shared, albums).await;
    paginate(shared, RouteKind::Playlist, body.next.as_deref()).await;
    run_artist_pipeline(shared, artists).await
}

async fn handle_search(shared: &Shared, data: Value) -> (u64, u64) {
    let body: SearchResponse = decode(data, "search");
    paginate(shared, RouteKind::Search, body.artists.next.as_deref()).await;
    run_artist_pipeline(shared, body.artists.items).await
}

async fn handle_related_artists(shared: &Shared, data: Value) -> (u64, u64) {
    let body: RelatedArtistsResponse = decode(data, "artist_related_artists");
    run_artist_pipeline(shared, body.artists).await
}

/// If `next` is present, enqueue a follow-up request for the same route
/// kind with no params, at the path relative to the API version token.
async fn paginate(shared: &Shared, route_kind: RouteKind, next: Option<&str>) {
    let Some(next) = next else { return };
    let Some(path) = models::pagination_path(next) else {
        return;
    };
    shared
        .prioritizer
        .put(route_kind, Endpoint::with_route_kind(path, BTreeMap::new(), route_kind));
}

/// Discovery of a next-level endpoint (category -> its playlists, playlist
/// -> its tracks), suppressed by the `WRITTEN`-as-marker cache convention.
/// Returns `true` if this id had not been enqueued before.
async fn stage_next_level(
    shared: &Shared,
    id: &str,
    route_kind: RouteKind,
    path_for: impl FnOnce(&str) -> String,
) -> bool {
    match shared.cache.already_written(id).await {
        Ok(true) => return false,
        Err(err) => {
            tracing::warn!(error = %err, "cache error checking marker, proceeding cautiously");
        }
        Ok(false) => {}
    }
    if let Err(err) = shared.cache.mark_written(id).await {
        tracing::warn!(error = %err, "cache error marking marker written");
    }
    shared.prioritizer.put(
        route_kind,
        Endpoint::with_route_kind(path_for(id), BTreeMap::new(), route_kind),
    );
    true
}

/// Discovered album references (from recommendations/playlist tracks) are
/// staged as `/albums?ids=...` fetches, suppressed the same way as
/// categories/playlists.
async fn stage_album_discovery(shared: &Shared, albums: Vec<AlbumRef>) {
    for album in albums {
        match shared.cache.already_written(&album.id).await {
            Ok(true) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "cache error checking album marker");
            }
            Ok(false) => {}
        }
        if let Err(err) = shared.cache.mark_written(&album.id).await {
            tracing::warn!(error = %err, "cache error marking album marker written");
        }
        let mut params = BTreeMap::new();
        params.insert("ids".to_string(), album.id);
        shared.prioritizer.put(
            RouteKind::Albums,
            Endpoint::with_route_kind("/albums", params, RouteKind::Albums),
        );
    }
}

/// Stage the genre-seeds-style expansion (a `/recommendations` and a
/// `/search` endpoint) for one genre, unless it was already expanded.
/// Returns `true` if this genre was newly expanded.
async fn expand_genre(shared: &Shared, genre: &str, seed_params: BTreeMap<String, String>) -> bool {
    match shared.cache.already_written(genre).await {
        Ok(true) => return false,
        Err(err) => {
            tracing::warn!(error = %err, "cache error checking genre marker");
        }
        Ok(false) => {}
    }
    if let Err(err) = shared.cache.mark_written(genre).await {
        tracing::warn!(error = %err, "cache error marking genre written");
    }

    shared.prioritizer.put(
        RouteKind::Recommendations,
        Endpoint::with_route_kind("/recommendations", seed_params, RouteKind::Recommendations),
    );

    let mut search_params = BTreeMap::new();
    search_params.insert("q".to_string(), format!("genre:{genre}"));
    search_params.insert("type".to_string(), "artist".to_string());
    search_params.insert("limit".to_string(), "50".to_string());
    shared
        .prioritizer
        .put(RouteKind::Search, Endpoint::with_route_kind("/search", search_params, RouteKind::Search));

    true
}

/// The artist pipeline (§4.8), applied to a batch of discovered references
/// in one dispatch call. Tie-break: complete-detail references (which
/// write and may exhaust the quota) are processed before incomplete ones
/// (which only feed the batch coalescer), so a quota-stopping write always
/// takes priority within a single response.
async fn run_artist_pipeline(shared: &Shared, refs: Vec<ArtistRef>) -> (u64, u64) {
    let (complete, incomplete): (Vec<_>, Vec<_>) =
        refs.into_iter().partition(ArtistRef::has_complete_detail);

    let mut added = 0u64;
    let mut batched = 0u64;

    for artist in complete {
        if shared.quota_reached() {
            return (added, batched);
        }
        added += process_artist(shared, artist).await.0;
    }
    for artist in incomplete {
        if shared.quota_reached() {
            return (added, batched);
        }
        batched += process_artist(shared, artist).await.1;
    }

    (added, batched)
}

/// Process one artist reference, returning `(added, batched)` each in
/// `{0, 1}`.
async fn process_artist(shared: &Shared, artist: ArtistRef) -> (u64, u64) {
    let state = match shared.cache.state(&artist.id).await {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(error = %err, "cache error reading artist state");
            return (0, 0);
        }
    };

    if state == CacheState::Written {
        return (0, 0);
    }

    if artist.has_complete_detail() {
        // I4: claim quota atomically before writing, so a burst of
        // complete artists in one response can never overshoot it.
        if !shared.try_claim_quota() {
            return (0, 0);
        }

        let name = artist.name.clone().unwrap_or_default();
        let popularity = artist.popularity.unwrap_or_default();
        let genres = artist.genres.clone().unwrap_or_default();

        if let Err(err) = shared
            .writer
            .add(artist.id.clone(), name, popularity, genres.clone())
            .await
        {
            tracing::error!(error = %err, id = artist.id.as_str(), "failed to write artist row");
        }
        if let Err(err) = shared.cache.mark_written(&artist.id).await {
            tracing::warn!(error = %err, "cache error marking artist written");
        }

        if shared.quota_reached() {
            return (1, 0);
        }

        shared.prioritizer.put(
            RouteKind::ArtistRelatedArtists,
            Endpoint::with_route_kind(
                format!("/artists/{}/related-artists", artist.id),
                BTreeMap::new(),
                RouteKind::ArtistRelatedArtists,
            ),
        );

        for genre in &genres {
            let mut seed_params = BTreeMap::new();
            seed_params.insert("seed_artists".to_string(), artist.id.clone());
            expand_genre(shared, genre, seed_params).await;
        }

        (1, 0)
    } else if state == CacheState::Batched {
        (0, 0)
    } else {
        if let Err(err) = shared.cache.mark_batched(&artist.id).await {
            tracing::warn!(error = %err, "cache error marking artist batched");
        }
        shared.batch.add(artist.id.clone());

        // Check-and-drain under one lock: two workers racing the same
        // threshold crossing must not both observe "full" and both build,
        // which would push a second, empty `/artists?ids=` request.
        if let Some(ids) = shared.batch.build_if_full() {
            let mut params = BTreeMap::new();
            params.insert("ids".to_string(), ids);
            shared
                .queues
                .push_primary(Endpoint::with_route_kind("/artists", params, RouteKind::Artists))
                .await;
        }

        (0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchCoalescer;
    use crate::cache::{DedupCache, MemoryCache};
    use crate::http_client::{Credentials, HttpClientAdapter};
    use crate::metrics::MetricsTable;
    use crate::orchestrator::Shared;
    use crate::prioritizer::Prioritizer;
    use crate::queue::QueueFabric;
    use crate::writer::ArtistWriter;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn temp_csv_path(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "catalog-crawler-dispatch-test-{}-{tag}-{}",
            std::process::id(),
            {
                use std::time::{SystemTime, UNIX_EPOCH};
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos()
            }
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("artists.csv")
    }

    fn test_shared(quota: u64, tag: &str) -> Shared {
        let http = HttpClientAdapter::new(Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        })
        .unwrap();
        let path = temp_csv_path(tag);
        Shared {
            queues: QueueFabric::new(),
            prioritizer: Prioritizer::new(),
            cache: DedupCache::new(Arc::new(MemoryCache::new())),
            batch: BatchCoalescer::default(),
            writer: ArtistWriter::new(&path, true).unwrap(),
            metrics: MetricsTable::new(),
            backoff: crate::backoff::BackoffController::new(1800.0, 5),
            http,
            total: AtomicU64::new(0),
            quota,
            priority_mark: AtomicU64::new(0),
            flush_mark: AtomicU64::new(0),
        }
    }

    /// Scenario 1 (§8): a genre-seeds response with two genres stages two
    /// `/recommendations` and two `/search` endpoints, and marks both genres
    /// `WRITTEN` in cache.
    #[tokio::test]
    async fn genre_seeds_scenario_stages_recommendations_and_search() {
        let shared = test_shared(100, "genre-seeds");
        let endpoint = Endpoint::with_route_kind(
            "/recommendations/available-genre-seeds",
            BTreeMap::new(),
            RouteKind::GenreSeeds,
        );
        let data = json!({"genres": ["rock", "jazz"]});

        let (added, batched) = dispatch(&shared, &endpoint, data).await;
        assert_eq!(added, 2);
        assert_eq!(batched, 0);

        assert!(shared.cache.already_written("rock").await.unwrap());
        assert!(shared.cache.already_written("jazz").await.unwrap());

        let staged = shared.prioritizer.flush(100);
        let recs = staged
            .iter()
            .filter(|e| e.route_kind() == RouteKind::Recommendations)
            .count();
        let searches = staged
            .iter()
            .filter(|e| e.route_kind() == RouteKind::Search)
            .count();
        assert_eq!(recs, 2);
        assert_eq!(searches, 2);
    }

    /// Scenario 2 (§8): `/artists?ids=A,B` with A complete and B bare writes
    /// exactly one row (A), marks A `WRITTEN`, and leaves B `BATCHED`.
    #[tokio::test]
    async fn artists_scenario_writes_complete_and_batches_bare() {
        let shared = test_shared(100, "artists-scenario");
        let mut params = BTreeMap::new();
        params.insert("ids".to_string(), "A,B".to_string());
        let endpoint = Endpoint::with_route_kind("/artists", params, RouteKind::Artists);
        let data = json!({
            "artists": [
                {"id": "A", "name": "Alpha", "popularity": 50, "genres": ["rock"]},
                {"id": "B"}
            ]
        });

        let (added, batched) = dispatch(&shared, &endpoint, data).await;
        assert_eq!(added, 1);
        assert_eq!(batched, 1);
        assert_eq!(shared.total.load(Ordering::SeqCst), 1);

        assert_eq!(
            shared.cache.state("A").await.unwrap(),
            crate::cache::CacheState::Written
        );
        assert_eq!(
            shared.cache.state("B").await.unwrap(),
            crate::cache::CacheState::Batched
        );
    }

    /// Scenario 6 (§8): quota = 2, three complete artists arrive in one
    /// response. Exactly two are written; the third is left entirely absent
    /// from cache so a later discovery can still pick it up.
    #[tokio::test]
    async fn quota_scenario_stops_after_two_leaves_third_absent() {
        let shared = test_shared(2, "quota-scenario");
        let mut params = BTreeMap::new();
        params.insert("ids".to_string(), "A,B,C".to_string());
        let endpoint = Endpoint::with_route_kind("/artists", params, RouteKind::Artists);
        let data = json!({
            "artists": [
                {"id": "A", "name": "Alpha", "popularity": 50, "genres": ["rock"]},
                {"id": "B", "name": "Beta", "popularity": 60, "genres": ["jazz"]},
                {"id": "C", "name": "Gamma", "popularity": 70, "genres": ["pop"]}
            ]
        });

        let (added, _batched) = dispatch(&shared, &endpoint, data).await;
        assert_eq!(added, 2);
        assert_eq!(shared.total.load(Ordering::SeqCst), 2);
        assert!(shared.quota_reached());

        assert_eq!(
            shared.cache.state("A").await.unwrap(),
            crate::cache::CacheState::Written
        );
        assert_eq!(
            shared.cache.state("B").await.unwrap(),
            crate::cache::CacheState::Written
        );
        assert_eq!(
            shared.cache.state("C").await.unwrap(),
            crate::cache::CacheState::Absent
        );
    }

    /// Payload shape errors (missing expected fields entirely) are logged and
    /// skipped rather than propagated: a malformed genre-seeds body decodes
    /// to the `Default` empty response and contributes nothing.
    #[tokio::test]
    async fn malformed_payload_decodes_to_default_instead_of_propagating() {
        let shared = test_shared(100, "malformed-payload");
        let endpoint = Endpoint::with_route_kind(
            "/recommendations/available-genre-seeds",
            BTreeMap::new(),
            RouteKind::GenreSeeds,
        );
        let data = json!({"genres": "not-an-array"});

        let (added, batched) = dispatch(&shared, &endpoint, data).await;
        assert_eq!(added, 0);
        assert_eq!(batched, 0);
        assert!(shared.prioritizer.is_empty());
    }

    /// The playlist handler restricts to `track.type == "track"` items only,
    /// skipping episodes/other item types per §4.8.
    #[tokio::test]
    async fn playlist_scenario_skips_non_track_items() {
        let shared = test_shared(100, "playlist-scenario");
        let endpoint = Endpoint::with_route_kind("/playlists/xyz/tracks", BTreeMap::new(), RouteKind::Playlist);
        let data = json!({
            "items": [
                {"track": {"type": "track", "artists": [
                    {"id": "A", "name": "Alpha", "popularity": 10, "genres": ["rock"]}
                ]}},
                {"track": {"type": "episode", "artists": [
                    {"id": "Z", "name": "Zeta", "popularity": 10, "genres": ["talk"]}
                ]}}
            ],
            "next": null
        });

        let (added, _batched) = dispatch(&shared, &endpoint, data).await;
        assert_eq!(added, 1);
        assert_eq!(
            shared.cache.state("A").await.unwrap(),
            crate::cache::CacheState::Written
        );
        assert_eq!(
            shared.cache.state("Z").await.unwrap(),
            crate::cache::CacheState::Absent
        );
    }
}
