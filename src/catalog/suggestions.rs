use std::collections::HashSet;

use tracing::{debug, warn};

use crate::catalog::client::CatalogClient;
use crate::catalog::models::Track;
use crate::library::{LibraryStore, SUGGESTION_SEED_LIMIT};

/// Songs suggested from a random sample of liked songs, duplicates removed.
/// Empty when nothing is liked. A failing seed is skipped.
pub async fn suggested_songs<C, L>(catalog: &C, library: &L) -> Vec<Track>
where
    C: CatalogClient + ?Sized,
    L: LibraryStore + ?Sized,
{
    let seeds = library.random_liked_ids(SUGGESTION_SEED_LIMIT).await;
    if seeds.is_empty() {
        debug!("No liked songs to base suggestions on");
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut songs = Vec::new();

    for id in &seeds {
        match catalog.song_suggestions(id).await {
            Ok(suggestions) => {
                songs.extend(suggestions.into_iter().filter(|s| seen.insert(s.id.clone())));
            }
            Err(e) => warn!("Error fetching suggestions for id {}: {}", id, e),
        }
    }

    debug!(seeds = seeds.len(), songs = songs.len(), "Suggestions collected");
    songs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::search::tests::ScriptedCatalog;
    use crate::library::{Library, MemoryStore};

    #[tokio::test]
    async fn test_no_likes_means_no_suggestions() {
        let catalog = ScriptedCatalog::default();
        let library = Library::new(MemoryStore::new());

        assert!(suggested_songs(&catalog, &library).await.is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_are_merged_and_deduplicated() {
        let mut catalog = ScriptedCatalog::default();
        catalog.suggestions.insert(
            "a".to_string(),
            vec![Track::mock("x", "x"), Track::mock("y", "y")],
        );
        catalog.suggestions.insert(
            "b".to_string(),
            vec![Track::mock("y", "y"), Track::mock("z", "z")],
        );
        catalog.failing_queries.insert("c".to_string());

        let library = Library::new(MemoryStore::new());
        for id in ["a", "b", "c"] {
            library.like(&Track::mock(id, id)).await;
        }

        let mut ids: Vec<String> = suggested_songs(&catalog, &library)
            .await
            .into_iter()
            .map(|t| t.id)
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["x", "y", "z"]);
    }
}
