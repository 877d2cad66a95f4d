use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Bitrate variants tried, in order, when resolving a stream URL.
const STREAM_VARIANT_PREFERENCE: [usize; 2] = [4, 3];
const ARTWORK_VARIANT: usize = 2;

/// Anything the catalog hands back with a stable id.
pub trait CatalogId {
    fn catalog_id(&self) -> &str;
}

/// Treats an explicit `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Older API revisions used `link` instead of `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl ImageLink {
    fn resolved(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or(self.link.as_deref())
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtistRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiArtists {
    #[serde(default, deserialize_with = "nullable")]
    pub primary: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlbumRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A song exactly as the catalog returns it. Unknown fields are kept in
/// `extra` so a stored song round-trips without losing data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiSong {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artists: Option<ApiArtists>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Vec<ImageLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumRef>,
    #[serde(rename = "downloadUrl", default, deserialize_with = "nullable")]
    pub download_url: Vec<MediaLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A playable song, normalized once when it enters the crate.
///
/// Serializes back to the catalog shape, so persisted libraries stay
/// readable by anything that understands the catalog JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ApiSong", into = "ApiSong")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub artwork_url: String,
    pub album_name: String,
    /// Empty when no preferred bitrate variant resolves.
    pub stream_url: String,
    source: ApiSong,
}

impl From<ApiSong> for Track {
    fn from(song: ApiSong) -> Self {
        let stream_url = STREAM_VARIANT_PREFERENCE
            .iter()
            .filter_map(|&i| song.download_url.get(i))
            .find_map(|v| v.url.as_deref().filter(|u| !u.is_empty()))
            .unwrap_or_default()
            .to_string();

        let artwork_url = song
            .image
            .get(ARTWORK_VARIANT)
            .and_then(ImageLink::resolved)
            .unwrap_or_default()
            .to_string();

        let artist_name = song
            .artists
            .as_ref()
            .and_then(|a| a.primary.first())
            .and_then(|a| a.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

        Self {
            id: song.id.clone(),
            title: song
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist_name,
            artwork_url,
            album_name: song
                .album
                .as_ref()
                .and_then(|a| a.name.clone())
                .unwrap_or_default(),
            stream_url,
            source: song,
        }
    }
}

impl From<Track> for ApiSong {
    fn from(track: Track) -> Self {
        track.source
    }
}

impl Track {
    /// Every primary artist, comma separated.
    pub fn all_artists(&self) -> String {
        self.source
            .artists
            .as_ref()
            .map(|a| {
                a.primary
                    .iter()
                    .filter_map(|r| r.name.as_deref())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    }

    pub fn year(&self) -> String {
        match &self.source.year {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match &self.source.duration {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Highest-quality download variant, used by the transcode server.
    pub fn download_source_url(&self) -> Option<&str> {
        self.source
            .download_url
            .get(STREAM_VARIANT_PREFERENCE[0])
            .and_then(|v| v.url.as_deref())
            .filter(|u| !u.is_empty())
    }
}

impl CatalogId for Track {
    fn catalog_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artists: Option<ApiArtists>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Vec<ImageLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "songCount", default, skip_serializing_if = "Option::is_none")]
    pub song_count: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Vec<ImageLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Vec<ImageLink>,
}

macro_rules! impl_catalog_id {
    ($($ty:ty),*) => {
        $(impl CatalogId for $ty {
            fn catalog_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

impl_catalog_id!(AlbumSummary, PlaylistSummary, ArtistSummary);

impl AlbumSummary {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .as_ref()
            .and_then(|a| a.primary.first())
            .and_then(|a| a.name.as_deref())
            .unwrap_or(UNKNOWN_ARTIST)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub artists: Option<ApiArtists>,
    #[serde(default, deserialize_with = "nullable")]
    pub songs: Vec<Track>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "songCount", default)]
    pub song_count: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub songs: Vec<Track>,
}

/// One page of a paginated catalog listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total: Some(0),
        }
    }
}

/// Entry on the language home page (album, playlist or chart).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleItem {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default)]
pub struct Modules {
    pub albums: Vec<ModuleItem>,
    pub playlists: Vec<ModuleItem>,
    pub charts: Vec<ModuleItem>,
}

#[cfg(test)]
impl Track {
    pub fn mock(id: &str, title: &str) -> Self {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": title,
            "artists": {"primary": [{"name": "Mock Artist"}]},
            "album": {"name": "Mock Album"},
            "image": [{"url": "i0"}, {"url": "i1"}, {"url": format!("https://img/{}.jpg", id)}],
            "downloadUrl": [
                {"url": "d0"}, {"url": "d1"}, {"url": "d2"}, {"url": "d3"},
                {"url": format!("https://cdn/{}_320.mp4", id)}
            ],
        }))
        .expect("mock track json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_prefers_highest_variant() {
        let track = Track::mock("abc", "Kesariya");
        assert_eq!(track.stream_url, "https://cdn/abc_320.mp4");
        assert_eq!(track.artwork_url, "https://img/abc.jpg");
        assert_eq!(track.artist_name, "Mock Artist");
        assert_eq!(track.album_name, "Mock Album");
    }

    #[test]
    fn test_track_falls_back_to_variant_three() {
        let track: Track = serde_json::from_value(json!({
            "id": "x",
            "name": "Song",
            "downloadUrl": [{"url": "a"}, {"url": "b"}, {"url": "c"}, {"url": "q160"}]
        }))
        .unwrap();

        assert_eq!(track.stream_url, "q160");
    }

    #[test]
    fn test_track_missing_fields_degrade_to_placeholders() {
        let track: Track = serde_json::from_value(json!({
            "id": "bare",
            "artists": null,
            "image": null,
            "downloadUrl": null
        }))
        .unwrap();

        assert_eq!(track.title, UNKNOWN_TITLE);
        assert_eq!(track.artist_name, UNKNOWN_ARTIST);
        assert_eq!(track.album_name, "");
        assert_eq!(track.artwork_url, "");
        assert_eq!(track.stream_url, "");
        assert!(track.download_source_url().is_none());
    }

    #[test]
    fn test_artwork_accepts_legacy_link_field() {
        let track: Track = serde_json::from_value(json!({
            "id": "old",
            "image": [{"link": "l0"}, {"link": "l1"}, {"link": "l2"}]
        }))
        .unwrap();

        assert_eq!(track.artwork_url, "l2");
    }

    #[test]
    fn test_track_serializes_back_to_catalog_shape() {
        let raw = json!({
            "id": "keep",
            "name": "Tum Hi Ho",
            "language": "hindi",
            "year": 2013,
            "artists": {"primary": [{"name": "Arijit Singh"}, {"name": "Mithoon"}]},
        });

        let track: Track = serde_json::from_value(raw).unwrap();
        let stored = serde_json::to_value(&track).unwrap();

        assert_eq!(stored["language"], "hindi");
        assert_eq!(stored["name"], "Tum Hi Ho");
        assert_eq!(track.all_artists(), "Arijit Singh,Mithoon");
        assert_eq!(track.year(), "2013");
    }
}
