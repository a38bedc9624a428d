//! Plex Media Server catalog backed by `ureq`.

use std::time::Duration;

use serde_json::Value;

use super::{Catalog, CatalogError, CatalogResult};
use crate::models::{Artist, EntryKind, Library, MediaEntry};

const TYPE_ARTIST: &str = "8";
const TYPE_ALBUM: &str = "9";
const TYPE_TRACK: &str = "10";

/// Section type Plex reports for music libraries.
const MUSIC_SECTION_TYPE: &str = "artist";

// ============================================================================
// Identification Headers
// ============================================================================

const DEVICE_NAME: &str = "media-script";
const PRODUCT: &str = "Chrome";
const CLIENT_ID: &str = "media-script-cli";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

/// Fixed identification headers sent with every request.
fn identification_headers() -> Vec<(&'static str, String)> {
    vec![
        ("User-Agent", USER_AGENT.to_string()),
        ("X-Plex-Product", PRODUCT.to_string()),
        ("X-Plex-Device-Name", DEVICE_NAME.to_string()),
        ("X-Plex-Client-Identifier", CLIENT_ID.to_string()),
        ("X-Plex-Device", "Script".to_string()),
        ("X-Plex-Platform", "Rust".to_string()),
        ("X-Plex-Platform-Version", std::env::consts::OS.to_string()),
        ("X-Plex-Version", env!("CARGO_PKG_VERSION").to_string()),
        ("Accept", "application/json".to_string()),
    ]
}

/// Keep only printable ASCII so header values are always encodable.
pub fn ascii_header_value(value: &str) -> String {
    value.chars().filter(|c| (' '..='~').contains(c)).collect()
}

// ============================================================================
// Adapter
// ============================================================================

/// Plex adapter. Holds the base URL, the token and a shared HTTP agent.
pub struct PlexCatalog {
    http_client: ureq::Agent,
    base_url: String,
    token: String,
}

impl PlexCatalog {
    /// Connect to a server and verify the token is accepted.
    pub fn connect(base_url: &str, token: &str) -> CatalogResult<Self> {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();
        let catalog = Self {
            http_client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.to_string(),
        };
        catalog.get_json("/identity", &[], "identity")?;
        Ok(catalog)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http_client.request(method, &url);
        for (name, value) in identification_headers() {
            request = request.set(name, &ascii_header_value(&value));
        }
        request.set("X-Plex-Token", &ascii_header_value(&self.token))
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        params: &[(&str, &str)],
        context: &str,
    ) -> CatalogResult<ureq::Response> {
        let mut request = self.request(method, path);
        for (name, value) in params {
            request = request.query(name, value);
        }
        let result = if method == "PUT" {
            request.send_bytes(&[])
        } else {
            request.call()
        };
        result.map_err(|err| match err {
            ureq::Error::Status(status, _) => CatalogError::Status {
                context: context.to_string(),
                status,
            },
            ureq::Error::Transport(transport) => CatalogError::Transport {
                context: context.to_string(),
                message: transport.to_string(),
            },
        })
    }

    fn get_json(&self, path: &str, params: &[(&str, &str)], context: &str) -> CatalogResult<Value> {
        let response = self.send("GET", path, params, context)?;
        response.into_json().map_err(|err| CatalogError::Parse {
            context: context.to_string(),
            message: err.to_string(),
        })
    }

    fn put(&self, path: &str, params: &[(&str, &str)], context: &str) -> CatalogResult<()> {
        self.send("PUT", path, params, context).map(|_| ())
    }

    /// Edit through the section endpoint, the path Plex clients use.
    fn edit(&self, entry: &MediaEntry, params: &[(&str, &str)], context: &str) -> CatalogResult<()> {
        let path = format!("/library/sections/{}/all", entry.library_key);
        let mut all: Vec<(&str, &str)> = vec![
            ("type", type_code(entry.kind)),
            ("id", entry.rating_key.as_str()),
            ("includeExternalMedia", "1"),
        ];
        all.extend_from_slice(params);
        self.put(&path, &all, context)
    }

    fn metadata_children(
        &self,
        rating_key: &str,
        kind: EntryKind,
        library_key: &str,
        context: &str,
    ) -> CatalogResult<Vec<MediaEntry>> {
        let path = format!("/library/metadata/{}/children", rating_key);
        let body = self.get_json(&path, &[], context)?;
        Ok(metadata_items(&body)
            .into_iter()
            .filter_map(|item| parse_entry(item, kind, library_key))
            .collect())
    }
}

fn type_code(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Album => TYPE_ALBUM,
        EntryKind::Track => TYPE_TRACK,
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

fn array_or_single(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
}

fn container(body: &Value) -> Option<&Value> {
    body.get("MediaContainer")
}

fn metadata_items(body: &Value) -> Vec<&Value> {
    array_or_single(container(body).and_then(|c| c.get("Metadata")))
}

fn directory_items(body: &Value) -> Vec<&Value> {
    array_or_single(container(body).and_then(|c| c.get("Directory")))
}

/// Rating keys come back as strings or numbers depending on server version.
fn string_field(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_library(item: &Value) -> Option<Library> {
    Some(Library {
        key: string_field(item, "key")?,
        title: string_field(item, "title")?,
    })
}

fn parse_labels(item: &Value) -> Vec<String> {
    array_or_single(item.get("Label"))
        .into_iter()
        .filter_map(|label| label.get("tag").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn parse_part_paths(item: &Value) -> Vec<String> {
    array_or_single(item.get("Media"))
        .into_iter()
        .flat_map(|media| array_or_single(media.get("Part")))
        .filter_map(|part| part.get("file").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn parse_entry(item: &Value, kind: EntryKind, library_key: &str) -> Option<MediaEntry> {
    let rating_key = string_field(item, "ratingKey")?;
    let library_key =
        string_field(item, "librarySectionID").unwrap_or_else(|| library_key.to_string());
    Some(MediaEntry {
        kind,
        rating_key,
        title: string_field(item, "title").unwrap_or_default(),
        labels: parse_labels(item),
        paths: parse_part_paths(item),
        library_key,
    })
}

// ============================================================================
// Catalog Implementation
// ============================================================================

impl Catalog for PlexCatalog {
    fn music_libraries(&self) -> CatalogResult<Vec<Library>> {
        let body = self.get_json("/library/sections", &[], "library sections")?;
        Ok(directory_items(&body)
            .into_iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some(MUSIC_SECTION_TYPE))
            .filter_map(parse_library)
            .collect())
    }

    fn library(&self, name: &str) -> CatalogResult<Library> {
        let body = self.get_json("/library/sections", &[], "library sections")?;
        directory_items(&body)
            .into_iter()
            .filter_map(parse_library)
            .find(|library| library.title == name)
            .ok_or_else(|| CatalogError::NotFound(format!("library '{}'", name)))
    }

    fn artists(&self, library: &Library, name_filter: Option<&str>) -> CatalogResult<Vec<Artist>> {
        let path = format!("/library/sections/{}/all", library.key);
        let mut params = vec![("type", TYPE_ARTIST)];
        if let Some(filter) = name_filter {
            params.push(("title", filter));
        }
        let context = format!("artists of '{}'", library.title);
        let body = self.get_json(&path, &params, &context)?;
        Ok(metadata_items(&body)
            .into_iter()
            .filter_map(|item| {
                Some(Artist {
                    rating_key: string_field(item, "ratingKey")?,
                    title: string_field(item, "title").unwrap_or_default(),
                    library_key: library.key.clone(),
                })
            })
            .collect())
    }

    fn albums(&self, artist: &Artist) -> CatalogResult<Vec<MediaEntry>> {
        let context = format!("albums of '{}'", artist.title);
        self.metadata_children(&artist.rating_key, EntryKind::Album, &artist.library_key, &context)
    }

    fn tracks(&self, album: &MediaEntry) -> CatalogResult<Vec<MediaEntry>> {
        let context = format!("tracks of '{}'", album.title);
        self.metadata_children(&album.rating_key, EntryKind::Track, &album.library_key, &context)
    }

    fn fetch(&self, entry: &MediaEntry) -> CatalogResult<MediaEntry> {
        let path = format!("/library/metadata/{}", entry.rating_key);
        let context = format!("metadata {}", entry.rating_key);
        let body = self.get_json(&path, &[], &context)?;
        metadata_items(&body)
            .into_iter()
            .find_map(|item| parse_entry(item, entry.kind, &entry.library_key))
            .ok_or_else(|| CatalogError::NotFound(context))
    }

    fn set_field_lock(&self, entry: &MediaEntry, field: &str, locked: bool) -> CatalogResult<()> {
        let name = format!("{}.locked", field);
        let value = if locked { "1" } else { "0" };
        self.edit(entry, &[(name.as_str(), value)], "field lock")
    }

    fn set_field(&self, entry: &MediaEntry, field: &str, value: &str) -> CatalogResult<()> {
        let name = format!("{}.value", field);
        self.edit(entry, &[(name.as_str(), value)], "field edit")
    }

    fn add_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()> {
        self.edit(
            entry,
            &[("label[0].tag.tag", label), ("label.locked", "1")],
            "add label",
        )
    }

    fn remove_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()> {
        self.edit(entry, &[("label[].tag.tag-", label)], "remove label")
    }

    fn put_metadata(&self, entry: &MediaEntry, fields: &[(&str, &str)]) -> CatalogResult<()> {
        let path = format!("/library/metadata/{}", entry.rating_key);
        let mut params: Vec<(&str, &str)> = vec![("X-Plex-Token", self.token.as_str())];
        params.extend_from_slice(fields);
        self.put(&path, &params, "direct metadata update")
    }
}
