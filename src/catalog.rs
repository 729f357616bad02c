use std::collections::HashMap;
use std::fmt;

use reqwest::Client;
use serde::Deserialize;
use serde::de::{Deserializer, MapAccess, Visitor};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::constants;

// --- Types ---

/// One dataset advertised by the server.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
  pub id: String,
  pub description: Option<String>,
  pub thumbnail_url: Option<String>,
  /// Locator handed to the viewer on activation. Entries without one are
  /// listed but cannot be opened.
  pub dataset_url: Option<String>,
}

/// Ordered, id-keyed collection of dataset entries for one browse session.
///
/// Entries keep the server's emission order so the listing is stable and
/// reproducible; the index map gives O(1) lookup by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  entries: Vec<CatalogEntry>,
  index: HashMap<String, usize>,
}

impl Catalog {
  /// Append an entry, keeping ids unique. A duplicate id keeps the first
  /// occurrence.
  pub fn insert(&mut self, entry: CatalogEntry) {
    if self.index.contains_key(&entry.id) {
      debug!(id = %entry.id, "duplicate dataset id in catalog response, keeping the first");
      return;
    }
    self.index.insert(entry.id.clone(), self.entries.len());
    self.entries.push(entry);
  }

  pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
    self.index.get(id).map(|&i| &self.entries[i])
  }

  /// Entries in emission order.
  pub fn entries(&self) -> &[CatalogEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

// --- Errors ---

#[derive(Debug, Error)]
pub enum CatalogError {
  /// The server could not be reached, or answered with a non-success status.
  #[error("connection error: {0}")]
  Connection(String),
  /// The response body was not a well-formed catalog document.
  #[error("protocol error: {0}")]
  Protocol(String),
}

// --- Decoding ---

/// Raw shape of one per-dataset object in the server response. Unknown fields
/// are forward-compatible no-ops; all recognized fields are optional here and
/// the id requirement is enforced in [`RawEntry::into_entry`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
  #[serde(default)]
  id: Option<String>,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  thumbnail_url: Option<String>,
  #[serde(default)]
  dataset_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.is_empty())
}

impl RawEntry {
  /// An object without a non-empty `id` is dropped rather than listed.
  fn into_entry(self) -> Option<CatalogEntry> {
    let id = non_empty(self.id)?;
    Some(CatalogEntry {
      id,
      description: non_empty(self.description),
      thumbnail_url: non_empty(self.thumbnail_url),
      dataset_url: non_empty(self.dataset_url),
    })
  }
}

impl<'de> Deserialize<'de> for Catalog {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    struct CatalogVisitor;

    impl<'de> Visitor<'de> for CatalogVisitor {
      type Value = Catalog;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of dataset descriptions")
      }

      fn visit_map<A>(self, mut map: A) -> Result<Catalog, A::Error>
      where
        A: MapAccess<'de>,
      {
        let mut catalog = Catalog::default();
        // Entries are walked in document order, so the server's emission
        // order survives. The outer key is informational only; the `id`
        // inside each object is authoritative. A malformed value aborts the
        // whole decode.
        while let Some((key, raw)) = map.next_entry::<String, RawEntry>()? {
          match raw.into_entry() {
            Some(entry) => catalog.insert(entry),
            None => debug!(key = %key, "dropping dataset object without an id"),
          }
        }
        Ok(catalog)
      }
    }

    deserializer.deserialize_map(CatalogVisitor)
  }
}

/// Decode a catalog response body.
pub fn decode_catalog(body: &[u8]) -> Result<Catalog, CatalogError> {
  serde_json::from_slice(body).map_err(|e| CatalogError::Protocol(e.to_string()))
}

// --- Fetching ---

/// Address of the catalog endpoint for a server base address.
pub fn catalog_url(server: &str) -> String {
  format!("{}/{}", server.trim_end_matches('/'), constants().catalog_endpoint)
}

/// Fetch and decode the dataset catalog from `server`.
///
/// One request per call; the connection is released on every exit path. The
/// catalog is returned whole so callers can install it atomically.
pub async fn fetch_catalog(client: &Client, server: &str) -> Result<Catalog, CatalogError> {
  let url = catalog_url(server);
  debug!(url = %url, "requesting catalog");

  let response =
    client.get(&url).send().await.map_err(|e| CatalogError::Connection(format!("cannot reach {}: {}", url, e)))?;

  let status = response.status();
  if !status.is_success() {
    warn!(url = %url, status = %status, "catalog endpoint answered with an error status");
    return Err(CatalogError::Connection(format!("{} returned {}", url, status)));
  }

  let body = response.bytes().await.map_err(|e| CatalogError::Connection(format!("failed to read {}: {}", url, e)))?;
  decode_catalog(&body)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  fn ids(catalog: &Catalog) -> Vec<&str> {
    catalog.entries().iter().map(|e| e.id.as_str()).collect()
  }

  fn test_client() -> Client {
    Client::builder().timeout(Duration::from_secs(5)).build().unwrap()
  }

  // --- decode_catalog ---

  #[test]
  fn decodes_entries_with_and_without_locators() {
    let body = br#"{"a":{"id":"a","datasetUrl":"http://h/x.xml"},"b":{"id":"b"}}"#;
    let catalog = decode_catalog(body).unwrap();
    assert_eq!(ids(&catalog), ["a", "b"]);
    assert_eq!(catalog.get("a").unwrap().dataset_url.as_deref(), Some("http://h/x.xml"));
    assert_eq!(catalog.get("b").unwrap().dataset_url, None);
  }

  #[test]
  fn preserves_emission_order_not_key_order() {
    let body = br#"{"z":{"id":"z"},"a":{"id":"a"},"m":{"id":"m"}}"#;
    let catalog = decode_catalog(body).unwrap();
    assert_eq!(ids(&catalog), ["z", "a", "m"]);
  }

  #[test]
  fn drops_objects_without_an_id() {
    let body = br#"{"first":{"id":"first"},"second":{"description":"no id here"},"third":{"id":""}}"#;
    let catalog = decode_catalog(body).unwrap();
    assert_eq!(ids(&catalog), ["first"]);
  }

  #[test]
  fn inner_id_wins_over_the_outer_key() {
    let body = br#"{"outer":{"id":"inner"}}"#;
    let catalog = decode_catalog(body).unwrap();
    assert!(catalog.get("inner").is_some());
    assert!(catalog.get("outer").is_none());
  }

  #[test]
  fn ignores_unknown_fields() {
    let body = br#"{"a":{"id":"a","category":"spim","sizeBytes":12}}"#;
    let catalog = decode_catalog(body).unwrap();
    assert_eq!(catalog.len(), 1);
  }

  #[test]
  fn empty_optional_fields_normalize_to_none() {
    let body = br#"{"a":{"id":"a","description":"","thumbnailUrl":"","datasetUrl":""}}"#;
    let catalog = decode_catalog(body).unwrap();
    let entry = catalog.get("a").unwrap();
    assert_eq!(entry.description, None);
    assert_eq!(entry.thumbnail_url, None);
    assert_eq!(entry.dataset_url, None);
  }

  #[test]
  fn duplicate_id_keeps_the_first_occurrence() {
    let body = br#"{"k1":{"id":"dup","description":"first"},"k2":{"id":"dup","description":"second"}}"#;
    let catalog = decode_catalog(body).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get("dup").unwrap().description.as_deref(), Some("first"));
  }

  #[test]
  fn malformed_record_aborts_the_whole_decode() {
    // A non-object value mid-document kills the read; no partial catalog.
    let body = br#"{"a":{"id":"a"},"b":42,"c":{"id":"c"}}"#;
    assert!(matches!(decode_catalog(body), Err(CatalogError::Protocol(_))));
  }

  #[test]
  fn non_map_body_is_a_protocol_error() {
    assert!(matches!(decode_catalog(b"[1,2,3]"), Err(CatalogError::Protocol(_))));
    assert!(matches!(decode_catalog(b"not json"), Err(CatalogError::Protocol(_))));
  }

  #[test]
  fn empty_map_is_an_empty_catalog() {
    let catalog = decode_catalog(b"{}").unwrap();
    assert!(catalog.is_empty());
  }

  // --- catalog_url ---

  #[test]
  fn catalog_url_joins_base_and_endpoint() {
    assert_eq!(catalog_url("http://example.org:8080"), "http://example.org:8080/json/");
    assert_eq!(catalog_url("http://example.org:8080/"), "http://example.org:8080/json/");
  }

  // --- fetch_catalog ---

  /// Answer exactly one HTTP request on a loopback socket, then close.
  async fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      if let Ok((mut stream, _)) = listener.accept().await {
        let mut buf = [0u8; 2048];
        let _ = stream.read(&mut buf).await;
        let head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", status_line, body.len());
        let _ = stream.write_all(head.as_bytes()).await;
        let _ = stream.write_all(body).await;
      }
    });
    format!("http://{}", addr)
  }

  #[tokio::test]
  async fn fetches_and_decodes_a_served_catalog() {
    let server = serve_once("200 OK", br#"{"a":{"id":"a","datasetUrl":"http://h/x.xml"},"b":{"id":"b"}}"#).await;
    let catalog = fetch_catalog(&test_client(), &server).await.unwrap();
    assert_eq!(ids(&catalog), ["a", "b"]);
  }

  #[tokio::test]
  async fn error_status_is_a_connection_error() {
    let server = serve_once("500 Internal Server Error", b"").await;
    let err = fetch_catalog(&test_client(), &server).await.unwrap_err();
    assert!(matches!(err, CatalogError::Connection(_)));
  }

  #[tokio::test]
  async fn unreachable_server_is_a_connection_error() {
    // Port 9 (discard) is not listening on loopback.
    let err = fetch_catalog(&test_client(), "http://127.0.0.1:9").await.unwrap_err();
    assert!(matches!(err, CatalogError::Connection(_)));
  }

  #[tokio::test]
  async fn malformed_body_is_a_protocol_error() {
    let server = serve_once("200 OK", b"<html>not a catalog</html>").await;
    let err = fetch_catalog(&test_client(), &server).await.unwrap_err();
    assert!(matches!(err, CatalogError::Protocol(_)));
  }
}
