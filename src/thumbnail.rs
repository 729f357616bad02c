use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::Catalog;
use crate::constants::constants;

/// A resolved preview image for one catalog entry.
#[derive(Debug)]
pub struct ThumbnailUpdate {
  pub entry_id: String,
  pub image: DynamicImage,
}

/// The (entry id, locator) pairs worth resolving, in listing order. Entries
/// without a thumbnail locator short-circuit to "no image" by never producing
/// a job.
pub fn thumbnail_jobs(catalog: &Catalog) -> Vec<(String, String)> {
  catalog.entries().iter().filter_map(|e| e.thumbnail_url.as_ref().map(|url| (e.id.clone(), url.clone()))).collect()
}

/// Decode fetched bytes into a displayable image.
pub fn decode_thumbnail(bytes: &[u8]) -> Result<DynamicImage> {
  image::load_from_memory(bytes).context("Failed to decode thumbnail image")
}

pub async fn fetch_thumbnail(client: &Client, url: &str) -> Result<DynamicImage> {
  let response = client.get(url).send().await.with_context(|| format!("Failed to fetch thumbnail from {}", url))?;
  if !response.status().is_success() {
    return Err(anyhow!("thumbnail endpoint {} returned {}", url, response.status()));
  }
  let bytes = response.bytes().await.with_context(|| format!("Failed to read thumbnail bytes from {}", url))?;
  decode_thumbnail(&bytes)
}

/// Resolve thumbnails for `jobs`, streaming each success through `tx`.
///
/// Runs up to `thumbnail_concurrency` fetches at once. A failed job is logged
/// and absorbed; it neither aborts the sweep nor blocks the other jobs. The
/// listing is never gated on this sweep, and the owning task is aborted when
/// the catalog it serves is discarded, so one sweep per catalog bounds
/// resolution to once per entry per session.
pub async fn resolve_thumbnails(client: Client, jobs: Vec<(String, String)>, tx: mpsc::Sender<ThumbnailUpdate>) {
  use futures::stream::{self, StreamExt};

  stream::iter(jobs)
    .map(|(entry_id, url)| {
      let client = client.clone();
      let tx = tx.clone();
      async move {
        match fetch_thumbnail(&client, &url).await {
          Ok(image) => {
            let _ = tx.send(ThumbnailUpdate { entry_id, image }).await;
          }
          Err(e) => {
            debug!(entry = %entry_id, err = %e, "thumbnail resolution failed");
          }
        }
      }
    })
    .buffer_unordered(constants().thumbnail_concurrency)
    .collect::<()>()
    .await;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::decode_catalog;
  use image::{ImageFormat, RgbImage};
  use std::io::Cursor;
  use std::time::Duration;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  fn png_bytes() -> Vec<u8> {
    let mut buf = Vec::new();
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, image::Rgb([200, 40, 40])));
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
  }

  fn test_client() -> Client {
    Client::builder().timeout(Duration::from_secs(5)).build().unwrap()
  }

  #[test]
  fn jobs_skip_entries_without_a_locator() {
    let body =
      br#"{"a":{"id":"a","thumbnailUrl":"http://h/a.png"},"b":{"id":"b"},"c":{"id":"c","thumbnailUrl":"http://h/c.png"}}"#;
    let catalog = decode_catalog(body).unwrap();
    let jobs = thumbnail_jobs(&catalog);
    assert_eq!(jobs, [("a".to_string(), "http://h/a.png".to_string()), ("c".to_string(), "http://h/c.png".to_string())]);
  }

  #[test]
  fn decodes_png_bytes() {
    let image = decode_thumbnail(&png_bytes()).unwrap();
    assert_eq!((image.width(), image.height()), (4, 3));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    assert!(decode_thumbnail(b"definitely not an image").is_err());
  }

  /// Serve one PNG response on a loopback socket.
  async fn serve_png_once() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      if let Ok((mut stream, _)) = listener.accept().await {
        let mut buf = [0u8; 2048];
        let _ = stream.read(&mut buf).await;
        let png = png_bytes();
        let head = format!(
          "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
          png.len()
        );
        let _ = stream.write_all(head.as_bytes()).await;
        let _ = stream.write_all(&png).await;
      }
    });
    format!("http://{}", addr)
  }

  #[tokio::test]
  async fn one_failing_job_does_not_block_the_others() {
    let good = serve_png_once().await;
    let jobs = vec![
      ("broken".to_string(), "http://127.0.0.1:9/nope.png".to_string()),
      ("ok".to_string(), format!("{}/thumb.png", good)),
    ];
    let (tx, mut rx) = mpsc::channel(4);
    resolve_thumbnails(test_client(), jobs, tx).await;

    let update = rx.recv().await.expect("the healthy job should resolve");
    assert_eq!(update.entry_id, "ok");
    assert!(rx.recv().await.is_none());
  }

  #[tokio::test]
  async fn all_failures_produce_no_updates() {
    let (tx, mut rx) = mpsc::channel(4);
    resolve_thumbnails(test_client(), vec![("a".to_string(), "http://127.0.0.1:9/a.png".to_string())], tx).await;
    assert!(rx.recv().await.is_none());
  }
}
