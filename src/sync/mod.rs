//! One-way mirror of blob containers into local index directories
//!
//! A mounted directory wins; otherwise a container SAS URL is mirrored into
//! the cache root; otherwise the default local directory is used.

use futures_util::StreamExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Url;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::cli::config::Config;
use crate::errors::{LexiError, Result};

/// Where an index directory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSource {
    Mounted,
    Mirrored,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexLocation {
    pub path: PathBuf,
    pub source: IndexSource,
}

/// One page of a container listing
#[derive(Debug, Default, PartialEq)]
pub struct BlobPage {
    pub names: Vec<String>,
    pub next_marker: Option<String>,
}

/// Parse a List Blobs response body
pub fn parse_blob_listing(xml: &str) -> Result<BlobPage> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = BlobPage::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| LexiError::SyncError(format!("Bad listing text: {}", e)))?;
                let n = path.len();
                match path.last().map(String::as_str) {
                    Some("Name") if n >= 2 && path[n - 2] == "Blob" => {
                        page.names.push(text.into_owned());
                    }
                    Some("NextMarker") if !text.is_empty() => {
                        page.next_marker = Some(text.into_owned());
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(LexiError::SyncError(format!(
                    "Malformed listing at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(page)
}

/// Local target for blob `name`; names that would leave `dir` are rejected
pub fn blob_target(dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let safe = !name.is_empty()
        && !name.starts_with('\\')
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

    if !safe {
        return Err(LexiError::SyncError(format!("Refusing blob name outside target: {}", name)));
    }
    Ok(dir.join(relative))
}

/// Whether `dir` exists and has at least one entry
pub fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Create `dir` if needed and prove it is writable
pub fn ensure_writable(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".lexi_write_test");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)?;
    Ok(())
}

/// Default cache root for mirrored indexes
pub fn default_cache_root() -> PathBuf {
    std::env::temp_dir().join("lexi_chroma_cache")
}

/// Mirrors containers addressed by SAS URLs
#[derive(Debug, Clone)]
pub struct BlobMirror {
    client: reqwest::Client,
    cache_root: PathBuf,
    force: bool,
    overwrite: bool,
}

impl BlobMirror {
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_root,
            force: false,
            overwrite: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let cache_root = config
            .sync
            .cache_root
            .as_deref()
            .map(Config::expand_path)
            .unwrap_or_else(default_cache_root);
        Self::new(cache_root)
            .with_force(config.sync.force)
            .with_overwrite(config.sync.overwrite)
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Pick the directory for one index, mirroring it first when needed
    pub async fn choose_index_dir(
        &self,
        mounted: Option<&str>,
        sas_url: Option<&str>,
        subdir: &str,
        default_dir: &Path,
    ) -> Result<IndexLocation> {
        if let Some(mounted) = mounted.filter(|m| !m.trim().is_empty()) {
            let path = Config::expand_path(mounted);
            if path.is_dir() {
                tracing::info!(index = subdir, path = %path.display(), "using mounted index directory");
                return Ok(IndexLocation {
                    path,
                    source: IndexSource::Mounted,
                });
            }
        }

        if let Some(sas_url) = sas_url.filter(|s| !s.trim().is_empty()) {
            let local = self.cache_root.join(subdir);
            if self.force || !has_entries(&local) {
                tracing::info!(index = subdir, path = %local.display(), "mirroring index container");
                let written = self.sync_container_to_dir(sas_url, &local, self.overwrite).await?;
                tracing::info!(index = subdir, files = written, "mirror complete");
            } else {
                tracing::info!(index = subdir, path = %local.display(), "using existing mirror");
            }
            return Ok(IndexLocation {
                path: local,
                source: IndexSource::Mirrored,
            });
        }

        tracing::info!(index = subdir, path = %default_dir.display(), "using local index directory");
        Ok(IndexLocation {
            path: default_dir.to_path_buf(),
            source: IndexSource::Local,
        })
    }

    /// Resolve the laws and procedures directories from configuration
    pub async fn resolve_index_dirs(&self, config: &Config) -> Result<(IndexLocation, IndexLocation)> {
        let sync = &config.sync;
        let laws = self
            .choose_index_dir(
                sync.laws_mount.as_deref(),
                sync.laws_sas_url.as_deref(),
                "laws",
                &config.laws_dir(),
            )
            .await?;
        let procedures = self
            .choose_index_dir(
                sync.procedures_mount.as_deref(),
                sync.procedures_sas_url.as_deref(),
                "procedures",
                &config.procedures_dir(),
            )
            .await?;
        Ok((laws, procedures))
    }

    /// Download every blob of the container into `dir`; returns files written
    pub async fn sync_container_to_dir(&self, sas_url: &str, dir: &Path, overwrite: bool) -> Result<usize> {
        let container = Url::parse(sas_url)
            .map_err(|e| LexiError::SyncError(format!("Invalid SAS URL: {}", e)))?;
        tokio::fs::create_dir_all(dir).await?;

        let mut written = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self.list_page(&container, marker.as_deref()).await?;
            for name in &page.names {
                let target = blob_target(dir, name)?;
                if target.exists() && !overwrite {
                    tracing::debug!(blob = %name, "already present");
                    continue;
                }
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                self.download(&container, name, &target).await?;
                written += 1;
            }

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(written)
    }

    async fn list_page(&self, container: &Url, marker: Option<&str>) -> Result<BlobPage> {
        let mut url = container.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container").append_pair("comp", "list");
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LexiError::SyncError(format!("List blobs failed: HTTP {}", status)));
        }
        parse_blob_listing(&body)
    }

    async fn download(&self, container: &Url, name: &str, target: &Path) -> Result<()> {
        let url = blob_url(container, name)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LexiError::SyncError(format!(
                "Download of {} failed: HTTP {}",
                name,
                response.status()
            )));
        }

        let partial = partial_path(target);
        match write_body(response, &partial).await {
            Ok(()) => {
                tokio::fs::rename(&partial, target).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::debug!(path = %partial.display(), error = %cleanup, "partial blob not removed");
                }
                tracing::warn!(blob = %name, error = %e, "download failed");
                Err(e)
            }
        }
    }
}

/// Sibling path a blob streams into before it replaces `target`
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Container URL with the blob name appended to the path, SAS query kept
pub fn blob_url(container: &Url, name: &str) -> Result<Url> {
    let mut url = container.clone();
    url.path_segments_mut()
        .map_err(|_| LexiError::SyncError("SAS URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(name.split('/'));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="laws">
  <Blobs>
    <Blob><Name>chroma.sqlite3</Name><Properties><Content-Length>10</Content-Length></Properties></Blob>
    <Blob><Name>a1b2/data_level0.bin</Name></Blob>
  </Blobs>
  <NextMarker>2!72!MDAwMDEx</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_listing() {
        let page = parse_blob_listing(LISTING).unwrap();
        assert_eq!(page.names, vec!["chroma.sqlite3", "a1b2/data_level0.bin"]);
        assert_eq!(page.next_marker.as_deref(), Some("2!72!MDAwMDEx"));
    }

    #[test]
    fn test_parse_last_page() {
        let xml = "<EnumerationResults><Blobs/><NextMarker/></EnumerationResults>";
        assert_eq!(parse_blob_listing(xml).unwrap(), BlobPage::default());
    }

    #[test]
    fn test_blob_target_rejects_escapes() {
        let dir = Path::new("/data/laws");
        assert_eq!(
            blob_target(dir, "a1b2/header.bin").unwrap(),
            PathBuf::from("/data/laws/a1b2/header.bin")
        );
        assert!(blob_target(dir, "../etc/passwd").is_err());
        assert!(blob_target(dir, "/etc/passwd").is_err());
        assert!(blob_target(dir, "a/../../x").is_err());
        assert!(blob_target(dir, "").is_err());
    }

    #[test]
    fn test_blob_url_keeps_sas() {
        let container = Url::parse("https://acct.blob.core.windows.net/laws?sv=2022&sig=abc").unwrap();
        let url = blob_url(&container, "a1b2/data level0.bin").unwrap();
        assert_eq!(url.path(), "/laws/a1b2/data%20level0.bin");
        assert_eq!(url.query(), Some("sv=2022&sig=abc"));
    }

    #[tokio::test]
    async fn test_choose_prefers_mount_then_default() {
        let mount = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let mirror = BlobMirror::new(cache.path().to_path_buf());
        let default = Path::new("laws_db_chroma");

        let chosen = mirror
            .choose_index_dir(mount.path().to_str(), Some("https://unused"), "laws", default)
            .await
            .unwrap();
        assert_eq!(chosen.source, IndexSource::Mounted);

        let chosen = mirror
            .choose_index_dir(Some("/does/not/exist"), None, "laws", default)
            .await
            .unwrap();
        assert_eq!(chosen.source, IndexSource::Local);
        assert_eq!(chosen.path, default);
    }

    #[tokio::test]
    async fn test_existing_mirror_not_resynced() {
        let cache = tempfile::tempdir().unwrap();
        let local = cache.path().join("procedures");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("chroma.sqlite3"), b"x").unwrap();

        // Unreachable URL: a sync attempt would fail
        let mirror = BlobMirror::new(cache.path().to_path_buf());
        let chosen = mirror
            .choose_index_dir(None, Some("http://127.0.0.1:9/c?sig=x"), "procedures", Path::new("d"))
            .await
            .unwrap();
        assert_eq!(chosen.source, IndexSource::Mirrored);
        assert_eq!(chosen.path, local);
    }

    #[test]
    fn test_partial_path_is_sibling() {
        assert_eq!(
            partial_path(Path::new("/data/laws/chroma.sqlite3")),
            PathBuf::from("/data/laws/chroma.sqlite3.part")
        );
    }

    /// Serves a two-page container listing; `truncated` blobs promise more
    /// bytes than they send
    fn serve_container(blobs: Vec<(&'static str, &'static [u8])>, truncated: &'static str) -> String {
        use std::io::{BufRead, BufReader, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }

                let target = request_line.split_whitespace().nth(1).unwrap_or("/");
                let (path, query) = target.split_once('?').unwrap_or((target, ""));
                let split = blobs.len() / 2 + 1;
                let (status, body, length): (&str, Vec<u8>, usize) = if query.contains("comp=list") {
                    let (page, next) = if query.contains("marker=page2") {
                        (&blobs[split..], "")
                    } else {
                        (&blobs[..split], "page2")
                    };
                    let names: String = page
                        .iter()
                        .map(|(name, _)| format!("<Blob><Name>{}</Name></Blob>", name))
                        .collect();
                    let xml = format!(
                        "<EnumerationResults><Blobs>{}</Blobs><NextMarker>{}</NextMarker></EnumerationResults>",
                        names, next
                    );
                    let len = xml.len();
                    ("200 OK", xml.into_bytes(), len)
                } else {
                    let name = path.trim_start_matches("/laws/");
                    match blobs.iter().find(|(n, _)| *n == name) {
                        Some((n, data)) if *n == truncated => ("200 OK", data.to_vec(), data.len() * 100),
                        Some((_, data)) => ("200 OK", data.to_vec(), data.len()),
                        None => ("404 Not Found", Vec::new(), 0),
                    }
                };

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status, length
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{}/laws?sv=2022&sig=test", addr)
    }

    const BLOBS: [(&str, &[u8]); 3] = [
        ("chroma.sqlite3", b"sqlite"),
        ("a1b2/header.bin", b"header"),
        ("a1b2/data_level0.bin", b"vectors"),
    ];

    #[tokio::test]
    async fn test_sync_follows_markers_and_respects_overwrite() {
        let url = serve_container(BLOBS.to_vec(), "");
        let dir = tempfile::tempdir().unwrap();
        let mirror = BlobMirror::new(dir.path().to_path_buf());
        let local = dir.path().join("laws");

        let written = mirror.sync_container_to_dir(&url, &local, false).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(std::fs::read(local.join("chroma.sqlite3")).unwrap(), b"sqlite");
        assert_eq!(std::fs::read(local.join("a1b2/data_level0.bin")).unwrap(), b"vectors");
        assert!(!local.join("chroma.sqlite3.part").exists());

        std::fs::write(local.join("chroma.sqlite3"), b"stale").unwrap();
        let written = mirror.sync_container_to_dir(&url, &local, false).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(std::fs::read(local.join("chroma.sqlite3")).unwrap(), b"stale");

        let written = mirror.sync_container_to_dir(&url, &local, true).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(std::fs::read(local.join("chroma.sqlite3")).unwrap(), b"sqlite");
    }

    #[tokio::test]
    async fn test_truncated_download_leaves_nothing_behind() {
        let url = serve_container(BLOBS.to_vec(), "chroma.sqlite3");
        let cache = tempfile::tempdir().unwrap();
        let mirror = BlobMirror::new(cache.path().to_path_buf());
        let local = cache.path().join("laws");

        let first = mirror.choose_index_dir(None, Some(&url), "laws", Path::new("d")).await;
        assert!(first.is_err());
        assert!(!local.join("chroma.sqlite3").exists());
        assert!(!local.join("chroma.sqlite3.part").exists());
        assert!(!has_entries(&local));

        // Nothing usable was kept, so the next run mirrors again instead of
        // reporting a complete index
        let second = mirror.choose_index_dir(None, Some(&url), "laws", Path::new("d")).await;
        assert!(second.is_err());
    }

    #[test]
    fn test_ensure_writable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(!has_entries(&nested));
    }
}
