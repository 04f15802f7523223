//! Asset sources and the glTF loader adapter
//!
//! A loader resolves the main document and every resource it references
//! (buffers, images) through an [`AssetSource`]. When the host provides an
//! [`AssetMap`] (files dropped into the page, an archive unpacked in memory),
//! resource URLs are rewritten to map keys first and fall back to the source.

use crate::error::{Result, ViewerError};
use crate::three_d::gltf_loader::{build_content, LoadedContent};
use async_trait::async_trait;
use base64::Engine;
use gltf::Gltf;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;

/// Something that can produce the bytes behind a URL
#[async_trait(?Send)]
pub trait AssetSource {
    /// Fetch the full contents of `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Reads URLs as paths relative to a base directory
#[derive(Debug, Clone)]
pub struct FileSource {
    base_dir: PathBuf,
}

impl FileSource {
    /// Source rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait(?Send)]
impl AssetSource for FileSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.base_dir.join(url);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ViewerError::AssetNotFound(url.to_string()),
            _ => ViewerError::Io(e),
        })
    }
}

/// In-memory files keyed by normalized path
#[derive(Debug, Clone, Default)]
pub struct AssetMap {
    entries: HashMap<String, Vec<u8>>,
}

impl AssetMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry
    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    /// Entry stored under `key`
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait(?Send)]
impl AssetSource for AssetMap {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.get(url)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ViewerError::AssetNotFound(url.to_string()))
    }
}

/// Directory part of `url`, including the trailing slash, or `./`
pub fn url_base(url: &str) -> &str {
    match url.rfind('/') {
        Some(index) => &url[..=index],
        None => "./",
    }
}

/// Where a resource URL ends up after rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUrl {
    /// Inline `data:` URI
    Data(String),
    /// Key of an [`AssetMap`] entry
    Mapped(String),
    /// URL handed to the [`AssetSource`]
    Source(String),
}

/// Loads glTF/GLB documents and everything they reference
pub struct AssetLoader<S: AssetSource> {
    source: S,
    root_path: String,
    asset_map: Option<AssetMap>,
}

impl<S: AssetSource> AssetLoader<S> {
    /// Loader fetching everything from `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            root_path: String::new(),
            asset_map: None,
        }
    }

    /// Prefer entries of `asset_map`, whose keys are prefixed by `root_path`
    pub fn with_asset_map(mut self, root_path: impl Into<String>, asset_map: AssetMap) -> Self {
        self.root_path = root_path.into();
        self.asset_map = Some(asset_map);
        self
    }

    /// The underlying source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Rewrite `url` (already joined with `base`) to where its bytes live
    pub fn resolve(&self, base: &str, url: &str) -> ResolvedUrl {
        if url.starts_with("data:") {
            return ResolvedUrl::Data(url.to_string());
        }
        if let Some(map) = &self.asset_map {
            let relative = url.replacen(base, "", 1);
            let relative = relative
                .strip_prefix("./")
                .or_else(|| relative.strip_prefix('/'))
                .unwrap_or(&relative);
            let key = format!("{}{}", self.root_path, relative);
            if map.contains(&key) {
                return ResolvedUrl::Mapped(key);
            }
        }
        ResolvedUrl::Source(url.to_string())
    }

    async fn fetch_resolved(&self, base: &str, url: &str) -> Result<Vec<u8>> {
        match self.resolve(base, url) {
            ResolvedUrl::Data(uri) => decode_data_uri(&uri),
            ResolvedUrl::Mapped(key) => self
                .asset_map
                .as_ref()
                .and_then(|map| map.get(&key))
                .map(<[u8]>::to_vec)
                .ok_or(ViewerError::AssetNotFound(key)),
            ResolvedUrl::Source(url) => self.source.fetch(&url).await,
        }
    }

    /// Fetch, parse and import the document at `url`
    pub async fn load(&self, url: &str) -> Result<LoadedContent> {
        let base = url_base(url);
        debug!("Loading {} (base {})", url, base);

        let bytes = self.fetch_resolved(base, url).await?;
        let gltf = Gltf::from_slice(&bytes)?;

        let mut buffers = Vec::new();
        for buffer in gltf.buffers() {
            let data = match buffer.source() {
                gltf::buffer::Source::Bin => gltf
                    .blob
                    .clone()
                    .ok_or_else(|| ViewerError::MissingBlob(url.to_string()))?,
                gltf::buffer::Source::Uri(uri) => {
                    self.fetch_resolved(base, &join(base, uri)).await?
                }
            };
            debug!("Buffer {} resolved ({} bytes)", buffer.index(), data.len());
            buffers.push(data);
        }

        let mut images = Vec::new();
        for image in gltf.images() {
            let encoded = match image.source() {
                gltf::image::Source::View { view, .. } => {
                    buffers.get(view.buffer().index()).and_then(|data| {
                        data.get(view.offset()..view.offset() + view.length())
                            .map(<[u8]>::to_vec)
                    })
                }
                gltf::image::Source::Uri { uri, .. } => {
                    match self.fetch_resolved(base, &join(base, uri)).await {
                        Ok(data) => Some(data),
                        Err(e) => {
                            warn!("Image {} unavailable: {}", uri, e);
                            None
                        }
                    }
                }
            };
            let decoded = match encoded.map(|data| image::load_from_memory(&data)) {
                Some(Ok(decoded)) => Some(decoded.to_rgba8()),
                Some(Err(e)) => {
                    warn!("Image {} could not be decoded: {}", image.index(), e);
                    None
                }
                None => None,
            };
            images.push(decoded);
        }

        let content = build_content(&gltf, content_name(url), &buffers, images)?;
        info!(
            "Loaded {}: {} nodes, {} meshes, {} clips",
            url,
            content.scene.nodes.len(),
            content.scene.meshes.len(),
            content.clips.len()
        );
        Ok(content)
    }
}

fn join(base: &str, uri: &str) -> String {
    if uri.starts_with("data:") || uri.contains("://") || uri.starts_with('/') {
        uri.to_string()
    } else if base == "./" {
        uri.to_string()
    } else {
        format!("{}{}", base, uri)
    }
}

fn content_name(url: &str) -> &str {
    let file = url.rsplit('/').next().unwrap_or(url);
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}

/// Decode the payload of a base64 `data:` URI
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| ViewerError::UnsupportedUri(uri.to_string()))?;
    if !header.ends_with(";base64") {
        return Err(ViewerError::UnsupportedUri(header.to_string()));
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_base() {
        assert_eq!(url_base("model/orgal006/scene.gltf"), "model/orgal006/");
        assert_eq!(url_base("scene.gltf"), "./");
    }

    #[test]
    fn test_resolve_prefers_asset_map() {
        let mut map = AssetMap::new();
        map.insert("drop/scene.bin", vec![1, 2, 3]);
        let loader = AssetLoader::new(AssetMap::new()).with_asset_map("drop/", map);

        let base = "model/x/";
        assert_eq!(
            loader.resolve(base, "model/x/scene.bin"),
            ResolvedUrl::Mapped("drop/scene.bin".to_string())
        );
        assert_eq!(
            loader.resolve(base, "model/x/other.bin"),
            ResolvedUrl::Source("model/x/other.bin".to_string())
        );
    }

    #[test]
    fn test_resolve_strips_leading_dot_slash() {
        let mut map = AssetMap::new();
        map.insert("textures/a.png", vec![0]);
        let loader = AssetLoader::new(AssetMap::new()).with_asset_map("", map);
        assert_eq!(
            loader.resolve("./", "./textures/a.png"),
            ResolvedUrl::Mapped("textures/a.png".to_string())
        );
    }

    #[test]
    fn test_data_uri() {
        let bytes = decode_data_uri("data:application/octet-stream;base64,AAEC").unwrap();
        assert_eq!(bytes, vec![0, 1, 2]);
        assert!(matches!(
            decode_data_uri("data:text/plain,hello"),
            Err(ViewerError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn test_content_name() {
        assert_eq!(content_name("model/m1/Elonva Export001.gltf"), "Elonva Export001");
        assert_eq!(content_name("scene"), "scene");
    }

    #[test]
    fn test_file_source_reports_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.bin"), [7u8; 4]).unwrap();
        let source = FileSource::new(dir.path());

        let bytes = pollster::block_on(source.fetch("present.bin")).unwrap();
        assert_eq!(bytes, vec![7; 4]);
        assert!(matches!(
            pollster::block_on(source.fetch("absent.bin")),
            Err(ViewerError::AssetNotFound(_))
        ));
    }
}
