//! Environment maps
//!
//! The catalog names the cube maps a viewer can light its content with.
//! Fetching one yields an [`EnvironmentMap`]: six decoded faces plus a chain
//! of progressively blurred levels that rough materials sample from.

use crate::assets::AssetSource;
use crate::error::{Result, ViewerError};
use image::imageops::{self, FilterType};
use image::Rgba32FImage;
use log::{debug, info};

/// How the six face files of a cube map are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceLayout {
    /// `<path>posx<format>`, `<path>negx<format>`, ...
    PosNeg,
    /// `<path>_px<format>`, `<path>_nx<format>`, ...
    Suffix,
}

impl FaceLayout {
    fn tags(&self) -> [&'static str; 6] {
        match self {
            FaceLayout::PosNeg => ["posx", "negx", "posy", "negy", "posz", "negz"],
            FaceLayout::Suffix => ["_px", "_nx", "_py", "_ny", "_pz", "_nz"],
        }
    }
}

/// A catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Stable identifier
    pub id: &'static str,
    /// Display name, used as the key in viewer state
    pub name: &'static str,
    /// Face path prefix; `None` means no environment
    pub path: Option<&'static str>,
    /// Face file extension
    pub format: &'static str,
    /// Face naming scheme
    pub layout: FaceLayout,
}

/// Environments known to the viewers
pub static ENVIRONMENTS: [Environment; 5] = [
    Environment {
        id: "",
        name: "None",
        path: None,
        format: ".jpg",
        layout: FaceLayout::PosNeg,
    },
    Environment {
        id: "bridge",
        name: "Bridge",
        path: Some("assets/environment/bridge/"),
        format: ".jpg",
        layout: FaceLayout::PosNeg,
    },
    Environment {
        id: "park",
        name: "Park",
        path: Some("assets/environment/park/"),
        format: ".jpg",
        layout: FaceLayout::PosNeg,
    },
    Environment {
        id: "footprint-court",
        name: "Footprint Court (HDR)",
        path: Some("assets/environment/footprint_court/"),
        format: ".hdr",
        layout: FaceLayout::PosNeg,
    },
    Environment {
        id: "studio13",
        name: "Studio 13",
        path: Some("assets/environment/studio13/studio13"),
        format: ".jpg",
        layout: FaceLayout::Suffix,
    },
];

/// Catalog entry called `name`
pub fn find_environment(name: &str) -> Result<&'static Environment> {
    ENVIRONMENTS
        .iter()
        .find(|e| e.name == name || (!e.id.is_empty() && e.id == name))
        .ok_or_else(|| ViewerError::UnknownEnvironment(name.to_string()))
}

impl Environment {
    /// URLs of the six faces in +X, -X, +Y, -Y, +Z, -Z order
    pub fn face_urls(&self) -> Option<[String; 6]> {
        let path = self.path?;
        Some(self.layout.tags().map(|tag| format!("{}{}{}", path, tag, self.format)))
    }

    /// Whether the faces carry high dynamic range texels
    pub fn is_hdr(&self) -> bool {
        self.format == ".hdr"
    }
}

/// A decoded cube map with its prefiltered levels
#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    /// Catalog name
    pub name: String,
    /// Edge length of level 0
    pub face_size: u32,
    /// `levels[l][f]` is face `f` at level `l`, each level half the size of the previous
    pub levels: Vec<Vec<Rgba32FImage>>,
}

impl EnvironmentMap {
    /// Build a map from six decoded faces, squaring them to the smallest edge
    pub fn from_faces(name: &str, faces: Vec<image::DynamicImage>) -> Result<Self> {
        if faces.len() != 6 {
            return Err(ViewerError::UnsupportedUri(format!(
                "{}: expected 6 cube faces, got {}",
                name,
                faces.len()
            )));
        }
        let face_size = faces
            .iter()
            .map(|f| f.width().min(f.height()))
            .min()
            .unwrap_or(1)
            .max(1);

        let base: Vec<Rgba32FImage> = faces
            .into_iter()
            .map(|face| {
                let texels = face.to_rgba32f();
                if texels.width() == face_size && texels.height() == face_size {
                    texels
                } else {
                    imageops::resize(&texels, face_size, face_size, FilterType::Triangle)
                }
            })
            .collect();

        let mut levels = vec![base];
        let mut size = face_size;
        while size > 1 {
            size /= 2;
            let Some(previous) = levels.last() else {
                break;
            };
            let next = previous
                .iter()
                .map(|face| imageops::resize(face, size, size, FilterType::Triangle))
                .collect();
            levels.push(next);
        }

        Ok(Self {
            name: name.to_string(),
            face_size,
            levels,
        })
    }

    /// Number of prefiltered levels, level 0 included
    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }
}

/// One pending environment fetch
///
/// The generation is stamped by the viewer when the request is made; a
/// result is only applied if no newer request was made in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentRequest {
    /// Request counter value at creation
    pub generation: u64,
    /// What to fetch
    pub environment: &'static Environment,
}

impl EnvironmentRequest {
    /// Fetch and decode the faces; `Ok(None)` for the empty environment
    pub async fn fetch<S: AssetSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Option<EnvironmentMap>> {
        let Some(urls) = self.environment.face_urls() else {
            return Ok(None);
        };
        let mut faces = Vec::with_capacity(6);
        for url in &urls {
            let bytes = source.fetch(url).await?;
            debug!("Environment face {} ({} bytes)", url, bytes.len());
            faces.push(image::load_from_memory(&bytes)?);
        }
        let map = EnvironmentMap::from_faces(self.environment.name, faces)?;
        info!(
            "Environment {} ready: {}px, {} levels",
            map.name,
            map.face_size,
            map.mip_count()
        );
        Ok(Some(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetMap;
    use image::{DynamicImage, RgbaImage};
    use std::io::Cursor;

    fn png_face(size: u32, value: u8) -> Vec<u8> {
        let pixel = image::Rgba([value, value, value, 255]);
        let face = DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, pixel));
        let mut bytes = Cursor::new(Vec::new());
        face.write_to(&mut bytes, image::ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_face_urls() {
        let bridge = find_environment("Bridge").unwrap();
        let urls = bridge.face_urls().unwrap();
        assert_eq!(urls[0], "assets/environment/bridge/posx.jpg");
        assert_eq!(urls[5], "assets/environment/bridge/negz.jpg");

        let studio = find_environment("studio13").unwrap();
        assert_eq!(studio.face_urls().unwrap()[1], "assets/environment/studio13/studio13_nx.jpg");

        assert!(find_environment("None").unwrap().face_urls().is_none());
        assert!(find_environment("Footprint Court (HDR)").unwrap().is_hdr());
    }

    #[test]
    fn test_unknown_environment() {
        assert!(matches!(
            find_environment("Moon"),
            Err(ViewerError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_fetch_builds_mip_chain() {
        let mut map = AssetMap::new();
        for (i, url) in ENVIRONMENTS[2].face_urls().unwrap().iter().enumerate() {
            map.insert(url.clone(), png_face(8, i as u8 * 40));
        }
        let request = EnvironmentRequest {
            generation: 1,
            environment: &ENVIRONMENTS[2],
        };

        let env = pollster::block_on(request.fetch(&map)).unwrap().unwrap();
        assert_eq!(env.face_size, 8);
        assert_eq!(env.mip_count(), 4);
        assert_eq!(env.levels[3][0].dimensions(), (1, 1));
        assert_eq!(env.levels[0].len(), 6);
    }

    #[test]
    fn test_fetch_missing_face_fails() {
        let request = EnvironmentRequest {
            generation: 1,
            environment: &ENVIRONMENTS[1],
        };
        assert!(matches!(
            pollster::block_on(request.fetch(&AssetMap::new())),
            Err(ViewerError::AssetNotFound(_))
        ));
    }
}
