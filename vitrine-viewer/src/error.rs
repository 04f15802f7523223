//! Error types for loading and viewing

/// Errors raised while loading assets or driving a viewer
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// The asset source has no entry for the requested URL
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// Filesystem failure while reading an asset
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The glTF document could not be parsed or validated
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// A texture or environment face could not be decoded
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// A `data:` URI carried an invalid base64 payload
    #[error("Invalid data URI: {0}")]
    DataUri(#[from] base64::DecodeError),

    /// A resource URI that no source can resolve
    #[error("Unsupported resource URI: {0}")]
    UnsupportedUri(String),

    /// Binary chunk referenced but absent from the asset
    #[error("Missing binary blob in {0}")]
    MissingBlob(String),

    /// Mesh primitive without vertex positions
    #[error("Mesh primitive missing positions: {0}")]
    MissingPositions(String),

    /// Camera name that the loaded content does not contain
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    /// Model title that no loaded entry carries
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Environment name missing from the catalog
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Skinned mesh whose skin has no joints to draw
    #[error("Skinned mesh without joints: {0}")]
    MissingSkeleton(String),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// The render backend rejected an upload or draw
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ViewerError>;
