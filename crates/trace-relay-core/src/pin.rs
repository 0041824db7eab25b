//! Interfaces of the artifact picker and pinning collaborators.
//!
//! No platform implementation lives here; hosts provide one.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Three-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Parse `"x, y, z"`. Unparsable components become `fallback`; a
    /// component count other than three yields `None`.
    #[must_use]
    pub fn parse(input: &str, fallback: f32) -> Option<Self> {
        let parts: Vec<f32> = input
            .split(',')
            .map(|s| s.trim().parse().unwrap_or(fallback))
            .collect();
        match parts[..] {
            [x, y, z] => Some(Self { x, y, z }),
            _ => None,
        }
    }
}

/// Axis-aligned bounding box of a pinned model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            center: Vec3::splat(0.0),
            extents: Vec3::splat(1.0),
        }
    }
}

impl BoundingBox {
    /// Build from user-entered center and extents strings.
    #[must_use]
    pub fn parse(center: &str, extents: &str) -> Self {
        let default = Self::default();
        Self {
            center: Vec3::parse(center, 0.0).unwrap_or(default.center),
            extents: Vec3::parse(extents, 1.0).unwrap_or(default.extents),
        }
    }
}

/// Identifier of a pinned tile: a UUID without braces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId(String);

impl TileId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request to pin a 3D artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRequest {
    pub display_name: String,
    pub file_path: PathBuf,
    pub bounding_box: Option<BoundingBox>,
    /// Pin without making the artifact activatable.
    pub activation_suppressed: bool,
}

impl PinRequest {
    /// Request named after the file, with no bounding box and activation suppressed.
    #[must_use]
    pub fn for_file(file_path: PathBuf) -> Self {
        let display_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            display_name,
            file_path,
            bounding_box: None,
            activation_suppressed: true,
        }
    }

    #[must_use]
    pub const fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    #[must_use]
    pub const fn with_activation(mut self, suppressed: bool) -> Self {
        self.activation_suppressed = suppressed;
        self
    }
}

/// Pinning error.
#[derive(Debug, Error)]
pub enum PinError {
    #[error("Pinning is not available on this display")]
    Unsupported,
    #[error("Could not copy artifact: {0}")]
    Copy(#[from] std::io::Error),
    #[error("Failed to create: {0}")]
    Failed(String),
}

/// File picker returning the path of a chosen artifact.
#[async_trait]
pub trait ArtifactPicker: Send + Sync {
    /// `None` when the user cancels.
    async fn pick(&self) -> Option<PathBuf>;
}

/// Platform pinning API.
#[async_trait]
pub trait ArtifactPinner: Send + Sync {
    /// Pin an artifact. `Ok(false)` means the user declined.
    async fn pin(&self, tile: &TileId, request: &PinRequest) -> Result<bool, PinError>;
}
