// src/assets.rs

use std::fmt;
use std::path::{Path, PathBuf};

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion};
use rapier3d::parry::bounding_volume::Aabb;
use serde::Deserialize;
use tracing::info;

/// World-space triangle mesh baked from the authored track scene.
#[derive(Debug, Clone, Deserialize)]
pub struct MeshCollider {
    pub name: String,
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<[u32; 3]>,
}

/// Axis-aligned box where the catch-up boost is replaced by a nudge.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneBox {
    pub name: String,
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl ZoneBox {
    pub fn aabb(&self) -> Aabb {
        let a = Point3::from(self.min);
        let b = Point3::from(self.max);
        Aabb::new(a.inf(&b), a.sup(&b))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoorAsset {
    pub name: String,
    pub translation: [f32; 3],
    pub half_extents: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotorAsset {
    pub name: String,
    pub translation: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4], // x, y, z, w
    pub half_extents: [f32; 3],
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl RotorAsset {
    pub fn pose(&self) -> Isometry3<f32> {
        let [x, y, z, w] = self.rotation;
        let [tx, ty, tz] = self.translation;
        Isometry3::from_parts(
            Translation3::new(tx, ty, tz),
            UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
        )
    }
}

/// Everything the race needs from the authored scene.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackAssets {
    pub guide: Vec<[f32; 3]>,
    pub colliders: Vec<MeshCollider>,
    pub neutral_zones: Vec<ZoneBox>,
    pub doors: Vec<DoorAsset>,
    pub rotors: Vec<RotorAsset>,
}

#[derive(Debug)]
pub enum AssetError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Geometry(String),
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
            Self::Geometry(message) => write!(f, "invalid track geometry: {message}"),
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Geometry(_) => None,
        }
    }
}

impl TrackAssets {
    pub fn guide_points(&self) -> Vec<Point3<f32>> {
        self.guide.iter().map(|p| Point3::from(*p)).collect()
    }

    /// Mesh sanity only. An unusable guide curve is not a load error, the
    /// session runs without a track instead.
    pub fn validate(&self) -> Result<(), AssetError> {
        for mesh in &self.colliders {
            if mesh.indices.is_empty() {
                return Err(AssetError::Geometry(format!("mesh '{}' has no triangles", mesh.name)));
            }

            let count = mesh.vertices.len();
            if let Some(bad) = mesh.indices.iter().flatten().find(|&&i| i as usize >= count) {
                return Err(AssetError::Geometry(format!(
                    "mesh '{}' references vertex {bad} of {count}",
                    mesh.name
                )));
            }

            if mesh.vertices.iter().flatten().any(|c| !c.is_finite()) {
                return Err(AssetError::Geometry(format!(
                    "mesh '{}' has a non-finite vertex",
                    mesh.name
                )));
            }
        }

        for zone in &self.neutral_zones {
            if zone.min.iter().chain(zone.max.iter()).any(|c| !c.is_finite()) {
                return Err(AssetError::Geometry(format!(
                    "zone '{}' has a non-finite bound",
                    zone.name
                )));
            }
        }

        Ok(())
    }

    pub fn from_json(path: &Path, text: &str) -> Result<Self, AssetError> {
        let assets: Self = serde_json::from_str(text).map_err(|source| AssetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        assets.validate()?;
        Ok(assets)
    }
}

/// Load phase: must complete before the first tick.
pub async fn load_track_assets(path: impl AsRef<Path>) -> Result<TrackAssets, AssetError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let assets = TrackAssets::from_json(path, &text)?;
    info!(
        "Loaded {}: {} guide points, {} meshes, {} neutral zones, {} doors, {} rotors",
        path.display(),
        assets.guide.len(),
        assets.colliders.len(),
        assets.neutral_zones.len(),
        assets.doors.len(),
        assets.rotors.len()
    );
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"{
        "guide": [[0, 0, 0], [0, 0, 5], [0, 0, 10]],
        "colliders": [{
            "name": "ramp",
            "vertices": [[-1, 0, 0], [1, 0, 0], [1, 0, 10], [-1, 0, 10]],
            "indices": [[0, 2, 1], [0, 3, 2]]
        }],
        "neutral_zones": [{ "name": "Cube031", "min": [1, 1, 1], "max": [-1, -1, -1] }],
        "rotors": [{ "name": "rotor", "translation": [0, 1, 0], "half_extents": [1, 0.1, 0.1] }]
    }"#;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("track-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn loads_track_file() {
        let path = temp_path();
        tokio::fs::write(&path, TRACK).await.unwrap();

        let assets = load_track_assets(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(assets.guide_points().len(), 3);
        assert_eq!(assets.colliders[0].indices.len(), 2);
        assert!(assets.doors.is_empty());
        assert_eq!(assets.rotors[0].rotation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = load_track_assets(temp_path()).await.unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = TrackAssets::from_json(Path::new("bad.json"), "{ guide: ").unwrap_err();
        assert!(matches!(err, AssetError::Parse { .. }));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let text = r#"{ "colliders": [{
            "name": "m",
            "vertices": [[0,0,0],[1,0,0],[0,0,1]],
            "indices": [[0,1,3]]
        }] }"#;
        let err = TrackAssets::from_json(Path::new("m.json"), text).unwrap_err();
        assert!(matches!(err, AssetError::Geometry(_)));
    }

    #[test]
    fn mesh_without_triangles_is_rejected() {
        let text = r#"{ "colliders": [{ "name": "m", "vertices": [[0,0,0]], "indices": [] }] }"#;
        assert!(TrackAssets::from_json(Path::new("m.json"), text).is_err());
    }

    #[test]
    fn shipped_track_is_valid() {
        let raw = include_str!("../assets/track.json");
        let assets = TrackAssets::from_json(Path::new("assets/track.json"), raw).unwrap();
        assert!(assets.guide.len() >= 2);
        let zones: Vec<&str> = assets.neutral_zones.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(zones, ["Cube031", "Cube033"]);
    }

    #[test]
    fn empty_guide_still_loads() {
        let assets = TrackAssets::from_json(Path::new("empty.json"), "{}").unwrap();
        assert!(assets.guide_points().is_empty());
    }

    #[test]
    fn zone_bounds_are_normalized() {
        let assets = TrackAssets::from_json(Path::new("t.json"), TRACK).unwrap();
        let aabb = assets.neutral_zones[0].aabb();
        assert!(aabb.contains_local_point(&Point3::origin()));
        assert!(!aabb.contains_local_point(&Point3::new(0.0, 2.0, 0.0)));
    }
}
