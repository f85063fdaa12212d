use crate::error::{MotioncamError, Result};
use crate::recorder::StopReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// JSON sidecar describing a closed recording segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub segment: PathBuf,
    pub episode: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reason: StopReason,
    pub motion_frames: u32,
    pub peak_magnitude: f64,
}

impl SegmentMetadata {
    /// Sidecar location: the segment path with `.json` appended
    pub fn sidecar_path(segment: &Path) -> PathBuf {
        let mut name = segment.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    pub(crate) fn save(&self) -> Result<PathBuf> {
        let metadata_json = serde_json::to_string_pretty(self).map_err(|e| {
            MotioncamError::component(
                "recorder",
                &format!("Failed to serialize segment metadata: {}", e),
            )
        })?;

        let path = Self::sidecar_path(&self.segment);
        std::fs::write(&path, metadata_json).map_err(|e| {
            MotioncamError::component(
                "recorder",
                &format!("Failed to write metadata file {}: {}", path.display(), e),
            )
        })?;

        debug!("Saved segment metadata to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_appends_json() {
        assert_eq!(
            SegmentMetadata::sidecar_path(Path::new("video/2024_05_01-13_45_10.h264")),
            PathBuf::from("video/2024_05_01-13_45_10.h264.json")
        );
    }

    #[test]
    fn test_save_writes_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = SegmentMetadata {
            segment: dir.path().join("clip.h264"),
            episode: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            reason: StopReason::Rollover,
            motion_frames: 42,
            peak_magnitude: 3.5,
        };

        let path = metadata.save().unwrap();
        let parsed: SegmentMetadata =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, metadata);
        assert!(serde_json::to_string(&parsed).unwrap().contains("\"rollover\""));
    }
}
