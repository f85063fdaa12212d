use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use config::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Timestamp layout shared by video segments and still images
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Zone {
    Local,
    Named(Tz),
}

/// Derives timestamp-based artifact paths such as `video/2024_05_01-13_45_10.h264`
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    zone: Zone,
}

impl ArtifactNamer {
    /// `"local"` (or an empty string) uses the host timezone, anything else must be an IANA name
    pub fn new(timezone: &str) -> Result<Self, ConfigError> {
        let trimmed = timezone.trim();
        let zone = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            Zone::Local
        } else {
            let tz = trimmed.parse::<Tz>().map_err(|_| {
                ConfigError::Message(format!(
                    "System timezone '{}' is neither \"local\" nor an IANA timezone name",
                    trimmed
                ))
            })?;
            Zone::Named(tz)
        };

        Ok(Self { zone })
    }

    /// Format a timestamp in the configured zone
    pub fn timestamp(&self, at: DateTime<Utc>) -> String {
        match self.zone {
            Zone::Local => at
                .with_timezone(&Local)
                .format(ARTIFACT_TIMESTAMP_FORMAT)
                .to_string(),
            Zone::Named(tz) => at
                .with_timezone(&tz)
                .format(ARTIFACT_TIMESTAMP_FORMAT)
                .to_string(),
        }
    }

    /// Reserve a path `{dir}/{timestamp}.{extension}` that does not exist yet.
    ///
    /// Creates `dir` when missing. A `-N` suffix is appended when an artifact
    /// with the same second already exists.
    pub fn next_path(
        &self,
        dir: &Path,
        extension: &str,
        at: DateTime<Utc>,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let stem = self.timestamp(at);
        let extension = extension.trim_start_matches('.');
        let mut candidate = dir.join(format!("{}.{}", stem, extension));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{}-{}.{}", stem, suffix, extension));
            suffix += 1;
        }

        debug!("Next artifact path: {}", candidate.display());
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let namer = ArtifactNamer::new("UTC").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap();
        assert_eq!(namer.timestamp(at), "2024_05_01-13_45_10");
    }

    #[test]
    fn test_named_timezone() {
        let namer = ArtifactNamer::new("America/New_York").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(namer.timestamp(at), "2024_01_15-07_00_00");
    }

    #[test]
    fn test_local_timezone_aliases() {
        assert_eq!(ArtifactNamer::new("local").unwrap().zone, Zone::Local);
        assert_eq!(ArtifactNamer::new(" Local ").unwrap().zone, Zone::Local);
        assert_eq!(ArtifactNamer::new("").unwrap().zone, Zone::Local);
    }

    #[test]
    fn test_invalid_timezone_is_rejected() {
        let err = ArtifactNamer::new("Not/AZone").unwrap_err();
        assert!(err.to_string().contains("Not/AZone"));
    }

    #[test]
    fn test_next_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let video_dir = dir.path().join("video");
        let namer = ArtifactNamer::new("UTC").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap();

        let first = namer.next_path(&video_dir, "h264", at).unwrap();
        assert_eq!(first, video_dir.join("2024_05_01-13_45_10.h264"));
        std::fs::write(&first, b"").unwrap();

        let second = namer.next_path(&video_dir, ".h264", at).unwrap();
        assert_eq!(second, video_dir.join("2024_05_01-13_45_10-1.h264"));
    }
}
