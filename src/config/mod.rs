use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub alignment: AlignmentConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

/// Every tunable constant used by the alignment engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AlignmentConfig {
    pub marks: MarkDetectionConfig,
    pub rotation: RotationSearchConfig,
    pub matching: MatchingConfig,
    pub features: FeatureMatchConfig,
    pub homography: HomographyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkDetectionConfig {
    pub min_side_ratio: f64,
    pub max_side_ratio: f64,
    /// Upper bound on the share of light pixels inside a mark's bounding box
    pub max_fill_ratio: f64,
    /// Minimum bounding-box area in pixels; 0 accepts marks of any size
    pub min_mark_area: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSearchConfig {
    pub step_degrees: f64,
    pub max_degrees: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategy {
    /// Nearest unused target per source point, in source order
    Greedy,
    /// Minimum total distance assignment over all points
    Optimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest accepted distance between normalized positions
    pub max_distance: f64,
    pub strategy: MatchingStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureMatchConfig {
    pub max_features: i32,
    /// Fraction of the best (lowest distance) matches kept for estimation
    pub match_keep_percent: f64,
    pub scale_factor: f32,
    pub n_levels: i32,
    pub edge_threshold: i32,
    pub patch_size: i32,
    pub fast_threshold: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomographyConfig {
    pub ransac_reproj_threshold: f64,
    /// Homographies whose upper-left 2x2 determinant falls below this are degenerate
    pub min_determinant: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; 0 sizes the pool to the available cores
    pub workers: usize,
    pub write_result_json: bool,
}

impl Default for MarkDetectionConfig {
    fn default() -> Self {
        Self {
            min_side_ratio: 0.9,
            max_side_ratio: 1.1,
            max_fill_ratio: 0.2,
            min_mark_area: 0,
        }
    }
}

impl Default for RotationSearchConfig {
    fn default() -> Self {
        Self {
            step_degrees: 0.5,
            max_degrees: 3.5,
        }
    }
}

impl RotationSearchConfig {
    /// Candidate angles in evaluation order: 0, then positive steps, then negative steps
    pub fn candidate_angles(&self) -> Vec<f64> {
        let mut angles = vec![0.0];
        if self.step_degrees <= 0.0 || self.max_degrees <= 0.0 {
            return angles;
        }

        let steps = (self.max_degrees / self.step_degrees + 1e-9).floor() as usize;
        angles.extend((1..=steps).map(|i| i as f64 * self.step_degrees));
        angles.extend((1..=steps).map(|i| -(i as f64) * self.step_degrees));
        angles
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance: 0.3,
            strategy: MatchingStrategy::Greedy,
        }
    }
}

impl Default for FeatureMatchConfig {
    fn default() -> Self {
        Self {
            max_features: 500,
            match_keep_percent: 0.2,
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

impl Default for HomographyConfig {
    fn default() -> Self {
        Self {
            ransac_reproj_threshold: 3.0,
            min_determinant: 1e-9,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            write_result_json: true,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> anyhow::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.alignment.validate().err().unwrap_or_default();

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl AlignmentConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let marks = &self.marks;
        if marks.min_side_ratio <= 0.0 || marks.min_side_ratio > marks.max_side_ratio {
            errors.push("Mark side ratio bounds must satisfy 0 < min <= max".to_string());
        }

        if !(0.0..=1.0).contains(&marks.max_fill_ratio) {
            errors.push("Mark max_fill_ratio must be within [0, 1]".to_string());
        }

        if self.rotation.step_degrees <= 0.0 {
            errors.push("Rotation step_degrees must be positive".to_string());
        }

        if self.rotation.max_degrees < 0.0 {
            errors.push("Rotation max_degrees must be non-negative".to_string());
        }

        if self.matching.max_distance <= 0.0 {
            errors.push("Matching max_distance must be positive".to_string());
        }

        if self.features.max_features <= 0 {
            errors.push("Feature max_features must be positive".to_string());
        }

        if self.features.match_keep_percent <= 0.0 || self.features.match_keep_percent > 1.0 {
            errors.push("Feature match_keep_percent must be within (0, 1]".to_string());
        }

        if self.features.scale_factor <= 1.0 {
            errors.push("Feature scale_factor must be greater than 1.0".to_string());
        }

        if self.homography.ransac_reproj_threshold <= 0.0 {
            errors.push("Homography ransac_reproj_threshold must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigFormat {
    Json,
    Toml,
}

pub fn load_config_or_default(config_path: Option<&Path>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    tracing::warn!("Configuration validation errors:");
                    for error in errors {
                        tracing::warn!("  - {}", error);
                    }
                    tracing::warn!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load config from '{}': {}", path.display(), e);
                tracing::warn!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_candidate_angles() {
        let angles = RotationSearchConfig::default().candidate_angles();
        assert_eq!(angles.len(), 17);
        assert_eq!(angles[0], 0.0);
        assert_eq!(angles[1], 0.5);
        assert_eq!(angles[7], 3.5);
        assert_eq!(angles[8], -0.5);
        assert_eq!(angles[16], -3.5);
    }

    #[test]
    fn test_zero_range_keeps_only_upright() {
        let config = RotationSearchConfig {
            step_degrees: 0.5,
            max_degrees: 0.0,
        };
        assert_eq!(config.candidate_angles(), vec![0.0]);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = Config::default();
        config.alignment.features.match_keep_percent = 0.0;
        config.alignment.matching.max_distance = -1.0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_toml_roundtrip_and_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.alignment.features.max_features = 1000;
        config.save_to_file(&path, ConfigFormat::Toml).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.alignment.features.max_features, 1000);

        let partial = dir.path().join("partial.toml");
        fs::write(&partial, "[alignment.matching]\nmax_distance = 0.25\n").unwrap();
        let loaded = Config::load_from_file(&partial).unwrap();
        assert_eq!(loaded.alignment.matching.max_distance, 0.25);
        assert_eq!(loaded.alignment.features.max_features, 500);
    }

    #[test]
    fn test_json_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "batch": { "workers": 3 } }"#).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.batch.workers, 3);
        assert!(loaded.batch.write_result_json);
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[alignment.features]\nmax_features = -4\n").unwrap();
        let config = load_config_or_default(Some(&path));
        assert_eq!(config.alignment.features.max_features, 500);
    }
}
