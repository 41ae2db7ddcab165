use anyhow::{bail, Context, Result};
use rollcall_core::liveness::{LivenessConfig, DEFAULT_CONSEC_FRAMES, DEFAULT_EAR_THRESHOLD};
use rollcall_core::matcher::{DEFAULT_LIBRARY_TOLERANCE, DEFAULT_MATCH_THRESHOLD};
use rollcall_core::onnx::ModelPaths;
use rollcall_core::pipeline::DEFAULT_DOWNSCALE;
use rollcall_core::{
    AttendanceBackend, FlatFileBackend, LivenessPolicy, PipelineConfig, SqliteBackend,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which attendance store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Csv,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "csv" => Ok(Self::Csv),
            other => bail!("unknown backend {other:?} (expected \"sqlite\" or \"csv\")"),
        }
    }
}

/// Runtime configuration: defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Enrollment photos, one `<label>.<ext>` per person.
    pub images_dir: PathBuf,
    pub backend: BackendKind,
    pub db_path: PathBuf,
    pub csv_path: PathBuf,
    /// Local acceptance bound; a match must be strictly closer.
    pub match_threshold: f32,
    /// Tolerance passed to the analyzer's own match predicate.
    pub library_tolerance: f32,
    /// Fraction of capture resolution handed to the analyzer.
    pub downscale: f32,
    pub ear_threshold: f32,
    pub ear_consec_frames: u32,
    /// Require a blink before recording.
    pub liveness: bool,
    /// Frames discarded after the camera opens (AGC/AE settling).
    pub warmup_frames: usize,
    /// Annotated frames are written here as JPEG when set.
    pub preview_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: default_model_dir(),
            images_dir: PathBuf::from("images"),
            backend: BackendKind::Sqlite,
            db_path: PathBuf::from("attendance.db"),
            csv_path: PathBuf::from("attendance/attendance.csv"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            library_tolerance: DEFAULT_LIBRARY_TOLERANCE,
            downscale: DEFAULT_DOWNSCALE,
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            ear_consec_frames: DEFAULT_CONSEC_FRAMES,
            liveness: true,
            warmup_frames: 4,
            preview_path: None,
        }
    }
}

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

impl Config {
    /// Load from `path` (or `ROLLCALL_CONFIG`), then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from));

        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `ROLLCALL_*` variables as resolved by `lookup`.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_CSV_PATH") {
            self.csv_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_PREVIEW_PATH") {
            self.preview_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }

        self.backend = env_parse(&lookup, "ROLLCALL_BACKEND", self.backend);
        self.match_threshold = env_parse(&lookup, "ROLLCALL_MATCH_THRESHOLD", self.match_threshold);
        self.library_tolerance =
            env_parse(&lookup, "ROLLCALL_LIBRARY_TOLERANCE", self.library_tolerance);
        self.downscale = env_parse(&lookup, "ROLLCALL_DOWNSCALE", self.downscale);
        self.ear_threshold = env_parse(&lookup, "ROLLCALL_EAR_THRESHOLD", self.ear_threshold);
        self.ear_consec_frames =
            env_parse(&lookup, "ROLLCALL_EAR_CONSEC_FRAMES", self.ear_consec_frames);
        self.warmup_frames = env_parse(&lookup, "ROLLCALL_WARMUP_FRAMES", self.warmup_frames);

        if let Some(v) = lookup("ROLLCALL_LIVENESS") {
            self.liveness = v != "0";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.downscale > 0.0 && self.downscale <= 1.0) {
            bail!("downscale must be in (0, 1], got {}", self.downscale);
        }
        if !(self.match_threshold > 0.0) {
            bail!("match_threshold must be positive, got {}", self.match_threshold);
        }
        if !(self.library_tolerance > 0.0) {
            bail!(
                "library_tolerance must be positive, got {}",
                self.library_tolerance
            );
        }
        if !(self.ear_threshold > 0.0) {
            bail!("ear_threshold must be positive, got {}", self.ear_threshold);
        }
        if self.ear_consec_frames == 0 {
            bail!("ear_consec_frames must be at least 1");
        }
        Ok(())
    }

    pub fn liveness_policy(&self) -> LivenessPolicy {
        if self.liveness {
            LivenessPolicy::Required
        } else {
            LivenessPolicy::Disabled
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            downscale: self.downscale,
            match_threshold: self.match_threshold,
            library_tolerance: self.library_tolerance,
            liveness: LivenessConfig {
                ear_threshold: self.ear_threshold,
                consec_frames: self.ear_consec_frames,
            },
            policy: self.liveness_policy(),
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    /// Open whichever attendance store is configured.
    pub fn open_backend(&self) -> Result<Box<dyn AttendanceBackend>> {
        Ok(match self.backend {
            BackendKind::Sqlite => Box::new(
                SqliteBackend::open(&self.db_path)
                    .with_context(|| format!("failed to open {}", self.db_path.display()))?,
            ),
            BackendKind::Csv => Box::new(
                FlatFileBackend::open(&self.csv_path)
                    .with_context(|| format!("failed to open {}", self.csv_path.display()))?,
            ),
        })
    }
}

fn env_parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match var(key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
                current
            }
        },
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.downscale, 0.25);
        assert_eq!(config.ear_consec_frames, 3);
        assert!(config.liveness);
        assert!(config.model_dir.ends_with("rollcall/models"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            backend = "csv"
            match_threshold = 0.5
            liveness = false
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Csv);
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.liveness_policy(), LivenessPolicy::Disabled);
        assert_eq!(config.images_dir, PathBuf::from("images"));
        assert_eq!(config.ear_threshold, 0.3);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<Config>("treshold = 0.5").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "camera_device = \"/dev/video4\"\nwarmup_frames = 0\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.warmup_frames, 0);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::from_file(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config {
            match_threshold: 0.5,
            ..Config::default()
        };
        config.apply_env(env(&[
            ("ROLLCALL_MATCH_THRESHOLD", "0.45"),
            ("ROLLCALL_BACKEND", "CSV"),
            ("ROLLCALL_LIVENESS", "0"),
            ("ROLLCALL_EAR_CONSEC_FRAMES", "5"),
            ("ROLLCALL_PREVIEW_PATH", "/tmp/preview.jpg"),
        ]));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.backend, BackendKind::Csv);
        assert!(!config.liveness);
        assert_eq!(config.ear_consec_frames, 5);
        assert_eq!(config.preview_path, Some(PathBuf::from("/tmp/preview.jpg")));
    }

    #[test]
    fn test_bad_env_value_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("ROLLCALL_DOWNSCALE", "quarter"),
            ("ROLLCALL_BACKEND", "postgres"),
        ]));
        assert_eq!(config.downscale, 0.25);
        assert_eq!(config.backend, BackendKind::Sqlite);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let bad = Config {
            downscale: 0.0,
            ..Config::default()
        };
        assert!(bad.validate().is_err());

        let bad = Config {
            ear_consec_frames: 0,
            ..Config::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_mapping() {
        let config = Config {
            downscale: 0.5,
            ear_threshold: 0.25,
            ..Config::default()
        };
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.upscale(), 2.0);
        assert_eq!(pipeline.liveness.ear_threshold, 0.25);
        assert_eq!(pipeline.policy, LivenessPolicy::Required);
    }

    #[test]
    fn test_open_csv_backend_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            backend: BackendKind::Csv,
            csv_path: dir.path().join("attendance").join("attendance.csv"),
            ..Config::default()
        };
        let backend = config.open_backend().unwrap();
        assert!(backend.records().unwrap().is_empty());
        assert!(dir.path().join("attendance").is_dir());
    }
}
