// config.rs — 运行时配置
//
// - 配置来源（优先级从高到低）：
//   A) CLI: --config <file> / --video <path> / --fps <n> / --hud
//   B) Env: PANOVIDEO_CONFIG / PANOVIDEO_VIDEO
//   C) <exe_dir>/assets/viewer.json，然后 ./assets/viewer.json
//   D) 内置默认值
// - JSON 中所有字段都是可选的，缺失字段保持默认值。

use crate::error::ConfigError;
use crate::mesh::MAX_SEGMENTS;
use crate::scene::FilterMode;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "viewer.json";

/// 搜索 assets/ 的目录：exe 同目录优先，然后是工作目录
static ASSET_DIRS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    let mut dirs = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            dirs.push(dir.join("assets"));
        }
    }
    dirs.push(PathBuf::from("assets"));
    dirs
});

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SphereConfig {
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self {
            radius: 500.0,
            width_segments: 64,
            height_segments: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// 垂直视场角（度）
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 95.0,
            near: 0.001,
            far: 700.0,
            position: [100.0, 100.0, 100.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// 初始俯仰偏移（弧度），传给 rotate_up
    pub initial_pitch: f32,
    /// 观察目标相对相机位置的偏移
    pub target_offset: [f32; 3],
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub enable_zoom: bool,
    pub enable_pan: bool,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            initial_pitch: std::f32::consts::FRAC_PI_4,
            target_offset: [0.1, 0.0, 0.0],
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            enable_zoom: false,
            enable_pan: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 单张全景图或者按文件名排序的帧目录
    pub source: Option<PathBuf>,
    pub frame_rate: f32,
    pub looping: bool,
    /// 放大采样方式："linear" 或 "nearest"（缩小采样固定为 linear）
    pub mag_filter: FilterMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            source: None,
            frame_rate: 30.0,
            looping: true,
            mag_filter: FilterMode::Linear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub title: String,
    pub window_size: [u32; 2],
    pub show_hud: bool,
    pub sphere: SphereConfig,
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub playback: PlaybackConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "360° Video Viewer".to_string(),
            window_size: [1280, 720],
            show_hud: false,
            sphere: SphereConfig::default(),
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text, path)
    }

    /// 按 CLI → Env → assets/ → 默认值 的顺序解析配置，最后统一校验。
    pub fn load(args: &[String]) -> Result<Self, ConfigError> {
        let cli = CliArgs::parse(args)?;

        let explicit = cli.config.clone().or_else(|| {
            std::env::var("PANOVIDEO_CONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        });

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match find_config_file() {
                Some(path) => {
                    log::info!("using config {}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };

        if let Ok(v) = std::env::var("PANOVIDEO_VIDEO") {
            if !v.trim().is_empty() {
                config.playback.source = Some(PathBuf::from(v));
            }
        }
        cli.apply(&mut config);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        let sphere = &self.sphere;
        let camera = &self.camera;

        if !(sphere.radius.is_finite() && sphere.radius > 0.0) {
            return Err(invalid("sphere.radius", "must be a positive number"));
        }
        if !(3..=MAX_SEGMENTS).contains(&sphere.width_segments) {
            return Err(invalid(
                "sphere.width_segments",
                format!("must be within 3..={MAX_SEGMENTS}"),
            ));
        }
        if !(2..=MAX_SEGMENTS).contains(&sphere.height_segments) {
            return Err(invalid(
                "sphere.height_segments",
                format!("must be within 2..={MAX_SEGMENTS}"),
            ));
        }
        if !(camera.fov > 0.0 && camera.fov < 180.0) {
            return Err(invalid("camera.fov", "must be inside (0, 180) degrees"));
        }
        if !(camera.near > 0.0) {
            return Err(invalid("camera.near", "must be greater than zero"));
        }
        if camera.near >= camera.far {
            return Err(invalid("camera.far", "must be greater than camera.near"));
        }
        let [x, y, z] = camera.position;
        let distance = (x * x + y * y + z * z).sqrt();
        if distance >= sphere.radius {
            return Err(invalid("camera.position", "must lie inside the sphere"));
        }
        // 球面上离相机最远的点在 radius + |position| 处，far 不够时那一侧会被裁掉
        if camera.far < sphere.radius + distance {
            let needed = sphere.radius + distance;
            return Err(invalid(
                "camera.far",
                format!("must be at least sphere.radius + |camera.position| ({needed})"),
            ));
        }
        if !(self.playback.frame_rate > 0.0) {
            return Err(invalid("playback.frame_rate", "must be greater than zero"));
        }
        if self.window_size[0] == 0 || self.window_size[1] == 0 {
            return Err(invalid("window_size", "must be non-zero"));
        }
        Ok(())
    }
}

fn find_config_file() -> Option<PathBuf> {
    ASSET_DIRS
        .iter()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|p| p.exists())
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    video: Option<PathBuf>,
    fps: Option<f32>,
    hud: bool,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut out = Self::default();
        let mut it = args.iter();
        while let Some(a) = it.next() {
            match a.as_str() {
                "--config" => {
                    let v = it.next().ok_or_else(|| ConfigError::MissingArgument(a.clone()))?;
                    out.config = Some(PathBuf::from(v));
                }
                "--video" => {
                    let v = it.next().ok_or_else(|| ConfigError::MissingArgument(a.clone()))?;
                    out.video = Some(PathBuf::from(v));
                }
                "--fps" => {
                    let v = it.next().ok_or_else(|| ConfigError::MissingArgument(a.clone()))?;
                    let fps = v.parse::<f32>().map_err(|e| ConfigError::Invalid {
                        field: "--fps",
                        reason: e.to_string(),
                    })?;
                    out.fps = Some(fps);
                }
                "--hud" => out.hud = true,
                other => log::warn!("ignoring unknown argument {other:?}"),
            }
        }
        Ok(out)
    }

    fn apply(&self, config: &mut ViewerConfig) {
        if let Some(v) = &self.video {
            config.playback.source = Some(v.clone());
        }
        if let Some(fps) = self.fps {
            config.playback.frame_rate = fps;
        }
        if self.hud {
            config.show_hud = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ViewerConfig::default();
        config.validate().unwrap();
        assert!(config.camera.near < config.camera.far);
        assert!(config.camera.far >= config.sphere.radius);
        assert_eq!(config.playback.mag_filter, FilterMode::Linear);
        assert!(!config.controls.enable_zoom);
        assert!(!config.controls.enable_pan);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let text = r#"{ "camera": { "fov": 80.0 }, "playback": { "frame_rate": 24 } }"#;
        let config = ViewerConfig::from_json_str(text, Path::new("inline")).unwrap();
        assert_eq!(config.camera.fov, 80.0);
        assert_eq!(config.camera.far, 700.0);
        assert_eq!(config.playback.frame_rate, 24.0);
        assert_eq!(config.sphere, SphereConfig::default());
    }

    #[test]
    fn malformed_json_reports_origin() {
        let err = ViewerConfig::from_json_str("{ nope", Path::new("broken.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == Path::new("broken.json")));
    }

    #[test]
    fn far_plane_inside_sphere_is_rejected() {
        let mut config = ViewerConfig::default();
        config.camera.far = 400.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "camera.far", .. }));
    }

    #[test]
    fn far_plane_must_reach_the_far_side_from_off_centre() {
        let mut config = ViewerConfig::default();
        // 相机在 (100,100,100)，|p| ≈ 173，far = 500 够不到球面另一侧
        config.camera.far = 500.0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "camera.far", .. }
        ));

        config.camera.far = 674.0;
        config.validate().unwrap();

        config.camera.position = [0.0, 0.0, 0.0];
        config.camera.far = 500.0;
        config.validate().unwrap();
    }

    #[test]
    fn segment_counts_are_bounded() {
        let mut config = ViewerConfig::default();
        config.sphere.width_segments = 100_000;
        config.sphere.height_segments = 100_000;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "sphere.width_segments", .. }
        ));

        config.sphere.width_segments = MAX_SEGMENTS;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "sphere.height_segments", .. }
        ));

        config.sphere.height_segments = MAX_SEGMENTS;
        config.validate().unwrap();

        config.sphere.height_segments = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn filter_mode_parses_from_json() {
        let text = r#"{ "playback": { "mag_filter": "nearest" } }"#;
        let config = ViewerConfig::from_json_str(text, Path::new("inline")).unwrap();
        assert_eq!(config.playback.mag_filter, FilterMode::Nearest);

        let bad = r#"{ "playback": { "mag_filter": "cubic" } }"#;
        assert!(ViewerConfig::from_json_str(bad, Path::new("inline")).is_err());
    }

    #[test]
    fn near_must_stay_below_far() {
        let mut config = ViewerConfig::default();
        config.camera.near = 800.0;
        assert!(config.validate().is_err());

        config.camera.near = 0.0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "camera.near", .. }
        ));
    }

    #[test]
    fn camera_outside_sphere_is_rejected() {
        let mut config = ViewerConfig::default();
        config.camera.position = [600.0, 0.0, 0.0];
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "camera.position", .. }
        ));
    }

    #[test]
    fn cli_overrides_playback() {
        let cli = CliArgs::parse(&args(&["--video", "frames", "--fps", "12.5", "--hud"])).unwrap();
        let mut config = ViewerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.playback.source, Some(PathBuf::from("frames")));
        assert_eq!(config.playback.frame_rate, 12.5);
        assert!(config.show_hud);
    }

    #[test]
    fn cli_flag_without_value_fails() {
        let err = CliArgs::parse(&args(&["--video"])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingArgument(ref a) if a == "--video"));
    }
}
