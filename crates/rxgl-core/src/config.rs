//! Renderer configuration (JSON).

use std::path::Path;

use serde::Deserialize;

use crate::EngineError;

/// Draw topology for a program's draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    LineLoop,
    Points,
}

/// Renderer-wide settings.
///
/// Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Clear color applied at the start of every render pass. `None` leaves the surface alone.
    pub clear_color: Option<[f32; 4]>,
    /// Upper bound on texture units, applied on top of the queried hardware limit.
    pub max_texture_units: Option<u32>,
    /// How many back-to-back passes one tick may run when cells change mid-render.
    pub max_render_passes: u32,
    /// Topology used by programs that do not pick one.
    pub default_mode: DrawMode,
    /// `tracing` filter directive (e.g. `"rxgl_runtime_glow=debug"`).
    pub log_filter: Option<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: None,
            max_texture_units: None,
            max_render_passes: 8,
            default_mode: DrawMode::Triangles,
            log_filter: None,
        }
    }
}

impl RendererConfig {
    fn validate(&self, path: &Path) -> Result<(), EngineError> {
        if self.max_render_passes == 0 {
            return Err(EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg: "max_render_passes must be at least 1".into(),
            });
        }
        if self.max_texture_units == Some(0) {
            return Err(EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg: "max_texture_units must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Load and validate a [`RendererConfig`] from a JSON file.
pub fn load_renderer_config(path: impl AsRef<Path>) -> Result<RendererConfig, EngineError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_renderer_config(path, &bytes)
}

/// Parse a [`RendererConfig`] from JSON bytes; `path` is only used for error reporting.
pub fn parse_renderer_config(path: &Path, bytes: &[u8]) -> Result<RendererConfig, EngineError> {
    let cfg: RendererConfig = serde_json::from_slice(bytes).map_err(|source| EngineError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate(path)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = parse_renderer_config(Path::new("mem.json"), b"{}").unwrap();
        assert_eq!(cfg, RendererConfig::default());
        assert_eq!(cfg.max_render_passes, 8);
    }

    #[test]
    fn parses_all_fields() {
        let json = br#"{
            "clear_color": [0.1, 0.2, 0.3, 1.0],
            "max_texture_units": 4,
            "max_render_passes": 3,
            "default_mode": "line_strip",
            "log_filter": "rxgl=debug"
        }"#;
        let cfg = parse_renderer_config(Path::new("mem.json"), json).unwrap();
        assert_eq!(cfg.clear_color, Some([0.1, 0.2, 0.3, 1.0]));
        assert_eq!(cfg.max_texture_units, Some(4));
        assert_eq!(cfg.max_render_passes, 3);
        assert_eq!(cfg.default_mode, DrawMode::LineStrip);
        assert_eq!(cfg.log_filter.as_deref(), Some("rxgl=debug"));
    }

    #[test]
    fn rejects_zero_pass_cap() {
        let err = parse_renderer_config(Path::new("mem.json"), br#"{"max_render_passes": 0}"#)
            .expect_err("zero passes must be rejected");
        assert!(matches!(err, EngineError::InvalidConfig { .. }), "got {err}");
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_renderer_config(Path::new("mem.json"), br#"{"colour": 1}"#)
            .expect_err("unknown key must be rejected");
        assert!(matches!(err, EngineError::Json { .. }), "got {err}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_renderer_config("/definitely/not/here/rxgl.json").unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
