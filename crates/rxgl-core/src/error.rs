use std::path::PathBuf;

/// Engine-level errors used across rxgl crates.
///
/// Contract rule: this type lives in `rxgl-core` and is re-exported by runtimes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ---- Config (SDK-level) ----
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("json parse error at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config at {}: {msg}", path.display())]
    InvalidConfig { path: PathBuf, msg: String },

    // ---- Runtime-facing (backend) ----
    #[error("vertex shader compile error: {0}")]
    VertexCompile(String),
    #[error("fragment shader compile error: {0}")]
    FragmentCompile(String),
    #[error("program link error: {0}")]
    Link(String),
    #[error("backend object creation failed: {0}")]
    GlCreate(String),

    // ---- Programmer contract ----
    #[error("draw source: {0}")]
    DrawSource(String),
    #[error("shader template: {0}")]
    Template(String),
    #[error("missing program: {0}")]
    MissingProgram(String),
    #[error("scene graph: {0}")]
    SceneGraph(String),

    // ---- Environment ----
    #[error("cannot auto-resize an offscreen surface (no client dimensions)")]
    OffscreenResize,

    // ---- Fallback ----
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn other<T: Into<String>>(s: T) -> Self {
        EngineError::Other(s.into())
    }

    /// True for failures reported by the driver while building GPU objects.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            EngineError::VertexCompile(_)
                | EngineError::FragmentCompile(_)
                | EngineError::Link(_)
                | EngineError::GlCreate(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_carry_driver_log() {
        let err = EngineError::FragmentCompile("0:3: 'foo' undeclared".into());
        assert_eq!(
            err.to_string(),
            "fragment shader compile error: 0:3: 'foo' undeclared"
        );
        assert!(err.is_setup_failure());
        assert!(!EngineError::OffscreenResize.is_setup_failure());
    }
}
