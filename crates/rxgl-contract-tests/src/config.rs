use std::path::Path;

use rxgl_core::{init_logging, parse_renderer_config, DrawMode, EngineError, LoggingConfig};
use rxgl_runtime_glow::{GlCall, ProgramOptions};

use crate::support::{plain_vertex, renderer_with};

const RENDERER_JSON: &str = r#"{
    "clear_color": [0.1, 0.1, 0.1, 1.0],
    "max_texture_units": 4,
    "default_mode": "triangle_strip",
    "log_filter": "rxgl_runtime_glow=trace"
}"#;

#[test]
fn json_config_drives_the_renderer() {
    let config = parse_renderer_config(Path::new("renderer.json"), RENDERER_JSON.as_bytes()).unwrap();
    init_logging(LoggingConfig {
        env_filter: config.log_filter.clone(),
        ansi: false,
    });

    let (gl, r) = renderer_with(config);
    assert_eq!(r.context().max_texture_units(), 4);

    let fs = rxgl_runtime_glow::ShaderTemplate::from_source(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(0.5); }",
    );
    let p = r
        .create_program(ProgramOptions::new(plain_vertex(), fs).count(4))
        .unwrap();
    assert_eq!(p.mode(), DrawMode::TriangleStrip);
    r.push(p);
    gl.take_calls();

    r.tick(0.0).unwrap();
    let calls = gl.calls();
    assert_eq!(calls[0], GlCall::ClearColor([0.1, 0.1, 0.1, 1.0]));
    assert!(calls.contains(&GlCall::DrawArrays {
        mode: glow::TRIANGLE_STRIP,
        first: 0,
        count: 4,
    }));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = parse_renderer_config(Path::new("bad.json"), br#"{ "clear_colour": [0, 0, 0, 1] }"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::Json { .. }), "got {err:?}");
}
