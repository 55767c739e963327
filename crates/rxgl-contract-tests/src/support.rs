use std::rc::Rc;

use rxgl_runtime_glow::{GlBackend, RecordingBackend, Renderer, RendererConfig, ShaderTemplate};

pub const FULLSCREEN_VS: &str = "void main() { gl_Position = vec4(0.0); }";

pub fn renderer() -> (Rc<RecordingBackend>, Renderer) {
    renderer_with(RendererConfig::default())
}

pub fn renderer_with(config: RendererConfig) -> (Rc<RecordingBackend>, Renderer) {
    let gl = Rc::new(RecordingBackend::new());
    let backend: Rc<dyn GlBackend> = gl.clone();
    (gl, Renderer::new(backend, config))
}

pub fn plain_vertex() -> ShaderTemplate {
    ShaderTemplate::from_source(FULLSCREEN_VS)
}
