use std::rc::Rc;

use rxgl_reactive::RenderRequest;
use rxgl_runtime_glow::{
    GlBackend, GlCall, GlContext, IntoToken, RecordingBackend, ShaderTemplate, TokenRef, Uniform,
};

use crate::support::plain_vertex;

struct Idle;

impl RenderRequest for Idle {
    fn request_render(&self) {}
}

fn context() -> (Rc<RecordingBackend>, GlContext) {
    let gl = Rc::new(RecordingBackend::new());
    let backend: Rc<dyn GlBackend> = gl.clone();
    (gl, GlContext::new(backend, Rc::new(Idle), None))
}

fn parts() -> Vec<String> {
    vec![
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(".into(),
        ", ".into(),
        "); }".into(),
    ]
}

fn linked_sources(fragment: &ShaderTemplate) -> Vec<String> {
    let (gl, ctx) = context();
    ctx.program(&plain_vertex(), fragment).unwrap();
    gl.shader_sources()
}

/// Same parts and tokens give the same template id and the same GLSL in any
/// context.
#[test]
fn runtime_templates_compile_identically() {
    let rgb = Uniform::new([0.2f32, 0.4, 0.6]);
    let alpha = Uniform::new(1.0f32);
    let tokens = || -> Vec<TokenRef> { vec![rgb.clone().into_token(), alpha.clone().into_token()] };

    let a = ShaderTemplate::from_parts(parts(), tokens());
    let b = ShaderTemplate::from_parts(parts(), tokens());
    assert_eq!(a.id(), b.id());
    assert_eq!(a.compile().unwrap().code, b.compile().unwrap().code);

    let first = linked_sources(&a);
    assert_eq!(first.len(), 2);
    assert_eq!(first, linked_sources(&b));
}

#[test]
fn template_pairs_link_once_per_context() {
    let (gl, ctx) = context();
    let fragment = ShaderTemplate::from_source(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(0.0); }",
    );

    let first = ctx.program(&plain_vertex(), &fragment).unwrap();
    let again = ctx.program(&plain_vertex(), &fragment).unwrap();
    assert!(Rc::ptr_eq(&first, &again));
    assert_eq!(gl.count(|c| matches!(c, GlCall::CompileShader(_))), 2);
    assert_eq!(gl.count(|c| matches!(c, GlCall::LinkProgram(_))), 1);

    let (other_gl, other) = context();
    other.program(&plain_vertex(), &fragment).unwrap();
    assert_eq!(
        other_gl.count(|c| matches!(c, GlCall::LinkProgram(_))),
        1,
        "caches are per context"
    );
}

#[test]
fn equal_text_with_other_token_types_compiles_separately() {
    let (gl, ctx) = context();
    let parts = || {
        vec![
            "precision mediump float;\nvoid main() { gl_FragColor = vec4(".to_string(),
            "); }".to_string(),
        ]
    };
    let scalar = ShaderTemplate::from_parts(parts(), vec![Uniform::new(1.0f32).into_token()]);
    let color = ShaderTemplate::from_parts(
        parts(),
        vec![Uniform::new([1.0f32, 0.0, 0.0, 1.0]).into_token()],
    );
    assert_ne!(scalar.id(), color.id());

    let declared = |t: &ShaderTemplate| ctx.compile_shader(t).unwrap().value().declarations.clone();
    assert!(declared(&scalar)[0].starts_with("uniform float "));
    assert!(declared(&color)[0].starts_with("uniform vec4 "));

    let a = ctx.program(&plain_vertex(), &scalar).unwrap();
    let b = ctx.program(&plain_vertex(), &color).unwrap();
    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(gl.count(|c| matches!(c, GlCall::LinkProgram(_))), 2);
}
