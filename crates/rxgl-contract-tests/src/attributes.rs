use rxgl_runtime_glow::{glsl, AttribKind, Attribute, BufferData, GlCall, ProgramOptions, ShaderTemplate};

use crate::support::renderer;

const FS: &str = "precision mediump float;\nvoid main() { gl_FragColor = vec4(1.0); }";

fn is_buffer_work(call: &GlCall) -> bool {
    matches!(
        call,
        GlCall::BindBuffer { .. } | GlCall::BufferData { .. } | GlCall::VertexAttribPointer { .. }
    )
}

fn triangle() -> BufferData {
    BufferData::from_f32(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0])
}

#[test]
fn unchanged_attribute_issues_no_buffer_calls() {
    let (gl, r) = renderer();
    let position = Attribute::new(AttribKind::Vec2, triangle());
    let vs = glsl!(
        "void main() { gl_Position = vec4(",
        &position,
        ", 0.0, 1.0); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(vs, ShaderTemplate::from_source(FS)).count(3))
            .unwrap(),
    );

    r.render().unwrap();
    let first = gl.take_calls();
    assert_eq!(first.iter().filter(|c| is_buffer_work(c)).count(), 3);
    assert!(first.contains(&GlCall::EnableVertexAttribArray(0)));

    r.render().unwrap();
    r.render().unwrap();
    assert_eq!(gl.count(is_buffer_work), 0);
    assert_eq!(gl.count(GlCall::is_draw), 2);
}

#[test]
fn new_data_rebinds_and_uploads_once() {
    let (gl, r) = renderer();
    let position = Attribute::new(AttribKind::Vec2, triangle());
    let vs = glsl!(
        "void main() { gl_Position = vec4(",
        &position,
        ", 0.0, 1.0); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(vs, ShaderTemplate::from_source(FS)).count(3))
            .unwrap(),
    );
    r.tick(0.0).unwrap();
    gl.take_calls();

    position.set(BufferData::from_f32(&[0.0, 0.0, -1.0, 0.0, 0.0, -1.0]));
    assert!(r.needs_frame());
    r.tick(0.016).unwrap();
    let uploads = gl.count(|c| matches!(c, GlCall::BufferData { .. }));
    assert_eq!(uploads, 1);
    assert_eq!(
        gl.count(|c| matches!(c, GlCall::VertexAttribPointer { .. })),
        1
    );

    r.tick(0.032).unwrap();
    assert_eq!(gl.count(|c| matches!(c, GlCall::BufferData { .. })), 1);
}

#[test]
fn in_place_replacement_reuploads_into_the_same_buffer() {
    let (gl, r) = renderer();
    let position = Attribute::new(AttribKind::Vec2, triangle());
    let vs = glsl!(
        "void main() { gl_Position = vec4(",
        &position,
        ", 0.0, 1.0); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(vs, ShaderTemplate::from_source(FS)).count(3))
            .unwrap(),
    );
    r.tick(0.0).unwrap();
    gl.take_calls();

    let current = position.buffer().get();
    position.set(current.replace(BufferData::from_f32(&[1.0; 6])));
    r.tick(0.016).unwrap();
    let calls = gl.calls();
    assert!(!calls.iter().any(|c| matches!(c, GlCall::CreateBuffer(_))));
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, GlCall::BufferData { .. }))
            .count(),
        1
    );
}

#[test]
fn programs_sharing_a_buffer_keep_separate_bindings() {
    let (gl, r) = renderer();
    let position = Attribute::new(AttribKind::Vec2, triangle());
    let vs_a = glsl!(
        "void main() { gl_Position = vec4(",
        &position,
        ", 0.0, 1.0); }"
    );
    let vs_b = glsl!(
        "void main() { gl_Position = vec4(",
        &position,
        ", 0.5, 1.0); }"
    );
    let a = r
        .create_program(ProgramOptions::new(vs_a, ShaderTemplate::from_source(FS)).count(3))
        .unwrap();
    let b = r
        .create_program(ProgramOptions::new(vs_b, ShaderTemplate::from_source(FS)).count(3))
        .unwrap();
    assert_ne!(a.handle(), b.handle());
    r.push(vec![a, b]);

    r.render().unwrap();
    assert_eq!(gl.count(|c| matches!(c, GlCall::CreateBuffer(_))), 1);
    assert_eq!(gl.count(|c| matches!(c, GlCall::BufferData { .. })), 1);
    assert_eq!(
        gl.count(|c| matches!(c, GlCall::VertexAttribPointer { .. })),
        2,
        "each program sets up its own attribute"
    );

    gl.take_calls();
    r.render().unwrap();
    assert_eq!(gl.count(is_buffer_work), 0);
}

#[test]
fn indexed_programs_upload_indices_once() {
    let (gl, r) = renderer();
    let position = Attribute::new(
        AttribKind::Vec2,
        BufferData::from_f32(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
    );
    let vs = glsl!(
        "void main() { gl_Position = vec4(",
        &position,
        ", 0.0, 1.0); }"
    );
    r.push(
        r.create_program(
            ProgramOptions::new(vs, ShaderTemplate::from_source(FS))
                .index_data(BufferData::from_u16(&[0, 1, 2, 2, 1, 3])),
        )
        .unwrap(),
    );
    r.render().unwrap();
    r.render().unwrap();

    let index_uploads = gl.count(|c| {
        matches!(c, GlCall::BufferData { target, .. } if *target == glow::ELEMENT_ARRAY_BUFFER)
    });
    assert_eq!(index_uploads, 1);
    assert_eq!(
        gl.count(|c| matches!(c, GlCall::DrawElements { count: 6, .. })),
        2
    );
}
