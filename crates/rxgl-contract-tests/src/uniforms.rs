use rxgl_runtime_glow::{glsl, GlCall, ProgramOptions, Uniform};

use crate::support::{plain_vertex, renderer};

fn vec3_uploads(calls: &[GlCall]) -> Vec<Vec<f32>> {
    calls
        .iter()
        .filter_map(|c| match c {
            GlCall::UniformF32 {
                components: 3,
                data,
                ..
            } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn float_uploads(calls: &[GlCall]) -> Vec<f32> {
    calls
        .iter()
        .filter_map(|c| match c {
            GlCall::UniformF32 {
                components: 1,
                data,
                ..
            } => data.first().copied(),
            _ => None,
        })
        .collect()
}

#[test]
fn changed_uniform_uploads_exactly_once() {
    let (gl, r) = renderer();
    let color = Uniform::new([1.0f32, 0.0, 0.0]);
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &color,
        ", 1.0); }"
    );
    let p = r
        .create_program(ProgramOptions::new(plain_vertex(), fs).count(6))
        .unwrap();
    r.push(p);

    assert_eq!(r.tick(0.0).unwrap(), 1);
    assert_eq!(vec3_uploads(&gl.take_calls()), vec![vec![1.0, 0.0, 0.0]]);

    color.set([0.0, 1.0, 0.0]);
    assert!(r.needs_frame());
    assert_eq!(r.tick(0.016).unwrap(), 1);
    let calls = gl.take_calls();
    assert_eq!(vec3_uploads(&calls), vec![vec![0.0, 1.0, 0.0]]);
    assert_eq!(
        calls.iter().filter(|c| c.is_draw()).collect::<Vec<_>>(),
        vec![&GlCall::DrawArrays {
            mode: glow::TRIANGLES,
            first: 0,
            count: 6
        }]
    );
}

#[test]
fn setting_an_equal_value_schedules_nothing() {
    let (gl, r) = renderer();
    let level = Uniform::new(0.5f32);
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &level,
        "); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );
    r.tick(0.0).unwrap();
    gl.take_calls();

    level.set(0.5);
    assert!(!r.needs_frame());
    assert_eq!(r.tick(0.016).unwrap(), 0);
    assert!(gl.calls().is_empty());
}

#[test]
fn suppressed_render_does_not_hide_the_next_change() {
    let (gl, r) = renderer();
    let level = Uniform::new(1.0f32);
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &level,
        "); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );
    r.tick(0.0).unwrap();
    assert_eq!(float_uploads(&gl.take_calls()), vec![1.0]);

    level.atom().update(|_, flags| {
        flags.prevent_render();
        2.0
    });
    assert!(!r.needs_frame());

    // Some other change redraws, carrying the suppressed value along.
    r.request_render();
    r.tick(0.016).unwrap();
    assert_eq!(float_uploads(&gl.take_calls()), vec![2.0]);

    level.set(1.0);
    assert!(r.needs_frame());
    assert_eq!(r.tick(0.032).unwrap(), 1);
    assert_eq!(float_uploads(&gl.take_calls()), vec![1.0]);
}

#[test]
fn redraw_without_changes_issues_no_uniform_calls() {
    let (gl, r) = renderer();
    let level = Uniform::new(0.25f32);
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &level,
        "); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );
    r.render().unwrap();
    gl.take_calls();

    r.render().unwrap();
    let calls = gl.calls();
    assert_eq!(calls.iter().filter(|c| c.is_uniform_upload()).count(), 0);
    assert_eq!(calls.iter().filter(|c| c.is_draw()).count(), 1);
}

#[test]
fn matrix_uniforms_upload_untransposed() {
    let (gl, r) = renderer();
    let model = Uniform::new(glam::Mat4::from_translation(glam::vec3(1.0, 2.0, 3.0)));
    let vs = glsl!(
        "void main() { gl_Position = ",
        &model,
        " * vec4(0.0, 0.0, 0.0, 1.0); }"
    );
    let fs = rxgl_runtime_glow::ShaderTemplate::from_source(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(1.0); }",
    );
    r.push(
        r.create_program(ProgramOptions::new(vs, fs).count(1))
            .unwrap(),
    );
    r.render().unwrap();

    let uploads: Vec<GlCall> = gl
        .calls()
        .into_iter()
        .filter(GlCall::is_uniform_upload)
        .collect();
    assert_eq!(uploads.len(), 1);
    match &uploads[0] {
        GlCall::UniformMatrixF32 {
            dim,
            transpose,
            data,
            ..
        } => {
            assert_eq!(*dim, 4);
            assert!(!transpose);
            assert_eq!(
                data.as_slice(),
                glam::Mat4::from_translation(glam::vec3(1.0, 2.0, 3.0))
                    .to_cols_array()
                    .as_slice()
            );
        }
        other => panic!("expected a matrix upload, got {other:?}"),
    }
}
