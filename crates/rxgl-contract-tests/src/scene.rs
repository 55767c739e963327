use std::cell::Cell;
use std::rc::Rc;

use glam::{vec3, Mat4, Quat};
use rxgl_runtime_glow::{glsl, GlCall, ProgramOptions, ShaderTemplate, Uniform};
use rxgl_scene::{DirtyFlag, Scene};

use crate::support::renderer;

const FS: &str = "precision mediump float;\nvoid main() { gl_FragColor = vec4(1.0); }";

fn matrix_uploads(calls: &[GlCall]) -> Vec<Vec<f32>> {
    calls
        .iter()
        .filter_map(|c| match c {
            GlCall::UniformMatrixF32 { dim: 4, data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn child_world_follows_parent_and_skips_sibling_changes() {
    let (gl, r) = renderer();
    let scene = Scene::new(r.requester());
    let updater = scene.clone();
    let _update = r.on_before_render(move || {
        updater.update();
    });

    let parent_local = Mat4::from_translation(vec3(2.0, 0.0, 0.0));
    let child_local = Mat4::from_rotation_z(0.5);
    let parent = scene.create_node_with(parent_local);
    let child = scene.create_node_with(child_local);
    let sibling = scene.create_node();
    child.bind(&parent).unwrap();
    sibling.bind(&parent).unwrap();

    let model = Uniform::from_atom(child.world().clone());
    let vs = glsl!(
        "void main() { gl_Position = ",
        &model,
        " * vec4(0.0, 0.0, 0.0, 1.0); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(vs, ShaderTemplate::from_source(FS)).count(1))
            .unwrap(),
    );

    let recomputed = Rc::new(Cell::new(0));
    let counter = Rc::clone(&recomputed);
    let _hook = child.on_update(move |_| counter.set(counter.get() + 1));

    parent.bind(&scene.origin()).unwrap();
    assert_eq!(r.tick(0.0).unwrap(), 1, "scene updates are absorbed by the pass");
    assert_eq!(recomputed.get(), 1);

    let expected = parent_local * child_local;
    assert_eq!(child.world_matrix(), expected);
    assert_eq!(
        matrix_uploads(&gl.take_calls()),
        vec![expected.to_cols_array().to_vec()]
    );

    sibling.set_local(Mat4::from_scale(vec3(3.0, 3.0, 3.0)));
    assert_eq!(child.flag(), DirtyFlag::Clean);
    assert_eq!(parent.flag(), DirtyFlag::DirtyDescendant);
    r.tick(0.016).unwrap();
    assert_eq!(recomputed.get(), 1, "sibling change leaves the child alone");
    assert!(matrix_uploads(&gl.take_calls()).is_empty());

    let moved = Mat4::from_rotation_translation(Quat::from_rotation_y(1.0), vec3(0.0, 1.0, 0.0));
    parent.set_local(moved);
    r.tick(0.032).unwrap();
    assert_eq!(recomputed.get(), 2);
    assert_eq!(
        matrix_uploads(&gl.take_calls()),
        vec![(moved * child_local).to_cols_array().to_vec()]
    );
}

#[test]
fn detached_subtrees_stop_requesting_frames() {
    let (_gl, r) = renderer();
    let scene = Scene::new(r.requester());
    let updater = scene.clone();
    let _update = r.on_before_render(move || {
        updater.update();
    });

    let node = scene.create_node();
    node.bind(&scene.origin()).unwrap();
    assert!(r.needs_frame());
    r.tick(0.0).unwrap();
    assert!(!r.needs_frame());

    node.unbind();
    node.set_local(Mat4::from_translation(vec3(0.0, 0.0, 1.0)));
    assert!(!r.needs_frame());

    node.bind(&scene.origin()).unwrap();
    assert!(r.needs_frame());
    r.tick(0.016).unwrap();
    assert_eq!(
        node.world_matrix(),
        Mat4::from_translation(vec3(0.0, 0.0, 1.0))
    );
}
