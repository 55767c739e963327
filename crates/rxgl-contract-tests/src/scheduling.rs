use std::cell::Cell;
use std::rc::Rc;

use rxgl_runtime_glow::{glsl, GlCall, ProgramOptions, RendererConfig, Uniform};

use crate::support::{plain_vertex, renderer, renderer_with};

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
fn mutations_between_frames_collapse_into_one_pass() {
    let (gl, r) = renderer();
    let level = Uniform::new(0.0f32);
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

    for i in 1..=5 {
        level.set(i as f32);
    }
    assert_eq!(r.tick(0.016).unwrap(), 1);
    let calls = gl.calls();
    assert_eq!(float_uploads(&calls), vec![5.0]);
    assert_eq!(calls.iter().filter(|c| c.is_draw()).count(), 1);
}

#[test]
fn change_during_draw_runs_a_second_pass() {
    let (gl, r) = renderer();
    let first = Uniform::new(0.0f32);
    let second = Uniform::new(1.0f32);
    let fs_a = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &first,
        "); }"
    );
    let fs_b = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &second,
        " * 0.5); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs_a).count(3))
            .unwrap(),
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs_b).count(3))
            .unwrap(),
    );

    // `first` has already been drawn when `second` is about to sync.
    let armed = Rc::new(Cell::new(true));
    let target = first.clone();
    let trigger = Rc::clone(&armed);
    let _hook = second.atom().on_before_draw(move || {
        if trigger.replace(false) {
            target.set(5.0);
        }
    });

    assert_eq!(r.tick(0.0).unwrap(), 2);
    assert!(!armed.get());
    let calls = gl.calls();
    assert_eq!(float_uploads(&calls), vec![0.0, 1.0, 5.0]);
    assert_eq!(calls.iter().filter(|c| c.is_draw()).count(), 4);
    assert!(!r.needs_frame());
}

#[test]
fn endless_rerenders_stop_at_the_pass_cap() {
    let config = RendererConfig {
        max_render_passes: 3,
        ..RendererConfig::default()
    };
    let (_gl, r) = renderer_with(config);
    let level = Uniform::new(0.0f32);
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &level,
        "); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );
    let feedback = level.clone();
    let _hook = level
        .atom()
        .on_before_draw(move || feedback.set(feedback.get() + 1.0));

    assert_eq!(r.tick(0.0).unwrap(), 3);
    assert!(r.needs_frame(), "the leftover change waits for the next tick");
}

#[test]
fn loop_callbacks_render_every_tick() {
    let (gl, r) = renderer();
    let phase = Uniform::new(0.0f32);
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = vec4(",
        &phase,
        "); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );

    let driven = phase.clone();
    let sub = r.on_loop(move |t| driven.set(t.now as f32));
    for frame in 1..=3 {
        assert_eq!(r.tick(f64::from(frame)).unwrap(), 1);
    }
    assert_eq!(float_uploads(&gl.calls()), vec![1.0, 2.0, 3.0]);

    sub.unsubscribe();
    assert!(!r.needs_frame());
    assert_eq!(r.tick(4.0).unwrap(), 0);
}

#[test]
fn cell_render_request_schedules_a_pass_without_a_change() {
    let (gl, r) = renderer();
    let level = Uniform::new(0.75f32);
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

    level.atom().request_render();
    assert!(r.needs_frame());
    assert_eq!(r.tick(0.016).unwrap(), 1);
    let calls = gl.take_calls();
    assert!(float_uploads(&calls).is_empty(), "value already on the GPU");
    assert_eq!(calls.iter().filter(|c| c.is_draw()).count(), 1);
}
