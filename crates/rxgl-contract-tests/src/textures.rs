use rxgl_runtime_glow::{
    glsl, GlCall, ProgramOptions, RendererConfig, Sampler2D, Texture, TextureImage,
};

use crate::support::{plain_vertex, renderer_with};

fn texture(shade: u8) -> Texture {
    Texture::new(TextureImage::rgba8(1, 1, vec![shade, shade, shade, 255]))
}

fn sampler_units(calls: &[GlCall]) -> Vec<i32> {
    calls
        .iter()
        .filter_map(|c| match c {
            GlCall::UniformI32 { data, .. } => data.first().copied(),
            _ => None,
        })
        .collect()
}

fn active_units(calls: &[GlCall]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|c| match c {
            GlCall::ActiveTexture(unit) => Some(*unit),
            _ => None,
        })
        .collect()
}

fn uploads(calls: &[GlCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, GlCall::TexImage2d { .. }))
        .count()
}

#[test]
fn least_recently_used_texture_gives_up_its_unit() {
    let config = RendererConfig {
        max_texture_units: Some(2),
        ..RendererConfig::default()
    };
    let (gl, r) = renderer_with(config);
    assert_eq!(r.context().max_texture_units(), 2);

    let (a, b, c) = (texture(10), texture(20), texture(30));
    let sampler = Sampler2D::new(a.clone());
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = texture2D(",
        &sampler,
        ", vec2(0.5)); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );

    r.tick(0.0).unwrap();
    let calls = gl.take_calls();
    assert_eq!((active_units(&calls), sampler_units(&calls)), (vec![0], vec![0]));
    assert_eq!(uploads(&calls), 1);

    sampler.set(b);
    r.tick(0.1).unwrap();
    let calls = gl.take_calls();
    assert_eq!((active_units(&calls), sampler_units(&calls)), (vec![1], vec![1]));
    assert_eq!(uploads(&calls), 1);

    // Both units taken: `a` is the least recently used.
    sampler.set(c);
    r.tick(0.2).unwrap();
    let calls = gl.take_calls();
    assert_eq!((active_units(&calls), sampler_units(&calls)), (vec![0], vec![0]));
    assert_eq!(uploads(&calls), 1);

    // `a` comes back on the unit `b` held; its pixels are still on the GPU.
    sampler.set(a);
    r.tick(0.3).unwrap();
    let calls = gl.take_calls();
    assert_eq!((active_units(&calls), sampler_units(&calls)), (vec![1], vec![1]));
    assert_eq!(uploads(&calls), 0);
}

#[test]
fn replacing_an_image_reuploads_once() {
    let (gl, r) = renderer_with(RendererConfig::default());
    let tex = texture(0);
    let sampler = Sampler2D::new(tex.clone());
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = texture2D(",
        &sampler,
        ", vec2(0.5)); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );
    r.tick(0.0).unwrap();
    gl.take_calls();

    r.request_render();
    r.tick(0.1).unwrap();
    let calls = gl.take_calls();
    assert_eq!(uploads(&calls), 0);
    assert!(sampler_units(&calls).is_empty(), "sampler uniform unchanged");

    tex.set_image(TextureImage::rgba8(2, 1, vec![255; 8]));
    assert!(r.needs_frame());
    r.tick(0.2).unwrap();
    let calls = gl.take_calls();
    assert_eq!(uploads(&calls), 1);
    assert!(calls.contains(&GlCall::TexImage2d {
        target: glow::TEXTURE_2D,
        width: 2,
        height: 1,
        format: glow::RGBA,
        bytes: Some(8),
    }));

    r.tick(0.3).unwrap();
    assert_eq!(uploads(&gl.calls()), 0);
}

#[test]
fn suppressed_texture_swap_does_not_hide_the_swap_back() {
    let (gl, r) = renderer_with(RendererConfig::default());
    let (a, b) = (texture(10), texture(20));
    let sampler = Sampler2D::new(a.clone());
    let fs = glsl!(
        "precision mediump float;\nvoid main() { gl_FragColor = texture2D(",
        &sampler,
        ", vec2(0.5)); }"
    );
    r.push(
        r.create_program(ProgramOptions::new(plain_vertex(), fs).count(3))
            .unwrap(),
    );
    r.tick(0.0).unwrap();
    gl.take_calls();

    sampler.atom().update(|_, flags| {
        flags.prevent_render();
        b.clone()
    });
    assert!(!r.needs_frame());
    r.request_render();
    r.tick(0.1).unwrap();
    assert_eq!(active_units(&gl.take_calls()), vec![1]);

    sampler.set(a);
    assert!(r.needs_frame());
    r.tick(0.2).unwrap();
    assert_eq!(active_units(&gl.take_calls()), vec![0]);

    sampler.atom().request_render();
    assert!(r.needs_frame());
}
