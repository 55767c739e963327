//! Textures and the `sampler2D` token.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rxgl_reactive::{Atom, BindFlow};

use crate::context::GlContext;
use crate::token::{Dialect, IntoToken, Location, Token, TokenKind, TokenRef};
use crate::uniform::UniformKind;
use crate::virtual_program::VirtualProgram;
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TextureId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8,
    Rgb8,
    R8,
}

impl TextureFormat {
    /// `(internal format, format)`.
    pub fn gl_formats(self) -> (i32, u32) {
        match self {
            TextureFormat::Rgba8 => (glow::RGBA8 as i32, glow::RGBA),
            TextureFormat::Rgb8 => (glow::RGB8 as i32, glow::RGB),
            TextureFormat::R8 => (glow::R8 as i32, glow::RED),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgb8 => 3,
            TextureFormat::R8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Linear,
    Nearest,
}

impl Filter {
    fn gl(self) -> i32 {
        match self {
            Filter::Linear => glow::LINEAR as i32,
            Filter::Nearest => glow::NEAREST as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

impl Wrap {
    fn gl(self) -> i32 {
        match self {
            Wrap::ClampToEdge => glow::CLAMP_TO_EDGE as i32,
            Wrap::Repeat => glow::REPEAT as i32,
            Wrap::MirroredRepeat => glow::MIRRORED_REPEAT as i32,
        }
    }
}

/// Pixel contents and sampling state of a 2D texture.
#[derive(Clone, PartialEq)]
pub struct TextureImage {
    pub width: i32,
    pub height: i32,
    pub format: TextureFormat,
    /// `None` allocates storage without initializing it.
    pub pixels: Option<Rc<[u8]>>,
    pub filter: Filter,
    pub wrap: Wrap,
}

impl fmt::Debug for TextureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.pixels.as_ref().map(|p| p.len()))
            .field("filter", &self.filter)
            .field("wrap", &self.wrap)
            .finish()
    }
}

impl TextureImage {
    pub fn rgba8(width: i32, height: i32, pixels: impl Into<Rc<[u8]>>) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8,
            pixels: Some(pixels.into()),
            filter: Filter::default(),
            wrap: Wrap::default(),
        }
    }

    pub fn empty(width: i32, height: i32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: None,
            filter: Filter::default(),
            wrap: Wrap::default(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_wrap(mut self, wrap: Wrap) -> Self {
        self.wrap = wrap;
        self
    }

    /// Sampling parameters followed by `tex_image_2d`, on whatever is bound to `TEXTURE_2D`.
    pub(crate) fn upload(&self, gl: &dyn crate::GlBackend) {
        let target = glow::TEXTURE_2D;
        gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, self.filter.gl());
        gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, self.filter.gl());
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, self.wrap.gl());
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, self.wrap.gl());
        let (internal, format) = self.format.gl_formats();
        gl.tex_image_2d(
            target,
            0,
            internal,
            self.width,
            self.height,
            format,
            glow::UNSIGNED_BYTE,
            self.pixels.as_deref(),
        );
    }
}

/// A texture object: identity plus reactive image contents.
///
/// Changing the image re-uploads into the same GL texture; assigning a
/// different `Texture` to a sampler switches GL textures.
#[derive(Debug, Clone)]
pub struct Texture {
    id: TextureId,
    image: Atom<TextureImage>,
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Texture {
    pub fn new(image: TextureImage) -> Self {
        Self {
            id: TextureId::next(),
            image: Atom::new(image),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn image(&self) -> &Atom<TextureImage> {
        &self.image
    }

    pub fn set_image(&self, image: TextureImage) {
        self.image.set(image);
    }
}

/// `uniform sampler2D` token.
#[derive(Debug, Clone)]
pub struct Sampler2D {
    texture: Atom<Texture>,
}

impl Sampler2D {
    pub fn new(texture: Texture) -> Self {
        Self {
            texture: Atom::new(texture),
        }
    }

    pub fn atom(&self) -> &Atom<Texture> {
        &self.texture
    }

    pub fn get(&self) -> Texture {
        self.texture.get()
    }

    pub fn set(&self, texture: Texture) {
        self.texture.set(texture);
    }
}

impl Token for Sampler2D {
    fn id(&self) -> u64 {
        self.texture.id().raw()
    }

    fn kind(&self) -> TokenKind {
        TokenKind::Uniform
    }

    fn declaration(&self, name: &str, _dialect: Dialect) -> String {
        format!("uniform {} {};", UniformKind::Sampler2D.glsl_name(), name)
    }

    fn bind(&self, ctx: &GlContext, vp: &Rc<VirtualProgram>, location: Location) {
        let Location::Uniform(loc) = location else {
            return;
        };
        vp.register_uniform(loc);
        let weak = Rc::downgrade(vp);
        self.texture
            .bind_with(vp.binding_key(), ctx.requester(), move |texture: &Texture| {
                match weak.upgrade() {
                    Some(vp) if vp.sampled_texture(loc) != Some(texture.id()) => BindFlow::Render,
                    _ => BindFlow::Skip,
                }
            });
    }

    fn update(
        &self,
        ctx: &GlContext,
        vp: &VirtualProgram,
        location: Location,
    ) -> Result<(), EngineError> {
        self.texture.run_before_draw();
        let Location::Uniform(loc) = location else {
            return Ok(());
        };
        let texture = self.texture.get();
        let record = vp.register_texture(ctx.gl(), &texture)?;

        // Image edits re-upload into this record and re-render this program.
        let weak = Rc::downgrade(&record);
        texture
            .image()
            .bind_with(vp.binding_key(), ctx.requester(), move |_: &TextureImage| {
                if let Some(record) = weak.upgrade() {
                    record.mark_dirty();
                }
                BindFlow::Render
            });

        vp.enqueue_texture(ctx, texture, loc)
    }
}

impl IntoToken for Sampler2D {
    fn into_token(self) -> TokenRef {
        Rc::new(self)
    }
}
