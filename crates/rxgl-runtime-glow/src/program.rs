//! Drawable programs: a template pair, a draw source and a visibility cell.

use std::fmt;

use rxgl_core::DrawMode;
use rxgl_reactive::Atom;
use tracing::trace;

use crate::attribute::{BufferData, BufferToken};
use crate::context::GlContext;
use crate::gl::ProgramHandle;
use crate::shader::{ShaderTemplate, TemplateId};
use crate::token::TokenRef;
use crate::EngineError;

pub fn gl_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Triangles => glow::TRIANGLES,
        DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
        DrawMode::TriangleFan => glow::TRIANGLE_FAN,
        DrawMode::Lines => glow::LINES,
        DrawMode::LineStrip => glow::LINE_STRIP,
        DrawMode::LineLoop => glow::LINE_LOOP,
        DrawMode::Points => glow::POINTS,
    }
}

/// Builder for [`Program`]. Exactly one of `count` / `indices` must be set.
#[derive(Debug)]
pub struct ProgramOptions {
    vertex: ShaderTemplate,
    fragment: ShaderTemplate,
    count: Option<Atom<i32>>,
    indices: Option<BufferToken>,
    mode: Option<DrawMode>,
    visible: Option<Atom<bool>>,
}

impl ProgramOptions {
    pub fn new(vertex: ShaderTemplate, fragment: ShaderTemplate) -> Self {
        Self {
            vertex,
            fragment,
            count: None,
            indices: None,
            mode: None,
            visible: None,
        }
    }

    /// Non-indexed draw of `count` vertices.
    pub fn count(self, count: i32) -> Self {
        self.count_atom(Atom::new(count))
    }

    /// Reactive vertex count.
    pub fn count_atom(mut self, count: Atom<i32>) -> Self {
        self.count = Some(count);
        self
    }

    pub fn indices(mut self, indices: BufferToken) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn index_data(self, data: BufferData) -> Self {
        self.indices(BufferToken::indices(data))
    }

    pub fn mode(mut self, mode: DrawMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn visible(mut self, visible: Atom<bool>) -> Self {
        self.visible = Some(visible);
        self
    }
}

#[derive(Debug)]
enum DrawSource {
    Count(Atom<i32>),
    Indices(BufferToken),
}

/// A linked, bound program ready to be put on a renderer's draw stack.
pub struct Program {
    vertex: TemplateId,
    fragment: TemplateId,
    handle: ProgramHandle,
    vertex_tokens: Vec<TokenRef>,
    fragment_tokens: Vec<TokenRef>,
    source: DrawSource,
    mode: DrawMode,
    visible: Atom<bool>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("handle", &self.handle)
            .field("vertex", &self.vertex)
            .field("fragment", &self.fragment)
            .field("tokens", &(self.vertex_tokens.len() + self.fragment_tokens.len()))
            .field("mode", &self.mode)
            .finish()
    }
}

fn distinct(template: &ShaderTemplate) -> Vec<TokenRef> {
    template
        .named_tokens()
        .into_iter()
        .map(|(token, _)| token)
        .collect()
}

impl Program {
    /// Link (or reuse) the template pair in `ctx` and bind every token, the
    /// draw source and the visibility cell to it.
    pub fn new(
        ctx: &GlContext,
        options: ProgramOptions,
        default_mode: DrawMode,
    ) -> Result<Self, EngineError> {
        let source = match (options.count, options.indices) {
            (Some(count), None) => DrawSource::Count(count),
            (None, Some(indices)) => DrawSource::Indices(indices),
            (Some(_), Some(_)) => {
                return Err(EngineError::DrawSource(
                    "both count and indices were supplied".into(),
                ))
            }
            (None, None) => {
                return Err(EngineError::DrawSource(
                    "one of count or indices is required".into(),
                ))
            }
        };

        let record = ctx.program(&options.vertex, &options.fragment)?;
        let linked = record.value();
        let vertex_tokens = distinct(&options.vertex);
        let fragment_tokens = distinct(&options.fragment);
        if vertex_tokens.len() != linked.vertex_locations.len()
            || fragment_tokens.len() != linked.fragment_locations.len()
        {
            return Err(EngineError::Template(format!(
                "template pair {:?}/{:?} was linked with a different token layout",
                options.vertex.id(),
                options.fragment.id()
            )));
        }

        let vp = &linked.vp;
        for (token, location) in vertex_tokens.iter().zip(&linked.vertex_locations) {
            token.bind(ctx, vp, *location);
        }
        for (token, location) in fragment_tokens.iter().zip(&linked.fragment_locations) {
            token.bind(ctx, vp, *location);
        }
        match &source {
            DrawSource::Count(count) => {
                count.bind(vp.binding_key(), ctx.requester());
            }
            DrawSource::Indices(indices) => indices.bind_indices(ctx, vp),
        }
        let visible = options.visible.unwrap_or_else(|| Atom::new(true));
        visible.bind(vp.binding_key(), ctx.requester());

        Ok(Self {
            vertex: options.vertex.id(),
            fragment: options.fragment.id(),
            handle: linked.handle,
            vertex_tokens,
            fragment_tokens,
            source,
            mode: options.mode.unwrap_or(default_mode),
            visible,
        })
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    pub fn visible(&self) -> &Atom<bool> {
        &self.visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    /// Vertex tokens, then fragment tokens, then textures, then the draw call.
    pub fn draw(&self, ctx: &GlContext) -> Result<(), EngineError> {
        if !self.visible.get() {
            trace!(program = self.handle.0, "skipping hidden program");
            return Ok(());
        }
        let record = ctx.lookup_program(self.vertex, self.fragment)?;
        let linked = record.value();
        let vp = &linked.vp;

        ctx.use_program(linked.handle);
        ctx.bind_vertex_array(vp.vao());
        for (token, location) in self.vertex_tokens.iter().zip(&linked.vertex_locations) {
            token.update(ctx, vp, *location)?;
        }
        for (token, location) in self.fragment_tokens.iter().zip(&linked.fragment_locations) {
            token.update(ctx, vp, *location)?;
        }
        vp.resolve_texture_bindings(ctx)?;

        let gl = ctx.gl();
        let mode = gl_mode(self.mode);
        match &self.source {
            DrawSource::Count(count) => {
                let count = count.get();
                if count > 0 {
                    gl.draw_arrays(mode, 0, count);
                }
            }
            DrawSource::Indices(indices) => {
                let (count, element_type) = indices.update_indices(ctx, vp)?;
                if count > 0 {
                    gl.draw_elements(mode, count, element_type, 0);
                }
            }
        }
        Ok(())
    }
}
