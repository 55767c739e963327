//! Vertex/index buffers and attribute tokens.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rxgl_reactive::{Atom, BindFlow, Record};
use tracing::trace;

use crate::context::GlContext;
use crate::token::{Dialect, IntoToken, Location, Token, TokenKind, TokenRef};
use crate::virtual_program::{GlBuffer, VirtualProgram};
use crate::EngineError;

/// Identity of a buffer's contents; one GL buffer exists per id per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BufferId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    U8,
    U16,
    U32,
}

impl ElementType {
    pub fn gl_type(self) -> u32 {
        match self {
            ElementType::F32 => glow::FLOAT,
            ElementType::U8 => glow::UNSIGNED_BYTE,
            ElementType::U16 => glow::UNSIGNED_SHORT,
            ElementType::U32 => glow::UNSIGNED_INT,
        }
    }

    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::F32 | ElementType::U32 => 4,
        }
    }
}

/// Immutable buffer contents plus an identity.
///
/// Assigning a new `BufferData` to a [`BufferToken`] creates a new GL buffer;
/// [`BufferData::replace`] keeps the identity so the existing GL buffer is
/// re-filled instead.
#[derive(Clone)]
pub struct BufferData {
    id: BufferId,
    bytes: Rc<[u8]>,
    element: ElementType,
}

impl fmt::Debug for BufferData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferData")
            .field("id", &self.id)
            .field("element", &self.element)
            .field("len", &self.len())
            .finish()
    }
}

impl BufferData {
    fn from_bytes(bytes: &[u8], element: ElementType) -> Self {
        Self {
            id: BufferId::next(),
            bytes: Rc::from(bytes),
            element,
        }
    }

    pub fn from_f32(data: &[f32]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(data), ElementType::F32)
    }

    pub fn from_u8(data: &[u8]) -> Self {
        Self::from_bytes(data, ElementType::U8)
    }

    pub fn from_u16(data: &[u16]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(data), ElementType::U16)
    }

    pub fn from_u32(data: &[u32]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(data), ElementType::U32)
    }

    /// `next`'s contents under this buffer's identity.
    pub fn replace(&self, next: BufferData) -> BufferData {
        BufferData { id: self.id, ..next }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.element.size_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A reactive buffer with a fixed GL target and usage hint.
#[derive(Debug, Clone)]
pub struct BufferToken {
    data: Atom<BufferData>,
    target: u32,
    usage: u32,
}

impl BufferToken {
    pub fn new(data: BufferData, target: u32, usage: u32) -> Self {
        Self {
            data: Atom::new(data),
            target,
            usage,
        }
    }

    /// `ARRAY_BUFFER`, `STATIC_DRAW`.
    pub fn vertices(data: BufferData) -> Self {
        Self::new(data, glow::ARRAY_BUFFER, glow::STATIC_DRAW)
    }

    /// `ELEMENT_ARRAY_BUFFER`, `STATIC_DRAW`. Expects u8/u16/u32 data.
    pub fn indices(data: BufferData) -> Self {
        Self::new(data, glow::ELEMENT_ARRAY_BUFFER, glow::STATIC_DRAW)
    }

    pub fn with_usage(mut self, usage: u32) -> Self {
        self.usage = usage;
        self
    }

    pub fn atom(&self) -> &Atom<BufferData> {
        &self.data
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn get(&self) -> BufferData {
        self.data.get()
    }

    pub fn set(&self, data: BufferData) {
        self.data.set(data);
    }

    /// Bind + (if dirty) upload. Returns the record so callers can finish
    /// their own slot bookkeeping.
    fn sync(
        &self,
        ctx: &GlContext,
        vp: &VirtualProgram,
        data: &BufferData,
        bound_already: bool,
    ) -> Result<Option<Rc<Record<GlBuffer>>>, EngineError> {
        let record = vp.register_buffer(ctx.gl(), data)?;
        if bound_already && !record.is_dirty() {
            return Ok(None);
        }
        let gl = ctx.gl();
        gl.bind_buffer(self.target, Some(record.value().handle));
        if record.is_dirty() {
            trace!(buffer = ?data.id(), bytes = data.bytes().len(), "uploading buffer");
            gl.buffer_data(self.target, data.bytes(), self.usage);
            record.clear_dirty();
        }
        Ok(Some(record))
    }

    /// Tie the index buffer to a program: data changes re-upload and re-render.
    pub(crate) fn bind_indices(&self, ctx: &GlContext, vp: &Rc<VirtualProgram>) {
        let weak = Rc::downgrade(vp);
        self.data
            .bind_with(vp.binding_key(), ctx.requester(), move |data: &BufferData| {
                if let Some(vp) = weak.upgrade() {
                    vp.dirty_buffer(data.id());
                    vp.dirty_index();
                }
                BindFlow::Render
            });
    }

    /// Make this the program's element buffer. Returns `(count, element type)`
    /// for `draw_elements`.
    pub(crate) fn update_indices(
        &self,
        ctx: &GlContext,
        vp: &VirtualProgram,
    ) -> Result<(i32, u32), EngineError> {
        self.data.run_before_draw();
        let data = self.data.get();
        let bound = vp.check_index(data.id());
        if self.sync(ctx, vp, &data, bound)?.is_some() {
            vp.set_index(data.id());
        }
        Ok((data.len() as i32, data.element().gl_type()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttribKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl AttribKind {
    pub fn glsl_name(self) -> &'static str {
        match self {
            AttribKind::Float => "float",
            AttribKind::Vec2 => "vec2",
            AttribKind::Vec3 => "vec3",
            AttribKind::Vec4 => "vec4",
        }
    }

    pub fn components(self) -> i32 {
        match self {
            AttribKind::Float => 1,
            AttribKind::Vec2 => 2,
            AttribKind::Vec3 => 3,
            AttribKind::Vec4 => 4,
        }
    }
}

/// Per-vertex input backed by a [`BufferToken`].
#[derive(Debug, Clone)]
pub struct Attribute {
    buffer: BufferToken,
    kind: AttribKind,
    normalized: bool,
    stride: i32,
    offset: i32,
}

impl Attribute {
    pub fn new(kind: AttribKind, data: BufferData) -> Self {
        Self::from_buffer(kind, BufferToken::vertices(data))
    }

    pub fn from_buffer(kind: AttribKind, buffer: BufferToken) -> Self {
        Self {
            buffer,
            kind,
            normalized: false,
            stride: 0,
            offset: 0,
        }
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Interleaved layout, in bytes.
    pub fn layout(mut self, stride: i32, offset: i32) -> Self {
        self.stride = stride;
        self.offset = offset;
        self
    }

    pub fn buffer(&self) -> &BufferToken {
        &self.buffer
    }

    pub fn set(&self, data: BufferData) {
        self.buffer.set(data);
    }
}

impl Token for Attribute {
    fn id(&self) -> u64 {
        self.buffer.data.id().raw()
    }

    fn kind(&self) -> TokenKind {
        TokenKind::Attribute
    }

    fn declaration(&self, name: &str, dialect: Dialect) -> String {
        let qualifier = match dialect {
            Dialect::Es100 => "attribute",
            Dialect::Es300 => "in",
        };
        format!("{qualifier} {} {name};", self.kind.glsl_name())
    }

    fn bind(&self, ctx: &GlContext, vp: &Rc<VirtualProgram>, location: Location) {
        let Location::Attribute(index) = location else {
            return;
        };
        let weak = Rc::downgrade(vp);
        self.buffer
            .data
            .bind_with(vp.binding_key(), ctx.requester(), move |data: &BufferData| {
                if let Some(vp) = weak.upgrade() {
                    vp.dirty_buffer(data.id());
                    vp.dirty_attribute(index);
                }
                BindFlow::Render
            });
    }

    fn update(
        &self,
        ctx: &GlContext,
        vp: &VirtualProgram,
        location: Location,
    ) -> Result<(), EngineError> {
        self.buffer.data.run_before_draw();
        let Location::Attribute(index) = location else {
            return Ok(());
        };
        let data = self.buffer.data.get();
        let bound = vp.check_attribute(index, data.id());
        if self.buffer.sync(ctx, vp, &data, bound)?.is_none() {
            return Ok(());
        }
        let gl = ctx.gl();
        gl.vertex_attrib_pointer(
            index,
            self.kind.components(),
            data.element().gl_type(),
            self.normalized,
            self.stride,
            self.offset,
        );
        gl.enable_vertex_attrib_array(index);
        vp.set_attribute(index, data.id());
        Ok(())
    }
}

impl IntoToken for Attribute {
    fn into_token(self) -> TokenRef {
        Rc::new(self)
    }
}
