//! Per-program shadow of GPU state.
//!
//! Tokens consult a [`VirtualProgram`] before every GL call: which buffer each
//! attribute location last pointed at, what value each uniform location last
//! received, and which texture unit each texture sits in. Shadows are never
//! shared between programs; the buffer and texture registries are, since GL
//! objects are per context.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use rxgl_reactive::{BindingKey, Record, Registry};
use tracing::{debug, trace};

use crate::attribute::{BufferData, BufferId};
use crate::context::GlContext;
use crate::gl::{BufferHandle, GlBackend, ProgramHandle, TextureHandle, UniformLocation, VertexArrayHandle};
use crate::texture::{Texture, TextureId};
use crate::texture_slots::{Enqueued, TextureSlots};
use crate::uniform::UniformValue;
use crate::EngineError;

#[derive(Debug)]
pub struct GlBuffer {
    pub handle: BufferHandle,
}

#[derive(Debug)]
pub struct GlTexture {
    pub handle: TextureHandle,
}

pub type BufferRegistry = Registry<BufferId, GlBuffer>;
pub type TextureRegistry = Registry<TextureId, GlTexture>;

#[derive(Debug)]
struct UniformShadow {
    value: Option<UniformValue>,
    dirty: bool,
}

/// A sampler waiting for its texture's unit.
#[derive(Debug)]
pub(crate) struct SamplerRequest {
    texture: Texture,
    location: UniformLocation,
}

#[derive(Debug)]
pub struct VirtualProgram {
    program: ProgramHandle,
    vao: VertexArrayHandle,
    key: BindingKey,
    attributes: RefCell<HashMap<u32, BufferId>>,
    dirty_attributes: RefCell<HashSet<u32>>,
    index: Cell<Option<BufferId>>,
    index_dirty: Cell<bool>,
    uniforms: RefCell<HashMap<UniformLocation, UniformShadow>>,
    sampled: RefCell<HashMap<UniformLocation, TextureId>>,
    buffers: Rc<BufferRegistry>,
    textures: Rc<TextureRegistry>,
    slots: RefCell<TextureSlots<TextureId, SamplerRequest>>,
}

impl VirtualProgram {
    pub(crate) fn new(
        program: ProgramHandle,
        vao: VertexArrayHandle,
        key: BindingKey,
        buffers: Rc<BufferRegistry>,
        textures: Rc<TextureRegistry>,
        texture_units: u32,
    ) -> Self {
        Self {
            program,
            vao,
            key,
            attributes: RefCell::new(HashMap::new()),
            dirty_attributes: RefCell::new(HashSet::new()),
            index: Cell::new(None),
            index_dirty: Cell::new(false),
            uniforms: RefCell::new(HashMap::new()),
            sampled: RefCell::new(HashMap::new()),
            buffers,
            textures,
            slots: RefCell::new(TextureSlots::new(texture_units)),
        }
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn vao(&self) -> VertexArrayHandle {
        self.vao
    }

    pub fn binding_key(&self) -> BindingKey {
        self.key
    }

    // ---- buffers / attributes ----

    /// The GL buffer for `data`'s identity, created (dirty) on first use.
    pub fn register_buffer(
        &self,
        gl: &dyn GlBackend,
        data: &BufferData,
    ) -> Result<Rc<Record<GlBuffer>>, EngineError> {
        self.buffers.try_register(data.id(), || {
            let handle = gl
                .create_buffer()
                .map_err(|e| EngineError::GlCreate(format!("create_buffer failed: {e}")))?;
            debug!(buffer = ?data.id(), handle = handle.0, "created GL buffer");
            Ok(GlBuffer { handle })
        })
    }

    pub fn dirty_buffer(&self, id: BufferId) -> bool {
        self.buffers.mark_dirty(&id)
    }

    /// `true` when `index` already points at buffer `id` and nothing forced a rebind.
    pub fn check_attribute(&self, index: u32, id: BufferId) -> bool {
        !self.dirty_attributes.borrow().contains(&index)
            && self.attributes.borrow().get(&index) == Some(&id)
    }

    pub fn set_attribute(&self, index: u32, id: BufferId) {
        self.attributes.borrow_mut().insert(index, id);
        self.dirty_attributes.borrow_mut().remove(&index);
    }

    pub fn dirty_attribute(&self, index: u32) {
        self.dirty_attributes.borrow_mut().insert(index);
    }

    pub fn check_index(&self, id: BufferId) -> bool {
        !self.index_dirty.get() && self.index.get() == Some(id)
    }

    pub fn set_index(&self, id: BufferId) {
        self.index.set(Some(id));
        self.index_dirty.set(false);
    }

    pub fn dirty_index(&self) {
        self.index_dirty.set(true);
    }

    // ---- uniforms ----

    /// Start tracking `location`; it stays dirty until the first upload.
    pub fn register_uniform(&self, location: UniformLocation) {
        self.uniforms
            .borrow_mut()
            .entry(location)
            .or_insert(UniformShadow {
                value: None,
                dirty: true,
            });
    }

    /// `true` when the slot already holds `value` and is clean.
    pub fn check_uniform(&self, location: UniformLocation, value: &UniformValue) -> bool {
        self.uniforms
            .borrow()
            .get(&location)
            .is_some_and(|s| !s.dirty && s.value.as_ref() == Some(value))
    }

    pub fn set_uniform(&self, location: UniformLocation, value: UniformValue) {
        let mut uniforms = self.uniforms.borrow_mut();
        let shadow = uniforms.entry(location).or_insert(UniformShadow {
            value: None,
            dirty: false,
        });
        shadow.value = Some(value);
        shadow.dirty = false;
    }

    pub fn dirty_uniform(&self, location: UniformLocation) {
        if let Some(shadow) = self.uniforms.borrow_mut().get_mut(&location) {
            shadow.dirty = true;
        }
    }

    pub fn uniform_value(&self, location: UniformLocation) -> Option<UniformValue> {
        self.uniforms
            .borrow()
            .get(&location)
            .and_then(|s| s.value.clone())
    }

    // ---- textures ----

    pub fn register_texture(
        &self,
        gl: &dyn GlBackend,
        texture: &Texture,
    ) -> Result<Rc<Record<GlTexture>>, EngineError> {
        self.textures.try_register(texture.id(), || {
            let handle = gl
                .create_texture()
                .map_err(|e| EngineError::GlCreate(format!("create_texture failed: {e}")))?;
            debug!(texture = ?texture.id(), handle = handle.0, "created GL texture");
            Ok(GlTexture { handle })
        })
    }

    pub fn dirty_texture(&self, id: TextureId) -> bool {
        self.textures.mark_dirty(&id)
    }

    /// The texture `location` sampled in the last pass that drew it.
    pub fn sampled_texture(&self, location: UniformLocation) -> Option<TextureId> {
        self.sampled.borrow().get(&location).copied()
    }

    pub fn texture_unit(&self, id: TextureId) -> Option<u32> {
        self.slots.borrow().unit_of(&id)
    }

    /// Point `location` at `texture`'s unit, now if it has one, otherwise at
    /// the next [`VirtualProgram::resolve_texture_bindings`].
    pub(crate) fn enqueue_texture(
        &self,
        ctx: &GlContext,
        texture: Texture,
        location: UniformLocation,
    ) -> Result<(), EngineError> {
        let id = texture.id();
        let enqueued = self
            .slots
            .borrow_mut()
            .enqueue(id, SamplerRequest { texture, location });
        match enqueued {
            Enqueued::Ready(unit, request) => self.apply_sampler(ctx, unit, &request),
            Enqueued::Queued => Ok(()),
        }
    }

    /// Assign units to every queued sampler and issue their binds.
    pub fn resolve_texture_bindings(&self, ctx: &GlContext) -> Result<(), EngineError> {
        let resolved = self.slots.borrow_mut().resolve();
        for (unit, requests) in resolved {
            for request in &requests {
                self.apply_sampler(ctx, unit, request)?;
            }
        }
        Ok(())
    }

    fn apply_sampler(
        &self,
        ctx: &GlContext,
        unit: u32,
        request: &SamplerRequest,
    ) -> Result<(), EngineError> {
        let record = self.register_texture(ctx.gl(), &request.texture)?;
        ctx.bind_texture_unit(unit, record.value().handle);
        if record.is_dirty() {
            trace!(texture = ?request.texture.id(), unit, "uploading texture");
            request.texture.image().with(|image| image.upload(ctx.gl()));
            record.clear_dirty();
        }
        let value = UniformValue::Int(unit as i32);
        if !self.check_uniform(request.location, &value) {
            value.upload(ctx.gl(), request.location);
            self.set_uniform(request.location, value);
        }
        self.sampled
            .borrow_mut()
            .insert(request.location, request.texture.id());
        Ok(())
    }
}
