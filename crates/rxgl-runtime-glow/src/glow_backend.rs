//! [`GlBackend`] over a real glow context.
#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use glow::HasContext;
use tracing::warn;

use crate::gl::{
    BufferHandle, GlBackend, ProgramHandle, ShaderHandle, ShaderStage, TextureHandle,
    UniformLocation, VertexArrayHandle,
};

/// Maps our u32 handles onto glow's native object types.
struct HandleTable<T> {
    next: Cell<u32>,
    entries: RefCell<HashMap<u32, T>>,
}

impl<T: Clone> HandleTable<T> {
    fn new() -> Self {
        Self {
            next: Cell::new(0),
            entries: RefCell::new(HashMap::new()),
        }
    }

    fn insert(&self, native: T) -> u32 {
        let id = self.next.get() + 1;
        self.next.set(id);
        self.entries.borrow_mut().insert(id, native);
        id
    }

    fn get(&self, id: u32, what: &str) -> Option<T> {
        let native = self.entries.borrow().get(&id).cloned();
        if native.is_none() {
            warn!(handle = id, "unknown {what} handle");
        }
        native
    }

    fn remove(&self, id: u32, what: &str) -> Option<T> {
        let native = self.entries.borrow_mut().remove(&id);
        if native.is_none() {
            warn!(handle = id, "deleting unknown {what} handle");
        }
        native
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Uniform locations, keyed by owning program and name so each lookup hits
/// the driver once per program.
struct UniformTable<T> {
    locations: HandleTable<T>,
    by_name: RefCell<HashMap<(u32, String), u32>>,
}

impl<T: Clone> UniformTable<T> {
    fn new() -> Self {
        Self {
            locations: HandleTable::new(),
            by_name: RefCell::new(HashMap::new()),
        }
    }

    fn lookup(&self, program: u32, name: &str, query: impl FnOnce() -> Option<T>) -> Option<u32> {
        let key = (program, name.to_owned());
        if let Some(id) = self.by_name.borrow().get(&key) {
            return Some(*id);
        }
        let id = self.locations.insert(query()?);
        self.by_name.borrow_mut().insert(key, id);
        Some(id)
    }

    fn get(&self, id: u32) -> Option<T> {
        self.locations.get(id, "uniform location")
    }

    /// Drop every location that belongs to `program`.
    fn forget_program(&self, program: u32) {
        let mut stale = Vec::new();
        self.by_name.borrow_mut().retain(|(owner, _), id| {
            if *owner == program {
                stale.push(*id);
                return false;
            }
            true
        });
        for id in stale {
            self.locations.remove(id, "uniform location");
        }
    }

    fn len(&self) -> usize {
        self.locations.len()
    }
}

pub struct GlowBackend<C: HasContext> {
    gl: C,
    shaders: HandleTable<C::Shader>,
    programs: HandleTable<C::Program>,
    buffers: HandleTable<C::Buffer>,
    textures: HandleTable<C::Texture>,
    vertex_arrays: HandleTable<C::VertexArray>,
    uniforms: UniformTable<C::UniformLocation>,
}

impl<C: HasContext> fmt::Debug for GlowBackend<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowBackend")
            .field("programs", &self.programs.len())
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("vertex_arrays", &self.vertex_arrays.len())
            .field("uniforms", &self.uniforms.len())
            .finish_non_exhaustive()
    }
}

impl<C: HasContext> GlowBackend<C> {
    pub fn new(gl: C) -> Self {
        Self {
            gl,
            shaders: HandleTable::new(),
            programs: HandleTable::new(),
            buffers: HandleTable::new(),
            textures: HandleTable::new(),
            vertex_arrays: HandleTable::new(),
            uniforms: UniformTable::new(),
        }
    }

    /// The wrapped context, for host code that needs GL calls outside the engine.
    pub fn context(&self) -> &C {
        &self.gl
    }
}

#[cfg(target_arch = "wasm32")]
impl GlowBackend<glow::Context> {
    pub fn from_webgl2(context: web_sys::WebGl2RenderingContext) -> Self {
        Self::new(glow::Context::from_webgl2_context(context))
    }
}

impl<C: HasContext> GlBackend for GlowBackend<C> {
    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderHandle, String> {
        let shader = unsafe { self.gl.create_shader(stage.gl_enum()) }?;
        Ok(ShaderHandle(self.shaders.insert(shader)))
    }

    fn shader_source(&self, shader: ShaderHandle, source: &str) {
        if let Some(s) = self.shaders.get(shader.0, "shader") {
            unsafe { self.gl.shader_source(s, source) }
        }
    }

    fn compile_shader(&self, shader: ShaderHandle) {
        if let Some(s) = self.shaders.get(shader.0, "shader") {
            unsafe { self.gl.compile_shader(s) }
        }
    }

    fn shader_compile_status(&self, shader: ShaderHandle) -> bool {
        self.shaders
            .get(shader.0, "shader")
            .is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> String {
        self.shaders
            .get(shader.0, "shader")
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: ShaderHandle) {
        if let Some(s) = self.shaders.remove(shader.0, "shader") {
            unsafe { self.gl.delete_shader(s) }
        }
    }

    fn create_program(&self) -> Result<ProgramHandle, String> {
        let program = unsafe { self.gl.create_program() }?;
        Ok(ProgramHandle(self.programs.insert(program)))
    }

    fn attach_shader(&self, program: ProgramHandle, shader: ShaderHandle) {
        if let (Some(p), Some(s)) = (
            self.programs.get(program.0, "program"),
            self.shaders.get(shader.0, "shader"),
        ) {
            unsafe { self.gl.attach_shader(p, s) }
        }
    }

    fn detach_shader(&self, program: ProgramHandle, shader: ShaderHandle) {
        if let (Some(p), Some(s)) = (
            self.programs.get(program.0, "program"),
            self.shaders.get(shader.0, "shader"),
        ) {
            unsafe { self.gl.detach_shader(p, s) }
        }
    }

    fn link_program(&self, program: ProgramHandle) {
        if let Some(p) = self.programs.get(program.0, "program") {
            unsafe { self.gl.link_program(p) }
        }
    }

    fn program_link_status(&self, program: ProgramHandle) -> bool {
        self.programs
            .get(program.0, "program")
            .is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }

    fn program_info_log(&self, program: ProgramHandle) -> String {
        self.programs
            .get(program.0, "program")
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn delete_program(&self, program: ProgramHandle) {
        if let Some(p) = self.programs.remove(program.0, "program") {
            unsafe { self.gl.delete_program(p) }
        }
        self.uniforms.forget_program(program.0);
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        let native = match program {
            Some(handle) => match self.programs.get(handle.0, "program") {
                Some(p) => Some(p),
                None => return,
            },
            None => None,
        };
        unsafe { self.gl.use_program(native) }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let id = self.uniforms.lookup(program.0, name, || {
            let p = self.programs.get(program.0, "program")?;
            unsafe { self.gl.get_uniform_location(p, name) }
        })?;
        Some(UniformLocation(id))
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let p = self.programs.get(program.0, "program")?;
        unsafe { self.gl.get_attrib_location(p, name) }
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle, String> {
        let vao = unsafe { self.gl.create_vertex_array() }?;
        Ok(VertexArrayHandle(self.vertex_arrays.insert(vao)))
    }

    fn bind_vertex_array(&self, vao: Option<VertexArrayHandle>) {
        let native = match vao {
            Some(handle) => match self.vertex_arrays.get(handle.0, "vertex array") {
                Some(v) => Some(v),
                None => return,
            },
            None => None,
        };
        unsafe { self.gl.bind_vertex_array(native) }
    }

    fn delete_vertex_array(&self, vao: VertexArrayHandle) {
        if let Some(v) = self.vertex_arrays.remove(vao.0, "vertex array") {
            unsafe { self.gl.delete_vertex_array(v) }
        }
    }

    fn create_buffer(&self) -> Result<BufferHandle, String> {
        let buffer = unsafe { self.gl.create_buffer() }?;
        Ok(BufferHandle(self.buffers.insert(buffer)))
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferHandle>) {
        let native = match buffer {
            Some(handle) => match self.buffers.get(handle.0, "buffer") {
                Some(b) => Some(b),
                None => return,
            },
            None => None,
        };
        unsafe { self.gl.bind_buffer(target, native) }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        if let Some(b) = self.buffers.remove(buffer.0, "buffer") {
            unsafe { self.gl.delete_buffer(b) }
        }
    }

    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, data_type, normalized, stride, offset)
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn uniform_f32(&self, location: UniformLocation, components: u8, data: &[f32]) {
        let Some(loc) = self.uniforms.get(location.0) else {
            return;
        };
        let loc = Some(&loc);
        unsafe {
            match components {
                1 => self.gl.uniform_1_f32_slice(loc, data),
                2 => self.gl.uniform_2_f32_slice(loc, data),
                3 => self.gl.uniform_3_f32_slice(loc, data),
                4 => self.gl.uniform_4_f32_slice(loc, data),
                n => warn!(components = n, "unsupported float uniform width"),
            }
        }
    }

    fn uniform_i32(&self, location: UniformLocation, components: u8, data: &[i32]) {
        let Some(loc) = self.uniforms.get(location.0) else {
            return;
        };
        let loc = Some(&loc);
        unsafe {
            match components {
                1 => self.gl.uniform_1_i32_slice(loc, data),
                2 => self.gl.uniform_2_i32_slice(loc, data),
                3 => self.gl.uniform_3_i32_slice(loc, data),
                4 => self.gl.uniform_4_i32_slice(loc, data),
                n => warn!(components = n, "unsupported int uniform width"),
            }
        }
    }

    fn uniform_matrix_f32(&self, location: UniformLocation, dim: u8, transpose: bool, data: &[f32]) {
        let Some(loc) = self.uniforms.get(location.0) else {
            return;
        };
        let loc = Some(&loc);
        unsafe {
            match dim {
                2 => self.gl.uniform_matrix_2_f32_slice(loc, transpose, data),
                3 => self.gl.uniform_matrix_3_f32_slice(loc, transpose, data),
                4 => self.gl.uniform_matrix_4_f32_slice(loc, transpose, data),
                n => warn!(dim = n, "unsupported matrix uniform size"),
            }
        }
    }

    fn create_texture(&self) -> Result<TextureHandle, String> {
        let texture = unsafe { self.gl.create_texture() }?;
        Ok(TextureHandle(self.textures.insert(texture)))
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<TextureHandle>) {
        let native = match texture {
            Some(handle) => match self.textures.get(handle.0, "texture") {
                Some(t) => Some(t),
                None => return,
            },
            None => None,
        };
        unsafe { self.gl.bind_texture(target, native) }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                level,
                internal_format,
                width,
                height,
                0,
                format,
                ty,
                pixels,
            )
        }
    }

    fn delete_texture(&self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(texture.0, "texture") {
            unsafe { self.gl.delete_texture(t) }
        }
    }

    fn get_parameter_i32(&self, parameter: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(parameter) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, element_type, offset) }
    }
}
