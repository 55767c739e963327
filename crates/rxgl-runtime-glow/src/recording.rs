//! A headless [`GlBackend`] that records every state-changing call.
//!
//! Used by the unit tests in this crate and by `rxgl-contract-tests` to assert
//! on exact GL traffic ("one upload", "no redundant binds").

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::gl::{
    BufferHandle, GlBackend, ProgramHandle, ShaderHandle, ShaderStage, TextureHandle,
    UniformLocation, VertexArrayHandle,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    CreateShader(ShaderStage, ShaderHandle),
    ShaderSource(ShaderHandle, String),
    CompileShader(ShaderHandle),
    DeleteShader(ShaderHandle),
    CreateProgram(ProgramHandle),
    AttachShader(ProgramHandle, ShaderHandle),
    DetachShader(ProgramHandle, ShaderHandle),
    LinkProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    DeleteVertexArray(VertexArrayHandle),
    CreateBuffer(BufferHandle),
    BindBuffer {
        target: u32,
        buffer: Option<BufferHandle>,
    },
    BufferData {
        target: u32,
        data: Vec<u8>,
        usage: u32,
    },
    DeleteBuffer(BufferHandle),
    VertexAttribPointer {
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    },
    EnableVertexAttribArray(u32),
    UniformF32 {
        location: UniformLocation,
        components: u8,
        data: Vec<f32>,
    },
    UniformI32 {
        location: UniformLocation,
        components: u8,
        data: Vec<i32>,
    },
    UniformMatrixF32 {
        location: UniformLocation,
        dim: u8,
        transpose: bool,
        data: Vec<f32>,
    },
    CreateTexture(TextureHandle),
    ActiveTexture(u32),
    BindTexture {
        target: u32,
        texture: Option<TextureHandle>,
    },
    TexParameter {
        target: u32,
        parameter: u32,
        value: i32,
    },
    TexImage2d {
        target: u32,
        width: i32,
        height: i32,
        format: u32,
        bytes: Option<usize>,
    },
    DeleteTexture(TextureHandle),
    Viewport(i32, i32, i32, i32),
    ClearColor([f32; 4]),
    Clear(u32),
    DrawArrays {
        mode: u32,
        first: i32,
        count: i32,
    },
    DrawElements {
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
    },
}

impl GlCall {
    pub fn is_uniform_upload(&self) -> bool {
        matches!(
            self,
            GlCall::UniformF32 { .. } | GlCall::UniformI32 { .. } | GlCall::UniformMatrixF32 { .. }
        )
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. })
    }
}

#[derive(Debug)]
pub struct RecordingBackend {
    calls: RefCell<Vec<GlCall>>,
    next_handle: Cell<u32>,
    shader_stages: RefCell<HashMap<ShaderHandle, ShaderStage>>,
    uniform_locations: RefCell<HashMap<(ProgramHandle, String), UniformLocation>>,
    attrib_locations: RefCell<HashMap<(ProgramHandle, String), u32>>,
    next_attrib: RefCell<HashMap<ProgramHandle, u32>>,
    inactive: RefCell<HashSet<String>>,
    compile_failure: RefCell<Option<(ShaderStage, String)>>,
    link_failure: RefCell<Option<String>>,
    parameters: RefCell<HashMap<u32, i32>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        let mut parameters = HashMap::new();
        parameters.insert(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS, 16);
        Self {
            calls: RefCell::new(Vec::new()),
            next_handle: Cell::new(0),
            shader_stages: RefCell::new(HashMap::new()),
            uniform_locations: RefCell::new(HashMap::new()),
            attrib_locations: RefCell::new(HashMap::new()),
            next_attrib: RefCell::new(HashMap::new()),
            inactive: RefCell::new(HashSet::new()),
            compile_failure: RefCell::new(None),
            link_failure: RefCell::new(None),
            parameters: RefCell::new(parameters),
        }
    }

    /// Every recorded call since creation (or the last [`RecordingBackend::take_calls`]).
    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<GlCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    /// Source text of every shader compiled so far, in creation order.
    pub fn shader_sources(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                GlCall::ShaderSource(_, src) => Some(src.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make the next shaders of `stage` fail to compile with `log`.
    pub fn fail_compile(&self, stage: ShaderStage, log: impl Into<String>) {
        *self.compile_failure.borrow_mut() = Some((stage, log.into()));
    }

    /// Make the next links fail with `log`.
    pub fn fail_link(&self, log: impl Into<String>) {
        *self.link_failure.borrow_mut() = Some(log.into());
    }

    pub fn clear_failures(&self) {
        self.compile_failure.borrow_mut().take();
        self.link_failure.borrow_mut().take();
    }

    /// Pretend the linker optimized `name` away: location lookups return `None`.
    pub fn mark_inactive(&self, name: impl Into<String>) {
        self.inactive.borrow_mut().insert(name.into());
    }

    pub fn set_parameter(&self, parameter: u32, value: i32) {
        self.parameters.borrow_mut().insert(parameter, value);
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }

    fn handle(&self) -> u32 {
        let id = self.next_handle.get() + 1;
        self.next_handle.set(id);
        id
    }
}

impl GlBackend for RecordingBackend {
    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderHandle, String> {
        let shader = ShaderHandle(self.handle());
        self.shader_stages.borrow_mut().insert(shader, stage);
        self.record(GlCall::CreateShader(stage, shader));
        Ok(shader)
    }

    fn shader_source(&self, shader: ShaderHandle, source: &str) {
        self.record(GlCall::ShaderSource(shader, source.to_owned()));
    }

    fn compile_shader(&self, shader: ShaderHandle) {
        self.record(GlCall::CompileShader(shader));
    }

    fn shader_compile_status(&self, shader: ShaderHandle) -> bool {
        let stage = self.shader_stages.borrow().get(&shader).copied();
        match (&*self.compile_failure.borrow(), stage) {
            (Some((failing, _)), Some(stage)) => *failing != stage,
            _ => true,
        }
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> String {
        let stage = self.shader_stages.borrow().get(&shader).copied();
        match (&*self.compile_failure.borrow(), stage) {
            (Some((failing, log)), Some(stage)) if *failing == stage => log.clone(),
            _ => String::new(),
        }
    }

    fn delete_shader(&self, shader: ShaderHandle) {
        self.shader_stages.borrow_mut().remove(&shader);
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Result<ProgramHandle, String> {
        let program = ProgramHandle(self.handle());
        self.record(GlCall::CreateProgram(program));
        Ok(program)
    }

    fn attach_shader(&self, program: ProgramHandle, shader: ShaderHandle) {
        self.record(GlCall::AttachShader(program, shader));
    }

    fn detach_shader(&self, program: ProgramHandle, shader: ShaderHandle) {
        self.record(GlCall::DetachShader(program, shader));
    }

    fn link_program(&self, program: ProgramHandle) {
        self.record(GlCall::LinkProgram(program));
    }

    fn program_link_status(&self, _program: ProgramHandle) -> bool {
        self.link_failure.borrow().is_none()
    }

    fn program_info_log(&self, _program: ProgramHandle) -> String {
        self.link_failure.borrow().clone().unwrap_or_default()
    }

    fn delete_program(&self, program: ProgramHandle) {
        self.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        self.record(GlCall::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        if self.inactive.borrow().contains(name) {
            return None;
        }
        let key = (program, name.to_owned());
        if let Some(loc) = self.uniform_locations.borrow().get(&key) {
            return Some(*loc);
        }
        let loc = UniformLocation(self.handle());
        self.uniform_locations.borrow_mut().insert(key, loc);
        Some(loc)
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        if self.inactive.borrow().contains(name) {
            return None;
        }
        let key = (program, name.to_owned());
        if let Some(index) = self.attrib_locations.borrow().get(&key) {
            return Some(*index);
        }
        let mut next = self.next_attrib.borrow_mut();
        let slot = next.entry(program).or_insert(0);
        let index = *slot;
        *slot += 1;
        self.attrib_locations.borrow_mut().insert(key, index);
        Some(index)
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle, String> {
        let vao = VertexArrayHandle(self.handle());
        self.record(GlCall::CreateVertexArray(vao));
        Ok(vao)
    }

    fn bind_vertex_array(&self, vao: Option<VertexArrayHandle>) {
        self.record(GlCall::BindVertexArray(vao));
    }

    fn delete_vertex_array(&self, vao: VertexArrayHandle) {
        self.record(GlCall::DeleteVertexArray(vao));
    }

    fn create_buffer(&self) -> Result<BufferHandle, String> {
        let buffer = BufferHandle(self.handle());
        self.record(GlCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferHandle>) {
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        self.record(GlCall::BufferData {
            target,
            data: data.to_vec(),
            usage,
        });
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        self.record(GlCall::DeleteBuffer(buffer));
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
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            data_type,
            normalized,
            stride,
            offset,
        });
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn uniform_f32(&self, location: UniformLocation, components: u8, data: &[f32]) {
        self.record(GlCall::UniformF32 {
            location,
            components,
            data: data.to_vec(),
        });
    }

    fn uniform_i32(&self, location: UniformLocation, components: u8, data: &[i32]) {
        self.record(GlCall::UniformI32 {
            location,
            components,
            data: data.to_vec(),
        });
    }

    fn uniform_matrix_f32(&self, location: UniformLocation, dim: u8, transpose: bool, data: &[f32]) {
        self.record(GlCall::UniformMatrixF32 {
            location,
            dim,
            transpose,
            data: data.to_vec(),
        });
    }

    fn create_texture(&self) -> Result<TextureHandle, String> {
        let texture = TextureHandle(self.handle());
        self.record(GlCall::CreateTexture(texture));
        Ok(texture)
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: u32, texture: Option<TextureHandle>) {
        self.record(GlCall::BindTexture { target, texture });
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        self.record(GlCall::TexParameter {
            target,
            parameter,
            value,
        });
    }

    fn tex_image_2d(
        &self,
        target: u32,
        _level: i32,
        _internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        _ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage2d {
            target,
            width,
            height,
            format,
            bytes: pixels.map(<[u8]>::len),
        });
    }

    fn delete_texture(&self, texture: TextureHandle) {
        self.record(GlCall::DeleteTexture(texture));
    }

    fn get_parameter_i32(&self, parameter: u32) -> i32 {
        self.parameters
            .borrow()
            .get(&parameter)
            .copied()
            .unwrap_or(0)
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor([r, g, b, a]));
    }

    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        self.record(GlCall::DrawElements {
            mode,
            count,
            element_type,
            offset,
        });
    }
}
