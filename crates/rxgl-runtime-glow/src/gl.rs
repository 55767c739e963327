//! The GL entry points the engine actually uses.
//!
//! Everything above this module talks to [`GlBackend`] with plain handle
//! newtypes; [`crate::GlowBackend`] maps them onto a real glow context and
//! [`crate::RecordingBackend`] records them for tests.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

/// GL state machine, object-safe and `&self` like glow's `HasContext`.
///
/// Creation calls return the driver's message on failure; everything else is
/// fire-and-forget, matching GL.
pub trait GlBackend {
    // ---- shaders / programs ----
    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderHandle, String>;
    fn shader_source(&self, shader: ShaderHandle, source: &str);
    fn compile_shader(&self, shader: ShaderHandle);
    fn shader_compile_status(&self, shader: ShaderHandle) -> bool;
    fn shader_info_log(&self, shader: ShaderHandle) -> String;
    fn delete_shader(&self, shader: ShaderHandle);

    fn create_program(&self) -> Result<ProgramHandle, String>;
    fn attach_shader(&self, program: ProgramHandle, shader: ShaderHandle);
    fn detach_shader(&self, program: ProgramHandle, shader: ShaderHandle);
    fn link_program(&self, program: ProgramHandle);
    fn program_link_status(&self, program: ProgramHandle) -> bool;
    fn program_info_log(&self, program: ProgramHandle) -> String;
    fn delete_program(&self, program: ProgramHandle);
    fn use_program(&self, program: Option<ProgramHandle>);

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    // ---- vertex state ----
    fn create_vertex_array(&self) -> Result<VertexArrayHandle, String>;
    fn bind_vertex_array(&self, vao: Option<VertexArrayHandle>);
    fn delete_vertex_array(&self, vao: VertexArrayHandle);

    fn create_buffer(&self) -> Result<BufferHandle, String>;
    fn bind_buffer(&self, target: u32, buffer: Option<BufferHandle>);
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    fn delete_buffer(&self, buffer: BufferHandle);

    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn enable_vertex_attrib_array(&self, index: u32);

    // ---- uniforms ----
    /// `components` is 1..=4 (`float` .. `vec4`).
    fn uniform_f32(&self, location: UniformLocation, components: u8, data: &[f32]);
    /// `components` is 1..=4 (`int` .. `ivec4`, also `bool` and samplers).
    fn uniform_i32(&self, location: UniformLocation, components: u8, data: &[i32]);
    /// `dim` is 2..=4 (`mat2` .. `mat4`), column-major.
    fn uniform_matrix_f32(&self, location: UniformLocation, dim: u8, transpose: bool, data: &[f32]);

    // ---- textures ----
    fn create_texture(&self) -> Result<TextureHandle, String>;
    /// `unit` is the zero-based unit index, not the `TEXTURE0 + n` enum.
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<TextureHandle>);
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);
    #[allow(clippy::too_many_arguments)]
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
    );
    fn delete_texture(&self, texture: TextureHandle);

    // ---- frame ----
    fn get_parameter_i32(&self, parameter: u32) -> i32;
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&self, mask: u32);
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32);
}
