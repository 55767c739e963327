//! One GL context: its resource caches and its bound-state shadow.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rxgl_reactive::{BindingKey, Record, Registry, RenderRequest};
use tracing::{debug, info};

use crate::gl::{GlBackend, ProgramHandle, ShaderStage, TextureHandle, VertexArrayHandle};
use crate::shader::{CompiledShader, ShaderTemplate, TemplateId};
use crate::token::Location;
use crate::virtual_program::{BufferRegistry, TextureRegistry, VirtualProgram};
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A linked program plus what its tokens need at draw time.
#[derive(Debug)]
pub struct ProgramRecord {
    pub handle: ProgramHandle,
    /// Per distinct vertex-shader token, in template order.
    pub vertex_locations: Vec<Location>,
    /// Per distinct fragment-shader token, in template order.
    pub fragment_locations: Vec<Location>,
    pub vp: Rc<VirtualProgram>,
}

/// What this context last told GL, so redundant binds can be skipped.
#[derive(Debug, Default)]
struct BoundState {
    program: Cell<Option<ProgramHandle>>,
    vao: Cell<Option<VertexArrayHandle>>,
    active_unit: Cell<Option<u32>>,
    units: RefCell<HashMap<u32, TextureHandle>>,
}

type ProgramRegistry = Registry<TemplateId, Registry<TemplateId, ProgramRecord>>;

pub struct GlContext {
    id: ContextId,
    gl: Rc<dyn GlBackend>,
    requester: Rc<dyn RenderRequest>,
    max_texture_units: u32,
    shaders: Registry<TemplateId, CompiledShader>,
    programs: ProgramRegistry,
    buffers: Rc<BufferRegistry>,
    textures: Rc<TextureRegistry>,
    bound: BoundState,
}

impl fmt::Debug for GlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlContext")
            .field("id", &self.id)
            .field("max_texture_units", &self.max_texture_units)
            .field("shaders", &self.shaders.len())
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}

impl GlContext {
    /// `unit_cap` further limits the queried `MAX_COMBINED_TEXTURE_IMAGE_UNITS`.
    pub fn new(
        gl: Rc<dyn GlBackend>,
        requester: Rc<dyn RenderRequest>,
        unit_cap: Option<u32>,
    ) -> Self {
        let queried = gl
            .get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS)
            .max(1) as u32;
        let max_texture_units = unit_cap.map_or(queried, |cap| cap.min(queried)).max(1);
        let id = ContextId::next();
        info!(context = id.0, queried, max_texture_units, "GL context ready");
        Self {
            id,
            gl,
            requester,
            max_texture_units,
            shaders: Registry::new(),
            programs: Registry::new(),
            buffers: Rc::new(Registry::new()),
            textures: Rc::new(Registry::new()),
            bound: BoundState::default(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn gl(&self) -> &dyn GlBackend {
        self.gl.as_ref()
    }

    pub fn requester(&self) -> Rc<dyn RenderRequest> {
        Rc::clone(&self.requester)
    }

    pub fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    /// Compiled source for `template`, generated once per template identity.
    pub fn compile_shader(
        &self,
        template: &ShaderTemplate,
    ) -> Result<Rc<Record<CompiledShader>>, EngineError> {
        self.shaders.try_register(template.id(), || {
            let compiled = template.compile()?;
            debug!(
                template = template.id().raw(),
                declarations = compiled.declarations.len(),
                "generated shader source"
            );
            Ok(compiled)
        })
    }

    /// The linked program for this vertex/fragment pair, linking on first use.
    pub fn program(
        &self,
        vertex: &ShaderTemplate,
        fragment: &ShaderTemplate,
    ) -> Result<Rc<Record<ProgramRecord>>, EngineError> {
        let by_vertex = self.programs.register(vertex.id(), Registry::new);
        by_vertex
            .value()
            .try_register(fragment.id(), || self.link(vertex, fragment))
    }

    /// Look up an already-linked pair; fails if it was never linked or the
    /// context has been destroyed since.
    pub fn lookup_program(
        &self,
        vertex: TemplateId,
        fragment: TemplateId,
    ) -> Result<Rc<Record<ProgramRecord>>, EngineError> {
        self.programs
            .get(&vertex)
            .and_then(|by_vertex| by_vertex.value().get(&fragment))
            .ok_or_else(|| {
                EngineError::MissingProgram(format!(
                    "no program for vertex {:?} / fragment {:?} in context {}",
                    vertex, fragment, self.id.0
                ))
            })
    }

    fn link(
        &self,
        vertex: &ShaderTemplate,
        fragment: &ShaderTemplate,
    ) -> Result<ProgramRecord, EngineError> {
        let vs = self.compile_shader(vertex)?;
        let fs = self.compile_shader(fragment)?;
        let gl = self.gl();
        let handle = compile_program(gl, &vs.value().code, &fs.value().code)?;
        let vao = match gl.create_vertex_array() {
            Ok(vao) => vao,
            Err(e) => {
                gl.delete_program(handle);
                return Err(EngineError::GlCreate(format!(
                    "create_vertex_array failed: {e}"
                )));
            }
        };

        let vp = Rc::new(VirtualProgram::new(
            handle,
            vao,
            BindingKey::new(self.id.0, u64::from(handle.0)),
            Rc::clone(&self.buffers),
            Rc::clone(&self.textures),
            self.max_texture_units,
        ));
        info!(
            program = handle.0,
            vertex = vertex.id().raw(),
            fragment = fragment.id().raw(),
            "linked program"
        );
        Ok(ProgramRecord {
            handle,
            vertex_locations: vertex.locations(gl, handle),
            fragment_locations: fragment.locations(gl, handle),
            vp,
        })
    }

    // ---- bound state ----

    pub fn use_program(&self, program: ProgramHandle) {
        if self.bound.program.get() != Some(program) {
            self.gl.use_program(Some(program));
            self.bound.program.set(Some(program));
        }
    }

    pub fn bind_vertex_array(&self, vao: VertexArrayHandle) {
        if self.bound.vao.get() != Some(vao) {
            self.gl.bind_vertex_array(Some(vao));
            self.bound.vao.set(Some(vao));
        }
    }

    /// Leave `unit` active with `texture` bound to its `TEXTURE_2D` target.
    pub fn bind_texture_unit(&self, unit: u32, texture: TextureHandle) {
        if self.bound.active_unit.get() != Some(unit) {
            self.gl.active_texture(unit);
            self.bound.active_unit.set(Some(unit));
        }
        let mut units = self.bound.units.borrow_mut();
        if units.get(&unit) != Some(&texture) {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            units.insert(unit, texture);
        }
    }

    /// Delete every GL object this context created and forget all caches.
    ///
    /// Programs created before this call fail to draw afterwards
    /// ([`EngineError::MissingProgram`]).
    pub fn destroy(&self) {
        let gl = self.gl();
        let mut programs = 0;
        for (_, by_vertex) in self.programs.drain() {
            for (_, record) in by_vertex.value().drain() {
                let program = record.value();
                gl.delete_vertex_array(program.vp.vao());
                gl.delete_program(program.handle);
                programs += 1;
            }
        }
        let buffers = self.buffers.drain();
        for (_, record) in &buffers {
            gl.delete_buffer(record.value().handle);
        }
        let textures = self.textures.drain();
        for (_, record) in &textures {
            gl.delete_texture(record.value().handle);
        }
        self.shaders.drain();

        self.bound.program.set(None);
        self.bound.vao.set(None);
        self.bound.active_unit.set(None);
        self.bound.units.borrow_mut().clear();
        info!(
            context = self.id.0,
            programs,
            buffers = buffers.len(),
            textures = textures.len(),
            "GL context destroyed"
        );
    }
}

/// Compile both stages and link them.
///
/// Shaders are always released; a failed link also deletes the program.
pub fn compile_program(
    gl: &dyn GlBackend,
    vert_src: &str,
    frag_src: &str,
) -> Result<ProgramHandle, EngineError> {
    let vs = gl
        .create_shader(ShaderStage::Vertex)
        .map_err(|e| EngineError::GlCreate(format!("create_shader(VS) failed: {e}")))?;
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.shader_compile_status(vs) {
        let log = gl.shader_info_log(vs);
        gl.delete_shader(vs);
        return Err(EngineError::VertexCompile(log));
    }

    let fs = match gl.create_shader(ShaderStage::Fragment) {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(EngineError::GlCreate(format!("create_shader(FS) failed: {e}")));
        }
    };
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.shader_compile_status(fs) {
        let log = gl.shader_info_log(fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        return Err(EngineError::FragmentCompile(log));
    }

    let program = match gl.create_program() {
        Ok(p) => p,
        Err(e) => {
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(EngineError::GlCreate(format!("create_program failed: {e}")));
        }
    };
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.program_link_status(program) {
        let log = gl.program_info_log(program);
        gl.delete_program(program);
        return Err(EngineError::Link(log));
    }

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{GlCall, RecordingBackend};

    struct NoopRequester;

    impl RenderRequest for NoopRequester {
        fn request_render(&self) {}
    }

    fn context(gl: &Rc<RecordingBackend>, cap: Option<u32>) -> GlContext {
        let backend: Rc<dyn GlBackend> = gl.clone();
        GlContext::new(backend, Rc::new(NoopRequester), cap)
    }

    const VS: &str = "void main() { gl_Position = vec4(0.0); }";
    const FS: &str = "precision mediump float;\nvoid main() { gl_FragColor = vec4(1.0); }";

    #[test]
    fn vertex_compile_failure_carries_the_log() {
        let gl = RecordingBackend::new();
        gl.fail_compile(ShaderStage::Vertex, "0:1: syntax error");
        let err = compile_program(&gl, VS, FS).unwrap_err();
        assert!(matches!(&err, EngineError::VertexCompile(log) if log.contains("syntax error")));
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateProgram(_))), 0);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteShader(_))), 1);
    }

    #[test]
    fn fragment_failure_releases_both_shaders() {
        let gl = RecordingBackend::new();
        gl.fail_compile(ShaderStage::Fragment, "bad frag");
        let err = compile_program(&gl, VS, FS).unwrap_err();
        assert!(matches!(err, EngineError::FragmentCompile(_)));
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteShader(_))), 2);
    }

    #[test]
    fn link_failure_deletes_the_program() {
        let gl = RecordingBackend::new();
        gl.fail_link("varying mismatch");
        let err = compile_program(&gl, VS, FS).unwrap_err();
        assert!(matches!(&err, EngineError::Link(log) if log == "varying mismatch"));
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteProgram(_))), 1);
    }

    #[test]
    fn program_pairs_link_once() {
        let gl = Rc::new(RecordingBackend::new());
        let ctx = context(&gl, None);
        let vs = ShaderTemplate::from_source(VS);
        let fs = ShaderTemplate::from_source(FS);

        let a = ctx.program(&vs, &fs).unwrap();
        let b = ctx.program(&vs, &fs).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(gl.count(|c| matches!(c, GlCall::LinkProgram(_))), 1);

        let other = ShaderTemplate::from_source("precision lowp float;\nvoid main() {}");
        ctx.program(&vs, &other).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::LinkProgram(_))), 2);
        assert_eq!(
            gl.count(|c| matches!(c, GlCall::CreateShader(ShaderStage::Vertex, _))),
            2,
            "source is cached, GL shader objects are per link"
        );
    }

    #[test]
    fn failed_link_is_not_cached() {
        let gl = Rc::new(RecordingBackend::new());
        let ctx = context(&gl, None);
        let vs = ShaderTemplate::from_source(VS);
        let fs = ShaderTemplate::from_source(FS);

        gl.fail_link("nope");
        assert!(ctx.program(&vs, &fs).is_err());
        assert!(ctx.lookup_program(vs.id(), fs.id()).is_err());

        gl.clear_failures();
        ctx.program(&vs, &fs).unwrap();
        assert!(ctx.lookup_program(vs.id(), fs.id()).is_ok());
    }

    #[test]
    fn texture_units_respect_cap_and_hardware() {
        let gl = Rc::new(RecordingBackend::new());
        gl.set_parameter(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS, 8);
        assert_eq!(context(&gl, None).max_texture_units(), 8);
        assert_eq!(context(&gl, Some(2)).max_texture_units(), 2);
        assert_eq!(context(&gl, Some(32)).max_texture_units(), 8);
    }

    #[test]
    fn redundant_binds_are_skipped() {
        let gl = Rc::new(RecordingBackend::new());
        let ctx = context(&gl, None);
        ctx.use_program(ProgramHandle(3));
        ctx.use_program(ProgramHandle(3));
        ctx.bind_texture_unit(1, TextureHandle(5));
        ctx.bind_texture_unit(1, TextureHandle(5));
        ctx.bind_texture_unit(1, TextureHandle(6));

        assert_eq!(
            gl.take_calls(),
            vec![
                GlCall::UseProgram(Some(ProgramHandle(3))),
                GlCall::ActiveTexture(1),
                GlCall::BindTexture {
                    target: glow::TEXTURE_2D,
                    texture: Some(TextureHandle(5)),
                },
                GlCall::BindTexture {
                    target: glow::TEXTURE_2D,
                    texture: Some(TextureHandle(6)),
                },
            ]
        );
    }

    #[test]
    fn destroy_releases_everything_and_forgets_programs() {
        let gl = Rc::new(RecordingBackend::new());
        let ctx = context(&gl, None);
        let vs = ShaderTemplate::from_source(VS);
        let fs = ShaderTemplate::from_source(FS);
        let record = ctx.program(&vs, &fs).unwrap();
        let handle = record.value().handle;

        ctx.destroy();
        assert!(gl
            .calls()
            .contains(&GlCall::DeleteProgram(handle)));
        let err = ctx.lookup_program(vs.id(), fs.id()).unwrap_err();
        assert!(matches!(err, EngineError::MissingProgram(_)));
    }
}
