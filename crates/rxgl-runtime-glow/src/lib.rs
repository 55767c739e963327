//! rxgl runtime (glow/OpenGL ES backend)
//
// Reactive GPU programs:
// - shader templates with embedded uniform/attribute/sampler tokens
// - per-program shadow state so unchanged values issue no GL calls
// - a scheduler that coalesces render requests into host-driven ticks
//
// Windowing and canvas setup stay with the host; it hands us a GL backend and
// calls `Renderer::tick` once per frame.
#![deny(unsafe_code)]

pub mod attribute;
pub mod context;
pub mod gl;
pub mod glow_backend;
pub mod program;
pub mod recording;
pub mod renderer;
pub mod scheduler;
pub mod shader;
pub mod texture;
pub mod texture_slots;
pub mod token;
pub mod uniform;
pub mod virtual_program;

pub use attribute::{AttribKind, Attribute, BufferData, BufferId, BufferToken, ElementType};
pub use context::{compile_program, ContextId, GlContext, ProgramRecord};
pub use gl::{
    BufferHandle, GlBackend, ProgramHandle, ShaderHandle, ShaderStage, TextureHandle,
    UniformLocation, VertexArrayHandle,
};
pub use glow_backend::GlowBackend;
pub use program::{gl_mode, Program, ProgramOptions};
pub use recording::{GlCall, RecordingBackend};
pub use renderer::{DrawEntry, ProgramMap, Renderer, Surface};
pub use scheduler::{FrameTime, Scheduler};
pub use shader::{CompiledShader, ShaderTemplate, TemplateId, TemplateSite};
pub use texture::{Filter, Sampler2D, Texture, TextureFormat, TextureId, TextureImage, Wrap};
pub use texture_slots::{Enqueued, TextureSlots};
pub use token::{Dialect, IntoToken, Location, Token, TokenKind, TokenRef};
pub use uniform::{GlslValue, Uniform, UniformKind, UniformValue};
pub use virtual_program::{GlBuffer, GlTexture, VirtualProgram};

pub use rxgl_core::{DrawMode, EngineError, RendererConfig};
