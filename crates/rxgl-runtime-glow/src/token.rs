//! Reactive values that can be embedded in a shader template.

use std::fmt;
use std::rc::Rc;

use crate::context::GlContext;
use crate::gl::{GlBackend, ProgramHandle, UniformLocation};
use crate::virtual_program::VirtualProgram;
use crate::EngineError;

pub type TokenRef = Rc<dyn Token>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Uniform,
    Attribute,
}

impl TokenKind {
    /// Leading character of generated GLSL names.
    pub fn prefix(self) -> &'static str {
        match self {
            TokenKind::Uniform => "u",
            TokenKind::Attribute => "a",
        }
    }
}

/// GLSL dialect of the template a token is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// GLSL ES 1.00 (no `#version`, or `#version 100`).
    Es100,
    /// GLSL ES 3.00 (`#version 300 es`).
    Es300,
}

/// Where a token lives in one linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Uniform(UniformLocation),
    Attribute(u32),
    /// The linker dropped the declaration; updates are no-ops.
    Inactive,
}

/// One embedded value.
///
/// A token contributes a declaration to the generated source, resolves its
/// location once per linked program, binds its cell to that program so changes
/// schedule renders, and synchronizes GPU state right before each draw.
pub trait Token: fmt::Debug {
    /// Stable identity, used to give repeated embeddings one shared declaration.
    fn id(&self) -> u64;

    fn kind(&self) -> TokenKind;

    fn declaration(&self, name: &str, dialect: Dialect) -> String;

    fn location(&self, gl: &dyn GlBackend, program: ProgramHandle, name: &str) -> Location {
        match self.kind() {
            TokenKind::Uniform => gl
                .uniform_location(program, name)
                .map_or(Location::Inactive, Location::Uniform),
            TokenKind::Attribute => gl
                .attrib_location(program, name)
                .map_or(Location::Inactive, Location::Attribute),
        }
    }

    fn bind(&self, ctx: &GlContext, vp: &Rc<VirtualProgram>, location: Location);

    fn update(
        &self,
        ctx: &GlContext,
        vp: &VirtualProgram,
        location: Location,
    ) -> Result<(), EngineError>;
}

/// Conversion used by `glsl!` for each interpolated expression.
pub trait IntoToken {
    fn into_token(self) -> TokenRef;
}

impl IntoToken for TokenRef {
    fn into_token(self) -> TokenRef {
        self
    }
}

impl<T: Token + Clone + 'static> IntoToken for &T {
    fn into_token(self) -> TokenRef {
        Rc::new(self.clone())
    }
}
