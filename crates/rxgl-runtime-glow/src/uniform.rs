//! Uniform tokens and the GLSL-type → upload dispatch.

use std::fmt;
use std::rc::Rc;

use rxgl_reactive::{Atom, BindFlow};

use crate::context::GlContext;
use crate::gl::{GlBackend, UniformLocation};
use crate::token::{Dialect, IntoToken, Location, Token, TokenKind, TokenRef};
use crate::virtual_program::VirtualProgram;
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Bool,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
}

impl UniformKind {
    pub fn glsl_name(self) -> &'static str {
        match self {
            UniformKind::Float => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Int => "int",
            UniformKind::IVec2 => "ivec2",
            UniformKind::IVec3 => "ivec3",
            UniformKind::IVec4 => "ivec4",
            UniformKind::Bool => "bool",
            UniformKind::Mat2 => "mat2",
            UniformKind::Mat3 => "mat3",
            UniformKind::Mat4 => "mat4",
            UniformKind::Sampler2D => "sampler2D",
        }
    }
}

/// A value as it sits in a uniform slot.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    Bool(bool),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::IVec2(_) => UniformKind::IVec2,
            UniformValue::IVec3(_) => UniformKind::IVec3,
            UniformValue::IVec4(_) => UniformKind::IVec4,
            UniformValue::Bool(_) => UniformKind::Bool,
            UniformValue::Mat2(_) => UniformKind::Mat2,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Issue the matching `glUniform*` call. Matrices are column-major, never transposed.
    pub fn upload(&self, gl: &dyn GlBackend, location: UniformLocation) {
        match self {
            UniformValue::Float(v) => gl.uniform_f32(location, 1, std::slice::from_ref(v)),
            UniformValue::Vec2(v) => gl.uniform_f32(location, 2, v),
            UniformValue::Vec3(v) => gl.uniform_f32(location, 3, v),
            UniformValue::Vec4(v) => gl.uniform_f32(location, 4, v),
            UniformValue::Int(v) => gl.uniform_i32(location, 1, std::slice::from_ref(v)),
            UniformValue::IVec2(v) => gl.uniform_i32(location, 2, v),
            UniformValue::IVec3(v) => gl.uniform_i32(location, 3, v),
            UniformValue::IVec4(v) => gl.uniform_i32(location, 4, v),
            UniformValue::Bool(b) => gl.uniform_i32(location, 1, &[i32::from(*b)]),
            UniformValue::Mat2(m) => gl.uniform_matrix_f32(location, 2, false, m),
            UniformValue::Mat3(m) => gl.uniform_matrix_f32(location, 3, false, m),
            UniformValue::Mat4(m) => gl.uniform_matrix_f32(location, 4, false, m),
        }
    }
}

/// Rust types that map onto a GLSL uniform type.
pub trait GlslValue: Clone + 'static {
    const KIND: UniformKind;

    fn to_uniform(&self) -> UniformValue;
}

macro_rules! glsl_value {
    ($ty:ty, $kind:ident, |$v:ident| $conv:expr) => {
        impl GlslValue for $ty {
            const KIND: UniformKind = UniformKind::$kind;

            fn to_uniform(&self) -> UniformValue {
                let $v = self;
                UniformValue::$kind($conv)
            }
        }
    };
}

glsl_value!(f32, Float, |v| *v);
glsl_value!([f32; 2], Vec2, |v| *v);
glsl_value!([f32; 3], Vec3, |v| *v);
glsl_value!([f32; 4], Vec4, |v| *v);
glsl_value!(i32, Int, |v| *v);
glsl_value!([i32; 2], IVec2, |v| *v);
glsl_value!([i32; 3], IVec3, |v| *v);
glsl_value!([i32; 4], IVec4, |v| *v);
glsl_value!(bool, Bool, |v| *v);
glsl_value!(glam::Vec2, Vec2, |v| v.to_array());
glsl_value!(glam::Vec3, Vec3, |v| v.to_array());
glsl_value!(glam::Vec4, Vec4, |v| v.to_array());
glsl_value!(glam::IVec2, IVec2, |v| v.to_array());
glsl_value!(glam::IVec3, IVec3, |v| v.to_array());
glsl_value!(glam::IVec4, IVec4, |v| v.to_array());
glsl_value!(glam::Mat2, Mat2, |v| v.to_cols_array());
glsl_value!(glam::Mat3, Mat3, |v| v.to_cols_array());
glsl_value!(glam::Mat4, Mat4, |v| v.to_cols_array());

/// A reactive uniform. Clones share the same cell.
pub struct Uniform<T> {
    atom: Atom<T>,
}

impl<T> Clone for Uniform<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
        }
    }
}

impl<T: GlslValue + fmt::Debug> fmt::Debug for Uniform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uniform")
            .field("kind", &T::KIND)
            .field("atom", &self.atom)
            .finish()
    }
}

impl<T: GlslValue> Uniform<T> {
    pub fn new(value: T) -> Self {
        Self::from_atom(Atom::new(value))
    }

    /// Wrap an existing cell, e.g. a scene node's world matrix.
    pub fn from_atom(atom: Atom<T>) -> Self {
        Self { atom }
    }

    pub fn atom(&self) -> &Atom<T> {
        &self.atom
    }

    pub fn get(&self) -> T {
        self.atom.get()
    }

    pub fn set(&self, value: T) {
        self.atom.set(value);
    }
}

impl<T: GlslValue + fmt::Debug> Token for Uniform<T> {
    fn id(&self) -> u64 {
        self.atom.id().raw()
    }

    fn kind(&self) -> TokenKind {
        TokenKind::Uniform
    }

    fn declaration(&self, name: &str, _dialect: Dialect) -> String {
        format!("uniform {} {};", T::KIND.glsl_name(), name)
    }

    fn bind(&self, ctx: &GlContext, vp: &Rc<VirtualProgram>, location: Location) {
        let Location::Uniform(loc) = location else {
            return;
        };
        vp.register_uniform(loc);

        // Skip only when the slot already holds the new value. The shadow is
        // written by uploads, so a suppressed set that a later pass drew
        // still counts as a change when the cell moves back.
        let weak = Rc::downgrade(vp);
        self.atom
            .bind_with(vp.binding_key(), ctx.requester(), move |value: &T| {
                let Some(vp) = weak.upgrade() else {
                    return BindFlow::Skip;
                };
                if vp.check_uniform(loc, &value.to_uniform()) {
                    return BindFlow::Skip;
                }
                vp.dirty_uniform(loc);
                BindFlow::Render
            });
    }

    fn update(
        &self,
        ctx: &GlContext,
        vp: &VirtualProgram,
        location: Location,
    ) -> Result<(), EngineError> {
        self.atom.run_before_draw();
        let Location::Uniform(loc) = location else {
            return Ok(());
        };
        let value = self.atom.with(GlslValue::to_uniform);
        if vp.check_uniform(loc, &value) {
            return Ok(());
        }
        value.upload(ctx.gl(), loc);
        vp.set_uniform(loc, value);
        Ok(())
    }
}

impl<T: GlslValue + fmt::Debug> IntoToken for Uniform<T> {
    fn into_token(self) -> TokenRef {
        Rc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{GlCall, RecordingBackend};

    #[test]
    fn glam_matrices_upload_column_major_untransposed() {
        let gl = RecordingBackend::new();
        let m = glam::Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        m.to_uniform().upload(&gl, UniformLocation(9));

        let calls = gl.calls();
        let GlCall::UniformMatrixF32 {
            dim,
            transpose,
            data,
            ..
        } = &calls[0]
        else {
            panic!("expected a matrix upload, got {calls:?}");
        };
        assert_eq!(*dim, 4);
        assert!(!transpose);
        assert_eq!(&data[12..15], &[1.0, 2.0, 3.0], "translation in the last column");
    }

    #[test]
    fn bool_uploads_as_int() {
        let gl = RecordingBackend::new();
        true.to_uniform().upload(&gl, UniformLocation(1));
        assert_eq!(
            gl.calls(),
            vec![GlCall::UniformI32 {
                location: UniformLocation(1),
                components: 1,
                data: vec![1],
            }]
        );
    }

    #[test]
    fn declarations_use_glsl_type_names() {
        let u = Uniform::new(glam::Vec3::ZERO);
        assert_eq!(u.declaration("u1_0", Dialect::Es300), "uniform vec3 u1_0;");
        let m = Uniform::new([0i32; 2]);
        assert_eq!(m.declaration("x", Dialect::Es100), "uniform ivec2 x;");
    }
}
