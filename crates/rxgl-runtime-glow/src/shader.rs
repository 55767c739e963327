//! Shader templates: literal GLSL fragments interleaved with tokens.
//!
//! A template is identified by its call site (`glsl!`) or by a hash of its text
//! (`ShaderTemplate::from_parts`), combined with the shape of its tokens: the
//! declaration each one produces and which positions repeat a token. Compiled
//! output and linked programs are cached per identity, so a template evaluated
//! every frame compiles once.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::gl::{GlBackend, ProgramHandle};
use crate::token::{Dialect, Location, TokenRef};
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u64);

const HASHED_BIT: u64 = 1 << 63;

impl TemplateId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TemplateId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    fn for_site(site: &TemplateSite, tokens: &[TokenRef]) -> Self {
        let mut h = DefaultHasher::new();
        0u8.hash(&mut h);
        site.id().0.hash(&mut h);
        hash_shape(&mut h, tokens, dialect_of(&site.parts.concat()));
        TemplateId(h.finish() | HASHED_BIT)
    }

    fn for_parts(parts: &[String], tokens: &[TokenRef]) -> Self {
        let mut h = DefaultHasher::new();
        1u8.hash(&mut h);
        parts.hash(&mut h);
        hash_shape(&mut h, tokens, dialect_of(&parts.concat()));
        TemplateId(h.finish() | HASHED_BIT)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Feeds each token's declaration and its first position into `h`. Two token
/// lists with the same shape compile to the same source modulo token values.
fn hash_shape(h: &mut DefaultHasher, tokens: &[TokenRef], dialect: Dialect) {
    for (i, token) in tokens.iter().enumerate() {
        let first = tokens
            .iter()
            .position(|t| t.id() == token.id())
            .unwrap_or(i);
        first.hash(h);
        token.declaration("_", dialect).hash(h);
    }
}

/// Per-call-site identity, created by `glsl!` as a `static`.
///
/// One site can back several token shapes (a `glsl!` inside a generic fn is
/// one `static` for every instantiation), so [`ShaderTemplate::from_site`]
/// mixes the shape into the final [`TemplateId`].
pub struct TemplateSite {
    parts: &'static [&'static str],
    id: OnceLock<TemplateId>,
}

impl fmt::Debug for TemplateSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateSite")
            .field("id", &self.id.get())
            .field("parts", &self.parts.len())
            .finish()
    }
}

impl TemplateSite {
    pub const fn new(parts: &'static [&'static str]) -> Self {
        Self {
            parts,
            id: OnceLock::new(),
        }
    }

    pub fn id(&self) -> TemplateId {
        *self.id.get_or_init(TemplateId::next)
    }
}

#[derive(Debug, Clone)]
enum Parts {
    Static(&'static [&'static str]),
    Owned(Rc<[String]>),
}

impl Parts {
    fn len(&self) -> usize {
        match self {
            Parts::Static(p) => p.len(),
            Parts::Owned(p) => p.len(),
        }
    }

    fn get(&self, i: usize) -> &str {
        match self {
            Parts::Static(p) => p[i],
            Parts::Owned(p) => &p[i],
        }
    }
}

/// Output of [`ShaderTemplate::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    /// Everything up to and including the precision statement (or `#version` line).
    pub preamble: String,
    /// One declaration per distinct token, in first-embedding order.
    pub declarations: Vec<String>,
    /// The rest of the source.
    pub body: String,
    /// Final source handed to the driver.
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct ShaderTemplate {
    id: TemplateId,
    parts: Parts,
    tokens: Vec<TokenRef>,
}

impl ShaderTemplate {
    /// Used by `glsl!`; the macro guarantees `parts.len() == tokens.len() + 1`.
    pub fn from_site(site: &'static TemplateSite, tokens: Vec<TokenRef>) -> Self {
        Self {
            id: TemplateId::for_site(site, &tokens),
            parts: Parts::Static(site.parts),
            tokens,
        }
    }

    /// Template built at runtime. Identity is a hash of the text parts and the
    /// token shape, so equal text with equally typed tokens shares compiled
    /// shaders.
    ///
    /// Needs one more part than tokens; anything else is reported when the
    /// template is compiled.
    pub fn from_parts(parts: Vec<String>, tokens: Vec<TokenRef>) -> Self {
        Self {
            id: TemplateId::for_parts(&parts, &tokens),
            parts: Parts::Owned(parts.into()),
            tokens,
        }
    }

    /// A template with no embedded tokens.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self::from_parts(vec![source.into()], Vec::new())
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn tokens(&self) -> &[TokenRef] {
        &self.tokens
    }

    /// Distinct tokens paired with their generated GLSL names, first occurrence first.
    pub fn named_tokens(&self) -> Vec<(TokenRef, String)> {
        let mut named: Vec<(TokenRef, String)> = Vec::new();
        for token in &self.tokens {
            if named.iter().any(|(seen, _)| seen.id() == token.id()) {
                continue;
            }
            let name = format!(
                "{}{:x}_{}",
                token.kind().prefix(),
                self.id.raw(),
                named.len()
            );
            named.push((Rc::clone(token), name));
        }
        named
    }

    fn check_arity(&self) -> Result<(), EngineError> {
        if self.parts.len() == self.tokens.len() + 1 {
            return Ok(());
        }
        Err(EngineError::Template(format!(
            "template {:?} has {} text parts for {} tokens (expected {})",
            self.id,
            self.parts.len(),
            self.tokens.len(),
            self.tokens.len() + 1
        )))
    }

    pub fn compile(&self) -> Result<CompiledShader, EngineError> {
        self.check_arity()?;
        let named = self.named_tokens();

        let mut raw = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            raw.push_str(self.parts.get(i));
            if let Some((_, name)) = named.iter().find(|(t, _)| t.id() == token.id()) {
                raw.push_str(name);
            }
        }
        raw.push_str(self.parts.get(self.tokens.len()));

        let dialect = dialect_of(&raw);
        let declarations: Vec<String> = named
            .iter()
            .map(|(token, name)| token.declaration(name, dialect))
            .collect();
        Ok(inject(&raw, declarations))
    }

    /// Resolve each distinct token's location in a linked program, in
    /// [`ShaderTemplate::named_tokens`] order.
    pub fn locations(&self, gl: &dyn GlBackend, program: ProgramHandle) -> Vec<Location> {
        self.named_tokens()
            .iter()
            .map(|(token, name)| {
                let location = token.location(gl, program, name);
                if location == Location::Inactive {
                    tracing::warn!(
                        name = %name,
                        template = self.id.raw(),
                        "token is not active in the linked program; its updates are skipped"
                    );
                }
                location
            })
            .collect()
    }
}

fn inject(raw: &str, declarations: Vec<String>) -> CompiledShader {
    let split = find_precision(raw).or_else(|| find_version(raw)).unwrap_or(0);
    let (preamble, body) = raw.split_at(split);
    let code = if declarations.is_empty() {
        raw.to_owned()
    } else if split == 0 {
        format!("{}\n{}", declarations.join("\n"), body)
    } else {
        format!("{}\n{}{}", preamble, declarations.join("\n"), body)
    };
    CompiledShader {
        preamble: preamble.to_owned(),
        declarations,
        body: body.to_owned(),
        code,
    }
}

fn dialect_of(src: &str) -> Dialect {
    let version = src
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with("#version"));
    match version {
        Some(line) if line.split_whitespace().nth(1).is_some_and(|v| v.starts_with('3')) => {
            Dialect::Es300
        }
        _ => Dialect::Es100,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte offset just past the first `precision ...;` statement outside a line comment.
fn find_precision(src: &str) -> Option<usize> {
    const KEYWORD: &str = "precision";
    let mut from = 0;
    while let Some(rel) = src[from..].find(KEYWORD) {
        let start = from + rel;
        let after = start + KEYWORD.len();
        from = after;

        let line_start = src[..start].rfind('\n').map_or(0, |i| i + 1);
        if src[line_start..start].contains("//") {
            continue;
        }
        let clean_before = src[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_ident_char(c));
        let clean_after = src[after..].chars().next().is_some_and(char::is_whitespace);
        if clean_before && clean_after {
            return src[start..].find(';').map(|semi| start + semi + 1);
        }
    }
    None
}

/// Byte offset of the end of the `#version` line (before its newline).
fn find_version(src: &str) -> Option<usize> {
    let mut offset = 0;
    for line in src.split_inclusive('\n') {
        if line.trim_start().starts_with("#version") {
            return Some(offset + line.trim_end_matches(|c| c == '\r' || c == '\n').len());
        }
        offset += line.len();
    }
    None
}

/// Build a [`ShaderTemplate`] from GLSL text with embedded tokens.
///
/// ```ignore
/// let tint = Uniform::new([1.0f32, 0.0, 0.0]);
/// let frag = glsl!("precision mediump float;
/// void main() { gl_FragColor = vec4(", &tint, ", 1.0); }");
/// ```
///
/// Every expansion is its own call site: evaluating the same `glsl!` again
/// (e.g. every frame) with tokens of the same types yields the same
/// [`TemplateId`].
#[macro_export]
macro_rules! glsl {
    ($first:literal $(, $token:expr, $part:literal)*) => {{
        static SITE: $crate::shader::TemplateSite =
            $crate::shader::TemplateSite::new(&[$first $(, $part)*]);
        $crate::shader::ShaderTemplate::from_site(
            &SITE,
            ::std::vec![$($crate::token::IntoToken::into_token($token)),*],
        )
    }};
}
