//! The renderer: a context, a scheduler and an ordered draw stack.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rxgl_core::RendererConfig;
use rxgl_reactive::{Listeners, RenderRequest, Subscription};
use tracing::{debug, info};

use crate::context::GlContext;
use crate::gl::GlBackend;
use crate::program::{Program, ProgramOptions};
use crate::scheduler::{FrameTime, Scheduler};
use crate::EngineError;

/// Keyed programs drawn in least-recently-touched-first order.
///
/// Inserting or touching a key moves it to the end, so the most recently
/// touched program draws last (on top).
#[derive(Debug, Default)]
pub struct ProgramMap {
    entries: RefCell<Vec<(String, Rc<Program>)>>,
}

impl ProgramMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, program: Rc<Program>) {
        let key = key.into();
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(k, _)| *k != key);
        entries.push((key, program));
    }

    /// Returns `false` if `key` is absent.
    pub fn touch(&self, key: &str) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(pos) = entries.iter().position(|(k, _)| k == key) else {
            return false;
        };
        let entry = entries.remove(pos);
        entries.push(entry);
        true
    }

    pub fn remove(&self, key: &str) -> Option<Rc<Program>> {
        let mut entries = self.entries.borrow_mut();
        let pos = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(pos).1)
    }

    pub fn get(&self, key: &str) -> Option<Rc<Program>> {
        self.entries
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| Rc::clone(p))
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn programs(&self) -> Vec<Rc<Program>> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, p)| Rc::clone(p))
            .collect()
    }
}

/// One entry of the draw stack.
#[derive(Debug, Clone)]
pub enum DrawEntry {
    Program(Rc<Program>),
    /// Drawn in order, as one stack entry.
    Group(Vec<Rc<Program>>),
    Map(Rc<ProgramMap>),
}

impl From<Rc<Program>> for DrawEntry {
    fn from(program: Rc<Program>) -> Self {
        DrawEntry::Program(program)
    }
}

impl From<Vec<Rc<Program>>> for DrawEntry {
    fn from(group: Vec<Rc<Program>>) -> Self {
        DrawEntry::Group(group)
    }
}

impl From<Rc<ProgramMap>> for DrawEntry {
    fn from(map: Rc<ProgramMap>) -> Self {
        DrawEntry::Map(map)
    }
}

impl DrawEntry {
    fn contains(&self, program: &Rc<Program>) -> bool {
        match self {
            DrawEntry::Program(p) => Rc::ptr_eq(p, program),
            DrawEntry::Group(g) => g.iter().any(|p| Rc::ptr_eq(p, program)),
            DrawEntry::Map(_) => false,
        }
    }

    fn draw(&self, ctx: &GlContext) -> Result<(), EngineError> {
        match self {
            DrawEntry::Program(p) => p.draw(ctx),
            DrawEntry::Group(g) => g.iter().try_for_each(|p| p.draw(ctx)),
            DrawEntry::Map(m) => m.programs().iter().try_for_each(|p| p.draw(ctx)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Viewport follows the host's client size.
    Window,
    /// Fixed-size target; resizing to the client is an error.
    Offscreen { width: i32, height: i32 },
}

pub struct Renderer {
    ctx: GlContext,
    scheduler: Rc<Scheduler>,
    config: RendererConfig,
    stack: RefCell<Vec<DrawEntry>>,
    before_render: Rc<RefCell<Listeners<dyn Fn()>>>,
    surface: Surface,
    viewport: Cell<Option<(i32, i32)>>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("ctx", &self.ctx)
            .field("scheduler", &self.scheduler)
            .field("stack", &self.stack.borrow().len())
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(gl: Rc<dyn GlBackend>, config: RendererConfig) -> Self {
        Self::with_surface(gl, config, Surface::Window)
    }

    pub fn offscreen(gl: Rc<dyn GlBackend>, config: RendererConfig, width: i32, height: i32) -> Self {
        let renderer = Self::with_surface(gl, config, Surface::Offscreen { width, height });
        renderer.set_viewport(width, height);
        renderer
    }

    fn with_surface(gl: Rc<dyn GlBackend>, config: RendererConfig, surface: Surface) -> Self {
        let scheduler = Rc::new(Scheduler::new(config.max_render_passes));
        let requester: Rc<dyn RenderRequest> = scheduler.clone();
        let ctx = GlContext::new(gl, requester, config.max_texture_units);
        info!(?surface, mode = ?config.default_mode, "renderer created");
        Self {
            ctx,
            scheduler,
            config,
            stack: RefCell::new(Vec::new()),
            before_render: Rc::new(RefCell::new(Listeners::new())),
            surface,
            viewport: Cell::new(None),
        }
    }

    pub fn context(&self) -> &GlContext {
        &self.ctx
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// What to hand to cells and scene graphs that should trigger renders here.
    pub fn requester(&self) -> Rc<dyn RenderRequest> {
        self.ctx.requester()
    }

    pub fn request_render(&self) {
        self.scheduler.request_render();
    }

    pub fn create_program(&self, options: ProgramOptions) -> Result<Rc<Program>, EngineError> {
        let program = Program::new(&self.ctx, options, self.config.default_mode)?;
        Ok(Rc::new(program))
    }

    /// Append to the draw stack. Entries draw in insertion order.
    pub fn push(&self, entry: impl Into<DrawEntry>) {
        self.stack.borrow_mut().push(entry.into());
        self.request_render();
    }

    /// Remove every stack entry that is, or groups, `program`.
    pub fn remove(&self, program: &Rc<Program>) -> bool {
        let mut stack = self.stack.borrow_mut();
        let before = stack.len();
        stack.retain(|entry| !entry.contains(program));
        let removed = stack.len() != before;
        drop(stack);
        if removed {
            self.request_render();
        }
        removed
    }

    pub fn clear(&self) {
        self.stack.borrow_mut().clear();
        self.request_render();
    }

    pub fn stack_len(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Run `f` at the start of every render pass, before anything draws.
    pub fn on_before_render(&self, f: impl Fn() + 'static) -> Subscription {
        let callback: Rc<dyn Fn()> = Rc::new(f);
        let key = self.before_render.borrow_mut().insert(callback);
        let weak = Rc::downgrade(&self.before_render);
        Subscription::new(move || {
            if let Some(hooks) = weak.upgrade() {
                hooks.borrow_mut().remove(key);
            }
        })
    }

    pub fn on_loop(&self, f: impl Fn(&FrameTime) + 'static) -> Subscription {
        self.scheduler.on_loop(f)
    }

    pub fn needs_frame(&self) -> bool {
        self.scheduler.needs_frame()
    }

    /// One host frame. Returns how many passes ran (0 when nothing changed).
    pub fn tick(&self, now: f64) -> Result<u32, EngineError> {
        self.scheduler
            .tick(now, || self.prepare(), || self.draw_stack())
    }

    /// Render now if anything requested it, without advancing loop callbacks.
    pub fn flush(&self) -> Result<u32, EngineError> {
        self.scheduler.flush(|| self.prepare(), || self.draw_stack())
    }

    /// Unconditional pass, bypassing the scheduler.
    pub fn render(&self) -> Result<(), EngineError> {
        self.prepare()?;
        self.draw_stack()
    }

    fn prepare(&self) -> Result<(), EngineError> {
        let hooks = self.before_render.borrow().snapshot();
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    fn draw_stack(&self) -> Result<(), EngineError> {
        let gl = self.ctx.gl();
        if let Some([r, g, b, a]) = self.config.clear_color {
            gl.clear_color(r, g, b, a);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
        let entries: Vec<DrawEntry> = self.stack.borrow().clone();
        for entry in &entries {
            entry.draw(&self.ctx)?;
        }
        Ok(())
    }

    pub fn set_viewport(&self, width: i32, height: i32) {
        if self.viewport.get() == Some((width, height)) {
            return;
        }
        self.ctx.gl().viewport(0, 0, width, height);
        self.viewport.set(Some((width, height)));
        debug!(width, height, "viewport");
        self.request_render();
    }

    /// Match the viewport to the host's client size. Offscreen renderers have a
    /// fixed size and refuse.
    pub fn fit_to_client(&self, width: i32, height: i32) -> Result<(), EngineError> {
        match self.surface {
            Surface::Offscreen { .. } => Err(EngineError::OffscreenResize),
            Surface::Window => {
                self.set_viewport(width, height);
                Ok(())
            }
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Release every GL object and empty the draw stack.
    pub fn destroy(&self) {
        self.stack.borrow_mut().clear();
        self.ctx.destroy();
    }
}
