//! Render scheduling.
//!
//! Render requests only raise a flag; the host drives frames by calling
//! [`Scheduler::tick`] (from `requestAnimationFrame`, a winit redraw, a test
//! loop). Any number of requests between two ticks collapse into one pass.
//! Requests raised while a pass is drawing schedule one more pass in the same
//! tick, up to a configured cap.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rxgl_reactive::{Listeners, RenderRequest, Subscription};
use tracing::{debug, trace, warn};

use crate::EngineError;

/// Timing handed to animation-loop callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Host timestamp in seconds.
    pub now: f64,
    /// Seconds since the previous tick, `0.0` on the first.
    pub delta: f64,
    pub frame: u64,
}

type LoopCallback = dyn Fn(&FrameTime);

pub struct Scheduler {
    pending: Cell<bool>,
    rendering: Cell<bool>,
    scheduled_again: Cell<bool>,
    max_passes: u32,
    loops: RefCell<Listeners<LoopCallback>>,
    frame: Cell<u64>,
    last_time: Cell<Option<f64>>,
    passes: Cell<u64>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending.get())
            .field("rendering", &self.rendering.get())
            .field("looping", &self.is_looping())
            .field("frame", &self.frame.get())
            .field("passes", &self.passes.get())
            .finish()
    }
}

impl RenderRequest for Scheduler {
    fn request_render(&self) {
        if self.rendering.get() {
            self.scheduled_again.set(true);
        } else {
            self.pending.set(true);
        }
    }
}

impl Scheduler {
    pub fn new(max_passes: u32) -> Self {
        Self {
            pending: Cell::new(false),
            rendering: Cell::new(false),
            scheduled_again: Cell::new(false),
            max_passes: max_passes.max(1),
            loops: RefCell::new(Listeners::new()),
            frame: Cell::new(0),
            last_time: Cell::new(None),
            passes: Cell::new(0),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering.get()
    }

    pub fn is_looping(&self) -> bool {
        !self.loops.borrow().is_empty()
    }

    /// Whether the host should call [`Scheduler::tick`] on its next frame.
    pub fn needs_frame(&self) -> bool {
        self.is_pending() || self.is_looping()
    }

    /// Total passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes.get()
    }

    /// Run `f` at the start of every tick until unsubscribed. While any loop
    /// callback is registered, every tick also renders.
    pub fn on_loop(self: &Rc<Self>, f: impl Fn(&FrameTime) + 'static) -> Subscription {
        let callback: Rc<LoopCallback> = Rc::new(f);
        let key = {
            let mut loops = self.loops.borrow_mut();
            if loops.is_empty() {
                debug!("animation loop started");
            }
            loops.insert(callback)
        };
        self.pending.set(true);

        let weak: Weak<Self> = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(scheduler) = weak.upgrade() {
                let mut loops = scheduler.loops.borrow_mut();
                if loops.remove(key) && loops.is_empty() {
                    debug!("animation loop stopped");
                }
            }
        })
    }

    /// One host frame: loop callbacks, then [`Scheduler::flush`].
    pub fn tick(
        &self,
        now: f64,
        prepare: impl FnMut() -> Result<(), EngineError>,
        draw: impl FnMut() -> Result<(), EngineError>,
    ) -> Result<u32, EngineError> {
        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        let delta = self.last_time.replace(Some(now)).map_or(0.0, |last| now - last);
        let time = FrameTime { now, delta, frame };

        let loops = self.loops.borrow().snapshot();
        if !loops.is_empty() {
            self.pending.set(true);
        }
        for callback in loops {
            callback(&time);
        }
        self.flush(prepare, draw)
    }

    /// Run passes until no request arrived during the last one (or the cap
    /// is hit). Returns the number of passes.
    ///
    /// `prepare` runs before the pass is marked as rendering, so requests it
    /// triggers are absorbed by that same pass.
    pub fn flush(
        &self,
        mut prepare: impl FnMut() -> Result<(), EngineError>,
        mut draw: impl FnMut() -> Result<(), EngineError>,
    ) -> Result<u32, EngineError> {
        if !self.pending.get() || self.rendering.get() {
            return Ok(0);
        }
        let mut passes = 0;
        loop {
            prepare()?;
            self.pending.set(false);

            self.rendering.set(true);
            let result = draw();
            self.rendering.set(false);
            passes += 1;
            self.passes.set(self.passes.get() + 1);
            trace!(pass = passes, "render pass");

            let again = self.scheduled_again.replace(false);
            if let Err(e) = result {
                if again {
                    self.pending.set(true);
                }
                return Err(e);
            }
            if !again {
                break;
            }
            if passes >= self.max_passes {
                warn!(
                    passes,
                    "cells keep changing during render; deferring to the next tick"
                );
                self.pending.set(true);
                break;
            }
        }
        Ok(passes)
    }
}
