//! The reactive cell.
//!
//! An [`Atom`] holds a value, notifies subscribers when it changes and fans out
//! render requests to every GPU program it has been bound to.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::listeners::{Listeners, Subscription};

/// Process-unique identity of an [`Atom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

impl AtomId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        AtomId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Something that can be asked to schedule a render pass.
pub trait RenderRequest {
    fn request_render(&self);
}

/// Identifies one compiled program inside one GL context.
///
/// An atom is bound at most once per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub context: u64,
    pub program: u64,
}

impl BindingKey {
    pub fn new(context: u64, program: u64) -> Self {
        Self { context, program }
    }
}

/// Returned by a binding callback to decide whether its program should re-render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindFlow {
    Render,
    /// Suppress the render request for this program only.
    Skip,
}

/// One-shot switches handed to updaters.
///
/// Whatever is tripped only applies to the `set` in progress.
#[derive(Debug)]
pub struct SetFlags<'a> {
    notify: &'a Cell<bool>,
    render: &'a Cell<bool>,
}

impl SetFlags<'_> {
    pub fn prevent_notification(&self) {
        self.notify.set(false);
    }

    pub fn prevent_render(&self) {
        self.render.set(false);
    }
}

type BindCallback<T> = Box<dyn Fn(&T) -> BindFlow>;

/// Runs the binding callback, then asks for a render unless it skipped. A
/// forced call requests the render either way.
type Trampoline<T> = Rc<dyn Fn(&T, bool)>;

struct ProgramBinding<T> {
    key: BindingKey,
    trampoline: Trampoline<T>,
}

struct AtomInner<T> {
    id: AtomId,
    value: RefCell<T>,
    subscribers: RefCell<Listeners<dyn Fn(&T)>>,
    bindings: RefCell<Vec<ProgramBinding<T>>>,
    bound: RefCell<HashSet<BindingKey>>,
    before_draw: RefCell<Listeners<dyn Fn()>>,
    should_notify: Cell<bool>,
    should_render: Cell<bool>,
}

/// Shared, single-threaded reactive cell. Cloning yields another handle to the same cell.
pub struct Atom<T> {
    inner: Rc<AtomInner<T>>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Atom");
        s.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(v) => s.field("value", &*v),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("bindings", &self.inner.bindings.borrow().len())
            .finish()
    }
}

impl<T: Clone + 'static> Atom<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(AtomInner {
                id: AtomId::next(),
                value: RefCell::new(value),
                subscribers: RefCell::new(Listeners::new()),
                bindings: RefCell::new(Vec::new()),
                bound: RefCell::new(HashSet::new()),
                before_draw: RefCell::new(Listeners::new()),
                should_notify: Cell::new(true),
                should_render: Cell::new(true),
            }),
        }
    }

    pub fn id(&self) -> AtomId {
        self.inner.id
    }

    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrowed read; `f` must not set this atom.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    pub fn set(&self, value: T) {
        self.update(move |_, _| value);
    }

    /// Replace the value with `f(current, flags)`.
    pub fn update(&self, f: impl FnOnce(&T, &SetFlags<'_>) -> T) {
        let next = {
            let current = self.inner.value.borrow();
            f(&current, &self.flags())
        };
        *self.inner.value.borrow_mut() = next;
        self.emit();
    }

    /// Mutate the value in place.
    pub fn modify(&self, f: impl FnOnce(&mut T, &SetFlags<'_>)) {
        {
            let mut current = self.inner.value.borrow_mut();
            f(&mut current, &self.flags());
        }
        self.emit();
    }

    fn flags(&self) -> SetFlags<'_> {
        SetFlags {
            notify: &self.inner.should_notify,
            render: &self.inner.should_render,
        }
    }

    /// Subscribers first (subscription order), then program trampolines (binding order).
    fn emit(&self) {
        let notify = self.inner.should_notify.replace(true);
        let render = self.inner.should_render.replace(true);
        if !notify && !render {
            return;
        }

        let snapshot = self.get();
        if notify {
            let subscribers = self.inner.subscribers.borrow().snapshot();
            for subscriber in subscribers {
                subscriber(&snapshot);
            }
        }
        if render {
            self.fan_out(&snapshot, false);
        }
    }

    fn fan_out(&self, value: &T, force: bool) {
        let trampolines: Vec<Trampoline<T>> = self
            .inner
            .bindings
            .borrow()
            .iter()
            .map(|b| Rc::clone(&b.trampoline))
            .collect();
        for trampoline in trampolines {
            trampoline(value, force);
        }
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&T)> = Rc::new(f);
        let key = self.inner.subscribers.borrow_mut().insert(callback);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.borrow_mut().remove(key);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Associate this cell with a compiled program: every later change asks
    /// `requester` for a render. Returns `false` if `key` was already bound.
    pub fn bind(&self, key: BindingKey, requester: Rc<dyn RenderRequest>) -> bool {
        self.bind_inner(key, requester, None)
    }

    /// Like [`Atom::bind`], but `callback` runs first on every change and may
    /// return [`BindFlow::Skip`] to withhold this program's render request.
    pub fn bind_with(
        &self,
        key: BindingKey,
        requester: Rc<dyn RenderRequest>,
        callback: impl Fn(&T) -> BindFlow + 'static,
    ) -> bool {
        self.bind_inner(key, requester, Some(Box::new(callback)))
    }

    fn bind_inner(
        &self,
        key: BindingKey,
        requester: Rc<dyn RenderRequest>,
        callback: Option<BindCallback<T>>,
    ) -> bool {
        if !self.inner.bound.borrow_mut().insert(key) {
            return false;
        }
        let trampoline: Trampoline<T> = Rc::new(move |value: &T, force: bool| {
            let flow = callback.as_ref().map_or(BindFlow::Render, |cb| cb(value));
            if force || flow == BindFlow::Render {
                requester.request_render();
            }
        });
        self.inner
            .bindings
            .borrow_mut()
            .push(ProgramBinding { key, trampoline });
        true
    }

    pub fn unbind(&self, key: BindingKey) -> bool {
        if !self.inner.bound.borrow_mut().remove(&key) {
            return false;
        }
        self.inner.bindings.borrow_mut().retain(|b| b.key != key);
        true
    }

    pub fn is_bound(&self, key: BindingKey) -> bool {
        self.inner.bound.borrow().contains(&key)
    }

    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    /// Ask every bound program for a render without changing the value.
    ///
    /// Binding callbacks still run, but a [`BindFlow::Skip`] doesn't withhold
    /// the request.
    pub fn request_render(&self) {
        let snapshot = self.get();
        self.fan_out(&snapshot, true);
    }

    pub fn on_before_draw(&self, f: impl Fn() + 'static) -> Subscription {
        let callback: Rc<dyn Fn()> = Rc::new(f);
        let key = self.inner.before_draw.borrow_mut().insert(callback);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.before_draw.borrow_mut().remove(key);
            }
        })
    }

    /// Called by tokens right before they synchronize this cell with the GPU.
    pub fn run_before_draw(&self) {
        let hooks = self.inner.before_draw.borrow().snapshot();
        for hook in hooks {
            hook();
        }
    }

    pub fn downgrade(&self) -> WeakAtom<T> {
        WeakAtom {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Atom<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + Default + 'static> Default for Atom<T> {
    fn default() -> Self {
        Atom::new(T::default())
    }
}

/// Non-owning handle, used by callbacks that would otherwise keep their own atom alive.
pub struct WeakAtom<T> {
    inner: Weak<AtomInner<T>>,
}

impl<T> Clone for WeakAtom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WeakAtom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAtom")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<T> WeakAtom<T> {
    pub fn upgrade(&self) -> Option<Atom<T>> {
        self.inner.upgrade().map(|inner| Atom { inner })
    }
}
