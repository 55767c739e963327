#![forbid(unsafe_code)]

//! rxgl scene graph.
//!
//! Nodes live in an arena owned by a [`Scene`]; parents and children refer to
//! each other by [`NodeId`]. Every node carries a local transform cell and a
//! derived world transform cell. Changing a local transform marks the node and
//! its subtree stale and its ancestors as having stale descendants;
//! [`Scene::update`] then recomputes only the stale world matrices.
//!
//! Nodes reachable from the scene origin are *rooted*. Only rooted nodes are
//! queued for update and ask the renderer for a frame.
//!
//! [`Scene::remove`] frees a node and its subtree; freed slots are reused with
//! a new generation, so handles to removed nodes go inert instead of aliasing
//! the replacement.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use glam::Mat4;
use rxgl_core::EngineError;
use rxgl_reactive::{Atom, Listeners, RenderRequest, Subscription};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The origin is always the first node of a scene.
const ORIGIN: NodeId = NodeId(0);

/// Update rounds per [`Scene::update`] call; hooks that keep moving nodes
/// are cut off after this many.
const MAX_UPDATE_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum DirtyFlag {
    #[default]
    Clean = 0,
    /// World matrix is current, something below it is not.
    DirtyDescendant = 1,
    /// World matrix must be recomputed.
    DirtySelf = 2,
}

impl DirtyFlag {
    pub fn is_dirty(self) -> bool {
        self != DirtyFlag::Clean
    }
}

type UpdateHook = dyn Fn(&Mat4);
type Hooks = Rc<RefCell<Listeners<UpdateHook>>>;

struct NodeData {
    local: Atom<Mat4>,
    world: Atom<Mat4>,
    flag: DirtyFlag,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Position in the parent's `children`.
    slot: usize,
    rooted: bool,
    hooks: Hooks,
    generation: u32,
    live: bool,
    /// Marks the node dirty when its local cell changes.
    local_sub: Option<Subscription>,
}

// No callbacks run while `nodes` is borrowed: world cells and hooks are
// emitted after the borrow ends.
struct SceneInner {
    nodes: RefCell<Vec<NodeData>>,
    queue: RefCell<Vec<NodeId>>,
    free: RefCell<Vec<NodeId>>,
    requester: Rc<dyn RenderRequest>,
}

/// Root of a node arena plus its per-frame update queue.
#[derive(Clone)]
pub struct Scene {
    inner: Rc<SceneInner>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.len())
            .field("free", &self.inner.free.borrow().len())
            .field("queued", &self.inner.queue.borrow().len())
            .finish()
    }
}

impl Scene {
    /// `requester` is asked for a render whenever a rooted node goes stale.
    pub fn new(requester: Rc<dyn RenderRequest>) -> Self {
        let scene = Self {
            inner: Rc::new(SceneInner {
                nodes: RefCell::new(Vec::new()),
                queue: RefCell::new(Vec::new()),
                free: RefCell::new(Vec::new()),
                requester,
            }),
        };
        let origin = scene.insert(Mat4::IDENTITY, DirtyFlag::Clean, true);
        debug_assert_eq!(origin.id, ORIGIN);
        scene
    }

    pub fn origin(&self) -> Node3D {
        self.handle(ORIGIN)
    }

    /// A detached node with an identity transform.
    pub fn create_node(&self) -> Node3D {
        self.create_node_with(Mat4::IDENTITY)
    }

    pub fn create_node_with(&self, local: Mat4) -> Node3D {
        self.insert(local, DirtyFlag::DirtySelf, false)
    }

    /// Handle to a live node.
    pub fn node(&self, id: NodeId) -> Option<Node3D> {
        let live = self
            .inner
            .nodes
            .borrow()
            .get(id.index())
            .is_some_and(|n| n.live);
        live.then(|| self.handle(id))
    }

    /// Live nodes, the origin included.
    pub fn len(&self) -> usize {
        self.inner.nodes.borrow().len() - self.inner.free.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a rooted node is waiting for [`Scene::update`].
    pub fn has_pending(&self) -> bool {
        !self.inner.queue.borrow().is_empty()
    }

    /// Recompute stale world matrices, then publish them and run update hooks.
    /// Nodes moved by those hooks are handled in the same call. Returns the
    /// number of world matrices recomputed.
    pub fn update(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_UPDATE_ROUNDS {
            if !self.has_pending() {
                return total;
            }
            total += self.inner.update_once();
        }
        if self.has_pending() {
            warn!(
                rounds = MAX_UPDATE_ROUNDS,
                "update hooks keep moving nodes; deferring to the next frame"
            );
            self.inner.requester.request_render();
        }
        total
    }

    /// Free `node` and its whole subtree. Their slots are reused by later
    /// [`Scene::create_node`] calls; handles to them stop affecting the scene.
    /// Returns the number of nodes freed.
    pub fn remove(&self, node: &Node3D) -> Result<usize, EngineError> {
        if !Weak::ptr_eq(&Rc::downgrade(&self.inner), &node.scene) {
            return Err(EngineError::SceneGraph(
                "cannot remove a node of another scene".into(),
            ));
        }
        if node.id == ORIGIN {
            return Err(EngineError::SceneGraph(
                "the scene origin cannot be removed".into(),
            ));
        }
        self.inner.check_current(node.id, node.generation)?;

        let mut released = Vec::new();
        let freed = {
            let mut nodes = self.inner.nodes.borrow_mut();
            detach(&mut nodes, node.id);
            let mut stack = vec![node.id];
            let mut freed = Vec::new();
            while let Some(id) = stack.pop() {
                let data = &mut nodes[id.index()];
                stack.append(&mut data.children);
                data.live = false;
                data.parent = None;
                data.rooted = false;
                data.flag = DirtyFlag::Clean;
                released.extend(data.local_sub.take());
                data.hooks = Rc::new(RefCell::new(Listeners::new()));
                freed.push(id);
            }
            freed
        };
        for sub in released {
            sub.unsubscribe();
        }
        debug!(node = node.id.0, freed = freed.len(), "node removed");
        let count = freed.len();
        self.inner.free.borrow_mut().extend(freed);
        Ok(count)
    }

    fn handle(&self, id: NodeId) -> Node3D {
        let nodes = self.inner.nodes.borrow();
        let node = &nodes[id.index()];
        Node3D {
            id,
            generation: node.generation,
            local: node.local.clone(),
            world: node.world.clone(),
            scene: Rc::downgrade(&self.inner),
        }
    }

    fn insert(&self, local: Mat4, flag: DirtyFlag, rooted: bool) -> Node3D {
        let reused = self.inner.free.borrow_mut().pop();
        let (id, generation) = match reused {
            Some(id) => (id, self.inner.nodes.borrow()[id.index()].generation.wrapping_add(1)),
            None => (NodeId(self.inner.nodes.borrow().len() as u32), 0),
        };
        let local_cell = Atom::new(local);
        let world_cell = Atom::new(local);

        let weak = Rc::downgrade(&self.inner);
        let local_sub = local_cell.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.mark_dirty(id);
            }
        });

        let data = NodeData {
            local: local_cell.clone(),
            world: world_cell.clone(),
            flag,
            parent: None,
            children: Vec::new(),
            slot: 0,
            rooted,
            hooks: Rc::new(RefCell::new(Listeners::new())),
            generation,
            live: true,
            local_sub: Some(local_sub),
        };
        let mut nodes = self.inner.nodes.borrow_mut();
        match reused {
            Some(id) => nodes[id.index()] = data,
            None => nodes.push(data),
        }
        trace!(node = id.0, generation, "node created");
        Node3D {
            id,
            generation,
            local: local_cell,
            world: world_cell,
            scene: Rc::downgrade(&self.inner),
        }
    }
}

impl SceneInner {
    fn check_current(&self, id: NodeId, generation: u32) -> Result<(), EngineError> {
        let nodes = self.nodes.borrow();
        match nodes.get(id.index()) {
            Some(n) if n.live && n.generation == generation => Ok(()),
            _ => Err(EngineError::SceneGraph(format!("node {} was removed", id.0))),
        }
    }

    fn enqueue(&self, id: NodeId) {
        self.queue.borrow_mut().push(id);
        self.requester.request_render();
    }

    fn mark_dirty(&self, id: NodeId) {
        let rooted = {
            let mut nodes = self.nodes.borrow_mut();
            if !mark_subtree(&mut nodes, id) {
                return;
            }
            mark_ancestors(&mut nodes, id);
            nodes[id.index()].rooted
        };
        trace!(node = id.0, rooted, "node marked dirty");
        if rooted {
            self.enqueue(id);
        }
    }

    fn attach(&self, child: NodeId, parent: NodeId) -> Result<(), EngineError> {
        let rooted = {
            let mut nodes = self.nodes.borrow_mut();
            let mut cursor = Some(parent);
            while let Some(id) = cursor {
                if id == child {
                    return Err(EngineError::SceneGraph(format!(
                        "binding node {} under node {} would create a cycle",
                        child.0, parent.0
                    )));
                }
                cursor = nodes[id.index()].parent;
            }
            if nodes[child.index()].parent == Some(parent) {
                return Ok(());
            }

            detach(&mut nodes, child);
            let slot = nodes[parent.index()].children.len();
            nodes[parent.index()].children.push(child);
            let rooted = nodes[parent.index()].rooted;
            let node = &mut nodes[child.index()];
            node.parent = Some(parent);
            node.slot = slot;

            set_rooted(&mut nodes, child, rooted);
            // A fresh node is already dirty-self, so the ancestor walk must not
            // depend on `mark_subtree` having done anything.
            mark_subtree(&mut nodes, child);
            mark_ancestors(&mut nodes, child);
            rooted
        };
        debug!(child = child.0, parent = parent.0, rooted, "node bound");
        if rooted {
            self.enqueue(child);
        }
        Ok(())
    }

    fn unbind(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes.borrow_mut();
        if nodes[id.index()].parent.is_none() {
            return false;
        }
        detach(&mut nodes, id);
        set_rooted(&mut nodes, id, false);
        debug!(node = id.0, "node unbound");
        true
    }

    fn update_once(&self) -> usize {
        let queued = std::mem::take(&mut *self.queue.borrow_mut());
        trace!(queued = queued.len(), "scene update");

        let mut changed: Vec<(Atom<Mat4>, Mat4, Hooks)> = Vec::new();
        {
            let mut nodes = self.nodes.borrow_mut();
            let mut stack = vec![(ORIGIN, Mat4::IDENTITY)];
            while let Some((id, parent_world)) = stack.pop() {
                let node = &mut nodes[id.index()];
                let world = match node.flag {
                    DirtyFlag::Clean => continue,
                    DirtyFlag::DirtyDescendant => node.world.get(),
                    DirtyFlag::DirtySelf => {
                        let world = parent_world * node.local.get();
                        changed.push((node.world.clone(), world, Rc::clone(&node.hooks)));
                        world
                    }
                };
                node.flag = DirtyFlag::Clean;
                stack.extend(node.children.iter().rev().map(|&child| (child, world)));
            }
        }

        for (cell, world, hooks) in &changed {
            cell.set(*world);
            let hooks = hooks.borrow().snapshot();
            for hook in hooks {
                hook(world);
            }
        }
        changed.len()
    }
}

/// Force `id` and its subtree to dirty-self. Stops below nodes that already
/// are; returns `false` if `id` itself already was.
fn mark_subtree(nodes: &mut [NodeData], id: NodeId) -> bool {
    if nodes[id.index()].flag == DirtyFlag::DirtySelf {
        return false;
    }
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
        let node = &mut nodes[next.index()];
        if node.flag == DirtyFlag::DirtySelf {
            continue;
        }
        node.flag = DirtyFlag::DirtySelf;
        stack.extend_from_slice(&node.children);
    }
    true
}

/// Mark strict ancestors dirty-descendant up to the first one already dirty.
fn mark_ancestors(nodes: &mut [NodeData], id: NodeId) {
    let mut cursor = nodes[id.index()].parent;
    while let Some(parent) = cursor {
        let node = &mut nodes[parent.index()];
        if node.flag.is_dirty() {
            break;
        }
        node.flag = DirtyFlag::DirtyDescendant;
        cursor = node.parent;
    }
}

fn detach(nodes: &mut [NodeData], id: NodeId) {
    let Some(parent) = nodes[id.index()].parent.take() else {
        return;
    };
    let slot = nodes[id.index()].slot;
    let moved = {
        let siblings = &mut nodes[parent.index()].children;
        siblings.swap_remove(slot);
        siblings.get(slot).copied()
    };
    if let Some(moved) = moved {
        nodes[moved.index()].slot = slot;
    }
}

fn set_rooted(nodes: &mut [NodeData], id: NodeId, rooted: bool) {
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
        let node = &mut nodes[next.index()];
        node.rooted = rooted;
        stack.extend_from_slice(&node.children);
    }
}

/// Handle to one node of a [`Scene`].
///
/// The world cell is an ordinary [`Atom`], so it can back a `mat4` uniform
/// directly.
#[derive(Clone)]
pub struct Node3D {
    id: NodeId,
    generation: u32,
    local: Atom<Mat4>,
    world: Atom<Mat4>,
    scene: Weak<SceneInner>,
}

impl fmt::Debug for Node3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node3D")
            .field("id", &self.id)
            .field("flag", &self.flag())
            .field("parent", &self.parent())
            .finish()
    }
}

impl PartialEq for Node3D {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.generation == other.generation
            && Weak::ptr_eq(&self.scene, &other.scene)
    }
}

impl Node3D {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn local(&self) -> &Atom<Mat4> {
        &self.local
    }

    pub fn world(&self) -> &Atom<Mat4> {
        &self.world
    }

    pub fn set_local(&self, local: Mat4) {
        self.local.set(local);
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world.get()
    }

    fn scene(&self) -> Result<Rc<SceneInner>, EngineError> {
        self.scene
            .upgrade()
            .ok_or_else(|| EngineError::SceneGraph(format!("node {} outlived its scene", self.id.0)))
    }

    fn read<R>(&self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        let scene = self.scene.upgrade()?;
        let nodes = scene.nodes.borrow();
        let node = &nodes[self.id.index()];
        (node.live && node.generation == self.generation).then(|| f(node))
    }

    pub fn flag(&self) -> DirtyFlag {
        self.read(|n| n.flag).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.read(|n| n.parent).flatten()
    }

    pub fn children(&self) -> Vec<NodeId> {
        self.read(|n| n.children.clone()).unwrap_or_default()
    }

    /// Reachable from the scene origin.
    pub fn is_rooted(&self) -> bool {
        self.read(|n| n.rooted).unwrap_or(false)
    }

    /// Attach under `parent`, leaving any previous parent. The subtree is
    /// marked stale and, if `parent` is rooted, queued for the next update.
    pub fn bind(&self, parent: &Node3D) -> Result<(), EngineError> {
        let scene = self.scene()?;
        if !Weak::ptr_eq(&self.scene, &parent.scene) {
            return Err(EngineError::SceneGraph(
                "cannot bind a node under a node of another scene".into(),
            ));
        }
        if self.id == ORIGIN {
            return Err(EngineError::SceneGraph(
                "the scene origin cannot be bound".into(),
            ));
        }
        scene.check_current(self.id, self.generation)?;
        scene.check_current(parent.id, parent.generation)?;
        scene.attach(self.id, parent.id)
    }

    /// Detach from the parent. Returns `false` if there was none.
    pub fn unbind(&self) -> bool {
        self.scene.upgrade().is_some_and(|scene| {
            scene.check_current(self.id, self.generation).is_ok() && scene.unbind(self.id)
        })
    }

    /// Recompute this node's world matrix on the next update even if its
    /// local transform did not change.
    pub fn mark_dirty(&self) {
        if let Some(scene) = self.scene.upgrade() {
            if scene.check_current(self.id, self.generation).is_ok() {
                scene.mark_dirty(self.id);
            }
        }
    }

    /// Run `f` with the new world matrix every time it is recomputed.
    pub fn on_update(&self, f: impl Fn(&Mat4) + 'static) -> Subscription {
        let Some(hooks) = self.read(|n| Rc::clone(&n.hooks)) else {
            return Subscription::noop();
        };
        let callback: Rc<UpdateHook> = Rc::new(f);
        let key = hooks.borrow_mut().insert(callback);
        let weak = Rc::downgrade(&hooks);
        Subscription::new(move || {
            if let Some(hooks) = weak.upgrade() {
                hooks.borrow_mut().remove(key);
            }
        })
    }
}
