//! Thread reconstruction: descriptor tree in, render tree and fetch list out.
//! List overviews reuse the same descriptor trees for per-thread statistics.

pub mod builder;
pub mod loader;
pub mod summary;

pub use builder::{FetchRequest, RenderNode, RenderTree, ThreadBuilder};
pub use loader::{load_thread, LoadedThread, RenderedEmail, SlotContent};
pub use summary::{summarize, ThreadSummary};

use serde::{Deserialize, Serialize};

use crate::config::{NARROW_LAYOUT_WIDTH, NESTING_LEVEL_WIDTH};

/// A node of the backend's reply tree.
///
/// The backend names the identifier `tid` on thread roots and `mid` or `id`
/// on children; whichever is present first wins, in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawThreadNode")]
pub struct ThreadNode {
    pub id: String,
    pub epoch: i64,
    pub children: Vec<ThreadNode>,
}

#[derive(Deserialize)]
struct RawThreadNode {
    #[serde(default)]
    tid: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    mid: Option<String>,
    #[serde(default)]
    epoch: i64,
    #[serde(default)]
    children: Vec<RawThreadNode>,
}

impl From<RawThreadNode> for ThreadNode {
    fn from(raw: RawThreadNode) -> Self {
        let id = [raw.tid, raw.id, raw.mid]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .unwrap_or_default();
        Self {
            id,
            epoch: raw.epoch,
            children: raw.children.into_iter().map(ThreadNode::from).collect(),
        }
    }
}

impl ThreadNode {
    pub fn new(id: impl Into<String>, epoch: i64) -> Self {
        Self {
            id: id.into(),
            epoch,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ThreadNode>) -> Self {
        self.children = children;
        self
    }
}

/// Render layout inputs for one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub max_nesting: usize,
}

impl Layout {
    pub fn new(width: u32, max_nesting: usize) -> Self {
        Self { width, max_nesting }
    }

    /// Nesting depth after narrow-screen reduction.
    pub fn effective_max_nesting(&self) -> usize {
        if self.width < NARROW_LAYOUT_WIDTH {
            (self.width / NESTING_LEVEL_WIDTH) as usize
        } else {
            self.max_nesting
        }
    }
}
