//! Fire one request per message id and fill the render tree's slots.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::RenderTree;
use crate::api::{ApiError, EmailRecord, EmailSource};
use crate::fixup::{fixup_body, FixupOptions, Segment};

/// A fetched email with its body already segmented.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub record: EmailRecord,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotContent {
    /// Not fetched: the node had no id, or the response was superseded
    Pending,
    Email(Arc<RenderedEmail>),
    /// User-visible failure notice
    Failed(String),
}

static PENDING: SlotContent = SlotContent::Pending;

/// Result of loading every email of a render tree.
#[derive(Debug)]
pub struct LoadedThread {
    pub tree: RenderTree,
    slots: Vec<SlotContent>,
    records: HashMap<String, Arc<RenderedEmail>>,
    errors: Vec<String>,
}

impl LoadedThread {
    pub fn slot(&self, slot: usize) -> &SlotContent {
        self.slots.get(slot).unwrap_or(&PENDING)
    }

    pub fn email(&self, id: &str) -> Option<&Arc<RenderedEmail>> {
        self.records.get(id)
    }

    /// The root's email, if it loaded.
    pub fn root_email(&self) -> Option<&Arc<RenderedEmail>> {
        self.email(&self.tree.root.id)
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Fetch every email of `tree` concurrently and segment the bodies.
///
/// A failed fetch fills its slots with an error notice and never affects
/// siblings. There are no retries.
pub async fn load_thread(
    source: &dyn EmailSource,
    tree: RenderTree,
    options: &FixupOptions,
) -> LoadedThread {
    let requests = tree.fetches.iter().map(|request| async move {
        let result = source.fetch_email(&request.id).await;
        (request.id.as_str(), result)
    });
    let results = join_all(requests).await;

    let mut slots = vec![SlotContent::Pending; tree.node_count()];
    let mut records = HashMap::new();
    let mut errors = Vec::new();

    for (id, result) in results {
        let content = match result {
            Ok(record) => {
                let segments = fixup_body(&record.body, options);
                let rendered = Arc::new(RenderedEmail { record, segments });
                records.insert(id.to_string(), Arc::clone(&rendered));
                SlotContent::Email(rendered)
            }
            Err(ApiError::Superseded) => {
                tracing::debug!(%id, "Fetch superseded, leaving slot pending");
                continue;
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "Failed to load email");
                let message = format!("Sorry, we hit a snag while trying to load the email: {}", e);
                errors.push(message.clone());
                SlotContent::Failed(message)
            }
        };
        for &slot in tree.slots_for(id) {
            if let Some(target) = slots.get_mut(slot) {
                *target = content.clone();
            }
        }
    }

    LoadedThread {
        tree,
        slots,
        records,
        errors,
    }
}
