//! Template-facing views of loaded threads and emails.

use serde::Serialize;

use crate::api::{EmailRecord, Links, ListQuery};
use crate::fixup::Segment;
use crate::thread::{LoadedThread, RenderNode, RenderedEmail, SlotContent, ThreadSummary};

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    pub filename: String,
    pub size: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailView {
    pub mid: String,
    pub subject: String,
    pub author_name: String,
    pub author_address: Option<String>,
    pub epoch: i64,
    pub list_name: String,
    pub recipients: Vec<String>,
    pub private: bool,
    pub in_reply_to: Option<String>,
    pub attachments: Vec<AttachmentView>,
    pub source_url: String,
    pub permalink: String,
    /// `mailto:` link replying on the list
    pub reply_url: String,
    pub segments: Vec<Segment>,
}

impl EmailView {
    pub fn new(record: &EmailRecord, segments: &[Segment], links: &Links) -> Self {
        Self {
            mid: record.mid.clone(),
            subject: record.display_subject().to_string(),
            author_name: record.author_name(),
            author_address: record.author_address().map(str::to_string),
            epoch: record.epoch,
            list_name: record.list_name(),
            recipients: record.recipients(),
            private: record.private,
            in_reply_to: record.in_reply_to.clone().filter(|_| record.is_reply()),
            attachments: record
                .attachments
                .iter()
                .map(|a| AttachmentView {
                    filename: a.filename.clone(),
                    size: a.display_size(),
                    url: links.attachment_url(&record.mid, &a.hash),
                })
                .collect(),
            source_url: links.source_url(&record.mid),
            permalink: format!("/thread/{}", urlencoding::encode(&record.mid)),
            reply_url: record.reply_mailto(),
            segments: segments.to_vec(),
        }
    }

    pub fn from_rendered(rendered: &RenderedEmail, links: &Links) -> Self {
        Self::new(&rendered.record, &rendered.segments, links)
    }
}

/// What a placeholder shows.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotView {
    Pending,
    Email { email: Box<EmailView> },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: String,
    pub slot: usize,
    pub depth: usize,
    pub nested: bool,
    pub color: &'static str,
    pub scroll_into_view: bool,
    pub cycle: bool,
    pub content: SlotView,
    pub children: Vec<NodeView>,
}

fn node_view(node: &RenderNode, loaded: &LoadedThread, links: &Links) -> NodeView {
    let content = match loaded.slot(node.slot) {
        SlotContent::Pending => SlotView::Pending,
        SlotContent::Email(rendered) => SlotView::Email {
            email: Box::new(EmailView::from_rendered(rendered, links)),
        },
        SlotContent::Failed(message) => SlotView::Failed {
            message: message.clone(),
        },
    };
    NodeView {
        id: node.id.clone(),
        slot: node.slot,
        depth: node.depth,
        nested: node.nested,
        color: node.color,
        scroll_into_view: node.scroll_into_view,
        cycle: node.cycle,
        content,
        children: node
            .children
            .iter()
            .map(|child| node_view(child, loaded, links))
            .collect(),
    }
}

/// Whole-page view of a loaded thread.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub subject: String,
    pub list_name: String,
    pub list_url: String,
    /// Set when the root replies to an email outside this thread
    pub in_reply_to: Option<String>,
    pub root: NodeView,
    pub errors: Vec<String>,
}

impl ThreadView {
    pub fn new(loaded: &LoadedThread, fallback: Option<&EmailRecord>, links: &Links) -> Self {
        let root_record = loaded.root_email().map(|r| &r.record).or(fallback);
        let list_name = root_record.map(EmailRecord::list_name).unwrap_or_default();
        Self {
            subject: root_record
                .map(|r| r.display_subject().to_string())
                .unwrap_or_default(),
            list_url: links.list_url(&list_name),
            list_name,
            in_reply_to: root_record
                .filter(|r| r.is_reply())
                .and_then(|r| r.in_reply_to.clone()),
            root: node_view(&loaded.tree.root, loaded, links),
            errors: loaded.errors().to_vec(),
        }
    }
}

/// One line of the list overview.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadEntryView {
    pub permalink: String,
    pub subject: String,
    pub author_name: String,
    /// Body excerpt as shortened by the backend
    pub teaser: String,
    pub list_name: String,
    pub participants: usize,
    pub participants_label: String,
    pub replies: usize,
    pub replies_label: String,
    pub last_activity: i64,
}

fn count_label(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("one {}", one)
    } else {
        format!("{} {}", count, many)
    }
}

impl ThreadEntryView {
    pub fn new(summary: &ThreadSummary<'_>) -> Self {
        let email = summary.email;
        Self {
            permalink: format!("/thread/{}", urlencoding::encode(email.key())),
            subject: email.display_subject().to_string(),
            author_name: email.author_name(),
            teaser: email.body.clone(),
            list_name: email.list_name(),
            participants: summary.participants,
            participants_label: count_label(summary.participants, "participant", "participants"),
            replies: summary.replies,
            replies_label: count_label(summary.replies, "reply", "replies"),
            last_activity: summary.last_activity,
        }
    }
}

/// Whole-page view of a list's threads.
#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub address: String,
    pub month: Option<String>,
    /// Wildcard queries label each thread with its list
    pub wildcard: bool,
    /// `mailto:` link starting a new thread; unset for wildcard queries
    pub compose_url: Option<String>,
    pub threads: Vec<ThreadEntryView>,
}

impl ListView {
    pub fn new(query: &ListQuery, summaries: &[ThreadSummary<'_>]) -> Self {
        let address = query.address();
        let wildcard = query.is_wildcard();
        Self {
            compose_url: (!wildcard)
                .then(|| format!("mailto:{}?subject=Subject+goes+here", address)),
            address,
            month: query.month.clone(),
            wildcard,
            threads: summaries.iter().map(ThreadEntryView::new).collect(),
        }
    }
}
