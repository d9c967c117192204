//! Per-thread statistics for the list overview.

use std::collections::{HashMap, HashSet};

use super::ThreadNode;
use crate::api::{EmailRecord, ListResponse};

/// One thread of a list, with the email that started it.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSummary<'a> {
    pub email: &'a EmailRecord,
    pub replies: usize,
    pub participants: usize,
    /// Epoch of the newest email in the thread
    pub last_activity: i64,
}

/// Replies anywhere below `node`. A child repeating its parent's id is not a reply.
pub fn count_replies(node: &ThreadNode) -> usize {
    node.children
        .iter()
        .map(|child| usize::from(child.id != node.id) + count_replies(child))
        .sum()
}

/// Distinct senders among the thread's emails that are present in `emails`.
pub fn count_people(node: &ThreadNode, emails: &HashMap<&str, &EmailRecord>) -> usize {
    fn collect<'a>(
        node: &ThreadNode,
        emails: &HashMap<&str, &'a EmailRecord>,
        people: &mut HashSet<&'a str>,
    ) {
        if let Some(email) = emails.get(node.id.as_str()) {
            people.insert(email.from.as_str());
        }
        for child in &node.children {
            collect(child, emails, people);
        }
    }

    let mut people = HashSet::new();
    collect(node, emails, &mut people);
    people.len()
}

pub fn last_activity(node: &ThreadNode) -> i64 {
    node.children
        .iter()
        .map(last_activity)
        .fold(node.epoch, i64::max)
}

/// Summaries of every thread in `list`, newest thread first.
///
/// Threads whose starting email is missing from the payload are skipped.
pub fn summarize(list: &ListResponse) -> Vec<ThreadSummary<'_>> {
    let emails: HashMap<&str, &EmailRecord> =
        list.emails.iter().map(|email| (email.key(), email)).collect();

    list.thread_struct
        .iter()
        .rev()
        .filter_map(|thread| {
            let Some(&email) = emails.get(thread.id.as_str()) else {
                tracing::debug!(id = %thread.id, "Thread start missing from list payload");
                return None;
            };
            Some(ThreadSummary {
                email,
                replies: count_replies(thread),
                participants: count_people(thread, &emails),
                last_activity: last_activity(thread),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(id: &str, from: &str) -> EmailRecord {
        EmailRecord {
            mid: id.to_string(),
            id: id.to_string(),
            from: from.to_string(),
            ..Default::default()
        }
    }

    fn sample() -> ListResponse {
        ListResponse {
            thread_struct: vec![
                ThreadNode::new("old", 100).with_children(vec![
                    ThreadNode::new("r1", 150).with_children(vec![ThreadNode::new("r2", 400)]),
                    ThreadNode::new("r3", 200),
                ]),
                ThreadNode::new("new", 300),
                ThreadNode::new("ghost", 500),
            ],
            emails: vec![
                email("old", "Ann <ann@example.org>"),
                email("r1", "Bob <bob@example.org>"),
                email("r2", "Ann <ann@example.org>"),
                email("r3", "Cy <cy@example.org>"),
                email("new", "Bob <bob@example.org>"),
            ],
        }
    }

    #[test]
    fn test_count_replies_is_recursive() {
        let list = sample();
        assert_eq!(count_replies(&list.thread_struct[0]), 3);
        assert_eq!(count_replies(&list.thread_struct[1]), 0);
    }

    #[test]
    fn test_child_with_parent_id_is_not_a_reply() {
        let node = ThreadNode::new("a", 1)
            .with_children(vec![ThreadNode::new("a", 2), ThreadNode::new("b", 3)]);
        assert_eq!(count_replies(&node), 1);
    }

    #[test]
    fn test_count_people_dedups_senders() {
        let list = sample();
        let emails: HashMap<&str, &EmailRecord> =
            list.emails.iter().map(|e| (e.key(), e)).collect();
        assert_eq!(count_people(&list.thread_struct[0], &emails), 3);
        assert_eq!(count_people(&list.thread_struct[1], &emails), 1);
        assert_eq!(count_people(&list.thread_struct[2], &emails), 0);
    }

    #[test]
    fn test_last_activity_is_newest_in_subtree() {
        let list = sample();
        assert_eq!(last_activity(&list.thread_struct[0]), 400);
        assert_eq!(last_activity(&list.thread_struct[1]), 300);
    }

    #[test]
    fn test_summarize_newest_first_skips_unknown() {
        let list = sample();
        let summaries = summarize(&list);
        let ids: Vec<&str> = summaries.iter().map(|s| s.email.key()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(summaries[1].replies, 3);
        assert_eq!(summaries[1].participants, 3);
        assert_eq!(summaries[1].last_activity, 400);
    }

    #[test]
    fn test_stats_payload_deserializes() {
        let list: ListResponse = serde_json::from_str(
            r#"{
                "thread_struct": [
                    {"tid": "t1", "epoch": 10, "nest": 1, "subject": "Hi", "children": [
                        {"tid": "t2", "epoch": 20, "nest": 2, "children": []}
                    ]}
                ],
                "emails": [
                    {"id": "t1", "mid": "t1", "from": "Ann <ann@example.org>", "epoch": 10},
                    {"id": "t2", "mid": "t2", "from": "Bob <bob@example.org>", "epoch": 20}
                ],
                "hits": 2,
                "list": "dev@example.org"
            }"#,
        )
        .unwrap();
        let summaries = summarize(&list);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].replies, 1);
        assert_eq!(summaries[0].participants, 2);
    }
}
