//! Conversation grouping.
//!
//! Messages are linked through `Message-ID`, `In-Reply-To`, and `References`.
//! Any two messages connected through a chain of those identifiers end up in
//! the same thread, even when an intermediate message is missing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::model::message::MessageRecord;
use crate::model::part::strip_angle_brackets;

/// Group messages into threads, returning indices into `messages`.
///
/// Indices inside a thread are sorted by message date (oldest first); threads
/// are sorted by their newest message (newest first).
pub fn group_threads(messages: &[MessageRecord]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(messages.len());
    // Normalized id → first message index that mentions it.
    let mut owners: HashMap<String, usize> = HashMap::new();

    for (idx, message) in messages.iter().enumerate() {
        let linked = std::iter::once(message.id.as_str())
            .chain(message.in_reply_to.as_deref())
            .chain(message.references.iter().map(String::as_str));

        for id in linked {
            let id = normalize_id(id);
            if id.is_empty() {
                continue;
            }
            match owners.entry(id) {
                Entry::Occupied(owner) => sets.union(idx, *owner.get()),
                Entry::Vacant(slot) => {
                    slot.insert(idx);
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for idx in 0..messages.len() {
        groups.entry(sets.find(idx)).or_default().push(idx);
    }

    let mut threads: Vec<Vec<usize>> = groups
        .into_values()
        .map(|mut members| {
            members.sort_by_key(|&i| (messages[i].date, i));
            members
        })
        .collect();

    let newest = |members: &Vec<usize>| members.iter().map(|&i| messages[i].date).max();
    threads.sort_by(|a, b| newest(b).cmp(&newest(a)).then(a[0].cmp(&b[0])));
    threads
}

/// Normalize a message id: strip angle brackets and lowercase.
fn normalize_id(id: &str) -> String {
    strip_angle_brackets(id).to_lowercase()
}

/// Union-find over message indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = rb.min(ra);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::model::address::EmailAddress;
    use crate::model::message::MessageBody;

    fn message(id: &str, day: u32, in_reply_to: Option<&str>, refs: &[&str]) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            date: Utc.with_ymd_and_hms(2025, 8, day, 9, 0, 0).unwrap(),
            subject: String::new(),
            from: EmailAddress::new("", "a@b.c"),
            to: Vec::new(),
            raw: Vec::new(),
            body: MessageBody::default(),
            parts: Vec::new(),
            in_reply_to: in_reply_to.map(str::to_string),
            references: refs.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_reply_joins_thread() {
        let messages = vec![
            message("a@x", 1, None, &[]),
            message("b@x", 2, Some("<a@x>"), &["<a@x>"]),
            message("c@x", 3, None, &[]),
        ];
        let threads = group_threads(&messages);
        // Newest thread first
        assert_eq!(threads, vec![vec![2], vec![0, 1]]);
    }

    #[test]
    fn test_missing_parent_still_links_siblings() {
        let messages = vec![
            message("b@x", 2, Some("root@x"), &[]),
            message("c@x", 3, None, &["<ROOT@x>"]),
        ];
        assert_eq!(group_threads(&messages), vec![vec![0, 1]]);
    }

    #[test]
    fn test_thread_members_sorted_by_date() {
        let messages = vec![
            message("late@x", 9, Some("early@x"), &[]),
            message("early@x", 1, None, &[]),
        ];
        assert_eq!(group_threads(&messages), vec![vec![1, 0]]);
    }

    #[test]
    fn test_empty() {
        assert!(group_threads(&[]).is_empty());
    }
}
