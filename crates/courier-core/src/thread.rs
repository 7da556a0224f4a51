// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only views over the reply tree of a chat.
//!
//! Messages form a forest through `reply_to_message_id`. Several messages may
//! reply to the same parent (an edited prompt, a regenerated answer), which
//! creates branches. Nothing here mutates messages: picking a branch only
//! changes which path is returned.
//!
//! A message whose parent is not part of the given slice is treated as a root.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::types::Message;

struct Tree<'a> {
    children: HashMap<Option<&'a str>, Vec<&'a Message>>,
    /// Most recent timestamp anywhere in each message's subtree.
    activity: HashMap<&'a str, (DateTime<Utc>, &'a str)>,
}

impl<'a> Tree<'a> {
    fn build(messages: &'a [Message]) -> Self {
        let by_id: HashMap<&str, &Message> = messages.iter().map(|m| (m.id.as_str(), m)).collect();
        let parent_of = |m: &'a Message| -> Option<&'a str> {
            m.reply_to_message_id
                .as_deref()
                .filter(|p| *p != m.id && by_id.contains_key(p))
        };

        let mut children: HashMap<Option<&str>, Vec<&Message>> = HashMap::new();
        for m in messages {
            children.entry(parent_of(m)).or_default().push(m);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        }

        let mut activity: HashMap<&str, (DateTime<Utc>, &str)> = HashMap::new();
        for m in messages {
            let stamp = (m.timestamp, m.id.as_str());
            let mut current = Some(m);
            let mut seen = HashSet::new();
            while let Some(node) = current {
                if !seen.insert(node.id.as_str()) {
                    break;
                }
                let slot = activity.entry(node.id.as_str()).or_insert(stamp);
                if stamp > *slot {
                    *slot = stamp;
                }
                current = parent_of(node).and_then(|p| by_id.get(p).copied());
            }
        }

        Self { children, activity }
    }

    fn kids(&self, parent: Option<&'a str>) -> &[&'a Message] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Branch with the most recent activity.
    fn liveliest(&self, options: &[&'a Message]) -> Option<&'a Message> {
        options
            .iter()
            .max_by_key(|m| self.activity.get(m.id.as_str()).copied())
            .copied()
    }

    fn walk(&self, selections: &HashMap<String, String>) -> Vec<&'a Message> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.liveliest(self.kids(None));
        while let Some(node) = current {
            if !seen.insert(node.id.as_str()) {
                break;
            }
            path.push(node);
            let options = self.kids(Some(node.id.as_str()));
            current = selections
                .get(&node.id)
                .and_then(|chosen| options.iter().find(|m| m.id == *chosen).copied())
                .or_else(|| self.liveliest(options));
        }
        path
    }
}

/// Direct replies to `parent_id` (roots when `None`), oldest first.
///
/// An unknown `parent_id` has no children.
pub fn children_of<'a>(messages: &'a [Message], parent_id: Option<&str>) -> Vec<&'a Message> {
    let tree = Tree::build(messages);
    let key = match parent_id {
        None => None,
        Some(id) => match messages.iter().find(|m| m.id == id) {
            Some(parent) => Some(parent.id.as_str()),
            None => return Vec::new(),
        },
    };
    tree.kids(key).to_vec()
}

/// The conversation as shown by default: root first, following the branch
/// with the most recent activity at every fork. Ends at the latest message.
pub fn default_path(messages: &[Message]) -> Vec<&Message> {
    Tree::build(messages).walk(&HashMap::new())
}

/// Like [`default_path`], but `selections` maps a parent id to the child that
/// should be followed at that fork. Unknown selections fall back to the default.
pub fn path_with_selection<'a>(
    messages: &'a [Message],
    selections: &HashMap<String, String>,
) -> Vec<&'a Message> {
    Tree::build(messages).walk(selections)
}

/// Zero-based position of `id` among its siblings and the sibling count.
pub fn sibling_position(messages: &[Message], id: &str) -> Option<(usize, usize)> {
    let tree = Tree::build(messages);
    tree.children.values().find_map(|siblings| {
        siblings
            .iter()
            .position(|m| m.id == id)
            .map(|idx| (idx, siblings.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Platform};
    use chrono::TimeZone;

    fn msg(id: &str, parent: Option<&str>, secs: i64) -> Message {
        let mut m = Message::new(Platform::WebChat, id, "ch", "u", "chat", Direction::Incoming);
        m.reply_to_message_id = parent.map(str::to_string);
        m.timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        m
    }

    fn ids(path: &[&Message]) -> Vec<String> {
        path.iter().map(|m| m.id.clone()).collect()
    }

    /// root -> q1 -> a1
    ///      -> q2 -> a2 -> q3
    fn branched() -> Vec<Message> {
        vec![
            msg("root", None, 0),
            msg("q1", Some("root"), 10),
            msg("a1", Some("q1"), 11),
            msg("q2", Some("root"), 20),
            msg("a2", Some("q2"), 21),
            msg("q3", Some("a2"), 30),
        ]
    }

    #[test]
    fn default_path_follows_latest_branch() {
        let messages = branched();
        assert_eq!(ids(&default_path(&messages)), ["root", "q2", "a2", "q3"]);
    }

    #[test]
    fn old_branch_with_new_activity_wins() {
        let mut messages = branched();
        messages.push(msg("a1b", Some("a1"), 40));
        assert_eq!(ids(&default_path(&messages)), ["root", "q1", "a1", "a1b"]);
    }

    #[test]
    fn selection_switches_branch() {
        let messages = branched();
        let selections = HashMap::from([("root".to_string(), "q1".to_string())]);
        assert_eq!(
            ids(&path_with_selection(&messages, &selections)),
            ["root", "q1", "a1"]
        );
    }

    #[test]
    fn unknown_selection_falls_back() {
        let messages = branched();
        let selections = HashMap::from([("root".to_string(), "missing".to_string())]);
        assert_eq!(
            ids(&path_with_selection(&messages, &selections)),
            ["root", "q2", "a2", "q3"]
        );
    }

    #[test]
    fn siblings_are_ordered_by_time() {
        let messages = branched();
        assert_eq!(ids(&children_of(&messages, Some("root"))), ["q1", "q2"]);
        assert_eq!(sibling_position(&messages, "q2"), Some((1, 2)));
        assert_eq!(sibling_position(&messages, "q3"), Some((0, 1)));
        assert_eq!(sibling_position(&messages, "nope"), None);
    }

    #[test]
    fn children_lookup_accepts_borrowed_ids() {
        let messages = branched();
        let parent = String::from("q2");
        assert_eq!(ids(&children_of(&messages, Some(parent.as_str()))), ["a2"]);
        drop(parent);
        assert_eq!(ids(&children_of(&messages, None)), ["root"]);
        assert!(children_of(&messages, Some("missing")).is_empty());
    }

    #[test]
    fn orphan_reply_is_a_root() {
        let messages = vec![msg("late", Some("not-loaded"), 5)];
        assert_eq!(ids(&default_path(&messages)), ["late"]);
    }

    #[test]
    fn empty_chat_has_empty_path() {
        assert!(default_path(&[]).is_empty());
    }
}
