use crate::error::{Error, Result};
use std::collections::HashMap;

/// One subscriber's slot in the trie: who, and at what granted qos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub session: u64,
    pub qos: u8,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    /// Subscribers attached directly to this level (exact match).
    here: HashMap<u64, u8>,
    /// Subscribers that matched via a trailing `#` rooted at this level.
    multi: HashMap<u64, u8>,
}

impl Node {
    fn prune_if_empty(&self) -> bool {
        self.children.is_empty() && self.here.is_empty() && self.multi.is_empty()
    }
}

/// Matches topics against subscribed filters using the `+`/`#` wildcard
/// rules, per spec.md §4.4. Each part of a filter is a trie edge; `#`
/// subscribers are stored in a bucket on the parent of the final part
/// instead of becoming their own edge.
#[derive(Debug, Default)]
pub struct SubscriptionTrie {
    root: Node,
}

fn validate_filter(parts: &[&str]) -> Result<()> {
    for (i, part) in parts.iter().enumerate() {
        if *part == "#" && i != parts.len() - 1 {
            return Err(Error::BadTopicFilter(
                "'#' must be the last level of a filter".into(),
            ));
        }
        if part.len() > 1 && part.contains(['+', '#']) {
            return Err(Error::BadTopicFilter(format!(
                "'+'/'#' must occupy a whole level, found {part:?}"
            )));
        }
    }
    Ok(())
}

impl SubscriptionTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `(session, qos)` to the node reached by walking
    /// `pattern`. A trailing `#` attaches to the multi-level bucket of
    /// its parent instead of creating a `#` edge.
    pub fn subscribe(&mut self, pattern: &str, qos: u8, session: u64) -> Result<()> {
        let parts: Vec<&str> = pattern.split('/').collect();
        validate_filter(&parts)?;

        let mut node = &mut self.root;
        let (last, init) = parts.split_last().expect("split('/') yields >=1 part");
        for part in init {
            node = node.children.entry((*part).to_string()).or_default();
        }
        if *last == "#" {
            node.multi.insert(session, qos);
        } else {
            let leaf = node.children.entry((*last).to_string()).or_default();
            leaf.here.insert(session, qos);
        }
        Ok(())
    }

    /// Removes `session` from the terminal node of `pattern` and prunes
    /// any branch left empty by the removal.
    pub fn unsubscribe(&mut self, pattern: &str, session: u64) {
        let parts: Vec<&str> = pattern.split('/').collect();
        Self::unsubscribe_walk(&mut self.root, &parts, session);
    }

    fn unsubscribe_walk(node: &mut Node, parts: &[&str], session: u64) -> bool {
        match parts.split_first() {
            None => false,
            Some((&"#", _)) => {
                node.multi.remove(&session);
                false
            }
            Some((part, rest)) => {
                let Some(child) = node.children.get_mut(*part) else {
                    return false;
                };
                if rest.is_empty() {
                    child.here.remove(&session);
                } else {
                    Self::unsubscribe_walk(child, rest, session);
                }
                if child.prune_if_empty() {
                    node.children.remove(*part);
                }
                node.prune_if_empty()
            }
        }
    }

    /// Walks every path matching `topic`'s levels, collecting one
    /// `(session, qos)` per subscriber at its maximum matched qos.
    pub fn publish(&self, topic: &str) -> Vec<Subscriber> {
        let parts: Vec<&str> = topic.split('/').collect();
        let root_excluded = topic.starts_with('$');
        let mut matches: HashMap<u64, u8> = HashMap::new();
        Self::publish_walk(&self.root, &parts, root_excluded, &mut matches);
        matches
            .into_iter()
            .map(|(session, qos)| Subscriber { session, qos })
            .collect()
    }

    fn publish_walk(node: &Node, parts: &[&str], at_root: bool, out: &mut HashMap<u64, u8>) {
        let Some((part, rest)) = parts.split_first() else {
            for (&session, &qos) in &node.here {
                merge(out, session, qos);
            }
            return;
        };

        if let Some(child) = node.children.get(*part) {
            if rest.is_empty() {
                for (&session, &qos) in &child.here {
                    merge(out, session, qos);
                }
            } else {
                Self::publish_walk(child, rest, false, out);
            }
            if !at_root {
                for (&session, &qos) in &child.multi {
                    merge(out, session, qos);
                }
            }
        }

        if !at_root {
            if let Some(plus) = node.children.get("+") {
                if rest.is_empty() {
                    for (&session, &qos) in &plus.here {
                        merge(out, session, qos);
                    }
                } else {
                    Self::publish_walk(plus, rest, false, out);
                }
                for (&session, &qos) in &plus.multi {
                    merge(out, session, qos);
                }
            }
            for (&session, &qos) in &node.multi {
                merge(out, session, qos);
            }
        }
    }
}

fn merge(out: &mut HashMap<u64, u8>, session: u64, qos: u8) {
    out.entry(session)
        .and_modify(|existing| *existing = (*existing).max(qos))
        .or_insert(qos);
}
