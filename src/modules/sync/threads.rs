// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use crate::modules::store::message::MessageStore;
use ahash::AHashMap;

/// Resolves the thread for one new message: adopt the thread any of its
/// header identifiers already belong to, otherwise start a thread named by
/// the message's own message-id.
pub async fn resolve_thread_id(
    messages: &dyn MessageStore,
    account_id: u64,
    message_id: &str,
    in_reply_to: &str,
    references: &[String],
) -> MailSyncResult<String> {
    if let Some(existing) = messages
        .find_thread_id(account_id, message_id, in_reply_to, references)
        .await?
    {
        return Ok(existing);
    }
    Ok(message_id.to_string())
}

/// Union-find over header message-ids, used to group the messages of one
/// header batch that reference each other before they hit the store. An
/// arena of indices instead of a pointer graph; reference cycles in mail
/// headers are harmless here.
pub struct ThreadLinker {
    parent: Vec<usize>,
    by_header_id: AHashMap<String, usize>,
}

impl ThreadLinker {
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            by_header_id: AHashMap::new(),
        }
    }

    /// Registers one message and unions it with every identifier it
    /// carries. Returns an opaque handle for [`root`](ThreadLinker::root).
    pub fn add_message(
        &mut self,
        message_id: &str,
        in_reply_to: &str,
        references: &[String],
    ) -> usize {
        let node = self.fresh_node();
        for key in std::iter::once(message_id)
            .chain(std::iter::once(in_reply_to))
            .chain(references.iter().map(String::as_str))
        {
            if key.is_empty() {
                continue;
            }
            let id_node = match self.by_header_id.get(key) {
                Some(&existing) => existing,
                None => {
                    let fresh = self.fresh_node();
                    self.by_header_id.insert(key.to_string(), fresh);
                    fresh
                }
            };
            self.union(node, id_node);
        }
        node
    }

    pub fn root(&mut self, node: usize) -> usize {
        self.find(node)
    }

    fn fresh_node(&mut self) -> usize {
        let node = self.parent.len();
        self.parent.push(node);
        node
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        let mut cursor = node;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

impl Default for ThreadLinker {
    fn default() -> Self {
        Self::new()
    }
}
