use std::collections::{BTreeMap, HashMap, HashSet};

use tether_shared::schemas::{FileArtifact, InterruptData, Message, TodoItem, ToolCall};

use crate::normalize::ErrorPayload;

/// The projected view of one session, derived purely from the ordered
/// event history. Everything the rendering layer consumes lives here.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    messages: Vec<Message>,
    /// Message id -> position in `messages`; streaming deltas must not
    /// re-scan history.
    index: HashMap<String, usize>,
    /// Finalized message ids. Terminal; never revisited.
    finalized: HashSet<String>,
    /// Tool calls by id. Identity is stable across preview/full
    /// representations of the same call.
    pub tool_calls: HashMap<String, ToolCall>,
    /// Tool call id -> owning message id, for mirroring terminal updates
    /// into the message's embedded copy.
    pub(crate) tool_call_owner: HashMap<String, String>,
    pub todos: Vec<TodoItem>,
    /// Set once an explicit todos update arrives; weaker sources
    /// (message metadata, tool results) no longer apply after that.
    pub(crate) todos_from_update: bool,
    pub files: BTreeMap<String, FileArtifact>,
    /// At most one active interrupt per session.
    pub interrupt: Option<InterruptData>,
    pub is_loading: bool,
    pub last_error: Option<ErrorPayload>,
}

impl SessionState {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&pos| &self.messages[pos])
    }

    pub(crate) fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        match self.index.get(id) {
            Some(&pos) => self.messages.get_mut(pos),
            None => None,
        }
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Append a message, refusing duplicates: no two messages with the
    /// same id may coexist.
    pub(crate) fn push_message(&mut self, msg: Message) -> bool {
        if msg.id.is_empty() || self.index.contains_key(&msg.id) {
            return false;
        }
        self.index.insert(msg.id.clone(), self.messages.len());
        for call in &msg.tool_calls {
            if call.id.is_empty() {
                continue;
            }
            self.tool_calls.insert(call.id.clone(), call.clone());
            self.tool_call_owner.insert(call.id.clone(), msg.id.clone());
        }
        self.messages.push(msg);
        true
    }

    pub(crate) fn is_finalized(&self, id: &str) -> bool {
        self.finalized.contains(id)
    }

    pub(crate) fn finalize(&mut self, id: &str) {
        self.finalized.insert(id.to_string());
    }

    /// Replace the message log wholesale (snapshot seeding), rebuilding
    /// the id index and the tool-call map from embedded copies.
    pub(crate) fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        self.index.clear();
        self.finalized.clear();
        self.tool_calls.clear();
        self.tool_call_owner.clear();
        for msg in messages {
            self.push_message(msg);
        }
    }
}
