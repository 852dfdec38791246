//! The message log sent to the model.
//!
//! Rebuilt as `[system, user]` on every submitted prompt and only grown by
//! whole tool turns afterwards, so a `tool` message always directly follows
//! the `assistant` message holding the call it answers.

use crate::api_types::Message;

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    tool_turns: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log with a fresh system + user exchange.
    pub fn start(&mut self, system_prompt: &str, user_prompt: &str) {
        self.messages = vec![Message::system(system_prompt), Message::user(user_prompt)];
        self.tool_turns = 0;
    }

    /// Append the assistant's raw call text and the tool results answering it.
    /// Returns the id linking the two.
    pub fn push_tool_turn(&mut self, assistant_raw: &str, tool_content: &str) -> String {
        let call_id = format!("call_{}", self.tool_turns);
        self.tool_turns += 1;
        self.messages.push(Message::assistant(assistant_raw));
        self.messages.push(Message::tool(tool_content, call_id.clone()));
        call_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

}
