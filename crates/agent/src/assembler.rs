//! Streaming response assembly.
//!
//! Turns the raw chunk stream of one model response into display events plus
//! the finished text and tool calls. Tool-call fragments are keyed by slot
//! index because only the first fragment of a slot carries the call ID.

use std::collections::BTreeMap;
use skiff_core::message::MessageToolCall;
use skiff_core::provider::{StreamChunk, ToolCallDelta};
use crate::stream_event::StreamEvent;

/// Text is always content block 0 within one response.
const TEXT_BLOCK: u32 = 0;

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallBuilder {
    fn start(delta: &ToolCallDelta) -> Self {
        let id = delta
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        Self {
            id,
            name: delta.name.clone().unwrap_or_default(),
            arguments: delta.arguments.clone().unwrap_or_default(),
        }
    }

    fn extend(&mut self, delta: &ToolCallDelta) {
        if self.name.is_empty()
            && let Some(name) = &delta.name
        {
            self.name = name.clone();
        }
        if let Some(args) = &delta.arguments {
            self.arguments.push_str(args);
        }
    }
}

/// The finished output of one model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledResponse {
    pub text: String,
    /// In ascending slot order
    pub tool_calls: Vec<MessageToolCall>,
}

/// Per-iteration assembler. Create a fresh one for every model response.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    text: String,
    text_started: bool,
    slots: BTreeMap<u32, ToolCallBuilder>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one chunk and return the display events it produces.
    pub fn push(&mut self, chunk: &StreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty()) {
            if !self.text_started {
                self.text_started = true;
                events.push(StreamEvent::ContentBlockStart { index: TEXT_BLOCK });
            }
            self.text.push_str(text);
            events.push(StreamEvent::ContentBlockDelta {
                index: TEXT_BLOCK,
                text: text.to_string(),
            });
        }

        for delta in &chunk.tool_calls {
            self.slots
                .entry(delta.index)
                .and_modify(|b| b.extend(delta))
                .or_insert_with(|| ToolCallBuilder::start(delta));
        }

        events
    }

    /// Whether any text has been seen.
    pub fn has_text(&self) -> bool {
        self.text_started
    }

    /// Finish the response. Returns the assembled output and, when text was
    /// streamed, the closing content-block event.
    ///
    /// Slots that never received a tool name are dropped.
    pub fn finish(self) -> (AssembledResponse, Option<StreamEvent>) {
        let stop = self
            .text_started
            .then_some(StreamEvent::ContentBlockStop { index: TEXT_BLOCK });

        let tool_calls = self
            .slots
            .into_values()
            .filter(|b| !b.name.is_empty())
            .map(|b| MessageToolCall {
                id: b.id,
                name: b.name,
                arguments: b.arguments,
            })
            .collect();

        (
            AssembledResponse {
                text: self.text,
                tool_calls,
            },
            stop,
        )
    }
}
