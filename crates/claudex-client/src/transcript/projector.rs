//! Transcript projector
//!
//! Single-pass reduction of an event sequence into a renderable
//! transcript. The projection is pure and deterministic: the same
//! sequence always yields structurally equal output, so it can be
//! replayed as often as rendering needs it.

use std::collections::HashMap;

use serde_json::Value;

use crate::event_log::{StreamEvent, ToolPayload, ToolStatus};

/// Derived view of all lifecycle events sharing one tool-call id.
///
/// Status is monotonic: once completed or failed, later events for the
/// same id can update result/error fields but never reopen the call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolAggregate {
    pub id: String,
    pub name: String,
    pub title: String,
    pub status: ToolStatus,
    pub parent_id: Option<String>,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub children: Vec<ToolAggregate>,
}

/// The materialized view of one message's event log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcript {
    /// Concatenated assistant text, in event order.
    pub text: String,
    /// Thinking blocks, in event order.
    pub thinking: Vec<String>,
    /// Tool aggregate forest. Root order and child order are first-seen
    /// order.
    pub tools: Vec<ToolAggregate>,
}

/// Working node: children held as ids so deep updates stay O(1); the
/// nested forest is materialized once at the end of the pass.
struct Node {
    id: String,
    name: String,
    title: String,
    status: ToolStatus,
    parent_id: Option<String>,
    input: Option<Value>,
    result: Option<Value>,
    error: Option<String>,
    child_ids: Vec<String>,
}

/// Project an ordered event sequence into a transcript.
pub fn project(events: &[StreamEvent]) -> Transcript {
    let mut text = String::new();
    let mut thinking = Vec::new();
    let mut nodes: HashMap<String, Node> = HashMap::new();
    let mut roots: Vec<String> = Vec::new();

    for event in events {
        match event {
            StreamEvent::AssistantText { text: delta } => text.push_str(delta),
            StreamEvent::AssistantThinking { thinking: block } => thinking.push(block.clone()),
            StreamEvent::ToolStarted { tool } => {
                apply_tool_event(tool, ToolStatus::Started, &mut nodes, &mut roots)
            }
            StreamEvent::ToolCompleted { tool } => {
                apply_tool_event(tool, ToolStatus::Completed, &mut nodes, &mut roots)
            }
            StreamEvent::ToolFailed { tool } => {
                apply_tool_event(tool, ToolStatus::Failed, &mut nodes, &mut roots)
            }
            // User text, reviews, system payloads, and permission prompts
            // are rendered elsewhere; they contribute nothing here.
            _ => {}
        }
    }

    let tools = roots.iter().map(|id| materialize(id, &nodes)).collect();
    Transcript {
        text,
        thinking,
        tools,
    }
}

fn apply_tool_event(
    payload: &ToolPayload,
    status: ToolStatus,
    nodes: &mut HashMap<String, Node>,
    roots: &mut Vec<String>,
) {
    if let Some(node) = nodes.get_mut(&payload.id) {
        // Terminal states never transition again.
        if !node.status.is_terminal() {
            node.status = status;
        }
        if payload.input.is_some() {
            node.input = payload.input.clone();
        }
        if payload.result.is_some() {
            node.result = payload.result.clone();
        }
        if payload.error.is_some() {
            node.error = payload.error.clone();
        }
        return;
    }

    let node = Node {
        id: payload.id.clone(),
        name: payload.name.clone(),
        title: payload.title.clone(),
        status,
        parent_id: payload.parent_id.clone(),
        input: payload.input.clone(),
        result: payload.result.clone(),
        error: payload.error.clone(),
        child_ids: Vec::new(),
    };

    // A parent_id naming an unseen tool demotes nothing and drops
    // nothing: the node becomes a root.
    match payload.parent_id.as_deref() {
        Some(parent_id) if nodes.contains_key(parent_id) => {
            if let Some(parent) = nodes.get_mut(parent_id) {
                parent.child_ids.push(payload.id.clone());
            }
        }
        _ => roots.push(payload.id.clone()),
    }

    nodes.insert(payload.id.clone(), node);
}

fn materialize(id: &str, nodes: &HashMap<String, Node>) -> ToolAggregate {
    // Ids in roots/child_ids always came from an insert, so the lookup
    // cannot miss; a placeholder keeps the function total anyway.
    let Some(node) = nodes.get(id) else {
        return ToolAggregate {
            id: id.to_string(),
            name: String::new(),
            title: String::new(),
            status: ToolStatus::Started,
            parent_id: None,
            input: None,
            result: None,
            error: None,
            children: Vec::new(),
        };
    };

    ToolAggregate {
        id: node.id.clone(),
        name: node.name.clone(),
        title: node.title.clone(),
        status: node.status,
        parent_id: node.parent_id.clone(),
        input: node.input.clone(),
        result: node.result.clone(),
        error: node.error.clone(),
        children: node
            .child_ids
            .iter()
            .map(|child| materialize(child, nodes))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> StreamEvent {
        StreamEvent::AssistantText {
            text: s.to_string(),
        }
    }

    fn started(id: &str, parent: Option<&str>) -> StreamEvent {
        let mut tool = ToolPayload::new(id, "bash", format!("Tool {id}"));
        tool.parent_id = parent.map(String::from);
        StreamEvent::ToolStarted { tool }
    }

    fn completed(id: &str, result: Value) -> StreamEvent {
        let mut tool = ToolPayload::new(id, "bash", format!("Tool {id}"));
        tool.result = Some(result);
        StreamEvent::ToolCompleted { tool }
    }

    fn failed(id: &str, error: &str) -> StreamEvent {
        let mut tool = ToolPayload::new(id, "bash", format!("Tool {id}"));
        tool.error = Some(error.to_string());
        StreamEvent::ToolFailed { tool }
    }

    #[test]
    fn test_text_concatenation_skips_tool_events() {
        let events = vec![
            text("Hello, "),
            started("t1", None),
            text("world!"),
            completed("t1", Value::Null),
        ];
        let transcript = project(&events);
        assert_eq!(transcript.text, "Hello, world!");
        assert_eq!(transcript.tools.len(), 1);
    }

    #[test]
    fn test_child_attaches_under_known_parent() {
        let events = vec![
            started("parent", None),
            started("child", Some("parent")),
            completed("child", Value::Null),
            completed("parent", Value::Null),
        ];
        let transcript = project(&events);
        assert_eq!(transcript.tools.len(), 1);
        let parent = &transcript.tools[0];
        assert_eq!(parent.id, "parent");
        assert_eq!(parent.status, ToolStatus::Completed);
        assert_eq!(parent.children.len(), 1);
        assert_eq!(parent.children[0].id, "child");
        assert_eq!(parent.children[0].status, ToolStatus::Completed);
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let events = vec![started("orphan", Some("never-seen"))];
        let transcript = project(&events);
        assert_eq!(transcript.tools.len(), 1);
        assert_eq!(transcript.tools[0].id, "orphan");
        assert_eq!(
            transcript.tools[0].parent_id.as_deref(),
            Some("never-seen")
        );
    }

    #[test]
    fn test_update_merges_result_without_duplicating_node() {
        let events = vec![
            started("t1", None),
            completed("t1", serde_json::json!({"ok": true})),
        ];
        let transcript = project(&events);
        assert_eq!(transcript.tools.len(), 1);
        let tool = &transcript.tools[0];
        assert_eq!(tool.status, ToolStatus::Completed);
        assert_eq!(tool.result, Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn test_terminal_status_is_never_reopened() {
        let events = vec![
            started("t1", None),
            failed("t1", "boom"),
            started("t1", None),
        ];
        let transcript = project(&events);
        assert_eq!(transcript.tools[0].status, ToolStatus::Failed);
        assert_eq!(transcript.tools[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_root_and_child_order_is_first_seen() {
        let events = vec![
            started("a", None),
            started("b", None),
            started("a1", Some("a")),
            started("a2", Some("a")),
            started("c", None),
        ];
        let transcript = project(&events);
        let root_ids: Vec<&str> = transcript.tools.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(root_ids, vec!["a", "b", "c"]);
        let child_ids: Vec<&str> = transcript.tools[0]
            .children
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(child_ids, vec!["a1", "a2"]);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let events = vec![
            text("Working"),
            started("a", None),
            started("b", Some("a")),
            StreamEvent::AssistantThinking {
                thinking: "hm".to_string(),
            },
            completed("b", Value::Null),
            failed("a", "nope"),
            text("..."),
        ];
        assert_eq!(project(&events), project(&events));
    }

    #[test]
    fn test_thinking_blocks_collected_in_order() {
        let events = vec![
            StreamEvent::AssistantThinking {
                thinking: "first".to_string(),
            },
            text("answer"),
            StreamEvent::AssistantThinking {
                thinking: "second".to_string(),
            },
        ];
        let transcript = project(&events);
        assert_eq!(transcript.thinking, vec!["first", "second"]);
    }

    #[test]
    fn test_first_sighting_via_completed_event() {
        // The log may begin mid-stream after a reconnect; a completed
        // event for an unseen id still creates the aggregate.
        let events = vec![completed("t9", serde_json::json!("done"))];
        let transcript = project(&events);
        assert_eq!(transcript.tools.len(), 1);
        assert_eq!(transcript.tools[0].status, ToolStatus::Completed);
    }
}
