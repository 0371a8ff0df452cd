//! Text of the dynamic documents.
//!
//! Both renderers read only the thread snapshot and static settings, never
//! the clock, so the same snapshot always renders the same bytes.

use parley_core::{MessageOrigin, Role, Thread};
use std::fmt::Write;
use std::path::Path;

/// Render the `state` document for one invocation.
pub fn state(
    thread: &Thread,
    origin: Option<&MessageOrigin>,
    agent_name: &str,
    workdir: &Path,
) -> String {
    let mut out = String::from("# Current State\n\n## Session Info\n");
    let _ = writeln!(out, "- Thread: {}", thread.id);
    let _ = writeln!(out, "- Status: {}", thread.status);
    let _ = writeln!(
        out,
        "- Messages: {} ({} from user)",
        thread.messages.len(),
        thread.user_message_count()
    );
    let _ = writeln!(out, "- Last update: {}", thread.updated_at.to_rfc3339());
    if let Some(origin) = origin {
        let _ = writeln!(out, "- Channel: {}", origin.channel);
        let _ = writeln!(out, "- Sender: {}", origin.sender);
    }
    out.push_str("\n## Environment\n");
    let _ = writeln!(out, "- Agent: {agent_name}");
    let _ = writeln!(out, "- Working Directory: {}", workdir.display());
    out
}

/// Render the `history` document from the last `limit` messages.
pub fn history(thread: &Thread, limit: usize, agent_name: &str) -> String {
    let recent = thread.recent(limit);
    if recent.is_empty() {
        return "# Conversation History\n\n(No prior history - this is a new conversation)\n"
            .to_string();
    }

    let mut out = String::from("# Conversation History\n\n");
    let _ = writeln!(out, "Thread: {}", thread.id);
    let _ = writeln!(
        out,
        "Showing {} of {} messages\n",
        recent.len(),
        thread.messages.len()
    );
    for message in recent {
        let speaker = match message.role {
            Role::User => "User",
            Role::Agent => agent_name,
        };
        let _ = writeln!(
            out,
            "**{}** ({}):\n{}\n\n---\n",
            speaker,
            message.timestamp.to_rfc3339(),
            message.content.trim_end()
        );
    }
    out
}
