//! System prompt for the scheduling assistant.

use chrono::{DateTime, Utc};

use crate::auth::Identity;
use crate::tools::ToolRegistry;

/// Build the system prompt for one turn.
///
/// Tools that change shared state are listed by name so the model asks for
/// explicit confirmation before calling them.
pub fn system_prompt(identity: &Identity, now: DateTime<Utc>, tools: &ToolRegistry) -> String {
    let mut prompt = format!(
        "You are the scheduling assistant for an events product. You help {name} find events, \
         plan their calendar, create events, invite people and draft agendas.\n\n\
         Current time: {now} (UTC). The user's id is {id} and their email is {email}.\n\n\
         ## Rules\n\
         - Use the tools to read or change data. Never invent event ids, times or attendees.\n\
         - Resolve relative dates (\"tomorrow\", \"next Friday\") against the current time and \
         pass RFC 3339 timestamps to tools.\n\
         - Before creating an event at a specific time, check the user's conflicts first.\n\
         - If a tool returns an error, explain it plainly or try a different approach. Do not \
         repeat the exact same failing call.\n\
         - Keep replies short. Mention event titles and times, not raw ids, unless the user \
         asks for them.\n",
        name = identity.display_name,
        id = identity.subject_id,
        email = identity.email,
        now = now.format("%Y-%m-%dT%H:%M:%SZ (%A)"),
    );

    let gated = tools.confirmation_required();
    if !gated.is_empty() {
        prompt.push_str(&format!(
            "- These tools change shared data: {}. Before calling one, summarize exactly what \
             will happen and wait for the user to confirm in a later message.\n",
            gated.join(", ")
        ));
    }
    prompt
}
