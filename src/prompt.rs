//! Prompt templates.
//!
//! Pure string rendering: nothing here parses or calls out. The email prompt
//! pins the `{"events": [...]}` schema that [`crate::extract`] validates, so
//! field names in the template and in [`crate::models::EventRecord`] must move
//! together.

use serde_json::json;

/// Per-request parameters folded into a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    /// IANA name or abbreviation of the user's timezone.
    pub timezone: String,
    /// The user's current local time, if the client sent one.
    pub now: Option<String>,
}

impl PromptContext {
    pub fn new(timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
            now: None,
        }
    }

    pub fn with_now(mut self, now: Option<String>) -> Self {
        self.now = now;
        self
    }
}

pub const EMAIL_SYSTEM_PROMPT: &str = "You are a precise assistant that extracts \
scheduling-related information from user-provided website text. Your output MUST be a \
valid JSON object only. Focus on real events, meetings, deadlines, workshops, and \
reminders. Ignore promotions, ads, news articles, and anything unrelated to scheduling. \
Be strict. Output clean, deduplicated, readable data.";

pub const FREE_TEXT_SYSTEM_PROMPT: &str = "You are a precise scheduling assistant that \
extracts:\n- Event titles\n- Times (with timezone conversion)\n- Participants\n\
STRICT RULES:\n\
1. ALWAYS output valid JSON\n\
2. Convert ALL times to specified timezone\n\
3. Skip the user's own email in participants\n\
4. Be concise but descriptive";

fn example_email_events() -> String {
    let example = json!({
        "events": [{
            "event": "CS Department Info Session",
            "raw_subject": "[Reminder] CS Dept Fall info session today!",
            "time": {
                "iso": "2025-04-10T16:30/2025-04-10T17:30",
                "display": "April 10, 4:30 PM – 5:30 PM"
            },
            "context": "Fall course planning event in Sci 204",
            "sender": "Chris Murphy",
            "urgency": "high",
            "gmailThread": "17a4c5f0b1c"
        }]
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn now_line(ctx: &PromptContext) -> String {
    match &ctx.now {
        Some(now) => format!("The user's current time is {}.", now),
        None => "The user's current time was not provided; judge proximity from the text."
            .to_string(),
    }
}

/// Instruction for one chunk of rendered email blocks.
pub fn build_email_prompt(chunk: &str, ctx: &PromptContext) -> String {
    let tz = &ctx.timezone;
    format!(
        r#"
Extract only scheduling-related information that a college student might reasonably want to add to their calendar.
{now}

Format each event as a JSON object with exactly these fields:
- event: A short, cleaned title for the event (something nice to display to the user)
- raw_subject: The original subject line from the message (used to identify duplicates later)
- time:
    - iso: A single ISO-8601 string (converted to {tz}) that can be passed straight to a calendar
        - If you know both start and end: "YYYY-MM-DDTHH:MM/YYYY-MM-DDTHH:MM"
        - If you know only the start: "YYYY-MM-DDTHH:MM"
        - If only a day is clear: "YYYY-MM-DD"
        - Otherwise output "Not specified"
    - display: The time converted to {tz}, written for a person (e.g. "Every Tuesday, 1-2 PM", "April 10, 4:30 PM EST"). If iso is "Not specified", display is "Not specified" as well.
- context: Brief description or purpose of the event
- sender: Who sent or organized it
- urgency: "high", "medium", or "low"
- gmailThread: The gmailThread id of the message this event came from

TIME ZONE RULES:
- If a time zone (e.g. EST, PST, GMT) is mentioned in the text, convert the time from that zone to {tz}.
- If no time zone is mentioned, assume the text is already in {tz}.
- Both iso and display must be the converted time in {tz}; append the zone abbreviation to display.

URGENCY RULES:
- high: starts, or has a hard deadline, within 48 hours
- medium: within 7 days
- low: later than 7 days, or the date is unclear

Do not explain anything. Do not include markdown. Only output pure JSON.

Output ONLY a valid JSON object like this:
{example}

Text to analyze:
{chunk}
"#,
        now = now_line(ctx),
        tz = tz,
        example = example_email_events(),
        chunk = chunk,
    )
}

/// Instruction for free text typed or selected by the user.
pub fn build_free_text_prompt(text: &str, ctx: &PromptContext) -> String {
    let tz = &ctx.timezone;
    let now = ctx.now.as_deref().unwrap_or("unknown");
    format!(
        r#"
Extract scheduling information from the text and output it in JSON format.
Follow these strict rules:

1. Extract the actual meeting time from the user's text.
   - If both start and end time are mentioned, use them.
   - If only a start time is mentioned, assume a default duration:
     - 30 minutes for casual events (coffee, catch-up)
     - 1 hour for formal events (meetings, interviews, classes)
2. Respect the user's current time: {now}
   - Correctly interpret words like "today", "tomorrow", "next Friday".
3. If the text names a timezone different from the user's timezone ({tz}), convert to {tz}.
4. Extract any participant emails mentioned in the text (anything containing '@').
5. Output times in this format:
   - iso: single ISO-8601 string (start only, or start/end separated by "/")
   - display: easy-to-read version for humans
6. Final output must be a pure valid JSON object like this:

{{
  "events": [
    {{
      "title": "Meeting title",
      "time": {{
        "iso": "2025-04-10T14:00:00-04:00/2025-04-10T15:00:00-04:00",
        "display": "Apr 10, 2:00 PM – 3:00 PM EDT"
      }},
      "participants": ["person1@example.com", "person2@example.com"],
      "description": "Brief description or purpose"
    }}
  ]
}}

IMPORTANT:
- If no participants are mentioned, leave participants as an empty list.
- Always guess a reasonable end time if only a start time is provided.
- NEVER output extra explanation. Only the JSON object.

Text to analyze:
{text}
"#,
        now = now,
        tz = tz,
        text = text,
    )
}
