//! Message rendering for outgoing notifications.
//!
//! Templates are plain strings with `{{EVENT}}` and `{{EVENT_TIME}}`
//! placeholders. Rendering is pure -- no I/O here; the CLI resolves a
//! custom template path (if configured) before calling in.

use chrono::{DateTime, Utc};
use indoc::indoc;

use crate::model::Event;

/// Built-in HTML body used when no custom template is configured.
pub const DEFAULT_HTML_TEMPLATE: &str = indoc! {r#"
    <html>
      <body>
        <h2>Event Reminder</h2>
        <p>Reminder: <strong>{{EVENT}}</strong> is scheduled for {{EVENT_TIME}}.</p>
      </body>
    </html>
"#};

/// A rendered notification, ready for any channel.
///
/// Channels pick what they need: email uses subject + html_body, messaging
/// uses body, calendar sync uses the event fields.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub body: String,
    pub html_body: String,
    pub event_title: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
}

impl Message {
    /// Render a message for `event` using the built-in template, or
    /// `template` if supplied.
    pub fn for_event(event: &Event, template: Option<&str>) -> Self {
        let html = render(template.unwrap_or(DEFAULT_HTML_TEMPLATE), event);
        let time = format_event_time(event.start_time);
        Self {
            subject: format!("Event Reminder: {}", event.title),
            body: format!("Reminder: {} is scheduled for {}", event.title, time),
            html_body: html,
            event_title: event.title.clone(),
            event_start: event.start_time,
            event_end: event.end_time,
        }
    }
}

/// Substitute `{{EVENT}}` and `{{EVENT_TIME}}` placeholders.
pub fn render(template: &str, event: &Event) -> String {
    template
        .replace("{{EVENT}}", &event.title)
        .replace("{{EVENT_TIME}}", &format_event_time(event.start_time))
}

fn format_event_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event {
            id: 1,
            title: "Submit report".into(),
            description: "Quarterly numbers".into(),
            start_time: "2025-12-20T09:00:00Z".parse().unwrap(),
            end_time: "2025-12-20T10:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn render_substitutes_placeholders() {
        let out = render("{{EVENT}} at {{EVENT_TIME}}", &event());
        assert_eq!(out, "Submit report at 2025-12-20 09:00:00");
    }

    #[test]
    fn default_template_mentions_event() {
        let msg = Message::for_event(&event(), None);
        assert!(msg.html_body.contains("Submit report"));
        assert!(msg.html_body.contains("2025-12-20 09:00:00"));
        assert_eq!(msg.subject, "Event Reminder: Submit report");
    }

    #[test]
    fn custom_template_overrides_default() {
        let msg = Message::for_event(&event(), Some("custom: {{EVENT}}"));
        assert_eq!(msg.html_body, "custom: Submit report");
    }
}
