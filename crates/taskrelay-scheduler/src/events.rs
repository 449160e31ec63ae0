//! Calendar event creation with per-attendee confirmation emails.
//!
//! Used by the dispatch handlers and by the HTTP create endpoints. Attendee
//! mail failures are collected in the report and never fail the call.

use serde::Serialize;
use serde_json::Value;

use taskrelay_core::calendar::{GoogleEvent, OutlookEvent};
use taskrelay_core::error::Result;
use taskrelay_core::traits::{GoogleCalendar, Mailer, OutlookCalendar};

/// Outlook reminder used when confirmations are sent and none was requested.
pub const FANOUT_OUTLOOK_REMINDER: u32 = 30;

/// Outcome of an event creation plus confirmation fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutReport {
    /// The provider's event record.
    pub event: Value,
    pub sent: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn create_google_event_with_notification(
    calendar: &dyn GoogleCalendar,
    mailer: Option<&dyn Mailer>,
    event: &GoogleEvent,
    additional_body: Option<&str>,
) -> Result<FanoutReport> {
    let created = calendar.create_event(event).await?;
    let html = google_confirmation_html(event, &created, additional_body);
    let subject = format!("Confirmation: {}", event.summary);
    let (sent, failed) = send_confirmations(mailer, &event.attendees, &subject, &html).await;
    Ok(FanoutReport { event: created, sent, failed })
}

pub async fn create_outlook_event_with_notification(
    calendar: &dyn OutlookCalendar,
    mailer: Option<&dyn Mailer>,
    event: &OutlookEvent,
    additional_content: Option<&str>,
) -> Result<FanoutReport> {
    let created = calendar.create_event(event).await?;
    let html = outlook_confirmation_html(event, &created, additional_content);
    let subject = format!("Confirmation: {}", event.subject);
    let (sent, failed) = send_confirmations(mailer, &event.attendees, &subject, &html).await;
    Ok(FanoutReport { event: created, sent, failed })
}

async fn send_confirmations(
    mailer: Option<&dyn Mailer>,
    attendees: &[String],
    subject: &str,
    html: &str,
) -> (Vec<String>, Vec<String>) {
    let Some(mailer) = mailer else {
        if !attendees.is_empty() {
            tracing::warn!("⚠️ No mailer configured — {} confirmation(s) not sent", attendees.len());
        }
        return (Vec::new(), attendees.to_vec());
    };

    let mut sent = Vec::new();
    let mut failed = Vec::new();
    for attendee in attendees {
        match mailer.send_email(attendee, subject, html).await {
            Ok(()) => {
                tracing::debug!("confirmation sent to {attendee}");
                sent.push(attendee.clone());
            }
            Err(e) => {
                tracing::warn!("⚠️ Confirmation to {attendee} failed: {e}");
                failed.push(attendee.clone());
            }
        }
    }
    (sent, failed)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn date_range(start: &chrono::DateTime<chrono::Utc>, end: &chrono::DateTime<chrono::Utc>) -> String {
    format!("{} - {} UTC", start.format("%d/%m/%Y %H:%M"), end.format("%H:%M"))
}

/// Confirmation mail for a Google event. Description is plain text.
pub fn google_confirmation_html(event: &GoogleEvent, created: &Value, additional: Option<&str>) -> String {
    let mut html = format!(
        "<h2>New event scheduled: {}</h2>\
         <p><strong>Date and time:</strong> {}</p>\
         <p><strong>Description:</strong></p>\
         <div style=\"margin-left: 20px;\">{}</div>",
        escape_html(&event.summary),
        date_range(&event.start, &event.end),
        escape_html(&event.description),
    );
    if let Some(location) = &event.location {
        html.push_str(&format!("<p><strong>Location:</strong> {}</p>", escape_html(location)));
    }
    if let Some(meet) = created["hangoutLink"].as_str() {
        html.push_str(&format!(
            "<p><strong>Join the meeting:</strong> <a href=\"{meet}\">{meet}</a></p>"
        ));
    }
    if let Some(extra) = additional {
        html.push_str(&format!("<br/><h3>Additional information:</h3>{extra}"));
    }
    html.push_str("<br/><p>This event has been added to your Google Calendar.</p>");
    if let Some(link) = created["htmlLink"].as_str() {
        html.push_str(&format!("<p><a href=\"{link}\">View event in Google Calendar</a></p>"));
    }
    html
}

/// Confirmation mail for an Outlook event. `body` is already HTML.
pub fn outlook_confirmation_html(event: &OutlookEvent, created: &Value, additional: Option<&str>) -> String {
    let mut html = format!(
        "<h2>New event scheduled: {}</h2>\
         <p><strong>Date and time:</strong> {}</p>\
         <p><strong>Description:</strong></p>\
         <div style=\"margin-left: 20px;\">{}</div>",
        escape_html(&event.subject),
        date_range(&event.start, &event.end),
        event.body,
    );
    if let Some(location) = &event.location {
        html.push_str(&format!("<p><strong>Location:</strong> {}</p>", escape_html(location)));
    }
    if event.is_online_meeting
        && let Some(join_url) = created["onlineMeeting"]["joinUrl"].as_str()
        && !join_url.is_empty()
    {
        html.push_str(&format!(
            "<p><strong>Join the meeting:</strong> <a href=\"{join_url}\">Click here to join in Teams</a></p>"
        ));
    }
    if let Some(extra) = additional {
        html.push_str(&format!("<br/><h3>Additional information:</h3>{extra}"));
    }
    html.push_str(&format!(
        "<br/><p>This event has been added to your Outlook calendar. \
         You will get a reminder {} minutes before it starts.</p>",
        event.reminder_minutes_before_start
    ));
    if let Some(link) = created["webLink"].as_str() {
        html.push_str(&format!("<p><a href=\"{link}\">View event in Outlook</a></p>"));
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGoogle, FakeMailer, FakeOutlook};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use taskrelay_core::calendar::Importance;

    fn google_event() -> GoogleEvent {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 14, 0, 0).unwrap();
        GoogleEvent {
            summary: "Board <sync>".into(),
            description: "Agenda".into(),
            start,
            end: start + chrono::Duration::hours(1),
            attendees: vec!["ok@corp.com".into(), "bounce@corp.com".into()],
            location: Some("HQ".into()),
            calendar_id: "primary".into(),
            send_notifications: true,
            reminder_minutes: vec![30, 10],
            timezone: "UTC".into(),
        }
    }

    fn outlook_event() -> OutlookEvent {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 14, 0, 0).unwrap();
        OutlookEvent {
            subject: "Kickoff".into(),
            body: "<p>Welcome</p>".into(),
            start,
            end: start + chrono::Duration::minutes(30),
            attendees: vec!["a@corp.com".into()],
            location: None,
            is_online_meeting: true,
            reminder_minutes_before_start: FANOUT_OUTLOOK_REMINDER,
            categories: vec![],
            importance: Importance::Normal,
            send_response: true,
            timezone: None,
        }
    }

    #[tokio::test]
    async fn test_google_fanout_tolerates_attendee_failure() {
        let calendar = FakeGoogle::default();
        let mailer = FakeMailer::failing_for(&["bounce@corp.com"]);
        let report = create_google_event_with_notification(
            &calendar,
            Some(&mailer as &dyn Mailer),
            &google_event(),
            Some("<p>Bring slides</p>"),
        )
        .await
        .unwrap();

        assert_eq!(calendar.created.lock().unwrap().len(), 1);
        assert_eq!(report.sent, vec!["ok@corp.com"]);
        assert_eq!(report.failed, vec!["bounce@corp.com"]);
        let mails = mailer.sent.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].1, "Confirmation: Board <sync>");
        assert!(mails[0].2.contains("Bring slides"));
    }

    #[tokio::test]
    async fn test_fanout_without_mailer_still_creates_event() {
        let calendar = FakeOutlook::default();
        let report = create_outlook_event_with_notification(&calendar, None, &outlook_event(), None)
            .await
            .unwrap();
        assert_eq!(calendar.created.lock().unwrap().len(), 1);
        assert!(report.sent.is_empty());
        assert_eq!(report.failed, vec!["a@corp.com"]);
    }

    #[tokio::test]
    async fn test_calendar_failure_propagates() {
        let calendar = FakeGoogle::failing();
        let mailer = FakeMailer::default();
        let result =
            create_google_event_with_notification(&calendar, Some(&mailer as &dyn Mailer), &google_event(), None).await;
        assert!(result.is_err());
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_google_html_escapes_and_links() {
        let html = google_confirmation_html(
            &google_event(),
            &json!({"htmlLink": "https://calendar.google.com/e/1"}),
            None,
        );
        assert!(html.contains("Board &lt;sync&gt;"));
        assert!(html.contains("01/07/2026 14:00 - 15:00 UTC"));
        assert!(html.contains("<strong>Location:</strong> HQ"));
        assert!(html.contains("https://calendar.google.com/e/1"));
    }

    #[test]
    fn test_outlook_html_includes_teams_link_and_reminder() {
        let html = outlook_confirmation_html(
            &outlook_event(),
            &json!({
                "webLink": "https://outlook.office.com/e/1",
                "onlineMeeting": {"joinUrl": "https://teams.microsoft.com/l/abc"}
            }),
            Some("Dial-in below"),
        );
        assert!(html.contains("<p>Welcome</p>"));
        assert!(html.contains("https://teams.microsoft.com/l/abc"));
        assert!(html.contains("reminder 30 minutes"));
        assert!(html.contains("Dial-in below"));
        assert!(html.contains("https://outlook.office.com/e/1"));
    }
}
