// iCalendar (RFC 5545) export of all events
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::events::repository::EventView;
use crate::events::schedule::Schedule;

pub const CALENDAR_NAME: &str = "Studentenportal Events";
pub const CALENDAR_TIMEZONE: &str = "Europe/Zurich";
const MAX_LINE_OCTETS: usize = 75;

enum Stamp {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Stamp {
    fn property(&self, name: &str) -> String {
        match self {
            Stamp::Date(d) => format!("{};VALUE=DATE:{}", name, d.format("%Y%m%d")),
            Stamp::DateTime(dt) => format!("{}:{}", name, dt.format("%Y%m%dT%H%M%S")),
        }
    }
}

fn dtstart(s: &Schedule) -> Stamp {
    match s.start_time {
        Some(t) => Stamp::DateTime(s.start_date.and_time(t)),
        None => Stamp::Date(s.start_date),
    }
}

/// End date with end time, else start date with end time, else end of the end date.
fn dtend(s: &Schedule) -> Option<Stamp> {
    match (s.end_date, s.end_time) {
        (Some(d), Some(t)) => Some(Stamp::DateTime(d.and_time(t))),
        (None, Some(t)) => Some(Stamp::DateTime(s.start_date.and_time(t))),
        (Some(d), None) => {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
            Some(Stamp::DateTime(d.and_time(end_of_day)))
        }
        (None, None) => None,
    }
}

/// TEXT value escaping: backslash, semicolon, comma and newlines.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Fold a content line at 75 octets without splitting UTF-8 sequences.
pub fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out
}

struct Writer {
    buf: String,
}

impl Writer {
    fn line(&mut self, content: &str) {
        self.buf.push_str(&fold_line(content));
        self.buf.push_str("\r\n");
    }

    fn text(&mut self, name: &str, value: &str) {
        self.line(&format!("{}:{}", name, escape_text(value)));
    }
}

/// Serialize events; rows with an unparseable start date are skipped.
pub fn render(events: &[EventView], host: &str) -> String {
    let mut w = Writer { buf: String::new() };
    w.line("BEGIN:VCALENDAR");
    w.line("VERSION:2.0");
    w.line("PRODID:-//portal//Studentenportal Events//DE");
    w.text("X-WR-CALNAME", CALENDAR_NAME);
    w.text("X-WR-TIMEZONE", CALENDAR_TIMEZONE);

    for view in events {
        let event = &view.event;
        let Some(schedule) = Schedule::of(event) else {
            tracing::warn!(event_id = event.id, "skipping event with invalid start date");
            continue;
        };
        w.line("BEGIN:VEVENT");
        w.line(&format!("UID:event-{}@{}", event.id, host));
        w.text("SUMMARY", &event.summary);
        w.text("DESCRIPTION", &event.description);
        w.line(&dtstart(&schedule).property("DTSTART"));
        if let Some(end) = dtend(&schedule) {
            w.line(&end.property("DTEND"));
        }
        if let Some(author) = &view.author_name {
            w.text("COMMENT", &format!("Erfasst von {}", author));
        }
        w.line("END:VEVENT");
    }

    w.line("END:VCALENDAR");
    w.buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Event;

    fn view(start_time: Option<&str>, end_date: Option<&str>, end_time: Option<&str>) -> EventView {
        EventView {
            event: Event {
                id: 7,
                author_id: Some(1),
                summary: "Semesterstart; Apéro, Grill".into(),
                description: "Zeile 1\nZeile 2".into(),
                start_date: "2024-09-16".into(),
                start_time: start_time.map(Into::into),
                end_date: end_date.map(Into::into),
                end_time: end_time.map(Into::into),
                location: None,
                url: None,
            },
            author_name: Some("Olga Org".into()),
        }
    }

    fn lines(ics: &str) -> Vec<&str> {
        ics.split("\r\n").collect()
    }

    #[test]
    fn calendar_header_and_crlf() {
        let ics = render(&[], "portal.test");
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("X-WR-CALNAME:Studentenportal Events\r\n"));
        assert!(ics.contains("X-WR-TIMEZONE:Europe/Zurich\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn all_day_event_uses_date_value() {
        let ics = render(&[view(None, None, None)], "portal.test");
        let l = lines(&ics);
        assert!(l.contains(&"DTSTART;VALUE=DATE:20240916"));
        assert!(!ics.contains("DTEND"));
        assert!(l.contains(&"COMMENT:Erfasst von Olga Org"));
        assert!(l.contains(&"UID:event-7@portal.test"));
    }

    #[test]
    fn dtend_rules() {
        let ics = render(&[view(Some("18:00"), Some("2024-09-17"), Some("02:00"))], "h");
        assert!(ics.contains("DTSTART:20240916T180000\r\n"));
        assert!(ics.contains("DTEND:20240917T020000\r\n"));

        let ics = render(&[view(Some("18:00"), None, Some("22:00"))], "h");
        assert!(ics.contains("DTEND:20240916T220000\r\n"));

        let ics = render(&[view(None, Some("2024-09-18"), None)], "h");
        assert!(ics.contains("DTEND:20240918T235959\r\n"));
    }

    #[test]
    fn text_is_escaped() {
        let ics = render(&[view(None, None, None)], "h");
        assert!(ics.contains("SUMMARY:Semesterstart\\; Apéro\\, Grill\r\n"));
        assert!(ics.contains("DESCRIPTION:Zeile 1\\nZeile 2\r\n"));
        assert_eq!(escape_text("a\\b\r\nc"), "a\\\\b\\nc");
    }

    #[test]
    fn long_lines_fold_at_75_octets() {
        let long = format!("DESCRIPTION:{}", "ä".repeat(60));
        let folded = fold_line(&long);
        for part in folded.split("\r\n") {
            assert!(part.len() <= 75, "{} octets", part.len());
        }
        let unfolded = folded.replace("\r\n ", "");
        assert_eq!(unfolded, long);
    }

    #[test]
    fn short_lines_are_untouched() {
        assert_eq!(fold_line("VERSION:2.0"), "VERSION:2.0");
    }
}
