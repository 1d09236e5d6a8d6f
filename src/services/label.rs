//! Printable badge label for a ticket: name, code and a QR of the code,
//! laid out for a 3in x 2in label printer.

use qrcode::render::svg;
use qrcode::types::QrError;
use qrcode::QrCode;
use thiserror::Error;

use crate::models::TicketLookup;

const QR_MIN_PX: u32 = 160;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("could not encode QR: {0}")]
    Qr(#[from] QrError),
}

pub fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn qr_svg(code: &str) -> Result<String, LabelError> {
    let qr = QrCode::new(code.as_bytes())?;
    Ok(qr
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_PX, QR_MIN_PX)
        .quiet_zone(false)
        .build())
}

pub fn render_label(lookup: &TicketLookup) -> Result<String, LabelError> {
    let name = html_escape(&lookup.attendee.full_name());
    let code = html_escape(&lookup.ticket.code);
    let qr = qr_svg(&lookup.ticket.code)?;

    Ok(format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{code}</title>
<style>
@page {{ size: 3in 2in; margin: 0; }}
html, body {{ margin: 0; padding: 0; }}
.label {{ width: 3in; height: 2in; box-sizing: border-box; padding: 0.12in; display: flex; align-items: center; gap: 0.12in; font-family: sans-serif; }}
.label svg {{ width: 1.5in; height: 1.5in; flex: none; }}
.name {{ font-size: 16pt; font-weight: 700; line-height: 1.1; word-break: break-word; }}
.code {{ font-family: monospace; font-size: 12pt; letter-spacing: 0.05em; margin-top: 0.08in; }}
</style>
</head>
<body>
<div class="label">
{qr}
<div>
<div class="name">{name}</div>
<div class="code">{code}</div>
</div>
</div>
</body>
</html>
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attendee, Language, Ticket};
    use chrono::Utc;
    use uuid::Uuid;

    fn lookup(first: &str) -> TicketLookup {
        let now = Utc::now();
        let attendee = Attendee {
            id: Uuid::new_v4(),
            first_name: first.into(),
            last_name: "Li".into(),
            email: "ana@x.com".into(),
            phone: "555-0100".into(),
            language: Language::En,
            opt_info: None,
            created_at: now,
        };
        TicketLookup {
            ticket: Ticket::issue(attendee.id, "K3QZ92AB7X".into(), now),
            attendee,
        }
    }

    #[test]
    fn test_label_carries_name_code_and_qr() {
        let html = render_label(&lookup("Ana")).unwrap();
        assert!(html.contains("size: 3in 2in"));
        assert!(html.contains("Ana Li"));
        assert!(html.contains("K3QZ92AB7X"));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn test_label_escapes_markup_in_names() {
        let html = render_label(&lookup("<script>alert(1)</script>")).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape(r#"a&b "c" 'd'"#), "a&amp;b &quot;c&quot; &#39;d&#39;");
    }
}
