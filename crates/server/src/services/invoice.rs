// One-page PDF invoice for a booking, written with the base-14 Helvetica fonts

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::db::models::Booking;

const PAGE_WIDTH: i32 = 595;
const PAGE_HEIGHT: i32 = 842;

enum Font {
    Regular,
    Bold,
}

struct Line {
    x: i32,
    y: i32,
    size: u8,
    font: Font,
    text: String,
}

fn money(amount: Decimal) -> String {
    format!("BDT {}", amount.round_dp(2))
}

// Escape text for a PDF literal string; non-ASCII is replaced.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn invoice_lines(booking: &Booking, studio_name: &str, issued_on: NaiveDate) -> Vec<Line> {
    let line = |x, y, size, font, text: String| Line {
        x,
        y,
        size,
        font,
        text,
    };

    let mut lines = vec![
        line(
            180,
            780,
            20,
            Font::Bold,
            format!("{studio_name} - INVOICE"),
        ),
        line(50, 730, 12, Font::Regular, format!("Invoice #: INV-{}", booking.id)),
        line(
            50,
            714,
            12,
            Font::Regular,
            format!("Booking Date: {} ({})", booking.booking_date, booking.time_slot),
        ),
        line(50, 698, 12, Font::Regular, format!("Invoice Date: {issued_on}")),
        line(50, 666, 12, Font::Bold, "Bill To:".to_string()),
        line(50, 650, 12, Font::Regular, booking.client_name.clone()),
        line(50, 634, 12, Font::Regular, booking.client_phone.clone()),
    ];
    if let Some(email) = &booking.client_email {
        lines.push(line(50, 618, 12, Font::Regular, email.clone()));
    }

    lines.extend([
        line(50, 560, 12, Font::Bold, "Description".to_string()),
        line(450, 560, 12, Font::Bold, "Amount".to_string()),
        line(
            50,
            536,
            12,
            Font::Regular,
            format!("Studio Service: {} package", booking.package_name),
        ),
        line(450, 536, 12, Font::Regular, money(booking.total_amount)),
        line(330, 490, 12, Font::Bold, "Total Amount:".to_string()),
        line(450, 490, 12, Font::Bold, money(booking.total_amount)),
        line(330, 470, 12, Font::Regular, "Amount Paid:".to_string()),
        line(450, 470, 12, Font::Regular, money(booking.paid_amount)),
        line(330, 450, 12, Font::Bold, "Amount Due:".to_string()),
        line(450, 450, 12, Font::Bold, money(booking.due_amount)),
        line(
            50,
            420,
            10,
            Font::Regular,
            format!("Payment status: {}", booking.payment_status.as_str()),
        ),
        line(
            220,
            100,
            10,
            Font::Regular,
            "Thank you for your business!".to_string(),
        ),
    ]);
    lines
}

fn content_stream(lines: &[Line]) -> String {
    let mut stream = String::new();
    for l in lines {
        let font = match l.font {
            Font::Regular => "F1",
            Font::Bold => "F2",
        };
        stream.push_str(&format!(
            "BT /{font} {} Tf {} {} Td ({}) Tj ET\n",
            l.size,
            l.x,
            l.y,
            escape(&l.text)
        ));
    }
    // Rules under the table header and above the totals
    stream.push_str("0.5 w 50 552 m 545 552 l S 50 520 m 545 520 l S\n");
    stream
}

pub fn render_invoice(booking: &Booking, studio_name: &str, issued_on: NaiveDate) -> Vec<u8> {
    let stream = content_stream(&invoice_lines(booking, studio_name, issued_on));

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Contents 4 0 R /Resources << /Font << /F1 5 0 R /F2 6 0 R >> >> >>"
        ),
        format!(
            "<< /Length {} >>\nstream\n{stream}endstream",
            stream.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        xref.push_str(&format!("{offset:010} 00000 n \n"));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    out.extend_from_slice(xref.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn booking() -> Booking {
        let mut booking = testing::sample_booking(17, Some("rafi@example.com"));
        booking.client_name = "Rafi (Band)".to_string();
        booking
    }

    #[test]
    fn renders_a_well_formed_document() {
        let pdf = render_invoice(&booking(), "Studio", NaiveDate::from_ymd_opt(2026, 7, 2).unwrap());
        let text = String::from_utf8(pdf).unwrap();

        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("(Invoice #: INV-17)"));
        assert!(text.contains("(Rafi \\(Band\\))"));
        assert!(text.contains("(BDT 3000)"));

        // startxref must point at the xref table
        let start: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(text[start..].starts_with("xref\n0 7\n"));

        // every xref entry must point at its object header
        let entries: Vec<usize> = text[start..]
            .lines()
            .skip(3)
            .take(6)
            .map(|l| l[..10].parse().unwrap())
            .collect();
        for (i, offset) in entries.iter().enumerate() {
            assert!(text[*offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn non_ascii_text_is_replaced() {
        assert_eq!(escape("৳ 500"), "? 500");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }
}
