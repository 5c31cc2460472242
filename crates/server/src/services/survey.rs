// Feedback survey sweep: completed bookings get exactly one survey email

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;

use crate::{
    config::Config,
    db::{
        self,
        bookings::{find_booking, BOOKING_COLUMNS},
        models::{Booking, BookingRow},
        Database,
    },
    error::Result,
    services::{
        lifecycle::BookingStatus,
        mailer::{Mailer, OutgoingMail},
    },
    AppState,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    // eligible, no client email
    pub skipped: usize,
}

pub fn survey_link(client_url: &str, booking_id: i64) -> String {
    format!(
        "{}/survey.html?bookingId={booking_id}",
        client_url.trim_end_matches('/')
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn survey_mail(booking: &Booking, config: &Config) -> Option<OutgoingMail> {
    let to = booking.client_email.as_deref()?.trim();
    if to.is_empty() {
        return None;
    }

    let studio = &config.mail.sender_name;
    let link = survey_link(&config.client_url, booking.id);
    let html = format!(
        "<p>Hello {name},</p>\
         <p>Thank you for working with us on your recent project. We would love to hear your feedback to improve our services.</p>\
         <p>Please take a moment to fill out our short survey by clicking the link below:</p>\
         <a href=\"{link}\">Click here to give feedback</a>\
         <p>Thank you,<br>{studio} Team</p>",
        name = escape_html(&booking.client_name),
        studio = escape_html(studio),
    );

    Some(OutgoingMail {
        to: to.to_string(),
        subject: format!("We'd love your feedback on your project with {studio}!"),
        html,
    })
}

fn is_eligible(booking: &Booking, cutoff: &str) -> bool {
    booking.status == BookingStatus::Completed
        && !booking.is_feedback_survey_sent
        && booking.updated_at.as_str() <= cutoff
}

// Eligible: completed, flag unset, untouched for `survey_grace_days`.
// Failures stay local to one booking and leave it eligible for the next pass.
pub async fn run_sweep(
    db: &Database,
    mailer: &dyn Mailer,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let cutoff = db::format_timestamp(now - Duration::days(config.survey_grace_days));

    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings \
         WHERE status = 'completed' AND is_feedback_survey_sent = 0 AND updated_at <= ? \
         ORDER BY updated_at ASC"
    );
    let candidates = sqlx::query_as::<_, BookingRow>(&sql)
        .bind(&cutoff)
        .fetch_all(&db.pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect::<Result<Vec<_>>>()?;

    let mut report = SweepReport::default();
    if candidates.is_empty() {
        tracing::debug!(%cutoff, "No bookings awaiting a survey");
        return Ok(report);
    }
    tracing::info!(count = candidates.len(), "Sending feedback surveys");

    for candidate in candidates {
        // The booking may have changed since the selection ran
        let booking = match find_booking(&db.pool, candidate.id).await {
            Ok(Some(b)) if is_eligible(&b, &cutoff) => b,
            Ok(_) => {
                tracing::debug!(booking_id = candidate.id, "No longer eligible for a survey");
                continue;
            }
            Err(e) => {
                tracing::error!(booking_id = candidate.id, error = %e, "Could not reload booking for survey");
                report.failed += 1;
                continue;
            }
        };

        let Some(mail) = survey_mail(&booking, config) else {
            tracing::warn!(booking_id = booking.id, "Booking has no client email; survey skipped");
            report.skipped += 1;
            continue;
        };

        report.attempted += 1;
        if let Err(e) = mailer.send(&mail).await {
            tracing::warn!(booking_id = booking.id, error = %e, "Survey email failed; will retry next sweep");
            report.failed += 1;
            continue;
        }

        let marked = sqlx::query(
            "UPDATE bookings SET is_feedback_survey_sent = 1, updated_at = ? \
             WHERE id = ? AND status = 'completed' AND is_feedback_survey_sent = 0",
        )
        .bind(db::now())
        .bind(booking.id)
        .execute(&db.pool)
        .await;

        let marked = match marked {
            Ok(done) => done,
            Err(e) => {
                // Stays eligible, so the next pass may send it again
                tracing::error!(booking_id = booking.id, error = %e, "Survey sent but could not be marked");
                report.failed += 1;
                continue;
            }
        };

        if marked.rows_affected() == 0 {
            tracing::warn!(booking_id = booking.id, "Survey sent but booking changed before it was marked");
        } else {
            tracing::info!(booking_id = booking.id, to = %mail.to, "Survey email sent");
        }
        report.sent += 1;
    }

    Ok(report)
}

pub fn spawn_scheduler(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = StdDuration::from_secs(state.config.survey_sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match run_sweep(&state.db, state.mailer.as_ref(), &state.config, Utc::now()).await {
                Ok(report) if report.attempted + report.skipped > 0 => {
                    tracing::info!(
                        sent = report.sent,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Survey sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Survey sweep failed"),
            }
        }
    })
}
