// Booking lifecycle state machine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    ReadyForReview,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::ReadyForReview,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::ReadyForReview => "ready_for_review",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::InvalidStatus(s.to_string()))
    }
}

// Computed before anything is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub unchanged: bool,
    // just entered `completed`, survey not yet sent
    pub survey_eligible: bool,
}

// `pending` is only entered at creation; `completed` and `cancelled` have no exits.
pub fn plan_transition(
    current: BookingStatus,
    requested: &str,
    survey_sent: bool,
) -> Result<Transition> {
    let target: BookingStatus = requested.parse()?;

    if target == current {
        return Ok(Transition {
            from: current,
            to: target,
            unchanged: true,
            survey_eligible: false,
        });
    }

    if current.is_terminal() {
        return Err(AppError::InvalidStatus(format!(
            "{target} (booking is already {current})"
        )));
    }

    if target == BookingStatus::Pending {
        return Err(AppError::InvalidStatus(format!(
            "{target} (only new bookings are pending)"
        )));
    }

    Ok(Transition {
        from: current,
        to: target,
        unchanged: false,
        survey_eligible: target == BookingStatus::Completed && !survey_sent,
    })
}
