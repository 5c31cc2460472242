use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{parse_stored_amount, parse_stored_date};
use crate::{
    error::{AppError, Result},
    services::{access::Role, ledger::PaymentStatus, lifecycle::BookingStatus},
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub role: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn role(&self) -> Result<Role> {
        self.role.parse()
    }
}

// Raw `bookings` row; amounts and enums are still in stored text form.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: String,
    pub package_name: String,
    pub booking_date: String,
    pub time_slot: String,
    pub message: Option<String>,
    pub transaction_ref: String,
    pub status: String,
    pub assigned_employee_id: Option<i64>,
    pub total_amount: String,
    pub paid_amount: String,
    pub due_amount: String,
    pub payment_status: String,
    pub is_feedback_survey_sent: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub user_id: Option<i64>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: String,
    pub package_name: String,
    pub booking_date: NaiveDate,
    pub time_slot: String,
    pub message: Option<String>,
    pub transaction_ref: String,
    pub status: BookingStatus,
    pub assigned_employee_id: Option<i64>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub due_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub is_feedback_survey_sent: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<BookingRow> for Booking {
    type Error = AppError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            client_name: row.client_name,
            client_email: row.client_email,
            client_phone: row.client_phone,
            package_name: row.package_name,
            booking_date: parse_stored_date(&row.booking_date)?,
            time_slot: row.time_slot,
            message: row.message,
            transaction_ref: row.transaction_ref,
            status: row
                .status
                .parse()
                .map_err(|_| AppError::Internal(format!("Corrupt status '{}'", row.status)))?,
            assigned_employee_id: row.assigned_employee_id,
            total_amount: parse_stored_amount(&row.total_amount)?,
            paid_amount: parse_stored_amount(&row.paid_amount)?,
            due_amount: parse_stored_amount(&row.due_amount)?,
            payment_status: row.payment_status.parse()?,
            is_feedback_survey_sent: row.is_feedback_survey_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMessage {
    pub id: i64,
    pub booking_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub sender_role: String,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: i64,
    pub booking_id: i64,
    pub uploader_id: i64,
    pub uploader_name: Option<String>,
    pub file_name: String,
    pub file_url: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub uploaded_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: i64,
    pub booking_id: i64,
    pub rating: i64,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: i64,
    pub booking_id: i64,
    pub final_file_url: String,
    pub delivery_date: String,
    pub status: String,
    pub customer_accessed_at: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpenseRow {
    pub id: i64,
    pub description: String,
    pub amount: String,
    pub category: String,
    pub expense_date: String,
    pub receipt_url: Option<String>,
    pub recorded_by: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub expense_date: NaiveDate,
    pub receipt_url: Option<String>,
    pub recorded_by: Option<i64>,
    pub created_at: String,
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = AppError;

    fn try_from(row: ExpenseRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            description: row.description,
            amount: parse_stored_amount(&row.amount)?,
            category: row.category,
            expense_date: parse_stored_date(&row.expense_date)?,
            receipt_url: row.receipt_url,
            recorded_by: row.recorded_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action_type: String,
    pub details: String,
    pub target_id: Option<i64>,
    pub target_type: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FormFieldRow {
    pub id: i64,
    pub label: String,
    pub name: String,
    pub field_type: String,
    pub options: Option<String>,
    pub is_required: bool,
    pub placeholder: Option<String>,
    pub position: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: i64,
    pub label: String,
    pub name: String,
    pub field_type: String,
    pub options: Option<serde_json::Value>,
    pub is_required: bool,
    pub placeholder: Option<String>,
    pub order: i64,
    pub is_active: bool,
}

impl TryFrom<FormFieldRow> for FormField {
    type Error = AppError;

    fn try_from(row: FormFieldRow) -> Result<Self> {
        let options = row
            .options
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Corrupt form field options: {e}")))?;
        Ok(Self {
            id: row.id,
            label: row.label,
            name: row.name,
            field_type: row.field_type,
            options,
            is_required: row.is_required,
            placeholder: row.placeholder,
            order: row.position,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmployeeRow {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub position: String,
    pub salary: String,
    pub hire_date: String,
    pub is_active: bool,
    pub shift_type: String,
    pub hours_per_week: Option<i64>,
    pub available_leave_days: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub position: String,
    pub salary: Decimal,
    pub hire_date: NaiveDate,
    pub is_active: bool,
    pub shift_type: String,
    pub hours_per_week: Option<i64>,
    pub available_leave_days: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = AppError;

    fn try_from(row: EmployeeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            phone_number: row.phone_number,
            position: row.position,
            salary: parse_stored_amount(&row.salary)?,
            hire_date: parse_stored_date(&row.hire_date)?,
            is_active: row.is_active,
            shift_type: row.shift_type,
            hours_per_week: row.hours_per_week,
            available_leave_days: row.available_leave_days,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
