// Capability checks: every operation names a Resource and asks `authorize`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    db::{models::Booking, Database},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::activity::{log_activity, ActivityEntry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Accountant,
    Employee,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Accountant => "accountant",
            Role::Employee => "employee",
            Role::Customer => "customer",
        }
    }

    // Staff roles whose uploads are classified as `studio`.
    pub fn is_studio(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Employee)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "accountant" => Ok(Role::Accountant),
            "employee" => Ok(Role::Employee),
            "customer" => Ok(Role::Customer),
            other => Err(AppError::Validation(format!("Unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicOperation {
    CreateBooking,
    ReadAvailability,
    ReadFormSchema,
    SubmitSurvey,
    GenerateLyrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingScope {
    pub booking_id: i64,
    pub owner_id: Option<i64>,
    pub assigned_employee_id: Option<i64>,
}

impl BookingScope {
    fn owned_by(&self, user_id: i64) -> bool {
        self.owner_id == Some(user_id)
    }

    fn assigned_to(&self, user_id: i64) -> bool {
        self.assigned_employee_id == Some(user_id)
    }
}

impl From<&Booking> for BookingScope {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            owner_id: booking.user_id,
            assigned_employee_id: booking.assigned_employee_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Public(PublicOperation),
    BookingCollection,
    Booking(BookingScope),
    CustomerBookings { user_id: i64 },
    Project(BookingScope),
    Invoice(BookingScope),
    Delivery(BookingScope),
    DeliveryCollection,
    SurveyResponses,
    EmployeeCollection,
    Employee { employee_id: i64, user_id: i64 },
    EmployeeBookings { user_id: i64 },
    Expense,
    Report,
    ActivityLog,
    FormSchema,
}

impl Resource {
    // (target type, target id) as written to the activity log.
    pub fn audit_target(&self) -> (&'static str, Option<i64>) {
        match self {
            Resource::Public(_) => ("public", None),
            Resource::BookingCollection => ("booking", None),
            Resource::Booking(s) => ("booking", Some(s.booking_id)),
            Resource::CustomerBookings { user_id } => ("user", Some(*user_id)),
            Resource::Project(s) => ("project", Some(s.booking_id)),
            Resource::Invoice(s) => ("invoice", Some(s.booking_id)),
            Resource::Delivery(s) => ("delivery", Some(s.booking_id)),
            Resource::DeliveryCollection => ("delivery", None),
            Resource::SurveyResponses => ("survey", None),
            Resource::EmployeeCollection => ("employee", None),
            Resource::Employee { employee_id, .. } => ("employee", Some(*employee_id)),
            Resource::EmployeeBookings { user_id } => ("employee", Some(*user_id)),
            Resource::Expense => ("expense", None),
            Resource::Report => ("report", None),
            Resource::ActivityLog => ("activity_log", None),
            Resource::FormSchema => ("form_field", None),
        }
    }
}

// `None` is the unauthenticated caller
pub fn permits(actor: Option<&AuthUser>, action: Action, resource: &Resource) -> bool {
    if let Resource::Public(_) = resource {
        return true;
    }
    match actor {
        Some(user) => role_permits(user.role, user.id, action, resource),
        None => false,
    }
}

fn role_permits(role: Role, actor_id: i64, action: Action, resource: &Resource) -> bool {
    use Resource::*;

    match role {
        Role::Admin => true,

        Role::Manager => !matches!(
            (resource, action),
            (ActivityLog, _)
                | (FormSchema, _)
                | (Booking(_), Action::Delete)
                | (Employee { .. }, Action::Delete)
        ),

        Role::Accountant => {
            action == Action::Read
                && matches!(
                    resource,
                    BookingCollection
                        | Booking(_)
                        | CustomerBookings { .. }
                        | Invoice(_)
                        | Expense
                        | Report
                        | EmployeeCollection
                        | Employee { .. }
                )
        }

        Role::Employee => match resource {
            Booking(scope) => action == Action::Read && scope.assigned_to(actor_id),
            Project(scope) | Delivery(scope) => {
                action != Action::Delete && scope.assigned_to(actor_id)
            }
            Employee { user_id, .. } | EmployeeBookings { user_id } => {
                action == Action::Read && *user_id == actor_id
            }
            _ => false,
        },

        Role::Customer => match resource {
            Booking(scope) | Invoice(scope) | Delivery(scope) => {
                action == Action::Read && scope.owned_by(actor_id)
            }
            Project(scope) => action != Action::Delete && scope.owned_by(actor_id),
            CustomerBookings { user_id } => action == Action::Read && *user_id == actor_id,
            _ => false,
        },
    }
}

impl PublicOperation {
    fn action(&self) -> Action {
        match self {
            PublicOperation::ReadAvailability | PublicOperation::ReadFormSchema => Action::Read,
            _ => Action::Write,
        }
    }
}

pub fn allow_public(actor: Option<&AuthUser>, op: PublicOperation) -> Result<()> {
    if permits(actor, op.action(), &Resource::Public(op)) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

pub const UNAUTHORIZED_ACCESS_ATTEMPT: &str = "UNAUTHORIZED_ACCESS_ATTEMPT";

// Check and, on denial, write one audit record before returning `Forbidden`.
pub async fn authorize(
    db: &Database,
    user: &AuthUser,
    action: Action,
    resource: &Resource,
) -> Result<()> {
    if permits(Some(user), action, resource) {
        return Ok(());
    }

    let (target_type, target_id) = resource.audit_target();
    tracing::warn!(
        user_id = user.id,
        role = %user.role,
        %action,
        target_type,
        target_id,
        "Access denied"
    );

    let details = match target_id {
        Some(id) => format!(
            "{} '{}' attempted to {action} {target_type} #{id}",
            user.role, user.username
        ),
        None => format!(
            "{} '{}' attempted to {action} {target_type}",
            user.role, user.username
        ),
    };
    log_activity(
        &db.pool,
        ActivityEntry {
            user_id: Some(user.id),
            action_type: UNAUTHORIZED_ACCESS_ATTEMPT,
            details,
            target_id,
            target_type: Some(target_type),
            ip_address: user.source.as_deref(),
        },
    )
    .await;

    Err(AppError::Forbidden(format!(
        "Not authorized to {action} this {}",
        target_type.replace('_', " ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn actor(id: i64, role: Role) -> AuthUser {
        AuthUser {
            id,
            username: format!("user{id}"),
            role,
            source: Some("10.0.0.7".to_string()),
        }
    }

    fn scope(owner: Option<i64>, assignee: Option<i64>) -> BookingScope {
        BookingScope {
            booking_id: 42,
            owner_id: owner,
            assigned_employee_id: assignee,
        }
    }

    #[test]
    fn admin_is_unrestricted() {
        let admin = actor(1, Role::Admin);
        for resource in [
            Resource::Booking(scope(Some(9), None)),
            Resource::ActivityLog,
            Resource::Employee { employee_id: 3, user_id: 4 },
        ] {
            for action in [Action::Read, Action::Write, Action::Delete] {
                assert!(permits(Some(&admin), action, &resource));
            }
        }
    }

    #[test]
    fn manager_cannot_delete_people_or_bookings_or_touch_admin_areas() {
        let manager = actor(2, Role::Manager);
        let booking = Resource::Booking(scope(Some(9), None));
        let employee = Resource::Employee { employee_id: 3, user_id: 4 };

        assert!(permits(Some(&manager), Action::Write, &booking));
        assert!(!permits(Some(&manager), Action::Delete, &booking));
        assert!(permits(Some(&manager), Action::Write, &employee));
        assert!(!permits(Some(&manager), Action::Delete, &employee));
        assert!(!permits(Some(&manager), Action::Read, &Resource::ActivityLog));
        assert!(!permits(Some(&manager), Action::Write, &Resource::FormSchema));
        assert!(permits(Some(&manager), Action::Delete, &Resource::Expense));
    }

    #[test]
    fn accountant_is_read_only() {
        let accountant = actor(3, Role::Accountant);
        assert!(permits(Some(&accountant), Action::Read, &Resource::BookingCollection));
        assert!(permits(Some(&accountant), Action::Read, &Resource::Expense));
        assert!(permits(Some(&accountant), Action::Read, &Resource::Report));
        assert!(!permits(Some(&accountant), Action::Write, &Resource::Expense));
        assert!(!permits(
            Some(&accountant),
            Action::Read,
            &Resource::Project(scope(Some(9), None))
        ));
        assert!(!permits(Some(&accountant), Action::Write, &Resource::EmployeeCollection));
    }

    #[test]
    fn employee_sees_only_assigned_work_and_own_profile() {
        let employee = actor(5, Role::Employee);
        let assigned = scope(Some(9), Some(5));
        let other = scope(Some(9), Some(6));

        assert!(permits(Some(&employee), Action::Read, &Resource::Booking(assigned)));
        assert!(permits(Some(&employee), Action::Write, &Resource::Project(assigned)));
        assert!(!permits(Some(&employee), Action::Read, &Resource::Booking(other)));
        assert!(!permits(Some(&employee), Action::Write, &Resource::Project(other)));
        assert!(!permits(Some(&employee), Action::Write, &Resource::Booking(assigned)));

        assert!(permits(
            Some(&employee),
            Action::Read,
            &Resource::Employee { employee_id: 1, user_id: 5 }
        ));
        assert!(!permits(
            Some(&employee),
            Action::Read,
            &Resource::Employee { employee_id: 2, user_id: 6 }
        ));
        assert!(!permits(
            Some(&employee),
            Action::Read,
            &Resource::EmployeeBookings { user_id: 6 }
        ));
        assert!(!permits(Some(&employee), Action::Read, &Resource::BookingCollection));
    }

    #[test]
    fn customer_is_limited_to_owned_bookings() {
        let customer = actor(9, Role::Customer);
        let own = scope(Some(9), None);
        let foreign = scope(Some(10), None);
        let guest = scope(None, None);

        assert!(permits(Some(&customer), Action::Read, &Resource::Booking(own)));
        assert!(permits(Some(&customer), Action::Write, &Resource::Project(own)));
        assert!(permits(Some(&customer), Action::Read, &Resource::Invoice(own)));
        assert!(!permits(Some(&customer), Action::Write, &Resource::Booking(own)));
        assert!(!permits(Some(&customer), Action::Read, &Resource::Booking(foreign)));
        assert!(!permits(Some(&customer), Action::Write, &Resource::Project(foreign)));
        assert!(!permits(Some(&customer), Action::Read, &Resource::Invoice(guest)));
    }

    #[test]
    fn unauthenticated_callers_reach_public_operations_only() {
        for op in [
            PublicOperation::CreateBooking,
            PublicOperation::ReadAvailability,
            PublicOperation::ReadFormSchema,
            PublicOperation::SubmitSurvey,
            PublicOperation::GenerateLyrics,
        ] {
            assert!(permits(None, Action::Write, &Resource::Public(op)));
            assert!(allow_public(None, op).is_ok());
        }
        assert!(!permits(None, Action::Read, &Resource::BookingCollection));
        assert!(!permits(None, Action::Read, &Resource::Booking(scope(None, None))));
        assert!(!permits(None, Action::Read, &Resource::FormSchema));
    }

    #[tokio::test]
    async fn denial_writes_exactly_one_audit_record() {
        let ctx = testing::context().await;
        let customer = testing::seed_user(&ctx.state.db, "mallory", Role::Customer).await;
        let resource = Resource::Project(scope(Some(customer.id + 100), None));

        let err = authorize(&ctx.state.db, &customer, Action::Read, &resource)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let rows = sqlx::query_as::<_, (Option<i64>, String, Option<i64>, Option<String>, Option<String>, String)>(
            "SELECT user_id, action_type, target_id, target_type, ip_address, created_at FROM activity_logs",
        )
        .fetch_all(&ctx.state.db.pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        let (user_id, action_type, target_id, target_type, ip, created_at) = &rows[0];
        assert_eq!(*user_id, Some(customer.id));
        assert_eq!(action_type, UNAUTHORIZED_ACCESS_ATTEMPT);
        assert_eq!(*target_id, Some(42));
        assert_eq!(target_type.as_deref(), Some("project"));
        assert_eq!(ip.as_deref(), Some("127.0.0.1"));
        assert!(!created_at.is_empty());
    }

    #[tokio::test]
    async fn allowed_access_writes_nothing() {
        let ctx = testing::context().await;
        let customer = testing::seed_user(&ctx.state.db, "alice", Role::Customer).await;
        let resource = Resource::Project(scope(Some(customer.id), None));

        authorize(&ctx.state.db, &customer, Action::Write, &resource)
            .await
            .unwrap();

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activity_logs")
            .fetch_one(&ctx.state.db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
