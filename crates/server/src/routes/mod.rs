pub mod auth;
pub mod availability;
pub mod bookings;
pub mod deliveries;
pub mod employees;
pub mod expenses;
pub mod forms;
pub mod logs;
pub mod lyrics;
pub mod projects;
pub mod reports;
pub mod surveys;
pub mod upload;
