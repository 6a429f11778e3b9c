pub mod auth;
pub mod billing;
pub mod booking;
pub mod calendar;
pub mod customer_booking;
pub mod events;
pub mod scheduling;
pub mod sms;
