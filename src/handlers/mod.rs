pub mod admin;
pub mod auth;
pub mod calendar;
pub mod client;
pub mod customer_booking;
pub mod customers;
pub mod events;
pub mod health;
pub mod public;
pub mod sms;
pub mod webhook;
