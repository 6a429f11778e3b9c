pub mod availability;
pub mod blog;
pub mod booking;
pub mod catalog;
pub mod client;
pub mod jalali;
pub mod phone;
pub mod sms;
pub mod user;

pub use availability::Availability;
pub use blog::BlogPost;
pub use booking::{Booking, BookingStatus, NewBooking};
pub use catalog::{Job, Plan};
pub use client::Client;
pub use jalali::JalaliDate;
pub use sms::{NewSmsLog, PurchaseStatus, SmsLog, SmsPurchase, SmsStatus, SmsTemplate};
pub use user::{NewUser, OtpCode, User};
