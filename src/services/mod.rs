pub mod approvals;
pub mod auth;
pub mod bookings;
pub mod events;
pub mod policy;
pub mod sessions;
pub mod slots;
