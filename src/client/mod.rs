//! Client-side view of the booking service: who is signed in, how bookings
//! are fetched and acted on, and the per-view board that keeps a snapshot.

pub mod api;
pub mod board;
pub mod http;
pub mod session;

pub use api::{BoardScope, BookingApi};
pub use board::{BookingBoard, BookingRow};
pub use http::HttpBookingApi;
pub use session::{AuthState, ClientSession, ExpiryWatcher, SessionContext};

use crate::models::ViewerAction;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0:?} is not allowed on this booking")]
    NotAllowed(ViewerAction),

    #[error("an action for booking {0} is already in flight")]
    InFlight(String),

    #[error("board is closed")]
    Closed,
}
