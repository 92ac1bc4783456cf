pub mod approval;
pub mod booking;
pub mod permissions;
pub mod policy;
pub mod session;
pub mod stage;
pub mod user;

pub use approval::{project, status_badge, BookingState, Projection, StatusBadge, Tone, Track, Tracker};
pub use booking::{
    Booking, BookingNames, BookingStats, BookingView, NewBooking, StageChange, StageHistoryEntry,
};
pub use permissions::{legal_actions, ApprovalAction, LegalActions, ViewerAction};
pub use policy::{BookingPolicy, PolicyRemaining, QuotaExceeded, Usage, UNLIMITED_REMAINING};
pub use session::{AuthResponse, Session};
pub use stage::{ApprovalStage, Visibility};
pub use user::{Role, User, UserView};
