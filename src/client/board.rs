use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::{BoardScope, BookingApi};
use super::ClientError;
use crate::models::{
    ApprovalAction, BookingView, LegalActions, Projection, StatusBadge, UserView, ViewerAction,
};

/// One booking as a view renders it for the current viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRow {
    pub booking: BookingView,
    pub projection: Projection,
    pub badge: StatusBadge,
    pub actions: LegalActions,
}

#[derive(Default)]
struct BoardInner {
    rows: Vec<BookingView>,
    /// Bumped by every load; only the newest load may write `rows`.
    generation: u64,
    in_flight: HashSet<String>,
    last_error: Option<String>,
    closed: bool,
}

/// A view's snapshot of one list of bookings.
///
/// Loads never retry. A response that lands after a newer load started, or
/// after the board was closed, is dropped.
pub struct BookingBoard {
    api: Arc<dyn BookingApi>,
    scope: BoardScope,
    viewer: UserView,
    inner: Mutex<BoardInner>,
}

/// Clears a booking's in-flight mark however the action ends.
struct InFlightGuard<'a> {
    board: &'a BookingBoard,
    booking_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.board.lock().in_flight.remove(&self.booking_id);
    }
}

impl BookingBoard {
    pub fn new(api: Arc<dyn BookingApi>, scope: BoardScope, viewer: UserView) -> Self {
        Self {
            api,
            scope,
            viewer,
            inner: Mutex::new(BoardInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        // Plain data; a panic elsewhere cannot leave it half-written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn scope(&self) -> BoardScope {
        self.scope
    }

    pub async fn load(&self) -> Result<(), ClientError> {
        let generation = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(ClientError::Closed);
            }
            inner.generation += 1;
            inner.generation
        };

        let result = self.api.fetch(self.scope).await;

        let mut inner = self.lock();
        if inner.closed {
            return Err(ClientError::Closed);
        }
        if inner.generation != generation {
            tracing::debug!(scope = ?self.scope, generation, "discarding stale board load");
            return Ok(());
        }

        match result {
            Ok(rows) => {
                inner.rows = rows;
                inner.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(scope = ?self.scope, error = %e, "board load failed");
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Performs `action` on one booking, then reloads the board.
    ///
    /// Refused when the snapshot does not allow it for this viewer, or when
    /// the same booking already has an action in flight.
    pub async fn act(
        &self,
        booking_id: &str,
        action: ViewerAction,
    ) -> Result<BookingView, ClientError> {
        let (approval, _guard) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(ClientError::Closed);
            }

            let booking = inner
                .rows
                .iter()
                .find(|b| b.id == booking_id)
                .ok_or(ClientError::NotAllowed(action))?;
            if !booking
                .legal_actions(&self.viewer.id, self.viewer.role)
                .allows(action)
            {
                return Err(ClientError::NotAllowed(action));
            }
            let approval = ApprovalAction::for_viewer(action, self.viewer.role)
                .ok_or(ClientError::NotAllowed(action))?;

            if !inner.in_flight.insert(booking_id.to_string()) {
                return Err(ClientError::InFlight(booking_id.to_string()));
            }
            drop(inner);

            let guard = InFlightGuard {
                board: self,
                booking_id: booking_id.to_string(),
            };
            (approval, guard)
        };

        let updated = match self.api.perform(booking_id, approval).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(booking_id, action = approval.as_str(), error = %e, "action failed");
                self.lock().last_error = Some(e.to_string());
                return Err(e);
            }
        };

        // The action already went through; a failed refresh is only recorded
        match self.load().await {
            Ok(()) | Err(ClientError::Closed) => {}
            Err(e) => tracing::warn!(error = %e, "reload after action failed"),
        }

        Ok(updated)
    }

    pub fn is_in_flight(&self, booking_id: &str) -> bool {
        self.lock().in_flight.contains(booking_id)
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn rows(&self) -> Vec<BookingRow> {
        self.lock()
            .rows
            .iter()
            .map(|booking| BookingRow {
                projection: booking.projection(),
                badge: booking.status_badge(),
                actions: booking.legal_actions(&self.viewer.id, self.viewer.role),
                booking: booking.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Gate<T> = oneshot::Receiver<Result<T, ClientError>>;

    #[derive(Default)]
    struct MockApi {
        rows: Mutex<Vec<BookingView>>,
        fetch_gates: Mutex<VecDeque<Gate<Vec<BookingView>>>>,
        perform_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        fail_fetch: Mutex<bool>,
        fetch_calls: AtomicUsize,
        perform_calls: AtomicUsize,
    }

    impl MockApi {
        fn with_rows(rows: Vec<BookingView>) -> Arc<Self> {
            let api = Self::default();
            *api.rows.lock().unwrap() = rows;
            Arc::new(api)
        }

        fn gate_fetch(&self) -> oneshot::Sender<Result<Vec<BookingView>, ClientError>> {
            let (tx, rx) = oneshot::channel();
            self.fetch_gates.lock().unwrap().push_back(rx);
            tx
        }

        fn gate_perform(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.perform_gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl BookingApi for MockApi {
        async fn fetch(&self, _scope: BoardScope) -> Result<Vec<BookingView>, ClientError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.fetch_gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                return gate.await.unwrap_or(Err(ClientError::Closed));
            }
            if *self.fail_fetch.lock().unwrap() {
                return Err(ClientError::Status {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn perform(
            &self,
            booking_id: &str,
            action: ApprovalAction,
        ) -> Result<BookingView, ClientError> {
            self.perform_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.perform_gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }

            let mut rows = self.rows.lock().unwrap();
            let booking = rows
                .iter_mut()
                .find(|b| b.id == booking_id)
                .ok_or(ClientError::Status {
                    status: 404,
                    message: "booking not found".to_string(),
                })?;
            booking.approval_stage = match action {
                ApprovalAction::StaffApprove => "PENDING_ADMIN",
                ApprovalAction::AdminApprove => "APPROVED",
                ApprovalAction::StaffReject | ApprovalAction::AdminReject => "REJECTED",
                ApprovalAction::Cancel => "CANCELLED",
            }
            .to_string();
            Ok(booking.clone())
        }
    }

    fn viewer(id: &str, role: Role) -> UserView {
        UserView {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@campus.edu"),
            role,
            advisor_id: None,
        }
    }

    fn booking(id: &str, owner: &str, stage: &str) -> BookingView {
        let now = Utc::now().naive_utc();
        BookingView {
            id: id.to_string(),
            user_id: owner.to_string(),
            user_name: None,
            resource_id: "room-1".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            duration_hours: 1,
            approval_stage: stage.to_string(),
            visibility: "PRIVATE".to_string(),
            staff_approved_by: None,
            staff_approved_at: None,
            staff_approved_by_name: None,
            admin_approved_by: None,
            admin_approved_at: None,
            admin_approved_by_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn wait_for(counter: &AtomicUsize, n: usize) {
        while counter.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_load_builds_rows_for_viewer() {
        let api = MockApi::with_rows(vec![
            booking("b1", "student", "PENDING_STAFF"),
            booking("b2", "staff", "PENDING_ADMIN"),
        ]);
        let board = BookingBoard::new(api, BoardScope::PendingStaff, viewer("staff", Role::Staff));
        board.load().await.unwrap();

        let rows = board.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].projection.current_index, 1);
        assert!(rows[0].actions.can_approve);
        assert!(!rows[0].actions.can_cancel);
        assert_eq!(rows[0].badge.label, "PENDING STAFF");

        // Staff-created booking waiting for admin
        assert_eq!(rows[1].projection.current_index, 1);
        assert!(!rows[1].actions.can_approve);
        assert!(rows[1].actions.can_cancel);
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let api = MockApi::with_rows(vec![]);
        let board = Arc::new(BookingBoard::new(
            api.clone(),
            BoardScope::Mine,
            viewer("student", Role::Student),
        ));

        let first_gate = api.gate_fetch();
        let second_gate = api.gate_fetch();

        let b = board.clone();
        let first = tokio::spawn(async move { b.load().await });
        wait_for(&api.fetch_calls, 1).await;
        let b = board.clone();
        let second = tokio::spawn(async move { b.load().await });
        wait_for(&api.fetch_calls, 2).await;

        second_gate
            .send(Ok(vec![booking("new", "student", "PENDING_STAFF")]))
            .unwrap();
        second.await.unwrap().unwrap();

        first_gate
            .send(Ok(vec![booking("old", "student", "PENDING_STAFF")]))
            .unwrap();
        first.await.unwrap().unwrap();

        let rows = board.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].booking.id, "new");
    }

    #[tokio::test]
    async fn test_closed_board_drops_late_response() {
        let api = MockApi::with_rows(vec![]);
        let board = Arc::new(BookingBoard::new(
            api.clone(),
            BoardScope::Mine,
            viewer("student", Role::Student),
        ));

        let gate = api.gate_fetch();
        let b = board.clone();
        let pending = tokio::spawn(async move { b.load().await });
        wait_for(&api.fetch_calls, 1).await;

        board.close();
        gate.send(Ok(vec![booking("late", "student", "PENDING_STAFF")]))
            .unwrap();

        assert!(matches!(pending.await.unwrap(), Err(ClientError::Closed)));
        assert!(board.rows().is_empty());
        assert!(matches!(board.load().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_rows() {
        let api = MockApi::with_rows(vec![booking("b1", "student", "PENDING_STAFF")]);
        let board = BookingBoard::new(api.clone(), BoardScope::Mine, viewer("student", Role::Student));
        board.load().await.unwrap();

        *api.fail_fetch.lock().unwrap() = true;
        assert!(board.load().await.is_err());
        assert_eq!(board.rows().len(), 1);
        assert!(board.last_error().unwrap().contains("boom"));
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_illegal_action_refused_locally() {
        let api = MockApi::with_rows(vec![
            booking("b1", "student", "PENDING_STAFF"),
            booking("b2", "student", "APPROVED"),
        ]);
        let board = BookingBoard::new(api.clone(), BoardScope::Mine, viewer("student", Role::Student));
        board.load().await.unwrap();

        assert!(matches!(
            board.act("b1", ViewerAction::Approve).await,
            Err(ClientError::NotAllowed(ViewerAction::Approve))
        ));
        assert!(matches!(
            board.act("b2", ViewerAction::Cancel).await,
            Err(ClientError::NotAllowed(ViewerAction::Cancel))
        ));
        assert!(matches!(
            board.act("missing", ViewerAction::Cancel).await,
            Err(ClientError::NotAllowed(_))
        ));
        assert_eq!(api.perform_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_action_then_reload() {
        let api = MockApi::with_rows(vec![booking("b1", "student", "PENDING_STAFF")]);
        let board = BookingBoard::new(api.clone(), BoardScope::Mine, viewer("student", Role::Student));
        board.load().await.unwrap();

        let updated = board.act("b1", ViewerAction::Cancel).await.unwrap();
        assert_eq!(updated.approval_stage, "CANCELLED");

        let rows = board.rows();
        assert!(rows[0].projection.is_cancelled);
        assert_eq!(rows[0].actions, LegalActions::default());
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_in_flight_is_per_booking() {
        let api = MockApi::with_rows(vec![
            booking("b1", "student", "PENDING_STAFF"),
            booking("b2", "student", "PENDING_STAFF"),
        ]);
        let board = Arc::new(BookingBoard::new(
            api.clone(),
            BoardScope::PendingStaff,
            viewer("staff", Role::Staff),
        ));
        board.load().await.unwrap();

        let gate = api.gate_perform();
        let b = board.clone();
        let first = tokio::spawn(async move { b.act("b1", ViewerAction::Approve).await });
        wait_for(&api.perform_calls, 1).await;

        assert!(board.is_in_flight("b1"));
        assert!(matches!(
            board.act("b1", ViewerAction::Reject).await,
            Err(ClientError::InFlight(id)) if id == "b1"
        ));

        // Another booking is still actionable
        let other = board.act("b2", ViewerAction::Reject).await.unwrap();
        assert_eq!(other.approval_stage, "REJECTED");

        gate.send(()).unwrap();
        let approved = first.await.unwrap().unwrap();
        assert_eq!(approved.approval_stage, "PENDING_ADMIN");
        assert!(!board.is_in_flight("b1"));
    }
}
