use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppResult;
use crate::handlers::user_for_token;
use crate::models::StageChange;
use crate::services::events::visible_to;
use crate::state::AppState;

const KEEPALIVE: Duration = Duration::from_secs(30);
/// Most stage changes replayed to one reconnecting subscriber.
const BACKLOG_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct StageEventsQuery {
    pub token: String,
    pub last_id: Option<i64>,
}

fn to_event(change: &StageChange) -> Event {
    let data = serde_json::to_string(change).unwrap_or_default();
    Event::default()
        .id(change.id.to_string())
        .event("stage_change")
        .data(data)
}

// GET /api/bookings/events: SSE stream of stage changes visible to the caller
pub async fn stage_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StageEventsQuery>,
) -> AppResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    // EventSource can't set headers, so the token rides in the query
    let viewer = user_for_token(&state, &query.token)?;

    // Subscribe before reading the backlog so nothing falls between the two
    let rx = state.stage_tx.subscribe();

    // Without last_id the subscriber only wants what happens from now on
    let backlog = match query.last_id {
        Some(last_id) => {
            let db = state.db()?;
            queries::get_stage_changes_since(&db, last_id, BACKLOG_LIMIT)?
        }
        None => vec![],
    };
    if backlog.len() as i64 == BACKLOG_LIMIT {
        tracing::warn!(
            user_id = %viewer.id,
            limit = BACKLOG_LIMIT,
            "stage event backlog truncated to the newest changes"
        );
    }
    let backlog_max = backlog
        .last()
        .map(|c| c.id)
        .or(query.last_id)
        .unwrap_or(0);

    let catchup: Vec<_> = backlog
        .iter()
        .filter(|c| visible_to(c, &viewer))
        .map(|c| Ok::<_, Infallible>(to_event(c)))
        .collect();

    let live = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(change) if change.id > backlog_max && visible_to(&change, &viewer) => {
            Some(Ok(to_event(&change)))
        }
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "stage event subscriber lagged");
            None
        }
    });

    let keepalive = IntervalStream::new(tokio::time::interval(KEEPALIVE))
        .map(|_| Ok(Event::default().comment("keepalive")));

    let merged = tokio_stream::iter(catchup).chain(live).merge(keepalive);
    Ok(Sse::new(merged))
}
