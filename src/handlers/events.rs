use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::BookingStatus;
use crate::services::auth::CurrentUser;
use crate::services::events::{BookingEvent, BookingEventKind};
use crate::state::AppState;

// GET /api/client/events
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let user_id = current.user.id;
    let now = state.config.local_now();

    // Subscribe before the snapshot so nothing falls between the two.
    let rx = state.events_tx.subscribe();

    let today = {
        let db = state.conn()?;
        queries::mark_past_bookings_done(&db, user_id, &now)?;
        queries::list_bookings(
            &db,
            user_id,
            &BookingFilter {
                status: Some(BookingStatus::Active),
                date: Some(now.date()),
                client_phone: None,
                limit: 200,
            },
        )?
    };

    let snapshot: Vec<BookingEvent> = today
        .iter()
        .map(|b| BookingEvent::new(BookingEventKind::Created, b))
        .collect();
    let snapshot_data = serde_json::to_string(&snapshot).unwrap_or_default();
    let snapshot_stream = tokio_stream::once(Ok::<_, Infallible>(
        Event::default().data(snapshot_data).event("snapshot"),
    ));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.user_id == user_id => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().data(data).event("booking")))
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(user_id, skipped, "event stream lagged");
            None
        }
    });

    let keepalive_stream = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok(Event::default().comment("keepalive")));

    let combined = snapshot_stream.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}
