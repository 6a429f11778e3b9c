use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::services::calendar::generate_ics;
use crate::services::customer_booking;
use crate::state::AppState;

// GET /api/customer-booking/:token/ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let (booking, user) = {
        let db = state.conn()?;
        customer_booking::lookup(&db, &token, state.config.local_now())?
    };

    let link = state.config.customer_link(&booking.customer_token);
    let ics = generate_ics(
        &booking,
        user.display_business_name(),
        &link,
        state.config.utc_offset_minutes,
    );
    let disposition = format!("attachment; filename=\"booking-{}.ics\"", booking.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        ics,
    )
        .into_response())
}
