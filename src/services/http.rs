use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::{
    redemption::{ErrorKind, Outcome, RedemptionRequest},
    ServiceError,
};
use crate::models::{
    promo_codes::{ApplyPromoCode, NewPromoCode},
    referrals::{NewReferral, RedeemReferral},
};

#[derive(Clone)]
struct AppState {
    redemption_channel: mpsc::Sender<RedemptionRequest>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Expired | ErrorKind::LimitReached => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response<T>(outcome: Outcome<T>) -> Response {
    let kind = outcome.error_kind.unwrap_or(ErrorKind::StoreFailure);

    (
        status_for(kind),
        Json(json!({
            "success": false,
            "errorKind": kind,
            "retryable": kind.retryable(),
            "message": outcome.message,
        })),
    )
        .into_response()
}

/// Malformed bodies get the same failure shape as ledger validation errors.
fn rejection_response(rejection: JsonRejection) -> Response {
    log::debug!("Rejected request body: {}", rejection.body_text());

    (
        rejection.status(),
        Json(json!({
            "success": false,
            "errorKind": ErrorKind::Validation,
            "retryable": false,
            "message": rejection.body_text(),
        })),
    )
        .into_response()
}

fn communication_failure(error: ServiceError) -> Response {
    log::error!("{}", error);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "message": "Internal server error",
        })),
    )
        .into_response()
}

/// Sends a request to the redemption service and waits for its outcome.
async fn dispatch<T>(
    state: &AppState,
    request: impl FnOnce(oneshot::Sender<Outcome<T>>) -> RedemptionRequest,
) -> Result<Outcome<T>, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    state
        .redemption_channel
        .send(request(response_tx))
        .await
        .map_err(|e| {
            ServiceError::Communication("Failed to process request".to_string(), e.to_string())
        })?;

    response_rx.await.map_err(|e| {
        ServiceError::Communication("Failed to receive response".to_string(), e.to_string())
    })
}

async fn create_promo_code(
    State(state): State<AppState>,
    payload: Result<Json<NewPromoCode>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };

    let outcome = match dispatch(&state, |response| RedemptionRequest::CreatePromoCode {
        new_promo_code: req,
        response,
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return communication_failure(e),
    };

    match outcome.payload {
        Some(id) => (
            StatusCode::CREATED,
            Json(json!({"success": true, "promoCodeId": id})),
        )
            .into_response(),
        None => failure_response(outcome),
    }
}

async fn list_promo_codes(State(state): State<AppState>) -> Response {
    let outcome = match dispatch(&state, |response| RedemptionRequest::ListPromoCodes {
        response,
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return communication_failure(e),
    };

    match outcome.payload {
        Some(promo_codes) => (StatusCode::OK, Json(json!(promo_codes))).into_response(),
        None => failure_response(outcome),
    }
}

async fn apply_promo_code(
    State(state): State<AppState>,
    payload: Result<Json<ApplyPromoCode>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };

    let outcome = match dispatch(&state, |response| RedemptionRequest::ApplyPromoCode {
        user_id: req.user_id,
        code: req.promo_code,
        response,
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return communication_failure(e),
    };

    match outcome.payload {
        Some(discount) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": outcome.message,
                "discountApplied": discount,
            })),
        )
            .into_response(),
        None => failure_response(outcome),
    }
}

async fn create_referral(
    State(state): State<AppState>,
    payload: Result<Json<NewReferral>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };

    let outcome = match dispatch(&state, |response| RedemptionRequest::CreateReferral {
        new_referral: req,
        response,
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return communication_failure(e),
    };

    match outcome.payload {
        Some(id) => (
            StatusCode::CREATED,
            Json(json!({"success": true, "referralId": id})),
        )
            .into_response(),
        None => failure_response(outcome),
    }
}

async fn get_referral(
    State(state): State<AppState>,
    Path(referral_id): Path<String>,
) -> Response {
    let outcome = match dispatch(&state, |response| RedemptionRequest::GetReferral {
        id: referral_id,
        response,
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return communication_failure(e),
    };

    match outcome.payload {
        Some(referral) => (StatusCode::OK, Json(json!(referral))).into_response(),
        None => failure_response(outcome),
    }
}

async fn redeem_referral(
    State(state): State<AppState>,
    payload: Result<Json<RedeemReferral>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };

    let outcome = match dispatch(&state, |response| RedemptionRequest::RedeemReferral {
        referral_code: req.referral_code,
        user_id: req.user_id,
        response,
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return communication_failure(e),
    };

    if outcome.success {
        (
            StatusCode::OK,
            Json(json!({"success": true, "message": outcome.message})),
        )
            .into_response()
    } else {
        failure_response(outcome)
    }
}

pub fn router(redemption_channel: mpsc::Sender<RedemptionRequest>) -> Router {
    let app_state = AppState { redemption_channel };

    Router::new()
        .route(
            "/api/promocodes",
            post(create_promo_code).get(list_promo_codes),
        )
        .route("/api/promocodes/apply", post(apply_promo_code))
        .route("/api/referrals", post(create_referral))
        .route("/api/referrals/redeem", post(redeem_referral))
        .route("/api/referrals/{referral_id}", get(get_referral))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    redemption_channel: mpsc::Sender<RedemptionRequest>,
) -> Result<(), anyhow::Error> {
    let app = router(redemption_channel);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
