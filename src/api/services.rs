//! Demo request handlers
//!
//! Each route raises a different kind of failure so every resolution path
//! can be exercised end to end.

use axum::{Json, extract::Path, http::StatusCode};
use tracing::info;

use super::models::MemberDto;
use crate::failure::{Failure, FailureKind, Fault};

/// Area prefix recorded on failures raised by the member handlers
pub const MEMBERS_AREA: &str = "members";

/// Member lookup (GET /api2/members/{id})
///
/// A handful of reserved ids raise failures instead of returning a member:
/// `ex`, `bad`, `user-ex`, `bad-request` and `state`.
pub async fn get_member(Path(id): Path<String>) -> Result<Json<MemberDto>, Failure> {
    info!(%id, "Fetching member");

    let failure = match id.as_str() {
        "ex" => Failure::runtime("invalid member"),
        "bad" => Failure::bad_argument("invalid input value"),
        "user-ex" => Failure::user("user error"),
        "bad-request" => Failure::new(FailureKind::BadRequest, "malformed member request"),
        "state" => Failure::new(FailureKind::IllegalState, "member is locked"),
        _ => return Ok(Json(MemberDto::greeting(&id))),
    };

    Err(failure.in_handler(format!("{MEMBERS_AREA}::get_member")))
}

pub async fn error_ex() -> Result<(), Failure> {
    Err(Failure::runtime("exception raised").in_handler("pages::error_ex"))
}

pub async fn error_404() -> Fault {
    info!("error404");
    Fault::status_with_message(StatusCode::NOT_FOUND, "404 error")
}

pub async fn error_400() -> Fault {
    info!("error400");
    Fault::status_with_message(StatusCode::BAD_REQUEST, "400 error")
}

pub async fn error_500() -> Fault {
    info!("error500");
    Fault::status_with_message(StatusCode::INTERNAL_SERVER_ERROR, "500 error")
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}
