//! Failure handlers registered by the demo application

use axum::http::StatusCode;
use tracing::error;

use crate::failure::{Failure, FailureKind};
use crate::negotiate::ErrorResult;
use crate::resolve::{HandlerRegistration, HandlerRegistry, HandlerReply, RegistryError};

pub fn registry() -> Result<HandlerRegistry, RegistryError> {
    let mut builder = HandlerRegistry::builder();
    builder
        .register(
            HandlerRegistration::new(FailureKind::BadArgument, |failure: &Failure| {
                error!(error = %failure, "Advice: bad argument");
                Ok(HandlerReply::body(ErrorResult::new("bad", failure.message())))
            })
            .with_fixed_status(StatusCode::BAD_REQUEST),
        )
        .register(HandlerRegistration::new(FailureKind::User, |failure: &Failure| {
            error!(error = %failure, "Advice: user exception");
            Ok(HandlerReply::with_status(
                ErrorResult::new("user-exception", failure.message()),
                StatusCode::BAD_REQUEST,
            ))
        }));
    builder.build()
}
