//! Outermost layer: a panicking handler becomes an `Internal` error response
//! instead of taking the connection (or the process) down with it.

use std::any::Any;

use axum::response::{IntoResponse, Response};
use modelgate::errors::GatewayError;
use tower_http::catch_panic::CatchPanicLayer;

use crate::api_error::{ApiError, ErrorReport};
use crate::logging::{panic_message, take_panic_backtrace};

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

pub fn layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    tracing::error!(panic = %message, "recovered from panic in handler");

    let err = GatewayError::Internal(message);
    let report = ErrorReport::new(&err).with_backtrace(take_panic_backtrace());
    let mut response = ApiError::from(err).into_response();
    response.extensions_mut().insert(report);
    response
}
