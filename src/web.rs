mod db;
mod poll_api;
mod question_api;
mod submission_api;

pub use db::PgStore;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tracing::{debug, error, info};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{self, Reply, Response};
use warp::{Filter, Rejection};

use crate::error::ApiError;
use crate::store::Store;
use crate::survey::{Caller, Id};

const MAX_BODY_BYTES: u64 = 256 * 1024;

pub type SharedStore = Arc<dyn Store>;

pub fn routes(store: SharedStore) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    poll_api::routes(store.clone())
        .or(question_api::routes(store.clone())).unify()
        .or(submission_api::routes(store)).unify()
        .recover(handle_rejection)
        .with(warp::trace::request())
}

pub async fn serve(address: SocketAddr, store: SharedStore) -> Result<(), warp::Error> {
    let (bound, server) = warp::serve(routes(store))
        .try_bind_with_graceful_shutdown(address, shutdown_signal())?;
    info!("Listening on {bound}");
    server.await;
    info!("Server stopped");
    Ok(())
}

/// Identity forwarded by the authenticating gateway. No headers means anonymous.
fn caller() -> impl Filter<Extract = (Caller,), Error = Rejection> + Clone {
    warp::header::optional::<Id>("x-user-id")
        .and(warp::header::optional::<bool>("x-user-superuser"))
        .map(|id: Option<Id>, superuser: Option<bool>| match id {
            Some(id) if superuser.unwrap_or(false) => Caller::superuser(id),
            Some(id) => Caller::user(id),
            None => Caller::anonymous(),
        })
}

fn with_store(store: SharedStore) -> impl Filter<Extract = (SharedStore,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Run store work off the async executor; diesel connections block.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.unwrap_or_else(|err| {
        error!("Store task failed: {err}");
        Err(ApiError::Internal(err.to_string()))
    })
}

fn respond<T: Serialize>(result: Result<T, ApiError>, code: StatusCode) -> Response {
    match result {
        Ok(body) => reply::with_status(reply::json(&body), code).into_response(),
        Err(err) => {
            debug!("Request failed with {}: {err}", err.code());
            err.into_response()
        },
    }
}

fn respond_empty(result: Result<(), ApiError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            debug!("Request failed with {}: {err}", err.code());
            err.into_response()
        },
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (code, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("not found"))
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<reject::LengthRequired>() {
        (StatusCode::LENGTH_REQUIRED, e.to_string())
    } else if let Some(e) = err.find::<reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
    } else if let Some(e) = err.find::<reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
    } else if let Some(e) = err.find::<reject::MethodNotAllowed>() {
        // path matched, method did not
        (StatusCode::METHOD_NOT_ALLOWED, e.to_string())
    } else {
        error!("Unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, String::from("internal server error"))
    };

    Ok(reply::with_status(reply::json(&json!({ "detail": detail })), code).into_response())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
