use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use crate::access::{self, PollScope};
use crate::error;
use crate::survey::{Caller, CreatePoll, Id, UnvalidatedCreatePoll, UnvalidatedUpdatePoll, UpdatePoll};
use super::{blocking, caller, json_body, respond, respond_empty, today, with_store, SharedStore};

pub fn routes(store: SharedStore) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "polls")
        .and(warp::get())
        .and(caller())
        .and(with_store(store.clone()))
        .then(list_polls);
    let create = warp::path!("api" / "polls")
        .and(warp::post())
        .and(caller())
        .and(json_body())
        .and(with_store(store.clone()))
        .then(new_poll);
    let get = warp::path!("api" / "polls" / Id)
        .and(warp::get())
        .and(caller())
        .and(with_store(store.clone()))
        .then(get_poll);
    let update = warp::path!("api" / "polls" / Id)
        .and(warp::patch())
        .and(caller())
        .and(json_body())
        .and(with_store(store.clone()))
        .then(update_poll);
    let delete = warp::path!("api" / "polls" / Id)
        .and(warp::delete())
        .and(caller())
        .and(with_store(store))
        .then(delete_poll);

    list.or(create).unify()
        .or(get).unify()
        .or(update).unify()
        .or(delete).unify()
}

pub async fn list_polls(caller: Caller, store: SharedStore) -> Response {
    let scope = PollScope::for_caller(&caller, today());
    respond(blocking(move || Ok(store.list_polls(scope)?)).await, StatusCode::OK)
}

pub async fn get_poll(id: Id, caller: Caller, store: SharedStore) -> Response {
    let scope = PollScope::for_caller(&caller, today());
    let result = blocking(move || {
        let poll = store.get_poll(&id)?;
        // polls outside the caller's window do not exist for them
        if !scope.allows(&poll) {
            return Err(error::not_found("poll", id));
        }
        Ok(poll)
    }).await;
    respond(result, StatusCode::OK)
}

pub async fn new_poll(caller: Caller, input: UnvalidatedCreatePoll, store: SharedStore) -> Response {
    let result = blocking(move || {
        access::require_admin(&caller, "create polls")?;
        let poll = store.create_poll(CreatePoll::try_from(input)?)?;
        info!(poll = %poll.id, "{caller} created poll");
        Ok(poll)
    }).await;
    respond(result, StatusCode::CREATED)
}

pub async fn update_poll(id: Id, caller: Caller, input: UnvalidatedUpdatePoll, store: SharedStore) -> Response {
    let result = blocking(move || {
        access::require_admin(&caller, "update polls")?;
        let current = store.get_poll(&id)?;
        let update = UpdatePoll::try_from((input, &current))?;
        if update.is_empty() {
            return Ok(current);
        }
        let poll = store.update_poll(&id, update)?;
        info!(poll = %poll.id, "{caller} updated poll");
        Ok(poll)
    }).await;
    respond(result, StatusCode::OK)
}

pub async fn delete_poll(id: Id, caller: Caller, store: SharedStore) -> Response {
    let result = blocking(move || {
        access::require_admin(&caller, "delete polls")?;
        store.delete_poll(&id)?;
        info!(poll = %id, "{caller} deleted poll");
        Ok(())
    }).await;
    respond_empty(result)
}
