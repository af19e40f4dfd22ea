//! HTTP handlers for resource operations
//!
//! Two catch-all routes serve every configured resource:
//! - `/{resource}`
//! - `/{resource}/{*rest}` for items, nested members and `~method`s
//!
//! The handlers only translate HTTP into [`Dispatcher`] calls. Anything that
//! does not map onto an operation of the addressed resource is not found.

use crate::core::auth::{AuthContext, AuthProvider};
use crate::core::error::{DocrestError, DocrestResult, RequestError, ResourceError};
use crate::core::resource::MethodKind;
use crate::resources::dispatcher::{Address, Dispatcher, Reply};
use crate::resources::query::QueryParams;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Path, Query, Request, State};
use axum::http::Method;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<dyn AuthProvider>,
}

/// Build the resource routes, guarded by the auth provider
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/{resource}", any(handle_root))
        .route("/{resource}/{*rest}", any(handle_nested))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Authenticate every request before it reaches a handler
async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match state.auth.authenticate(request.headers()).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

async fn handle_root(
    State(state): State<AppState>,
    method: Method,
    Path(resource): Path<String>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> DocrestResult<Reply> {
    dispatch(&state, method, &resource, "", query, auth, body).await
}

async fn handle_nested(
    State(state): State<AppState>,
    method: Method,
    Path((resource, rest)): Path<(String, String)>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> DocrestResult<Reply> {
    dispatch(&state, method, &resource, &rest, query, auth, body).await
}

async fn dispatch(
    state: &AppState,
    method: Method,
    resource: &str,
    rest: &str,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    auth: AuthContext,
    body: Bytes,
) -> DocrestResult<Reply> {
    let Query(raw_query) = query.map_err(|e| RequestError::InvalidQuery {
        parameter: "*".to_string(),
        message: e.body_text(),
    })?;
    let dispatcher = state.dispatcher.as_ref();
    let not_found = || DocrestError::from(ResourceError::not_found(resource));

    let definition = dispatcher.resources().get(resource).ok_or_else(not_found)?;
    let address = Address::parse(definition.kind, rest).ok_or_else(not_found)?;
    let params = QueryParams::from(&raw_query);

    if let Address::Method { item, slug } = &address {
        let (kind, body) = if method == Method::GET {
            (MethodKind::View, None)
        } else if method == Method::POST {
            (MethodKind::Operation, optional_json(&body)?)
        } else {
            return Err(not_found());
        };
        return dispatcher
            .call_method(resource, item.as_ref(), slug, kind, body, raw_query, auth)
            .await;
    }

    let is_root = address == Address::Root;
    let list_root = is_root && definition.is_list();

    if method == Method::GET && list_root {
        dispatcher.list(resource, &params).await
    } else if method == Method::POST && is_root {
        dispatcher.create(resource, json_body(&body)?).await
    } else if list_root {
        Err(not_found())
    } else if method == Method::GET {
        dispatcher.read(resource, &address, &params).await
    } else if method == Method::PUT {
        dispatcher.replace(resource, &address, json_body(&body)?).await
    } else if method == Method::PATCH {
        dispatcher.update(resource, &address, json_body(&body)?).await
    } else if method == Method::DELETE {
        dispatcher.delete(resource, &address).await
    } else {
        Err(not_found())
    }
}

/// Parse a mandatory JSON body; malformed or missing bodies are `format:unexpected`
fn json_body(body: &Bytes) -> DocrestResult<Value> {
    Ok(serde_json::from_slice(body)?)
}

fn optional_json(body: &Bytes) -> DocrestResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    json_body(body).map(Some)
}
