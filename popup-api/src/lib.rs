//! HTTP API for the popup form builder
//!
//! Users own folders and forms; a form holds an ordered list of popups.
//! Visitors run through a form as a chat: the client snapshots the form's
//! popups into a new chat, submits one response per popup, and reports
//! engagement counters that feed the completion-rate bookkeeping.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;
pub mod store;
pub mod types;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

use handlers::{chats, folders, forms, users};
pub use state::AppState;

const MAX_BODY_BYTES: usize = 250 * 1024;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let account_routes = Router::new()
        .route("/signup", post(users::signup))
        .route("/login", post(users::login))
        .route("/user", get(users::current_user))
        .route("/update", put(users::update_user))
        .route("/logout", post(users::logout));

    let catalog_routes = Router::new()
        .route("/folder", post(folders::create_folder).get(folders::list_folders))
        .route("/folder/:id", delete(folders::delete_folder))
        .route("/Form", post(forms::create_form).get(forms::list_forms))
        .route("/Form/:id", put(forms::update_form).delete(forms::delete_form))
        .route("/Form/:id/Popup", post(forms::create_popup))
        .route("/Form/:id/Popups", get(forms::list_popups))
        .route(
            "/Form/:id/Popup/:popup_id",
            delete(forms::delete_popup).patch(forms::update_popup_content),
        );

    let chat_routes = Router::new()
        .route("/chat", post(chats::create_chat))
        .route("/chat/:id", get(chats::get_chat))
        .route("/chat/:id/response", post(chats::save_response))
        .route("/chat/:id/interact", put(chats::update_interaction))
        .route("/formresponse/:id", get(chats::get_form_response));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(account_routes)
        .merge(catalog_routes)
        .merge(chat_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
    ];

    let origin = origin.and_then(|o| {
        HeaderValue::from_str(o)
            .map_err(|_| warn!("BASE_URL {o:?} is not a valid origin, allowing any origin"))
            .ok()
    });

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static("x-auth-token"),
            ])
            .allow_credentials(true),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}
