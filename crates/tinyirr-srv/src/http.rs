//! HTTP query surface.
//!
//! ```text
//! GET /{registry}/{name}/v4   - expand an as-set or ASN to IPv4 prefixes
//! GET /{registry}/{name}/v6   - same, IPv6
//! GET /dump                   - JSON dump of every registry's tables
//! GET /healthz                - per-registry serial and table sizes
//! ```
//!
//! Expansions answer `{prefixes, macros, prefixCount}`; a direct `ASnnn`
//! lookup skips expansion and returns the raw origin bucket as a JSON
//! array. Unknown paths answer an empty body.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use tinyirr_core::{expand, rpsl, Family};
use tinyirr_mirror::Registries;
use tracing::debug;

/// Shared handle the handlers resolve registries through.
#[derive(Clone)]
pub struct AppState {
    pub registries: Registries,
}

/// Build the tinyirrd router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/dump", get(dump))
        .route("/healthz", get(healthz))
        .route("/{registry}/{name}/{family}", get(lookup))
        .fallback(|| async { "" })
        .with_state(state)
}

#[derive(Serialize)]
struct LookupResponse {
    prefixes: Vec<String>,
    macros: Vec<String>,
    #[serde(rename = "prefixCount")]
    prefix_count: usize,
}

async fn lookup(
    State(state): State<AppState>,
    Path((registry, name, family)): Path<(String, String, String)>,
) -> Response {
    let family = match family.as_str() {
        "v4" => Family::V4,
        "v6" => Family::V6,
        _ => return ().into_response(),
    };

    let shared = {
        let registries = state.registries.read().await;
        match registries.get(&registry) {
            Some(shared) => shared.clone(),
            None => {
                return (
                    StatusCode::NOT_FOUND,
                    format!("unknown registry {registry}\n"),
                )
                    .into_response();
            }
        }
    };
    let index = shared.read().await;
    let name = name.to_ascii_uppercase();

    // Direct-ASN shortcut: no expansion, raw bucket out.
    if let Some(asn) = rpsl::parse_asn(&name) {
        let bucket: Vec<String> = index
            .prefixes_by_origin(asn, family)
            .iter()
            .map(ToString::to_string)
            .collect();
        return Json(bucket).into_response();
    }

    let expansion = expand::expand(&index, &name, family);
    debug!(
        registry = %registry,
        name = %name,
        prefixes = expansion.prefixes.len(),
        macros = expansion.macros.len(),
        "expanded"
    );
    let prefixes: Vec<String> = expansion
        .prefixes
        .iter()
        .map(ToString::to_string)
        .collect();
    Json(LookupResponse {
        prefix_count: prefixes.len(),
        prefixes,
        macros: expansion.macros,
    })
    .into_response()
}

async fn dump(State(state): State<AppState>) -> Response {
    let registries = state.registries.read().await;
    let mut out = BTreeMap::new();
    for (name, shared) in registries.iter() {
        let index = shared.read().await;
        match serde_json::to_value(&*index) {
            Ok(value) => {
                out.insert(name.clone(), value);
            }
            Err(err) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("dump failed: {err}\n"),
                )
                    .into_response();
            }
        }
    }
    Json(out).into_response()
}

#[derive(Serialize)]
struct RegistryHealth {
    serial: u32,
    macros: usize,
    v4_origins: usize,
    v6_origins: usize,
}

async fn healthz(State(state): State<AppState>) -> Response {
    let registries = state.registries.read().await;
    let mut out = BTreeMap::new();
    for (name, shared) in registries.iter() {
        let index = shared.read().await;
        out.insert(
            name.clone(),
            RegistryHealth {
                serial: index.serial,
                macros: index.macros.len(),
                v4_origins: index.asnv4.len(),
                v6_origins: index.asnv6.len(),
            },
        );
    }
    Json(serde_json::json!({ "registries": out })).into_response()
}
