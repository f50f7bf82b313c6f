use serde_json::json;
use std::path::PathBuf;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::seed::{check_integrity, Dataset, Seed};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "schools": state.portal.school_count(),
            "seedIssues": state.portal.issues().len(),
            "flow": state.portal.flow().name(),
            "theme": state.portal.theme(),
            "term": state.portal.term(),
            "seedPath": state.config.seed_path.as_ref().map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

fn read_seed(params: &serde_json::Value) -> Result<(Seed, String), HandlerErr> {
    let path = get_optional_str(params, "path")?.map(PathBuf::from);
    let loaded = match &path {
        Some(p) => Seed::from_path(p).map(|s| (s, p.to_string_lossy().to_string())),
        None => Seed::demo().map(|s| (s, "demo".to_string())),
    };
    loaded.map_err(|e| HandlerErr {
        code: "seed_load_failed",
        message: format!("{e:#}"),
        details: None,
    })
}

fn handle_seed_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (seed, source) = match read_seed(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match Dataset::build(seed) {
        Ok(data) => {
            state.portal.replace_data(data);
            tracing::info!(%source, "seed replaced");
            ok(
                &req.id,
                json!({
                    "source": source,
                    "schools": state.portal.school_count(),
                    "issues": state.portal.issues(),
                }),
            )
        }
        Err(e) => err(&req.id, "seed_load_failed", format!("{e:#}"), None),
    }
}

/// Checks a seed without loading it; with no path, reports on the loaded one.
fn handle_seed_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let has_path = req.params.get("path").map(|v| !v.is_null()).unwrap_or(false);
    if !has_path {
        return ok(&req.id, json!({ "issues": state.portal.issues() }));
    }
    let result = read_seed(&req.params).map(|(seed, source)| {
        json!({
            "source": source,
            "issues": check_integrity(&seed),
        })
    });
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "seed.load" => Some(handle_seed_load(state, req)),
        "seed.validate" => Some(handle_seed_validate(state, req)),
        _ => None,
    }
}
