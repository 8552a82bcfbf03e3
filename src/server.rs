use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::candidates::{CandidateProvider, Env};
use crate::error::ResolveError;
use crate::plan;
use crate::prelude::*;
use crate::resolve::{CancelToken, Outcome, Resolver};
use crate::store::SqliteStore;
use crate::validate::{self, RequestError};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub allow_prereleases: bool,
    pub timeout: Option<Duration>,
}

/// The whole request pipeline, shared by the HTTP endpoint and the one-shot
/// CLI path: open a store, validate, resolve, emit. Each call gets its own
/// store connection; nothing is shared between resolutions.
pub fn execute(config: &ServiceConfig, body: &Value) -> (u16, Value) {
    let store = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(err) => return internal_error(err.into()),
    };

    let request = match validate::validate(&store, body) {
        Ok(request) => request,
        Err(RequestError::Store(err)) => return internal_error(err.into()),
        Err(err) => {
            return (
                400,
                json!({ "status": "invalid", "message": err.to_string() }),
            )
        }
    };

    info!(
        "resolving {:?} for python {}",
        request
            .requirements
            .keys()
            .map(|name| name.canonical())
            .collect::<Vec<_>>(),
        request
            .python
            .as_ref()
            .map(|python| python.to_string())
            .unwrap_or_else(|| "any".to_owned()),
    );

    let env = Env::new(request.python.clone(), config.allow_prereleases);
    let provider = CandidateProvider::new(&store, &env, request.max_versions);
    let cancel = match config.timeout {
        Some(budget) => CancelToken::with_deadline(budget),
        None => CancelToken::new(),
    };

    match Resolver::new(&provider, cancel).resolve(&request.requirements) {
        Ok(resolution) => match resolution.outcome {
            Outcome::Solved(assignment) => {
                match plan::install_plan(&provider, &assignment) {
                    Ok(entries) => (
                        200,
                        json!({
                            "status": "ok",
                            "install_plan": entries,
                            "stats": resolution.stats,
                        }),
                    ),
                    Err(err) => internal_error(err),
                }
            }
            Outcome::Conflict(conflict) => (
                200,
                json!({
                    "status": "conflict",
                    "message": conflict.to_string(),
                    "debug_info": {
                        "package_causing_conflict": conflict.package.canonical(),
                        "constraint_violated":
                            conflict.constraint.as_ref().map(|spec| spec.to_string()),
                    },
                    "stats": resolution.stats,
                }),
            ),
        },
        Err(ResolveError::Cancelled) => (
            408,
            json!({
                "status": "cancelled",
                "message": "resolution exceeded the configured time budget",
            }),
        ),
        Err(err) => internal_error(err),
    }
}

fn internal_error(err: ResolveError) -> (u16, Value) {
    tracing::error!("resolution aborted: {}", err);
    (500, json!({ "status": "error", "message": err.to_string() }))
}

pub fn routes(config: Arc<ServiceConfig>) -> BoxedFilter<(Response,)> {
    let banner = warp::path::end().and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "message": "dependency resolver is running; POST a request to /resolve",
        }))
    });

    let resolve = warp::path("resolve")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |body: Value| {
            let config = config.clone();
            async move {
                let (status, reply) =
                    tokio::task::spawn_blocking(move || execute(&config, &body))
                        .await
                        .unwrap_or_else(|err| {
                            tracing::error!("resolver task panicked: {}", err);
                            (500, json!({ "status": "error", "message": "internal error" }))
                        });
                let status = StatusCode::from_u16(status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Ok::<_, warp::Rejection>(warp::reply::with_status(
                    warp::reply::json(&reply),
                    status,
                ))
            }
        });

    banner
        .or(resolve)
        .recover(handle_rejection)
        .map(|reply| Reply::into_response(reply))
        .boxed()
}

async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, warp::Rejection> {
    if let Some(deserialize_err) = err.find::<warp::filters::body::BodyDeserializeError>()
    {
        let reply = warp::reply::json(&json!({
            "status": "invalid",
            "message": format!("request is not valid JSON: {}", deserialize_err),
        }));
        return Ok(warp::reply::with_status(reply, StatusCode::BAD_REQUEST));
    }
    Err(err)
}

pub async fn serve(config: ServiceConfig, addr: SocketAddr) -> Result<()> {
    if !config.db_path.exists() {
        warn!(
            "metadata database {} not found; run `setup` first or requests will fail",
            config.db_path.display()
        );
    }
    info!(
        "listening on http://{} (database: {})",
        addr,
        config.db_path.display()
    );
    warp::serve(routes(Arc::new(config))).run(addr).await;
    Ok(())
}
