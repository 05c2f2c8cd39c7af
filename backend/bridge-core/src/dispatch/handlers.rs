use crate::dispatch::DispatchOptions;
use crate::error::HandlerError;
use crate::executor::{HostExecutor, run_code};
use crate::protocol::{JsonMap, Method, Request, Response};

use common::ErrorLocation;

use std::panic::Location;

use log::{debug, info};
use serde_json::{Value, json};

/// Routes one request to its handler. Runs on the host thread only.
pub(crate) fn handle_request<E>(
    executor: &mut E,
    request: &Request,
    options: &DispatchOptions,
) -> Result<Response, HandlerError>
where
    E: HostExecutor + ?Sized,
{
    match request.method {
        Method::Ping => Ok(handle_ping(request)),
        Method::ExecuteCode => handle_execute_code(executor, request, options),
        Method::QueryScene => handle_query_scene(executor, request),
        Method::GetObjects => handle_get_objects(executor, request),
        Method::Shutdown => Ok(handle_shutdown(request)),
    }
}

fn handle_ping(request: &Request) -> Response {
    debug!("Handling ping");
    Response::success(request.id.clone(), JsonMap::new(), "").with_data("pong", json!(true))
}

fn handle_execute_code<E>(
    executor: &mut E,
    request: &Request,
    options: &DispatchOptions,
) -> Result<Response, HandlerError>
where
    E: HostExecutor + ?Sized,
{
    let code = match request.params.code.as_deref() {
        Some(code) if !code.is_empty() => code,
        _ => {
            return Err(HandlerError::MissingParam {
                param: "code",
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };
    debug!("Handling execute_code: code_length={}", code.len());

    let outcome = run_code(executor, code, request.timeout(), options.max_output);
    Ok(outcome.into_response(&request.id))
}

fn handle_query_scene<E>(executor: &mut E, request: &Request) -> Result<Response, HandlerError>
where
    E: HostExecutor + ?Sized,
{
    debug!(
        "Handling query_scene: {}",
        request.params.query.as_deref().unwrap_or("<none>")
    );

    let scene_info = executor.scene_info().map_err(|message| HandlerError::Host {
        message,
        location: ErrorLocation::from(Location::caller()),
    })?;

    Ok(Response::success(request.id.clone(), scene_info, ""))
}

fn handle_get_objects<E>(executor: &mut E, request: &Request) -> Result<Response, HandlerError>
where
    E: HostExecutor + ?Sized,
{
    debug!("Handling get_objects");

    let objects = executor.object_list().map_err(|message| HandlerError::Host {
        message,
        location: ErrorLocation::from(Location::caller()),
    })?;

    Ok(Response::success(request.id.clone(), JsonMap::new(), "")
        .with_data("objects", Value::Array(objects)))
}

/// Acknowledge only; tearing the bridge down belongs to the host lifecycle.
fn handle_shutdown(request: &Request) -> Response {
    info!("Shutdown requested");
    Response::success(request.id.clone(), JsonMap::new(), "").with_data("shutdown", json!(true))
}
