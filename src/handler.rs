//! WebSocket connection handler
//!
//! Handles individual TCP connections: WebSocket handshake on the room
//! path, identity extraction from the `auth` cookie, then hands the
//! upgraded stream to the room.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tracing::{debug, info};

use crate::error::AppError;
use crate::identity::Identity;
use crate::room::RoomHandle;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake and serves the connection until the
/// client goes away. A failed handshake only affects this connection; the
/// caller logs the error and carries on.
pub async fn handle_connection(
    stream: TcpStream,
    room: RoomHandle,
    path: &str,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let mut identity = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        identity = Some(authorize(req, path)?);
        Ok(resp)
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let identity = identity.ok_or(AppError::Unauthorized)?;

    info!("{} connected from {}", identity.name, peer_addr);

    room.accept(ws_stream, identity).await
}

/// Check the request path and decode the caller's identity
fn authorize(req: &Request, path: &str) -> Result<Identity, ErrorResponse> {
    if req.uri().path() != path {
        return Err(reject(StatusCode::NOT_FOUND, "Not found"));
    }

    let cookies = req
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok());

    let mut last_error = None;
    for cookie in cookies {
        match Identity::from_cookie_header(cookie) {
            Ok(identity) => return Ok(identity),
            Err(e) => last_error = Some(e),
        }
    }

    let reason = last_error.map_or_else(|| "Missing auth cookie".to_string(), |e| e.to_string());
    debug!("Rejecting handshake: {}", reason);
    Err(reject(StatusCode::UNAUTHORIZED, &reason))
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
