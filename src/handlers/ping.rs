//! Ping handler for health checks

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::db;
use crate::types::{ErrorResponse, Request, SuccessResponse};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PingRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PongResponse {
    message: String,
    database: bool,
}

fn pong(request: PingRequest, database: bool) -> PongResponse {
    PongResponse {
        message: request
            .message
            .map(|m| format!("Pong: {}", m))
            .unwrap_or_else(|| "Pong".to_string()),
        database,
    }
}

/// Handle hos.ping messages
pub async fn handle_ping(client: Client, mut subscriber: Subscriber, pool: PgPool) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received ping message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Ping message without reply subject");
                continue;
            }
        };

        let request: Request<PingRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse ping request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let database = db::is_reachable(&pool).await;
        let response = SuccessResponse::new(request.id, pong(request.payload, database));
        client.publish(reply, serde_json::to_vec(&response)?.into()).await?;

        debug!("Sent pong response");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_echoes_message() {
        let response = pong(PingRequest { message: Some("hi".into()) }, true);
        assert_eq!(response.message, "Pong: hi");
        assert!(response.database);
    }

    #[test]
    fn test_pong_without_message() {
        let request: Request<PingRequest> = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","timestamp":"2026-02-21T06:00:00Z","payload":{}}"#,
        )
        .unwrap();
        assert_eq!(pong(request.payload, false).message, "Pong");
    }
}
