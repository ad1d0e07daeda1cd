//! Schedule preview: the engine alone, without geocoding or persistence

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::services::hos::TripPlan;
use crate::services::trip_planner::TripPlanner;
use crate::types::{
    ErrorResponse, Request, SchedulePreviewRequest, SchedulePreviewResponse, SuccessResponse,
};

fn preview_response(plan: TripPlan) -> SchedulePreviewResponse {
    SchedulePreviewResponse {
        intervals: plan.intervals,
        stops: plan.route.stops,
        daily_logs: plan.daily_logs,
        truncated: plan.truncated,
    }
}

/// Handle hos.schedule.preview messages
pub async fn handle_preview(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<TripPlanner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received schedule.preview message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<SchedulePreviewRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match planner.preview(&request.payload) {
            Ok(plan) => {
                let response = SuccessResponse::new(request.id, preview_response(plan));
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                warn!("Schedule preview failed ({}): {}", e.code(), e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
