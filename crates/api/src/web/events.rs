/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! Long-lived server-sent event stream feeding dashboards from the bus.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use model::event::UpdateEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::EventSink;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventStreamParams {
    /// Scope the stream to one job; absent means every job.
    job_id: Option<String>,
}

/// Subscribes the connection on the bus and forwards each event as one
/// `event: <type>` / `data: <json>` frame. There is no backpressure: events
/// are coarse, and a stalled peer gets its stream closed by the transport
/// rather than buffered without bound.
pub(crate) async fn stream(
    State(state): State<AppState>,
    Query(params): Query<EventStreamParams>,
) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<UpdateEvent>();
    let sink: EventSink = Box::new(move |event| {
        // Send failure means the peer is gone; the subscription is dropped
        // with the stream shortly after.
        let _ = tx.send(event.clone());
    });
    let subscription = match &params.job_id {
        Some(job_id) => state.bus.subscribe(job_id, sink),
        None => state.bus.subscribe_all(sink),
    };
    tracing::debug!(job_id = ?params.job_id, "event stream subscriber connected");

    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        // The bus subscription lives inside the stream: when the peer
        // disconnects, axum drops the stream and unsubscribes with it.
        let _owned = &subscription;
        Ok::<Event, Infallible>(
            Event::default()
                .event(event.event_type.to_string())
                .data(serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string())),
        )
    });

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
