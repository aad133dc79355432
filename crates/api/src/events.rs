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
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, Weak};

use model::event::UpdateEvent;
use once_cell::sync::Lazy;

/// Callback invoked for every delivered event.
pub type EventSink = Box<dyn Fn(&UpdateEvent) + Send + Sync>;

static GLOBAL_BUS: Lazy<Arc<EventBus>> = Lazy::new(|| Arc::new(EventBus::new()));

/// In-process publish/subscribe of progress events.
///
/// Delivery is synchronous under the bus lock, which is what gives
/// subscribers per-job ordering. The bus is best effort and in-memory; the
/// durable record lives in the store.
pub struct EventBus {
    inner: Mutex<Subscribers>,
}

#[derive(Default)]
struct Subscribers {
    next_token: u64,
    by_job: HashMap<String, HashMap<u64, Arc<EventSink>>>,
    global: HashMap<u64, Arc<EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            inner: Mutex::new(Subscribers::default()),
        }
    }

    /// The process-wide bus instance.
    pub fn global() -> Arc<EventBus> {
        GLOBAL_BUS.clone()
    }

    /// Subscribes to events of one job. Dropping the returned subscription
    /// unsubscribes.
    pub fn subscribe(self: &Arc<Self>, job_id: &str, sink: EventSink) -> Subscription {
        let mut inner = self.lock();
        let token = inner.next_token;
        inner.next_token += 1;
        inner
            .by_job
            .entry(job_id.to_string())
            .or_default()
            .insert(token, Arc::new(sink));
        Subscription {
            bus: Arc::downgrade(self),
            job_id: Some(job_id.to_string()),
            token,
        }
    }

    /// Subscribes to events of every job.
    pub fn subscribe_all(self: &Arc<Self>, sink: EventSink) -> Subscription {
        let mut inner = self.lock();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.global.insert(token, Arc::new(sink));
        Subscription {
            bus: Arc::downgrade(self),
            job_id: None,
            token,
        }
    }

    /// Delivers the event to the job's subscribers, then the global ones.
    /// A panicking subscriber is logged and skipped; it cannot disturb the
    /// other deliveries.
    pub fn emit(&self, event: UpdateEvent) {
        let inner = self.lock();
        tracing::debug!(
            event_type = %event.event_type,
            job_id = %event.job_id,
            "emitting update event"
        );
        if let Some(subscribers) = inner.by_job.get(&event.job_id) {
            for sink in subscribers.values() {
                deliver(sink, &event);
            }
        }
        for sink in inner.global.values() {
            deliver(sink, &event);
        }
    }

    /// Drops every subscription scoped to the given job. Called when a job
    /// reaches a terminal state.
    pub fn cleanup(&self, job_id: &str) {
        self.lock().by_job.remove(job_id);
    }

    fn unsubscribe(&self, job_id: Option<&str>, token: u64) {
        let mut inner = self.lock();
        match job_id {
            Some(job_id) => {
                if let Some(subscribers) = inner.by_job.get_mut(job_id) {
                    subscribers.remove(&token);
                    if subscribers.is_empty() {
                        inner.by_job.remove(job_id);
                    }
                }
            }
            None => {
                inner.global.remove(&token);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        // A subscriber panic is caught in deliver(), so the lock can only be
        // poisoned by a panic in the bus itself.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(sink: &Arc<EventSink>, event: &UpdateEvent) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| sink(event))).is_err() {
        tracing::warn!(
            event_type = %event.event_type,
            job_id = %event.job_id,
            "event subscriber panicked; skipping it for this delivery"
        );
    }
}

/// Handle to an active subscription. Unsubscribes on drop; dropping twice or
/// after `cleanup` is harmless.
pub struct Subscription {
    bus: Weak<EventBus>,
    job_id: Option<String>,
    token: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.job_id.as_deref(), self.token);
        }
    }
}
