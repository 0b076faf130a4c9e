//! Tick stage: dispatch due probes
//!
//! Due tasks are popped in trigger order, expired ones are dropped unprobed,
//! and the rest are dispatched by provider priority under the probe limiter.
//! Every dispatched show is recorded in the dispatch log, so it is probed at
//! most once per window whatever the outcome. Credentials resolved at
//! enqueue time are checked against the TTL again before dispatch and
//! refreshed once per venue when stale. All probes of one tick are awaited
//! together; a failed probe never cancels its siblings.

use crate::error::{ProviderError, SamplerResult};
use crate::provider::{ProbeRequest, SeatProbe, VenueHints};
use crate::scheduler::{Credential, Measurement, SampleTask, SchedulerContext, SeatCount, TaskPayload};
use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use std::collections::HashMap;

/// A probe that did not produce a measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub payload: TaskPayload,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    /// Window closed before dispatch; never probed
    pub expired: usize,
    pub dispatched: usize,
    pub sampled: usize,
    pub failed: usize,
    pub failures: Vec<ProbeFailure>,
}

/// Run one Tick at `now`
pub async fn tick(ctx: &SchedulerContext, now: DateTime<Utc>) -> SamplerResult<TickReport> {
    let due = ctx.queue.lock().await.pop_due(now);

    let mut report = TickReport {
        due: due.len(),
        ..Default::default()
    };

    let (expired, mut ready): (Vec<SampleTask>, Vec<SampleTask>) =
        due.into_iter().partition(|task| task.is_expired(now));

    report.expired = expired.len();
    for task in &expired {
        tracing::debug!(
            show_id = task.payload.show_id,
            provider = %task.payload.provider,
            "Sampling window closed before dispatch, dropping"
        );
    }

    if ready.is_empty() {
        if report.expired > 0 {
            tracing::info!(due = report.due, expired = report.expired, "Tick complete");
        }
        return Ok(report);
    }

    // Stable: equal priorities keep trigger order
    ready.sort_by_key(|task| ctx.providers.priority(&task.payload.provider));
    report.dispatched = ready.len();
    for task in &ready {
        ctx.dispatched.record(task.payload.show_id, task.window_end).await;
    }
    refresh_credentials(ctx, &mut ready, now).await;

    let results = join_all(ready.into_iter().map(|task| probe_task(ctx, task))).await;

    let mut measurements = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(measurement) => measurements.push(measurement),
            Err(failure) => {
                tracing::warn!(
                    show_id = failure.payload.show_id,
                    provider = %failure.payload.provider,
                    error = %failure.error,
                    "Seat probe failed"
                );
                report.failures.push(failure);
            }
        }
    }

    report.sampled = measurements.len();
    report.failed = report.failures.len();
    ctx.buffer.extend(measurements).await;

    tracing::info!(
        due = report.due,
        expired = report.expired,
        dispatched = report.dispatched,
        sampled = report.sampled,
        failed = report.failed,
        "Tick complete"
    );

    Ok(report)
}

/// Swap enqueue-time tokens for fresh ones
///
/// A cached token younger than the TTL is used as is. Otherwise the token is
/// fetched again, at most once per venue per tick. When that fetch fails the
/// task keeps the token it was enqueued with and the probe decides.
async fn refresh_credentials(ctx: &SchedulerContext, tasks: &mut [SampleTask], now: DateTime<Utc>) {
    let ttl = ctx.config.credential_ttl();
    let mut current: HashMap<i64, Option<String>> = HashMap::new();

    for task in tasks.iter_mut() {
        if task.payload.credential.is_none() {
            continue;
        }
        let venue_id = task.payload.venue_id;

        if !current.contains_key(&venue_id) {
            let token = match ctx.credentials.get_fresh(venue_id, now, ttl).await {
                Some(credential) => Some(credential.token),
                None => refetch_credential(ctx, &task.payload, now).await,
            };
            current.insert(venue_id, token);
        }

        if let Some(Some(token)) = current.get(&venue_id) {
            task.payload.credential = Some(token.clone());
        }
    }
}

async fn refetch_credential(ctx: &SchedulerContext, payload: &TaskPayload, now: DateTime<Utc>) -> Option<String> {
    let provider = ctx.providers.get(&payload.provider)?;
    let venue_url = payload.venue_url.as_deref().filter(|url| !url.trim().is_empty())?;

    match provider.fetch_credential(venue_url).await {
        Ok(token) => {
            tracing::debug!(
                venue_id = payload.venue_id,
                provider = provider.tag(),
                "Refreshed stale credential before dispatch"
            );
            ctx.credentials
                .put(payload.venue_id, Credential::new(token.clone(), now))
                .await;
            Some(token)
        }
        Err(err) => {
            tracing::warn!(
                venue_id = payload.venue_id,
                error = %err,
                "Credential refresh failed, probing with the enqueued token"
            );
            None
        }
    }
}

async fn probe_task(ctx: &SchedulerContext, task: SampleTask) -> Result<Measurement, ProbeFailure> {
    let payload = task.payload;

    let provider = match ctx.providers.get(&payload.provider) {
        Some(provider) => provider,
        None => {
            let error = format!("provider '{}' is not registered", payload.provider);
            return Err(ProbeFailure { payload, error });
        }
    };

    let request = probe_request(&payload);

    let probe = {
        let _permit = match ctx.probe_limiter.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                return Err(ProbeFailure {
                    payload,
                    error: err.to_string(),
                })
            }
        };
        provider.probe_seats(&request).await
    };

    match probe.and_then(|probe| to_measurement(&payload, probe)) {
        Ok(measurement) => Ok(measurement),
        Err(err) => Err(ProbeFailure {
            payload,
            error: err.to_string(),
        }),
    }
}

fn probe_request(payload: &TaskPayload) -> ProbeRequest {
    let local = payload.starts_at.with_timezone(&Local);
    ProbeRequest {
        show_id: payload.show_id,
        starts_at: payload.starts_at,
        date: local.date_naive(),
        time: local.time(),
        title: payload.movie_title.clone(),
        detail_url: payload.detail_url.clone(),
        venue_hints: VenueHints {
            venue_id: payload.venue_id,
            venue_name: payload.venue_name.clone(),
            venue_url: payload.venue_url.clone(),
        },
        credential: payload.credential.clone(),
    }
}

fn to_measurement(payload: &TaskPayload, probe: SeatProbe) -> Result<Measurement, ProviderError> {
    let seats = match (probe.seats_remaining, probe.seats_sold) {
        (Some(remaining), _) => SeatCount::Remaining(remaining),
        (None, Some(sold)) => SeatCount::Sold(sold),
        (None, None) => {
            return Err(ProviderError::Parse(
                "probe returned neither seats remaining nor seats sold".to_string(),
            ))
        }
    };

    Ok(Measurement {
        show_id: payload.show_id,
        venue_id: payload.venue_id,
        movie_id: payload.movie_id,
        auditorium: probe.auditorium,
        seats,
        capacity: probe.capacity,
        source: probe.source,
        observed_at: Utc::now(),
    })
}
