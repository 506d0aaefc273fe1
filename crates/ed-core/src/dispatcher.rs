use crate::attempts::{AttemptRepository, DispatchLogRepository, NewLogEntry};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, EngineError, IntakeError};
use crate::escalator::TimeoutEscalator;
use crate::events::EventRepository;
use crate::finder::CandidateFinder;
use crate::locks::RequestLocks;
use crate::rate_limit::{Admission, AttemptMark, RateLimiter};
use crate::requests::{RequestRepository, StatusChange};
use crate::store::Store;
use crate::types::event::EventBody;
use crate::types::io::{
    CreateEmergencyInput, IntakeReceipt, OperatorInput, RequestDetail, RequestFilter,
    UpsertWorkerInput,
};
use crate::types::{
    AttemptResponse, Candidate, DispatchAttempt, EmergencyRequest, EscalationReason, LogEvent,
    RequestId, RequestStatus, Requester, ServiceId, WorkerId, WorkerSnapshot,
};
use crate::validation::{
    normalize_note, parse_urgency, validate_address, validate_coordinates, validate_phone,
    validate_status_transition,
};
use crate::workers::AvailabilityRepository;
use chrono::{DateTime, Utc};
use ed_events::bus::EventBus;
use ed_events::types::{EventRecord, EventSource};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source: EventSource,
    pub correlation_id: Option<String>,
}

impl RequestContext {
    pub fn new(source: EventSource, correlation_id: Option<String>) -> Self {
        Self {
            source,
            correlation_id,
        }
    }
}

/// Process-wide pieces shared by every dispatcher instance. Dispatchers are
/// cheap and usually built per call around a fresh store connection; the
/// runtime is what makes them agree with each other.
#[derive(Clone)]
pub struct Runtime {
    pub config: DispatchConfig,
    pub event_bus: EventBus,
    pub limiter: RateLimiter,
    pub escalator: TimeoutEscalator,
    pub locks: RequestLocks,
}

impl Runtime {
    pub fn new(config: DispatchConfig, event_bus: EventBus, escalator: TimeoutEscalator) -> Self {
        let limiter = RateLimiter::in_memory(config.rate_limit_window, config.rate_limit_max);
        Self {
            config,
            event_bus,
            limiter,
            escalator,
            locks: RequestLocks::new(),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

pub struct Dispatcher<S: Store> {
    store: S,
    runtime: Runtime,
}

impl<S: Store> Dispatcher<S> {
    pub fn new(store: S, runtime: Runtime) -> Self {
        Self { store, runtime }
    }

    pub fn emergencies(&self) -> EmergenciesApi<'_, S> {
        EmergenciesApi { core: self }
    }

    pub fn workers(&self) -> WorkersApi<'_, S> {
        WorkersApi { core: self }
    }

    pub fn events(&self) -> EventsApi<'_, S> {
        EventsApi { core: self }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Recent intake attempts for a rate-limit identifier, newest last.
    pub fn recent_attempts(&self, identifier: &str) -> Result<Vec<AttemptMark>, EngineError> {
        self.runtime
            .limiter
            .recent_attempts(identifier)
            .map_err(EngineError::store)
    }

    pub(crate) fn with_events<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&S) -> Result<(T, Vec<EventBody>), EngineError>,
    {
        let (value, records) = self.store.with_tx(|store| {
            let (value, bodies) = f(store)?;
            let mut records = Vec::new();
            for body in bodies {
                let record = build_event_record(ctx, body)?;
                let record = store.events().append(record)?;
                records.push(record);
            }
            Ok((value, records))
        })?;
        for record in records {
            let _ = self.runtime.event_bus.publish(record);
        }
        Ok(value)
    }
}

pub struct EmergenciesApi<'a, S: Store> {
    pub(crate) core: &'a Dispatcher<S>,
}

impl<'a, S: Store> EmergenciesApi<'a, S> {
    /// Validates, rate-limits and records a new request, then dispatches it
    /// right away unless auto dispatch is off.
    pub fn create(
        &self,
        ctx: &RequestContext,
        input: CreateEmergencyInput,
    ) -> Result<IntakeReceipt, EngineError> {
        let contact_phone = validate_phone(&input.contact_phone)?;
        validate_coordinates(&input.location)?;
        let address = validate_address(&input.address)?;
        let urgency = parse_urgency(input.urgency_level.as_deref())?;

        let now = Utc::now();
        let request = EmergencyRequest {
            id: RequestId::generate(),
            requester: match input.requester {
                Some(user_id) => Requester::User { user_id },
                None => Requester::Anonymous,
            },
            contact_phone,
            location: input.location,
            address,
            service_id: input.service_id,
            service_description: input
                .service_description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            site_id: input.site_id,
            urgency,
            status: RequestStatus::Open,
            assigned_worker: None,
            response_deadline: None,
            escalation_reason: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        let limiter = &self.core.runtime.limiter;
        let identifier = request.rate_limit_identifier();
        match limiter.admit(identifier) {
            Admission::Limited { wait_seconds } => {
                limiter.record_attempt(identifier, false);
                tracing::info!(identifier, wait_seconds, "emergency request rate limited");
                return Err(IntakeError::RateLimited { wait_seconds }.into());
            }
            Admission::Allowed => limiter.record_attempt(identifier, true),
        }

        let queued = self.core.with_events(ctx, |store| {
            store.requests().create(&request)?;
            let change = StatusChange::new(RequestStatus::Open, RequestStatus::Queued, now);
            let queued = apply_transition(store, &request, &change)?;
            let events = vec![
                EventBody::EmergencyCreated {
                    request: request.clone(),
                },
                EventBody::status_changed(&request.id, RequestStatus::Open, RequestStatus::Queued),
            ];
            Ok((queued, events))
        })?;
        tracing::info!(
            request_id = %queued.id,
            urgency = %queued.urgency,
            "emergency request created"
        );

        if !self.core.runtime.config.auto_dispatch {
            return Ok(receipt(&queued, 0));
        }

        let _guard = self.core.runtime.locks.lock(&queued.id);
        self.dispatch_locked(ctx, queued, None)
    }

    /// Operator dispatch of a queued request. Repeating it on a request that
    /// is already dispatched reports the outstanding offers.
    pub fn dispatch(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
        input: OperatorInput,
    ) -> Result<IntakeReceipt, EngineError> {
        let note = normalize_note(input.note)?;
        let _guard = self.core.runtime.locks.lock(id);
        let request = load(&self.core.store, id)?;
        match request.status {
            RequestStatus::Queued => self.dispatch_locked(ctx, request, note),
            RequestStatus::Dispatched => {
                let pending = self
                    .core
                    .store
                    .attempts()
                    .list(id)?
                    .iter()
                    .filter(|attempt| attempt.is_pending())
                    .count();
                Ok(receipt(&request, pending))
            }
            from => Err(DispatchError::InvalidTransition {
                from,
                to: RequestStatus::Dispatched,
            }
            .into()),
        }
    }

    fn dispatch_locked(
        &self,
        ctx: &RequestContext,
        request: EmergencyRequest,
        note: Option<String>,
    ) -> Result<IntakeReceipt, EngineError> {
        let config = &self.core.runtime.config;
        let found = {
            let workers = self.core.store.workers();
            CandidateFinder::new(&workers).find(
                &request.location,
                request.service_id.as_ref(),
                config.search_radius_km,
                config.max_candidates,
            )
        };

        let candidates = match found {
            Ok(candidates) if candidates.is_empty() => {
                tracing::warn!(request_id = %request.id, "no candidates in range");
                let escalated =
                    self.escalate_queued(ctx, &request, EscalationReason::NoCandidates, note)?;
                return Ok(receipt(&escalated, 0));
            }
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!(
                    request_id = %request.id,
                    error = %err,
                    "availability lookup failed"
                );
                let escalated = self.escalate_queued(
                    ctx,
                    &request,
                    EscalationReason::AvailabilityUnavailable,
                    note,
                )?;
                return Ok(receipt(&escalated, 0));
            }
        };

        let now = Utc::now();
        let deadline = config.response_deadline(now);
        let dispatched = self.core.with_events(ctx, |store| {
            let mut events = Vec::with_capacity(candidates.len() + 1);
            for candidate in &candidates {
                let attempt = notify_attempt(&request.id, candidate, now);
                store.attempts().insert(&attempt)?;
                store
                    .dispatch_log()
                    .record(NewLogEntry::for_attempt(&attempt, LogEvent::Notified, now))?;
                events.push(EventBody::CandidateNotified {
                    request_id: request.id.clone(),
                    worker_id: candidate.worker_id.clone(),
                    distance_km: candidate.distance_km,
                    urgency: request.urgency,
                });
            }
            let change = StatusChange::new(RequestStatus::Queued, RequestStatus::Dispatched, now)
                .deadline(deadline)
                .note(note);
            let dispatched = apply_transition(store, &request, &change)?;
            events.push(EventBody::status_changed(
                &request.id,
                RequestStatus::Queued,
                RequestStatus::Dispatched,
            ));
            Ok((dispatched, events))
        })?;

        self.core
            .runtime
            .escalator
            .watch(dispatched.id.clone(), config.capped_response_timeout());
        tracing::info!(
            request_id = %dispatched.id,
            candidates = candidates.len(),
            nearest_km = candidates[0].distance_km,
            "candidates notified"
        );
        Ok(receipt(&dispatched, candidates.len()))
    }

    fn escalate_queued(
        &self,
        ctx: &RequestContext,
        request: &EmergencyRequest,
        reason: EscalationReason,
        note: Option<String>,
    ) -> Result<EmergencyRequest, EngineError> {
        let change = StatusChange::new(request.status, RequestStatus::Escalated, Utc::now())
            .reason(reason)
            .note(note);
        self.core.with_events(ctx, |store| {
            let escalated = apply_transition(store, request, &change)?;
            let events = vec![
                EventBody::status_changed(&request.id, request.status, RequestStatus::Escalated),
                EventBody::RequestEscalated {
                    request_id: request.id.clone(),
                    reason,
                },
            ];
            Ok((escalated, events))
        })
    }

    /// Closes a dispatched request whose offers went unanswered: pending
    /// offers become timed out and the request escalates. Anything not in
    /// `dispatched` is left alone.
    pub fn expire(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
    ) -> Result<EmergencyRequest, EngineError> {
        let _guard = self.core.runtime.locks.lock(id);
        let request = load(&self.core.store, id)?;
        if request.status != RequestStatus::Dispatched {
            tracing::debug!(request_id = %id, status = %request.status, "expire skipped");
            return Ok(request);
        }

        let now = Utc::now();
        let (escalated, timed_out) = self.core.with_events(ctx, |store| {
            let mut events = Vec::new();
            let mut timed_out = 0usize;
            for attempt in store.attempts().list(id)? {
                if !attempt.is_pending() {
                    continue;
                }
                let Some(attempt) = store.attempts().set_response(
                    id,
                    &attempt.worker_id,
                    AttemptResponse::Pending,
                    AttemptResponse::TimedOut,
                    now,
                )?
                else {
                    continue;
                };
                store
                    .dispatch_log()
                    .record(NewLogEntry::for_attempt(&attempt, LogEvent::TimedOut, now))?;
                events.push(EventBody::WorkerResponded {
                    request_id: id.clone(),
                    worker_id: attempt.worker_id,
                    response: AttemptResponse::TimedOut,
                });
                timed_out += 1;
            }
            let change = StatusChange::new(RequestStatus::Dispatched, RequestStatus::Escalated, now)
                .reason(EscalationReason::ResponseTimeout);
            let escalated = apply_transition(store, &request, &change)?;
            events.push(EventBody::status_changed(
                id,
                RequestStatus::Dispatched,
                RequestStatus::Escalated,
            ));
            events.push(EventBody::RequestEscalated {
                request_id: id.clone(),
                reason: EscalationReason::ResponseTimeout,
            });
            Ok(((escalated, timed_out), events))
        })?;

        self.core.runtime.escalator.cancel(id);
        tracing::warn!(request_id = %id, timed_out, "no worker accepted in time, escalated");
        Ok(escalated)
    }

    /// Expires every dispatched request whose deadline has passed. Catches
    /// deadlines whose timers were lost, e.g. across a restart.
    pub fn sweep_expired(&self, ctx: &RequestContext) -> Result<Vec<RequestId>, EngineError> {
        let overdue = self.core.store.requests().overdue(Utc::now())?;
        let mut escalated = Vec::new();
        for id in overdue {
            match self.expire(ctx, &id) {
                Ok(request) if request.status == RequestStatus::Escalated => escalated.push(id),
                Ok(_) => {}
                Err(err) if err.is_store_unavailable() => return Err(err),
                Err(err) => {
                    tracing::warn!(request_id = %id, error = %err, "sweep could not expire request");
                }
            }
        }
        if !escalated.is_empty() {
            tracing::info!(count = escalated.len(), "sweep escalated overdue requests");
        }
        Ok(escalated)
    }

    pub fn force_escalate(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
        input: OperatorInput,
    ) -> Result<EmergencyRequest, EngineError> {
        self.operator_transition(ctx, id, RequestStatus::Escalated, input)
    }

    pub fn force_resolve(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
        input: OperatorInput,
    ) -> Result<EmergencyRequest, EngineError> {
        self.operator_transition(ctx, id, RequestStatus::Resolved, input)
    }

    pub fn cancel(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
        input: OperatorInput,
    ) -> Result<EmergencyRequest, EngineError> {
        self.operator_transition(ctx, id, RequestStatus::Cancelled, input)
    }

    fn operator_transition(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
        to: RequestStatus,
        input: OperatorInput,
    ) -> Result<EmergencyRequest, EngineError> {
        let note = normalize_note(input.note)?;
        let _guard = self.core.runtime.locks.lock(id);
        let request = load(&self.core.store, id)?;
        if request.status == to {
            return Ok(request);
        }
        validate_status_transition(request.status, to)?;

        let from = request.status;
        let mut change = StatusChange::new(from, to, Utc::now()).note(note);
        if to == RequestStatus::Escalated {
            change = change.reason(EscalationReason::Operator);
        }
        let updated = self.core.with_events(ctx, |store| {
            let updated = apply_transition(store, &request, &change)?;
            let mut events = vec![EventBody::status_changed(id, from, to)];
            if to == RequestStatus::Escalated {
                events.push(EventBody::RequestEscalated {
                    request_id: id.clone(),
                    reason: EscalationReason::Operator,
                });
            }
            Ok((updated, events))
        })?;

        self.core.runtime.escalator.cancel(id);
        tracing::info!(request_id = %id, %from, %to, "operator moved request");
        Ok(updated)
    }

    pub fn get(&self, id: &RequestId) -> Result<EmergencyRequest, EngineError> {
        load(&self.core.store, id)
    }

    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<EmergencyRequest>, EngineError> {
        self.core.store.requests().list(filter)
    }

    pub fn detail(&self, id: &RequestId) -> Result<RequestDetail, EngineError> {
        let request = load(&self.core.store, id)?;
        let attempts = self.core.store.attempts().list(id)?;
        let dispatch_log = self.core.store.dispatch_log().history(id)?;
        Ok(RequestDetail {
            request,
            attempts,
            dispatch_log,
        })
    }

    pub fn attempts(&self, id: &RequestId) -> Result<Vec<DispatchAttempt>, EngineError> {
        load(&self.core.store, id)?;
        self.core.store.attempts().list(id)
    }
}

pub struct WorkersApi<'a, S: Store> {
    core: &'a Dispatcher<S>,
}

impl<'a, S: Store> WorkersApi<'a, S> {
    pub fn upsert(
        &self,
        worker_id: &WorkerId,
        input: UpsertWorkerInput,
    ) -> Result<WorkerSnapshot, EngineError> {
        if let Some(location) = &input.location {
            validate_coordinates(location)?;
        }
        if !input.rating.is_finite() || !(0.0..=5.0).contains(&input.rating) {
            return Err(DispatchError::InvalidInput {
                message: format!("rating must be between 0 and 5, got {}", input.rating),
            }
            .into());
        }
        let snapshot = self
            .core
            .store
            .with_tx(|store| store.workers().upsert(worker_id, input))?;
        tracing::debug!(
            worker_id = %snapshot.worker_id,
            available = snapshot.is_available,
            "worker availability updated"
        );
        Ok(snapshot)
    }

    pub fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerSnapshot>, EngineError> {
        self.core.store.workers().get(worker_id)
    }

    pub fn available(&self, service: Option<&ServiceId>) -> Result<Vec<WorkerSnapshot>, EngineError> {
        self.core.store.workers().available(service)
    }
}

pub struct EventsApi<'a, S: Store> {
    core: &'a Dispatcher<S>,
}

impl<'a, S: Store> EventsApi<'a, S> {
    pub fn list(&self, after: Option<i64>, limit: Option<u32>) -> Result<Vec<EventRecord>, EngineError> {
        self.core.store.events().list(after, limit)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.core.runtime.event_bus.subscribe()
    }
}

pub(crate) fn load<S: Store>(store: &S, id: &RequestId) -> Result<EmergencyRequest, EngineError> {
    store
        .requests()
        .get(id)?
        .ok_or(EngineError::Dispatch(DispatchError::NotFound))
}

/// Applies a guarded move. A guard miss means the request moved underneath
/// us and is reported against its current status.
pub(crate) fn apply_transition<S: Store>(
    store: &S,
    request: &EmergencyRequest,
    change: &StatusChange,
) -> Result<EmergencyRequest, EngineError> {
    validate_status_transition(change.expected, change.to)?;
    match store.requests().transition(&request.id, change)? {
        Some(updated) => Ok(updated),
        None => {
            let current = load(store, &request.id)?;
            Err(DispatchError::InvalidTransition {
                from: current.status,
                to: change.to,
            }
            .into())
        }
    }
}

fn notify_attempt(id: &RequestId, candidate: &Candidate, now: DateTime<Utc>) -> DispatchAttempt {
    DispatchAttempt {
        request_id: id.clone(),
        worker_id: candidate.worker_id.clone(),
        distance_km: candidate.distance_km,
        rating: candidate.rating,
        notified_at: now,
        response: AttemptResponse::Pending,
        responded_at: None,
    }
}

fn receipt(request: &EmergencyRequest, candidates_notified: usize) -> IntakeReceipt {
    IntakeReceipt {
        request_id: request.id.clone(),
        status: request.status,
        candidates_notified,
        response_deadline: request.response_deadline,
    }
}

fn build_event_record(ctx: &RequestContext, body: EventBody) -> Result<EventRecord, EngineError> {
    let value = serde_json::to_value(body).map_err(EngineError::internal)?;
    Ok(EventRecord {
        id: String::new(),
        seq: 0,
        at: Utc::now(),
        correlation_id: ctx.correlation_id.clone(),
        source: ctx.source,
        body: value,
    })
}
