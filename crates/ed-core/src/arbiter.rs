use crate::attempts::{AttemptRepository, DispatchLogRepository, NewLogEntry};
use crate::dispatcher::{EmergenciesApi, RequestContext, apply_transition, load};
use crate::error::{DispatchError, EngineError};
use crate::requests::{RequestRepository, StatusChange};
use crate::store::Store;
use crate::types::event::EventBody;
use crate::types::io::{RespondInput, ResponseReceipt};
use crate::types::{
    AttemptResponse, Decision, DispatchAttempt, EmergencyRequest, LogEvent, RequestId,
    RequestStatus, WorkerId,
};
use chrono::{DateTime, Utc};

/// What a worker's response does to a request, decided from current state
/// alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Same answer as already recorded.
    Settled,
    Assign,
    /// Late accept after another worker won; recorded, then refused.
    Supersede,
    Decline { closes_request: bool },
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyAssigned,
    RequestClosed(RequestStatus),
    AlreadyResponded,
}

impl From<RejectReason> for DispatchError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::AlreadyAssigned => DispatchError::AlreadyAssigned,
            RejectReason::RequestClosed(status) => DispatchError::RequestClosed { status },
            RejectReason::AlreadyResponded => DispatchError::AlreadyResponded,
        }
    }
}

/// `attempts` are all offers for the request, including the responder's.
pub fn judge(
    request: &EmergencyRequest,
    attempt: &DispatchAttempt,
    attempts: &[DispatchAttempt],
    decision: Decision,
) -> Verdict {
    if attempt.response == decision.response() {
        return Verdict::Settled;
    }

    match decision {
        Decision::Accept => {
            let taken = request
                .assigned_worker
                .as_ref()
                .is_some_and(|assigned| assigned != &attempt.worker_id);
            if taken {
                return if attempt.is_pending() {
                    Verdict::Supersede
                } else {
                    Verdict::Reject(RejectReason::AlreadyAssigned)
                };
            }
            if request.status != RequestStatus::Dispatched {
                return Verdict::Reject(RejectReason::RequestClosed(request.status));
            }
            if !attempt.is_pending() {
                return Verdict::Reject(RejectReason::AlreadyResponded);
            }
            Verdict::Assign
        }
        Decision::Decline => {
            if !attempt.is_pending() {
                return Verdict::Reject(RejectReason::AlreadyResponded);
            }
            let others_declined = attempts
                .iter()
                .filter(|other| other.worker_id != attempt.worker_id)
                .all(|other| other.response == AttemptResponse::Declined);
            Verdict::Decline {
                closes_request: request.status == RequestStatus::Dispatched && others_declined,
            }
        }
    }
}

enum Outcome {
    Answered(ResponseReceipt),
    Lost,
}

impl<'a, S: Store> EmergenciesApi<'a, S> {
    /// Records a notified worker's accept or decline. Exactly one accept can
    /// win a request; a losing accept is still written to the log before
    /// `AlreadyAssigned` is returned.
    pub fn respond(
        &self,
        ctx: &RequestContext,
        id: &RequestId,
        input: RespondInput,
    ) -> Result<ResponseReceipt, EngineError> {
        let runtime = self.core.runtime();
        let _guard = runtime.locks.lock(id);
        let worker_id = input.worker_id;

        let mut closed = false;
        let outcome = self.core.with_events(ctx, |store| {
            let request = load(store, id)?;
            let attempt = store
                .attempts()
                .get(id, &worker_id)?
                .ok_or(DispatchError::UnknownCandidate)?;
            let attempts = store.attempts().list(id)?;
            let now = Utc::now();

            match judge(&request, &attempt, &attempts, input.decision) {
                Verdict::Settled => Ok((
                    Outcome::Answered(answer(&request, &attempt.worker_id, attempt.response)),
                    Vec::new(),
                )),
                Verdict::Reject(reason) => Err(DispatchError::from(reason).into()),
                Verdict::Supersede => {
                    let events = record_response(store, &attempt, AttemptResponse::Superseded, now)?;
                    Ok((Outcome::Lost, events))
                }
                Verdict::Assign => {
                    let change =
                        StatusChange::new(RequestStatus::Dispatched, RequestStatus::Accepted, now)
                            .assign(worker_id.clone());
                    let Some(accepted) = store.requests().transition(id, &change)? else {
                        let events =
                            record_response(store, &attempt, AttemptResponse::Superseded, now)?;
                        return Ok((Outcome::Lost, events));
                    };
                    let mut events =
                        record_response(store, &attempt, AttemptResponse::Accepted, now)?;
                    events.push(EventBody::WorkerAssigned {
                        request_id: id.clone(),
                        worker_id: worker_id.clone(),
                    });
                    events.push(EventBody::status_changed(
                        id,
                        RequestStatus::Dispatched,
                        RequestStatus::Accepted,
                    ));
                    closed = true;
                    Ok((
                        Outcome::Answered(answer(&accepted, &worker_id, AttemptResponse::Accepted)),
                        events,
                    ))
                }
                Verdict::Decline { closes_request } => {
                    let mut events =
                        record_response(store, &attempt, AttemptResponse::Declined, now)?;
                    let request = if closes_request {
                        let change = StatusChange::new(
                            RequestStatus::Dispatched,
                            RequestStatus::DeclinedAll,
                            now,
                        );
                        let updated = apply_transition(store, &request, &change)?;
                        events.push(EventBody::status_changed(
                            id,
                            RequestStatus::Dispatched,
                            RequestStatus::DeclinedAll,
                        ));
                        closed = true;
                        updated
                    } else {
                        request
                    };
                    Ok((
                        Outcome::Answered(answer(&request, &worker_id, AttemptResponse::Declined)),
                        events,
                    ))
                }
            }
        })?;

        match outcome {
            Outcome::Answered(receipt) => {
                if closed {
                    runtime.escalator.cancel(id);
                }
                tracing::info!(
                    request_id = %id,
                    worker_id = %receipt.worker_id,
                    response = ?receipt.response,
                    status = %receipt.status,
                    "worker response recorded"
                );
                Ok(receipt)
            }
            Outcome::Lost => {
                tracing::info!(request_id = %id, %worker_id, "late accept superseded");
                Err(DispatchError::AlreadyAssigned.into())
            }
        }
    }
}

fn record_response<S: Store>(
    store: &S,
    attempt: &DispatchAttempt,
    response: AttemptResponse,
    at: DateTime<Utc>,
) -> Result<Vec<EventBody>, EngineError> {
    let updated = store
        .attempts()
        .set_response(
            &attempt.request_id,
            &attempt.worker_id,
            AttemptResponse::Pending,
            response,
            at,
        )?
        .ok_or(DispatchError::AlreadyResponded)?;
    store.dispatch_log().record(NewLogEntry::for_attempt(
        &updated,
        LogEvent::from(response),
        at,
    ))?;
    Ok(vec![EventBody::WorkerResponded {
        request_id: updated.request_id,
        worker_id: updated.worker_id,
        response,
    }])
}

fn answer(
    request: &EmergencyRequest,
    worker_id: &WorkerId,
    response: AttemptResponse,
) -> ResponseReceipt {
    ResponseReceipt {
        request_id: request.id.clone(),
        worker_id: worker_id.clone(),
        status: request.status,
        response,
    }
}
