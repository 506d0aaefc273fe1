use crate::util::{
    decode_enum, decode_json, encode_enum, encode_json, from_rfc3339, from_rfc3339_opt, parse_id,
    sql_err, to_rfc3339,
};
use chrono::{DateTime, Utc};
use ed_core::EngineError;
use ed_core::requests::{RequestRepository, StatusChange};
use ed_core::types::io::RequestFilter;
use ed_core::types::{EmergencyRequest, GeoPoint, RequestId, RequestStatus};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

const COLUMNS: &str = "id, requester_json, contact_phone, lat, lng, address, service_id, service_description, site_id, urgency, status, assigned_worker, response_deadline, escalation_reason, notes_json, created_at, updated_at, resolved_at";
const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 500;

pub struct RequestRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> RequestRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> RequestRepository for RequestRepo<'a> {
    fn create(&self, request: &EmergencyRequest) -> Result<(), EngineError> {
        let sql = "INSERT INTO emergency_requests (id, requester_json, requester_user_id, contact_phone, lat, lng, address, service_id, service_description, site_id, urgency, status, assigned_worker, response_deadline, escalation_reason, notes_json, created_at, updated_at, resolved_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)";
        self.conn
            .execute(
                sql,
                params![
                    request.id.as_str(),
                    encode_json(&request.requester)?,
                    request.requester.user_id().map(|id| id.as_str()),
                    request.contact_phone,
                    request.location.lat,
                    request.location.lng,
                    request.address,
                    request.service_id.as_ref().map(|id| id.as_str()),
                    request.service_description,
                    request.site_id.as_ref().map(|id| id.as_str()),
                    encode_enum(&request.urgency)?,
                    encode_enum(&request.status)?,
                    request.assigned_worker.as_ref().map(|id| id.as_str()),
                    request.response_deadline.as_ref().map(to_rfc3339),
                    request
                        .escalation_reason
                        .as_ref()
                        .map(encode_enum)
                        .transpose()?,
                    encode_json(&request.notes)?,
                    to_rfc3339(&request.created_at),
                    to_rfc3339(&request.updated_at),
                    request.resolved_at.as_ref().map(to_rfc3339),
                ],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    fn get(&self, id: &RequestId) -> Result<Option<EmergencyRequest>, EngineError> {
        let sql = format!("SELECT {COLUMNS} FROM emergency_requests WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, [id.as_str()], read_row)
            .optional()
            .map_err(sql_err)?;
        row.map(RawRequest::into_request).transpose()
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<EmergencyRequest>, EngineError> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(status) = filter.status {
            values.push(Value::Text(encode_enum(&status)?));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(urgency) = filter.urgency {
            values.push(Value::Text(encode_enum(&urgency)?));
            clauses.push(format!("urgency = ?{}", values.len()));
        }
        if let Some(requester) = &filter.requester {
            values.push(Value::Text(requester.as_str().to_string()));
            clauses.push(format!("requester_user_id = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {COLUMNS} FROM emergency_requests");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        values.push(Value::Integer(i64::from(limit)));
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT ?{}",
            values.len()
        ));

        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), read_row)
            .map_err(sql_err)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row.map_err(sql_err)?.into_request()?);
        }
        Ok(requests)
    }

    fn transition(
        &self,
        id: &RequestId,
        change: &StatusChange,
    ) -> Result<Option<EmergencyRequest>, EngineError> {
        let note = change.note.as_ref().map(encode_json).transpose()?;
        let terminal = change.to.is_terminal();
        let sql = "UPDATE emergency_requests SET
                status = ?2,
                updated_at = ?3,
                assigned_worker = COALESCE(?4, assigned_worker),
                response_deadline = COALESCE(?5, response_deadline),
                escalation_reason = COALESCE(?6, escalation_reason),
                notes_json = CASE WHEN ?7 IS NULL THEN notes_json ELSE json_insert(notes_json, '$[#]', json(?7)) END,
                resolved_at = CASE WHEN ?8 THEN ?3 ELSE resolved_at END
            WHERE id = ?1 AND status = ?9 AND (?10 = 0 OR assigned_worker IS NULL)";
        let changed = self
            .conn
            .execute(
                sql,
                params![
                    id.as_str(),
                    encode_enum(&change.to)?,
                    to_rfc3339(&change.at),
                    change.assign.as_ref().map(|id| id.as_str()),
                    change.response_deadline.as_ref().map(to_rfc3339),
                    change
                        .escalation_reason
                        .as_ref()
                        .map(encode_enum)
                        .transpose()?,
                    note,
                    terminal,
                    encode_enum(&change.expected)?,
                    change.assign.is_some(),
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            tracing::debug!(request_id = %id, expected = %change.expected, to = %change.to, "transition guard missed");
            return Ok(None);
        }
        self.get(id)
    }

    fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<RequestId>, EngineError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM emergency_requests WHERE status = ?1 AND response_deadline IS NOT NULL AND response_deadline <= ?2 ORDER BY response_deadline ASC",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(
                params![encode_enum(&RequestStatus::Dispatched)?, to_rfc3339(&now)],
                |row| row.get::<_, String>(0),
            )
            .map_err(sql_err)?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(parse_id(row.map_err(sql_err)?)?);
        }
        Ok(ids)
    }
}

struct RawRequest {
    id: String,
    requester_json: String,
    contact_phone: String,
    lat: f64,
    lng: f64,
    address: String,
    service_id: Option<String>,
    service_description: Option<String>,
    site_id: Option<String>,
    urgency: String,
    status: String,
    assigned_worker: Option<String>,
    response_deadline: Option<String>,
    escalation_reason: Option<String>,
    notes_json: String,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRequest> {
    Ok(RawRequest {
        id: row.get(0)?,
        requester_json: row.get(1)?,
        contact_phone: row.get(2)?,
        lat: row.get(3)?,
        lng: row.get(4)?,
        address: row.get(5)?,
        service_id: row.get(6)?,
        service_description: row.get(7)?,
        site_id: row.get(8)?,
        urgency: row.get(9)?,
        status: row.get(10)?,
        assigned_worker: row.get(11)?,
        response_deadline: row.get(12)?,
        escalation_reason: row.get(13)?,
        notes_json: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        resolved_at: row.get(17)?,
    })
}

impl RawRequest {
    fn into_request(self) -> Result<EmergencyRequest, EngineError> {
        Ok(EmergencyRequest {
            id: parse_id(self.id)?,
            requester: decode_json(&self.requester_json)?,
            contact_phone: self.contact_phone,
            location: GeoPoint::new(self.lat, self.lng),
            address: self.address,
            service_id: self.service_id.map(parse_id).transpose()?,
            service_description: self.service_description,
            site_id: self.site_id.map(parse_id).transpose()?,
            urgency: decode_enum(&self.urgency)?,
            status: decode_enum(&self.status)?,
            assigned_worker: self.assigned_worker.map(parse_id).transpose()?,
            response_deadline: from_rfc3339_opt(self.response_deadline)?,
            escalation_reason: self
                .escalation_reason
                .as_deref()
                .map(decode_enum)
                .transpose()?,
            notes: decode_json(&self.notes_json)?,
            created_at: from_rfc3339(&self.created_at)?,
            updated_at: from_rfc3339(&self.updated_at)?,
            resolved_at: from_rfc3339_opt(self.resolved_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::with_test_db;
    use chrono::TimeDelta;
    use ed_core::types::{EscalationReason, Requester, Urgency, UserId, WorkerId};

    fn request(requester: Requester, urgency: Urgency) -> EmergencyRequest {
        let now = Utc::now();
        EmergencyRequest {
            id: RequestId::generate(),
            requester,
            contact_phone: "+919876543210".to_string(),
            location: GeoPoint::new(26.8467, 80.9462),
            address: "Hazratganj, Lucknow".to_string(),
            service_id: None,
            service_description: Some("burst pipe".to_string()),
            site_id: None,
            urgency,
            status: RequestStatus::Open,
            assigned_worker: None,
            response_deadline: None,
            escalation_reason: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    fn worker(id: &str) -> WorkerId {
        WorkerId::new(id.to_string()).unwrap()
    }

    #[test]
    fn create_and_get() {
        let conn = with_test_db().unwrap();
        let repo = RequestRepo::new(&conn);
        let user = UserId::new("user-7".to_string()).unwrap();
        let req = request(Requester::User { user_id: user }, Urgency::Medium);
        repo.create(&req).unwrap();

        let loaded = repo.get(&req.id).unwrap().unwrap();
        assert_eq!(loaded.id, req.id);
        assert_eq!(loaded.requester, req.requester);
        assert_eq!(loaded.urgency, Urgency::Medium);
        assert_eq!(loaded.service_description.as_deref(), Some("burst pipe"));
        assert!(repo.get(&RequestId::generate()).unwrap().is_none());
    }

    #[test]
    fn transition_is_guarded_by_expected_status() {
        let conn = with_test_db().unwrap();
        let repo = RequestRepo::new(&conn);
        let req = request(Requester::Anonymous, Urgency::High);
        repo.create(&req).unwrap();

        let stale = StatusChange::new(RequestStatus::Queued, RequestStatus::Dispatched, Utc::now());
        assert!(repo.transition(&req.id, &stale).unwrap().is_none());

        let queue = StatusChange::new(RequestStatus::Open, RequestStatus::Queued, Utc::now())
            .note(Some("phoned in".to_string()));
        let queued = repo.transition(&req.id, &queue).unwrap().unwrap();
        assert_eq!(queued.status, RequestStatus::Queued);
        assert_eq!(queued.notes.len(), 1);
        assert_eq!(queued.notes[0].note, "phoned in");
        assert_eq!(queued.notes[0].from, RequestStatus::Open);
    }

    #[test]
    fn assignment_happens_once() {
        let conn = with_test_db().unwrap();
        let repo = RequestRepo::new(&conn);
        let mut req = request(Requester::Anonymous, Urgency::High);
        req.status = RequestStatus::Dispatched;
        repo.create(&req).unwrap();

        let first = StatusChange::new(RequestStatus::Dispatched, RequestStatus::Accepted, Utc::now())
            .assign(worker("w1"));
        let accepted = repo.transition(&req.id, &first).unwrap().unwrap();
        assert_eq!(accepted.assigned_worker, Some(worker("w1")));

        let second = StatusChange::new(RequestStatus::Dispatched, RequestStatus::Accepted, Utc::now())
            .assign(worker("w2"));
        assert!(repo.transition(&req.id, &second).unwrap().is_none());
        let stored = repo.get(&req.id).unwrap().unwrap();
        assert_eq!(stored.assigned_worker, Some(worker("w1")));
    }

    #[test]
    fn terminal_transition_sets_resolved_at() {
        let conn = with_test_db().unwrap();
        let repo = RequestRepo::new(&conn);
        let mut req = request(Requester::Anonymous, Urgency::Low);
        req.status = RequestStatus::Escalated;
        repo.create(&req).unwrap();

        let resolve = StatusChange::new(RequestStatus::Escalated, RequestStatus::Resolved, Utc::now());
        let resolved = repo.transition(&req.id, &resolve).unwrap().unwrap();
        assert!(resolved.resolved_at.is_some());
    }

    #[test]
    fn overdue_lists_only_dispatched_past_deadline() {
        let conn = with_test_db().unwrap();
        let repo = RequestRepo::new(&conn);
        let now = Utc::now();

        let mut late = request(Requester::Anonymous, Urgency::High);
        late.status = RequestStatus::Dispatched;
        late.response_deadline = Some(now - TimeDelta::seconds(5));
        repo.create(&late).unwrap();

        let mut waiting = request(Requester::Anonymous, Urgency::High);
        waiting.status = RequestStatus::Dispatched;
        waiting.response_deadline = Some(now + TimeDelta::seconds(40));
        repo.create(&waiting).unwrap();

        let mut closed = request(Requester::Anonymous, Urgency::High);
        closed.status = RequestStatus::Escalated;
        closed.response_deadline = Some(now - TimeDelta::seconds(60));
        closed.escalation_reason = Some(EscalationReason::ResponseTimeout);
        repo.create(&closed).unwrap();

        assert_eq!(repo.overdue(now).unwrap(), vec![late.id]);
    }

    #[test]
    fn list_filters_and_limits() {
        let conn = with_test_db().unwrap();
        let repo = RequestRepo::new(&conn);
        let user = UserId::new("user-1".to_string()).unwrap();
        for _ in 0..3 {
            repo.create(&request(
                Requester::User {
                    user_id: user.clone(),
                },
                Urgency::High,
            ))
            .unwrap();
        }
        repo.create(&request(Requester::Anonymous, Urgency::Low))
            .unwrap();

        let all = repo.list(&RequestFilter::default()).unwrap();
        assert_eq!(all.len(), 4);

        let low = repo
            .list(&RequestFilter {
                urgency: Some(Urgency::Low),
                ..RequestFilter::default()
            })
            .unwrap();
        assert_eq!(low.len(), 1);

        let mine = repo
            .list(&RequestFilter {
                requester: Some(user),
                limit: Some(2),
                ..RequestFilter::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 2);

        let open = repo
            .list(&RequestFilter {
                status: Some(RequestStatus::Open),
                ..RequestFilter::default()
            })
            .unwrap();
        assert_eq!(open.len(), 4);
    }
}
