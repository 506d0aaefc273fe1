use crate::util::{decode_enum, encode_enum, from_rfc3339, from_rfc3339_opt, parse_id, sql_err, to_rfc3339};
use chrono::{DateTime, Utc};
use ed_core::EngineError;
use ed_core::attempts::AttemptRepository;
use ed_core::types::{AttemptResponse, DispatchAttempt, RequestId, WorkerId};
use rusqlite::{Connection, OptionalExtension, params};

const COLUMNS: &str =
    "request_id, worker_id, distance_km, rating, notified_at, response, responded_at";

pub struct AttemptRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> AttemptRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> AttemptRepository for AttemptRepo<'a> {
    fn insert(&self, attempt: &DispatchAttempt) -> Result<(), EngineError> {
        self.conn
            .execute(
                "INSERT INTO dispatch_attempts (request_id, worker_id, distance_km, rating, notified_at, response, responded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    attempt.request_id.as_str(),
                    attempt.worker_id.as_str(),
                    attempt.distance_km,
                    attempt.rating,
                    to_rfc3339(&attempt.notified_at),
                    encode_enum(&attempt.response)?,
                    attempt.responded_at.as_ref().map(to_rfc3339),
                ],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    fn get(
        &self,
        request_id: &RequestId,
        worker_id: &WorkerId,
    ) -> Result<Option<DispatchAttempt>, EngineError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM dispatch_attempts WHERE request_id = ?1 AND worker_id = ?2"
        );
        let row = self
            .conn
            .query_row(&sql, [request_id.as_str(), worker_id.as_str()], read_row)
            .optional()
            .map_err(sql_err)?;
        row.map(RawAttempt::into_attempt).transpose()
    }

    fn list(&self, request_id: &RequestId) -> Result<Vec<DispatchAttempt>, EngineError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM dispatch_attempts WHERE request_id = ?1 ORDER BY distance_km ASC, rating DESC, worker_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map([request_id.as_str()], read_row)
            .map_err(sql_err)?;
        let mut attempts = Vec::new();
        for row in rows {
            attempts.push(row.map_err(sql_err)?.into_attempt()?);
        }
        Ok(attempts)
    }

    fn set_response(
        &self,
        request_id: &RequestId,
        worker_id: &WorkerId,
        expected: AttemptResponse,
        response: AttemptResponse,
        at: DateTime<Utc>,
    ) -> Result<Option<DispatchAttempt>, EngineError> {
        let changed = self
            .conn
            .execute(
                "UPDATE dispatch_attempts SET response = ?3, responded_at = ?4 WHERE request_id = ?1 AND worker_id = ?2 AND response = ?5",
                params![
                    request_id.as_str(),
                    worker_id.as_str(),
                    encode_enum(&response)?,
                    to_rfc3339(&at),
                    encode_enum(&expected)?,
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Ok(None);
        }
        self.get(request_id, worker_id)
    }
}

struct RawAttempt {
    request_id: String,
    worker_id: String,
    distance_km: f64,
    rating: f64,
    notified_at: String,
    response: String,
    responded_at: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAttempt> {
    Ok(RawAttempt {
        request_id: row.get(0)?,
        worker_id: row.get(1)?,
        distance_km: row.get(2)?,
        rating: row.get(3)?,
        notified_at: row.get(4)?,
        response: row.get(5)?,
        responded_at: row.get(6)?,
    })
}

impl RawAttempt {
    fn into_attempt(self) -> Result<DispatchAttempt, EngineError> {
        Ok(DispatchAttempt {
            request_id: parse_id(self.request_id)?,
            worker_id: parse_id(self.worker_id)?,
            distance_km: self.distance_km,
            rating: self.rating,
            notified_at: from_rfc3339(&self.notified_at)?,
            response: decode_enum(&self.response)?,
            responded_at: from_rfc3339_opt(self.responded_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_repo::RequestRepo;
    use crate::schema::with_test_db;
    use ed_core::requests::RequestRepository;
    use ed_core::types::{EmergencyRequest, GeoPoint, RequestStatus, Requester, Urgency};

    fn seed_request(conn: &Connection) -> RequestId {
        let now = Utc::now();
        let request = EmergencyRequest {
            id: RequestId::generate(),
            requester: Requester::Anonymous,
            contact_phone: "+15550100".to_string(),
            location: GeoPoint::new(26.8467, 80.9462),
            address: "Aminabad".to_string(),
            service_id: None,
            service_description: None,
            site_id: None,
            urgency: Urgency::High,
            status: RequestStatus::Dispatched,
            assigned_worker: None,
            response_deadline: None,
            escalation_reason: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        RequestRepo::new(conn).create(&request).unwrap();
        request.id
    }

    fn pending(request_id: &RequestId, worker: &str, distance_km: f64) -> DispatchAttempt {
        DispatchAttempt {
            request_id: request_id.clone(),
            worker_id: WorkerId::new(worker.to_string()).unwrap(),
            distance_km,
            rating: 4.5,
            notified_at: Utc::now(),
            response: AttemptResponse::Pending,
            responded_at: None,
        }
    }

    #[test]
    fn one_attempt_per_worker() {
        let conn = with_test_db().unwrap();
        let id = seed_request(&conn);
        let repo = AttemptRepo::new(&conn);
        repo.insert(&pending(&id, "w1", 0.5)).unwrap();
        let err = repo.insert(&pending(&id, "w1", 0.5)).unwrap_err();
        assert!(!err.is_store_unavailable());
    }

    #[test]
    fn list_is_ranked() {
        let conn = with_test_db().unwrap();
        let id = seed_request(&conn);
        let repo = AttemptRepo::new(&conn);
        repo.insert(&pending(&id, "far", 3.2)).unwrap();
        repo.insert(&pending(&id, "near", 0.4)).unwrap();
        let workers: Vec<_> = repo
            .list(&id)
            .unwrap()
            .into_iter()
            .map(|attempt| attempt.worker_id.to_string())
            .collect();
        assert_eq!(workers, vec!["near", "far"]);
    }

    #[test]
    fn set_response_is_conditional() {
        let conn = with_test_db().unwrap();
        let id = seed_request(&conn);
        let repo = AttemptRepo::new(&conn);
        let attempt = pending(&id, "w1", 0.5);
        repo.insert(&attempt).unwrap();

        let declined = repo
            .set_response(
                &id,
                &attempt.worker_id,
                AttemptResponse::Pending,
                AttemptResponse::Declined,
                Utc::now(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(declined.response, AttemptResponse::Declined);
        assert!(declined.responded_at.is_some());

        let again = repo
            .set_response(
                &id,
                &attempt.worker_id,
                AttemptResponse::Pending,
                AttemptResponse::Accepted,
                Utc::now(),
            )
            .unwrap();
        assert!(again.is_none());
    }
}
