use crate::util::{decode_json, encode_json, from_rfc3339, parse_id, sql_err, to_rfc3339};
use chrono::Utc;
use ed_core::EngineError;
use ed_core::types::io::UpsertWorkerInput;
use ed_core::types::{GeoPoint, ServiceId, WorkerId, WorkerSnapshot};
use ed_core::workers::AvailabilityRepository;
use rusqlite::{Connection, OptionalExtension, params};

const COLUMNS: &str = "worker_id, lat, lng, is_available, services_json, rating, updated_at";

pub struct WorkerRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> WorkerRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> AvailabilityRepository for WorkerRepo<'a> {
    fn available(&self, service: Option<&ServiceId>) -> Result<Vec<WorkerSnapshot>, EngineError> {
        let mut sql = format!("SELECT {COLUMNS} FROM workers WHERE is_available = 1");
        if service.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(workers.services_json) WHERE json_each.value = ?1)",
            );
        }
        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let rows = match service {
            Some(service) => stmt.query_map([service.as_str()], read_row),
            None => stmt.query_map([], read_row),
        }
        .map_err(sql_err)?;

        let mut workers = Vec::new();
        for row in rows {
            workers.push(row.map_err(sql_err)?.into_snapshot()?);
        }
        Ok(workers)
    }

    fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerSnapshot>, EngineError> {
        let sql = format!("SELECT {COLUMNS} FROM workers WHERE worker_id = ?1");
        let row = self
            .conn
            .query_row(&sql, [worker_id.as_str()], read_row)
            .optional()
            .map_err(sql_err)?;
        row.map(RawWorker::into_snapshot).transpose()
    }

    fn upsert(
        &self,
        worker_id: &WorkerId,
        input: UpsertWorkerInput,
    ) -> Result<WorkerSnapshot, EngineError> {
        self.conn
            .execute(
                "INSERT INTO workers (worker_id, lat, lng, is_available, services_json, rating, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(worker_id) DO UPDATE SET lat = excluded.lat, lng = excluded.lng, is_available = excluded.is_available, services_json = excluded.services_json, rating = excluded.rating, updated_at = excluded.updated_at",
                params![
                    worker_id.as_str(),
                    input.location.map(|point| point.lat),
                    input.location.map(|point| point.lng),
                    input.is_available,
                    encode_json(&input.services)?,
                    input.rating,
                    to_rfc3339(&Utc::now()),
                ],
            )
            .map_err(sql_err)?;
        self.get(worker_id)?.ok_or_else(|| EngineError::Internal {
            message: format!("worker {worker_id} missing after upsert"),
        })
    }
}

struct RawWorker {
    worker_id: String,
    lat: Option<f64>,
    lng: Option<f64>,
    is_available: bool,
    services_json: String,
    rating: f64,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawWorker> {
    Ok(RawWorker {
        worker_id: row.get(0)?,
        lat: row.get(1)?,
        lng: row.get(2)?,
        is_available: row.get(3)?,
        services_json: row.get(4)?,
        rating: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl RawWorker {
    fn into_snapshot(self) -> Result<WorkerSnapshot, EngineError> {
        let location = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        Ok(WorkerSnapshot {
            worker_id: parse_id(self.worker_id)?,
            location,
            is_available: self.is_available,
            services: decode_json(&self.services_json)?,
            rating: self.rating,
            updated_at: from_rfc3339(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::with_test_db;

    fn input(available: bool, services: &[&str], location: Option<GeoPoint>) -> UpsertWorkerInput {
        UpsertWorkerInput {
            location,
            is_available: available,
            services: services
                .iter()
                .map(|s| ServiceId::new(s.to_string()).unwrap())
                .collect(),
            rating: 4.2,
        }
    }

    fn id(value: &str) -> WorkerId {
        WorkerId::new(value.to_string()).unwrap()
    }

    #[test]
    fn upsert_replaces_the_snapshot() {
        let conn = with_test_db().unwrap();
        let repo = WorkerRepo::new(&conn);
        let point = GeoPoint::new(26.85, 80.95);
        repo.upsert(&id("w1"), input(true, &["plumbing"], Some(point)))
            .unwrap();
        let updated = repo
            .upsert(&id("w1"), input(false, &["electrical"], None))
            .unwrap();
        assert!(!updated.is_available);
        assert_eq!(updated.location, None);
        assert_eq!(updated.services, vec![ServiceId::new("electrical".to_string()).unwrap()]);
    }

    #[test]
    fn available_filters_by_service() {
        let conn = with_test_db().unwrap();
        let repo = WorkerRepo::new(&conn);
        let point = Some(GeoPoint::new(26.85, 80.95));
        repo.upsert(&id("plumber"), input(true, &["plumbing"], point)).unwrap();
        repo.upsert(&id("sparky"), input(true, &["electrical", "hvac"], point)).unwrap();
        repo.upsert(&id("off"), input(false, &["plumbing"], point)).unwrap();

        assert_eq!(repo.available(None).unwrap().len(), 2);
        let hvac = ServiceId::new("hvac".to_string()).unwrap();
        let found = repo.available(Some(&hvac)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].worker_id, id("sparky"));
    }
}
