use crate::util::{decode_enum, encode_enum, from_rfc3339, parse_id, sql_err, to_rfc3339};
use ed_core::EngineError;
use ed_core::attempts::{DispatchLogRepository, NewLogEntry};
use ed_core::types::{DispatchLogEntry, RequestId};
use rusqlite::{Connection, params};

pub struct DispatchLogRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> DispatchLogRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> DispatchLogRepository for DispatchLogRepo<'a> {
    fn record(&self, entry: NewLogEntry) -> Result<DispatchLogEntry, EngineError> {
        self.conn
            .execute(
                "INSERT INTO dispatch_log (request_id, worker_id, event, distance_km, at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.request_id.as_str(),
                    entry.worker_id.as_str(),
                    encode_enum(&entry.event)?,
                    entry.distance_km,
                    to_rfc3339(&entry.at),
                ],
            )
            .map_err(sql_err)?;
        Ok(DispatchLogEntry {
            seq: self.conn.last_insert_rowid(),
            request_id: entry.request_id,
            worker_id: entry.worker_id,
            event: entry.event,
            distance_km: entry.distance_km,
            at: entry.at,
        })
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<DispatchLogEntry>, EngineError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT seq, request_id, worker_id, event, distance_km, at FROM dispatch_log WHERE request_id = ?1 ORDER BY seq ASC",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([request_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(sql_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, request_id, worker_id, event, distance_km, at) = row.map_err(sql_err)?;
            entries.push(DispatchLogEntry {
                seq,
                request_id: parse_id(request_id)?,
                worker_id: parse_id(worker_id)?,
                event: decode_enum(&event)?,
                distance_km,
                at: from_rfc3339(&at)?,
            });
        }
        Ok(entries)
    }
}
