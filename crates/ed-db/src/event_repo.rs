use crate::util::{decode_enum, decode_json, encode_enum, encode_json, from_rfc3339, sql_err, to_rfc3339};
use ed_core::EngineError;
use ed_core::events::EventRepository;
use ed_events::types::EventRecord;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use ulid::Ulid;

pub struct EventRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> EventRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> EventRepository for EventRepo<'a> {
    fn append(&self, mut event: EventRecord) -> Result<EventRecord, EngineError> {
        let seq: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM events", [], |row| {
                row.get(0)
            })
            .map_err(sql_err)?;
        event.seq = seq;
        event.id = format!("evt_{}", Ulid::new());
        self.conn
            .execute(
                "INSERT INTO events (id, seq, at, correlation_id, source, body_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.id,
                    event.seq,
                    to_rfc3339(&event.at),
                    event.correlation_id,
                    encode_enum(&event.source)?,
                    encode_json(&event.body)?,
                ],
            )
            .map_err(sql_err)?;
        Ok(event)
    }

    fn list(
        &self,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, EngineError> {
        let mut sql = "SELECT id, seq, at, correlation_id, source, body_json FROM events".to_string();
        let mut values = Vec::new();
        if let Some(after) = after {
            values.push(Value::Integer(after));
            sql.push_str(" WHERE seq > ?1");
        }
        sql.push_str(" ORDER BY seq ASC");
        if let Some(limit) = limit {
            values.push(Value::Integer(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(sql_err)?;

        let mut events = Vec::new();
        for row in rows {
            let (id, seq, at, correlation_id, source, body_json) = row.map_err(sql_err)?;
            events.push(EventRecord {
                id,
                seq,
                at: from_rfc3339(&at)?,
                correlation_id,
                source: decode_enum(&source)?,
                body: decode_json(&body_json)?,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::with_test_db;
    use chrono::Utc;
    use ed_events::types::EventSource;
    use serde_json::json;

    fn record(kind: &str) -> EventRecord {
        EventRecord {
            id: String::new(),
            seq: 0,
            at: Utc::now(),
            correlation_id: Some("corr-1".to_string()),
            source: EventSource::Escalator,
            body: json!({"type": kind, "payload": {}}),
        }
    }

    #[test]
    fn append_assigns_sequence() {
        let conn = with_test_db().unwrap();
        let repo = EventRepo::new(&conn);
        let first = repo.append(record("EmergencyCreated")).unwrap();
        let second = repo.append(record("RequestEscalated")).unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        assert!(first.id.starts_with("evt_"));
    }

    #[test]
    fn list_pages_after_a_sequence() {
        let conn = with_test_db().unwrap();
        let repo = EventRepo::new(&conn);
        for kind in ["A", "B", "C", "D"] {
            repo.append(record(kind)).unwrap();
        }

        let tail = repo.list(Some(1), Some(2)).unwrap();
        let kinds: Vec<_> = tail.iter().filter_map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["B", "C"]);
        assert_eq!(tail[0].source, EventSource::Escalator);
        assert_eq!(tail[0].correlation_id.as_deref(), Some("corr-1"));

        assert_eq!(repo.list(None, None).unwrap().len(), 4);
        assert_eq!(repo.list(None, Some(1)).unwrap().len(), 1);
    }
}
