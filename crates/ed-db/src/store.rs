use ed_core::EngineError;
use ed_core::store::Store;
use rusqlite::Connection;

use crate::attempt_repo::AttemptRepo;
use crate::dispatch_log_repo::DispatchLogRepo;
use crate::event_repo::EventRepo;
use crate::request_repo::RequestRepo;
use crate::schema;
use crate::util::sql_err;
use crate::worker_repo::WorkerRepo;

pub struct DbStore {
    conn: Connection,
}

impl DbStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens a connection to an already migrated database file.
    pub fn open(path: &str) -> Result<Self, EngineError> {
        schema::open(path).map(Self::new).map_err(sql_err)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for DbStore {
    type Requests<'a>
        = RequestRepo<'a>
    where
        Self: 'a;
    type Attempts<'a>
        = AttemptRepo<'a>
    where
        Self: 'a;
    type DispatchLog<'a>
        = DispatchLogRepo<'a>
    where
        Self: 'a;
    type Workers<'a>
        = WorkerRepo<'a>
    where
        Self: 'a;
    type Events<'a>
        = EventRepo<'a>
    where
        Self: 'a;

    fn requests(&self) -> Self::Requests<'_> {
        RequestRepo::new(&self.conn)
    }

    fn attempts(&self) -> Self::Attempts<'_> {
        AttemptRepo::new(&self.conn)
    }

    fn dispatch_log(&self) -> Self::DispatchLog<'_> {
        DispatchLogRepo::new(&self.conn)
    }

    fn workers(&self) -> Self::Workers<'_> {
        WorkerRepo::new(&self.conn)
    }

    fn events(&self) -> Self::Events<'_> {
        EventRepo::new(&self.conn)
    }

    fn with_tx<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Self) -> Result<T, EngineError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
        match f(self) {
            Ok(value) => {
                if let Err(err) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(sql_err(err));
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
