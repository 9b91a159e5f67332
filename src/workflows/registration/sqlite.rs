//! `SQLite`-backed implementation of the registration and operator stores.
//!
//! One connection is shared behind a mutex; every trait method is a single short critical
//! section. File-backed stores run in WAL mode with a busy timeout so several server processes
//! can share the database. Identifier counters use an upsert-and-return statement and status
//! transitions run inside one transaction, so neither ever exposes a half-applied write.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};

use super::catalog::DEFAULT_STATUSES;
use super::domain::{
    Application, ApplicationId, NewApplication, Operator, OperatorId, RegistrationCode,
    SessionTag, Status, StatusChange, StatusCode, TransitionRecord,
};
use super::repository::{
    ApplicationPage, ApplicationQuery, IdentifierBucket, NewOperator, OperatorCredentials,
    OperatorStore, OperatorUpdate, RegistrationStore, RepositoryError, SessionRecord,
};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const APPLICATION_COLUMNS: &str = "id, code, session, status_code, created_at, modified_at, \
     applicant, finances, payload";

const OPERATOR_COLUMNS: &str =
    "id, email, display_name, role, active, created_at, last_login_at, password_hash";

pub struct SqliteRegistrationStore {
    conn: Mutex<Connection>,
}

impl SqliteRegistrationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA_SQL)?;
        for (order, code, label, color) in DEFAULT_STATUSES {
            conn.execute(
                "INSERT OR IGNORE INTO statuses (code, label, color, sort_order, active)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![code, label, color, order],
            )?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("connection mutex poisoned".to_string()))
    }
}

impl RegistrationStore for SqliteRegistrationStore {
    fn next_counter(&self, bucket: &IdentifierBucket) -> Result<u32, RepositoryError> {
        let conn = self.connection()?;
        let value: i64 = conn.query_row(
            "INSERT INTO identifier_counters (bucket, value) VALUES (?1, 1)
             ON CONFLICT(bucket) DO UPDATE SET value = value + 1
             RETURNING value",
            params![bucket.key()],
            |row| row.get(0),
        )?;
        u32::try_from(value).map_err(|_| {
            RepositoryError::Unavailable(format!(
                "counter for bucket '{}' out of range: {value}",
                bucket.key()
            ))
        })
    }

    fn insert_application(&self, new: NewApplication) -> Result<Application, RepositoryError> {
        let applicant = to_json(&new.applicant)?;
        let finances = to_json(&new.finances)?;
        let payload = to_json(&new.payload)?;
        let created_at = format_timestamp(new.created_at);

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO applications
                (code, session, status_code, created_at, modified_at,
                 surname, given_name, email, applicant, finances, payload)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.code.as_str(),
                new.session.as_str(),
                new.status.as_str(),
                created_at,
                new.applicant.surname,
                new.applicant.given_name,
                new.applicant.email,
                applicant,
                finances,
                payload,
            ],
        )?;
        let id = ApplicationId(conn.last_insert_rowid());

        Ok(Application {
            id,
            code: new.code,
            session: new.session,
            status: new.status,
            created_at: new.created_at,
            modified_at: new.created_at,
            applicant: new.applicant,
            finances: new.finances,
            payload: new.payload,
        })
    }

    fn fetch_application(
        &self,
        code: &RegistrationCode,
    ) -> Result<Option<Application>, RepositoryError> {
        let conn = self.connection()?;
        let application = conn
            .query_row(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE code = ?1"),
                params![code.as_str()],
                map_application,
            )
            .optional()?;
        Ok(application)
    }

    fn search_applications(
        &self,
        query: &ApplicationQuery,
    ) -> Result<ApplicationPage, RepositoryError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = query
            .status
            .as_ref()
            .filter(|s| !s.as_str().trim().is_empty())
        {
            values.push(Value::Text(status.as_str().trim().to_string()));
            clauses.push(format!("status_code = ?{}", values.len()));
        }
        if let Some(session) = query.session.as_deref().filter(|s| !s.trim().is_empty()) {
            values.push(Value::Text(session.trim().to_string()));
            clauses.push(format!("session = ?{}", values.len()));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            values.push(Value::Text(like_pattern(search.trim())));
            let n = values.len();
            clauses.push(format!(
                "(surname LIKE ?{n} ESCAPE '\\' OR given_name LIKE ?{n} ESCAPE '\\' \
                 OR code LIKE ?{n} ESCAPE '\\' OR email LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.connection()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM applications {filter}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(to_i64(query.effective_limit())));
        let limit_param = values.len();
        values.push(Value::Integer(to_i64(query.offset)));
        let offset_param = values.len();

        let mut stmt = conn.prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications {filter}
             ORDER BY created_at DESC, id DESC
             LIMIT ?{limit_param} OFFSET ?{offset_param}"
        ))?;
        let applications = stmt
            .query_map(params_from_iter(values.iter()), map_application)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ApplicationPage {
            total: total.max(0) as u64,
            applications,
        })
    }

    fn list_statuses(&self, active_only: bool) -> Result<Vec<Status>, RepositoryError> {
        let conn = self.connection()?;
        let sql = if active_only {
            "SELECT code, label, color, sort_order, active FROM statuses
             WHERE active = 1 ORDER BY sort_order ASC, code ASC"
        } else {
            "SELECT code, label, color, sort_order, active FROM statuses
             ORDER BY sort_order ASC, code ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let statuses = stmt
            .query_map([], map_status)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    fn fetch_status(&self, code: &StatusCode) -> Result<Option<Status>, RepositoryError> {
        let conn = self.connection()?;
        let status = conn
            .query_row(
                "SELECT code, label, color, sort_order, active FROM statuses WHERE code = ?1",
                params![code.as_str()],
                map_status,
            )
            .optional()?;
        Ok(status)
    }

    fn set_status_active(&self, code: &StatusCode, active: bool) -> Result<(), RepositoryError> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE statuses SET active = ?1 WHERE code = ?2",
            params![active, code.as_str()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn apply_transition(&self, change: StatusChange) -> Result<TransitionRecord, RepositoryError> {
        let recorded_at = format_timestamp(change.at);
        let mut conn = self.connection()?;
        // Take the write lock up front; a deferred read-then-write upgrade fails
        // immediately with SQLITE_BUSY when another process holds the lock.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let code: String = tx
            .query_row(
                "SELECT code FROM applications WHERE id = ?1",
                params![change.application.0],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RepositoryError::NotFound)?;

        let updated = tx.execute(
            "UPDATE applications SET status_code = ?1, modified_at = ?2
             WHERE id = ?3 AND status_code = ?4",
            params![
                change.next.as_str(),
                recorded_at,
                change.application.0,
                change.previous.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::Conflict(format!(
                "status of {code} changed since it was read as {}",
                change.previous
            )));
        }

        tx.execute(
            "INSERT INTO status_transitions
                (application_id, previous_status, new_status, reason, operator_id, origin, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                change.application.0,
                change.previous.as_str(),
                change.next.as_str(),
                change.reason,
                change.actor.0,
                change.origin,
                recorded_at,
            ],
        )?;
        let sequence = tx.last_insert_rowid();
        tx.commit()?;

        Ok(TransitionRecord {
            sequence,
            application: RegistrationCode(code),
            previous_status: Some(change.previous),
            new_status: change.next,
            reason: change.reason,
            actor: change.actor,
            origin: change.origin,
            recorded_at: change.at,
        })
    }

    fn history(&self, application: ApplicationId) -> Result<Vec<TransitionRecord>, RepositoryError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT t.sequence, a.code, t.previous_status, t.new_status, t.reason,
                    t.operator_id, t.origin, t.recorded_at
             FROM status_transitions t
             JOIN applications a ON a.id = t.application_id
             WHERE t.application_id = ?1
             ORDER BY t.recorded_at DESC, t.sequence DESC",
        )?;
        let records = stmt
            .query_map(params![application.0], map_transition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn status_counts(&self) -> Result<Vec<(StatusCode, u64)>, RepositoryError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT s.code, COUNT(a.id)
             FROM statuses s
             LEFT JOIN applications a ON a.status_code = s.code
             GROUP BY s.code
             ORDER BY s.sort_order ASC, s.code ASC",
        )?;
        let counts = stmt
            .query_map([], |row| {
                let code: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((StatusCode(code), count.max(0) as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

impl OperatorStore for SqliteRegistrationStore {
    fn insert_operator(&self, new: NewOperator) -> Result<Operator, RepositoryError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO operators (email, display_name, role, password_hash, active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                new.email,
                new.display_name,
                new.role,
                new.password_hash,
                format_timestamp(new.created_at),
            ],
        )?;
        Ok(Operator {
            id: OperatorId(conn.last_insert_rowid()),
            email: new.email,
            display_name: new.display_name,
            role: new.role,
            active: true,
            created_at: new.created_at,
            last_login_at: None,
        })
    }

    fn operator_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OperatorCredentials>, RepositoryError> {
        let conn = self.connection()?;
        let credentials = conn
            .query_row(
                &format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE email = ?1"),
                params![email],
                |row| {
                    Ok(OperatorCredentials {
                        operator: map_operator(row)?,
                        password_hash: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(credentials)
    }

    fn operator(&self, id: OperatorId) -> Result<Option<Operator>, RepositoryError> {
        let conn = self.connection()?;
        let operator = conn
            .query_row(
                &format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE id = ?1"),
                params![id.0],
                map_operator,
            )
            .optional()?;
        Ok(operator)
    }

    fn list_operators(&self) -> Result<Vec<Operator>, RepositoryError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OPERATOR_COLUMNS} FROM operators ORDER BY created_at DESC, id DESC"
        ))?;
        let operators = stmt
            .query_map([], map_operator)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(operators)
    }

    fn update_operator(
        &self,
        id: OperatorId,
        update: OperatorUpdate,
    ) -> Result<Operator, RepositoryError> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE operators SET
                email = COALESCE(?1, email),
                display_name = COALESCE(?2, display_name),
                role = COALESCE(?3, role),
                password_hash = COALESCE(?4, password_hash),
                active = COALESCE(?5, active)
             WHERE id = ?6",
            params![
                update.email,
                update.display_name,
                update.role,
                update.password_hash,
                update.active,
                id.0,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        let operator = conn.query_row(
            &format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE id = ?1"),
            params![id.0],
            map_operator,
        )?;
        Ok(operator)
    }

    fn delete_operator(&self, id: OperatorId) -> Result<(), RepositoryError> {
        let conn = self.connection()?;
        let removed = conn.execute("DELETE FROM operators WHERE id = ?1", params![id.0])?;
        if removed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn operator_count(&self) -> Result<u64, RepositoryError> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM operators", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn record_login(&self, id: OperatorId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE operators SET last_login_at = ?1 WHERE id = ?2",
            params![format_timestamp(at), id.0],
        )?;
        Ok(())
    }

    fn insert_session(&self, session: SessionRecord) -> Result<(), RepositoryError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO admin_sessions (token, operator_id, origin, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.token,
                session.operator.0,
                session.origin,
                format_timestamp(session.created_at),
                format_timestamp(session.expires_at),
            ],
        )?;
        Ok(())
    }

    fn session(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        let conn = self.connection()?;
        let session = conn
            .query_row(
                "SELECT token, operator_id, origin, created_at, expires_at
                 FROM admin_sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok(SessionRecord {
                        token: row.get(0)?,
                        operator: OperatorId(row.get(1)?),
                        origin: row.get(2)?,
                        created_at: parse_timestamp(row, 3)?,
                        expires_at: parse_timestamp(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn delete_session(&self, token: &str) -> Result<(), RepositoryError> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM admin_sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM admin_sessions WHERE expires_at <= ?1",
            params![format_timestamp(now)],
        )?;
        Ok(removed as u64)
    }
}

/// Fixed-width RFC 3339 so lexical order in SQLite matches time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|err| RepositoryError::Unavailable(format!("failed to encode document: {err}")))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn map_application(row: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: ApplicationId(row.get(0)?),
        code: RegistrationCode(row.get(1)?),
        session: SessionTag(row.get(2)?),
        status: StatusCode(row.get(3)?),
        created_at: parse_timestamp(row, 4)?,
        modified_at: parse_timestamp(row, 5)?,
        applicant: parse_json(row, 6)?,
        finances: parse_json(row, 7)?,
        payload: parse_json(row, 8)?,
    })
}

fn map_status(row: &Row<'_>) -> rusqlite::Result<Status> {
    Ok(Status {
        code: StatusCode(row.get(0)?),
        label: row.get(1)?,
        color: row.get(2)?,
        order: row.get(3)?,
        active: row.get(4)?,
    })
}

fn map_transition(row: &Row<'_>) -> rusqlite::Result<TransitionRecord> {
    let previous: Option<String> = row.get(2)?;
    Ok(TransitionRecord {
        sequence: row.get(0)?,
        application: RegistrationCode(row.get(1)?),
        previous_status: previous.map(StatusCode),
        new_status: StatusCode(row.get(3)?),
        reason: row.get(4)?,
        actor: OperatorId(row.get(5)?),
        origin: row.get(6)?,
        recorded_at: parse_timestamp(row, 7)?,
    })
}

fn map_operator(row: &Row<'_>) -> rusqlite::Result<Operator> {
    let last_login: Option<String> = row.get(6)?;
    let last_login_at = match last_login {
        Some(_) => Some(parse_timestamp(row, 6)?),
        None => None,
    };
    Ok(Operator {
        id: OperatorId(row.get(0)?),
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: row.get(3)?,
        active: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
        last_login_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::registration::domain::{ApplicantIdentity, FinancialDetails};

    fn new_application(code: &str) -> NewApplication {
        NewApplication {
            code: RegistrationCode(code.to_string()),
            session: SessionTag::for_year(2026),
            status: StatusCode::new("RECU"),
            created_at: Utc::now(),
            applicant: ApplicantIdentity {
                surname: "Levy".to_string(),
                given_name: "Noa".to_string(),
                email: "noa@example.org".to_string(),
                ..ApplicantIdentity::default()
            },
            finances: FinancialDetails::default(),
            payload: Default::default(),
        }
    }

    #[test]
    fn seeds_default_catalog_once() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        let statuses = store.list_statuses(false).expect("list");
        assert_eq!(statuses.len(), DEFAULT_STATUSES.len());
        assert_eq!(statuses[0].code.as_str(), "RECU");
        assert_eq!(statuses[9].code.as_str(), "ARCHIVE");
    }

    #[test]
    fn counters_are_independent_per_bucket() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        let lev = IdentifierBucket {
            year: 2026,
            prefix: "LEV".to_string(),
        };
        let coh = IdentifierBucket {
            year: 2026,
            prefix: "COH".to_string(),
        };
        let lev_next_year = IdentifierBucket {
            year: 2027,
            prefix: "LEV".to_string(),
        };

        assert_eq!(store.next_counter(&lev).expect("counter"), 1);
        assert_eq!(store.next_counter(&lev).expect("counter"), 2);
        assert_eq!(store.next_counter(&coh).expect("counter"), 1);
        assert_eq!(store.next_counter(&lev_next_year).expect("counter"), 1);
        assert_eq!(store.next_counter(&lev).expect("counter"), 3);
    }

    #[test]
    fn duplicate_codes_surface_as_conflict() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        store
            .insert_application(new_application("2026_LEV_001"))
            .expect("first insert");
        match store.insert_application(new_application("2026_LEV_001")) {
            Err(RepositoryError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn audit_rows_reject_updates_and_deletes() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        let application = store
            .insert_application(new_application("2026_LEV_001"))
            .expect("insert");
        store
            .apply_transition(StatusChange {
                application: application.id,
                previous: StatusCode::new("RECU"),
                next: StatusCode::new("VALIDE"),
                reason: None,
                actor: OperatorId(1),
                origin: "127.0.0.1".to_string(),
                at: Utc::now(),
            })
            .expect("transition");

        let conn = store.connection().expect("connection");
        assert!(conn
            .execute("UPDATE status_transitions SET new_status = 'REFUSE'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM status_transitions", []).is_err());
    }

    fn temp_database(name: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "registrar-{name}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("registrar.db");
        (dir, path)
    }

    #[test]
    fn two_processes_can_transition_concurrently() {
        let (dir, path) = temp_database("shared");
        let first = SqliteRegistrationStore::open(&path).expect("first store opens");
        let second = SqliteRegistrationStore::open(&path).expect("second store opens");
        let left = first
            .insert_application(new_application("2026_LEV_001"))
            .expect("insert");
        let right = first
            .insert_application(new_application("2026_LEV_002"))
            .expect("insert");
        let rounds = 100;

        let drive = |store: &SqliteRegistrationStore, id: ApplicationId| {
            let mut current = StatusCode::new("RECU");
            let mut failures = Vec::new();
            for round in 0..rounds {
                let next = StatusCode::new(if round % 2 == 0 { "A_TRAITER" } else { "RECU" });
                match store.apply_transition(StatusChange {
                    application: id,
                    previous: current.clone(),
                    next: next.clone(),
                    reason: None,
                    actor: OperatorId(1),
                    origin: "127.0.0.1".to_string(),
                    at: Utc::now(),
                }) {
                    Ok(_) => current = next,
                    Err(err) => failures.push(err.to_string()),
                }
            }
            failures
        };

        let (left_failures, right_failures) = std::thread::scope(|scope| {
            let a = scope.spawn(|| drive(&first, left.id));
            let b = scope.spawn(|| drive(&second, right.id));
            (
                a.join().expect("first writer"),
                b.join().expect("second writer"),
            )
        });

        assert!(left_failures.is_empty(), "{left_failures:?}");
        assert!(right_failures.is_empty(), "{right_failures:?}");
        assert_eq!(second.history(left.id).expect("history").len(), rounds);
        assert_eq!(first.history(right.id).expect("history").len(), rounds);

        drop(first);
        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_removes_only_expired_sessions() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        let operator = store
            .insert_operator(NewOperator {
                email: "office@example.org".to_string(),
                display_name: "Office".to_string(),
                role: "admin".to_string(),
                password_hash: "unused".to_string(),
                created_at: Utc::now(),
            })
            .expect("operator");
        let now = Utc::now();
        for (token, expires_at) in [
            ("stale", now - chrono::Duration::minutes(5)),
            ("fresh", now + chrono::Duration::hours(1)),
        ] {
            store
                .insert_session(SessionRecord {
                    token: token.to_string(),
                    operator: operator.id,
                    origin: "127.0.0.1".to_string(),
                    created_at: now - chrono::Duration::hours(2),
                    expires_at,
                })
                .expect("session");
        }

        assert_eq!(store.purge_expired_sessions(now).expect("purge"), 1);
        assert!(store.session("stale").expect("lookup").is_none());
        assert!(store.session("fresh").expect("lookup").is_some());
    }

    #[test]
    fn operator_updates_and_deletes_report_missing_rows() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        assert!(matches!(
            store.update_operator(OperatorId(42), OperatorUpdate::default()),
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            store.delete_operator(OperatorId(42)),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn blank_status_filter_is_ignored() {
        let store = SqliteRegistrationStore::in_memory().expect("store opens");
        store
            .insert_application(new_application("2026_LEV_001"))
            .expect("insert");
        let page = store
            .search_applications(&ApplicationQuery {
                status: Some(StatusCode::new(" ")),
                ..ApplicationQuery::default()
            })
            .expect("search");
        assert_eq!(page.total, 1);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }

    #[test]
    fn file_backed_store_reopens_with_existing_rows() {
        let dir = std::env::temp_dir().join(format!("registrar-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("reopen.db");
        let _ = std::fs::remove_file(&path);

        {
            let store = SqliteRegistrationStore::open(&path).expect("store opens");
            store
                .insert_application(new_application("2026_LEV_001"))
                .expect("insert");
        }

        let store = SqliteRegistrationStore::open(&path).expect("store reopens");
        let fetched = store
            .fetch_application(&RegistrationCode("2026_LEV_001".to_string()))
            .expect("fetch");
        assert!(fetched.is_some());
        assert_eq!(store.list_statuses(false).expect("list").len(), 10);

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
