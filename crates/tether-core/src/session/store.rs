//! File-backed session store: one JSON record per run, one active pointer.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::SessionError;
use super::model::{
    RunSession, SessionBudget, SessionStatus, SessionUpdate, generate_run_id, validate_run_id,
};
use super::pointer::{ACTIVE_POINTER_NAME, ActivePointer};

/// Reason recorded on sessions reclaimed by [`SessionStore::detect_orphans`].
const ORPHANED_REASON: &str =
    "session was still running but not active; owning process died or crashed";

/// Directory under a project that holds tether state.
const STATE_DIR: &str = ".tether";

/// Persists [`RunSession`] records for one project and maintains the
/// active-session pointer.
///
/// Concurrent writers to the same record are not expected (one run owns
/// one record); the pointer is the only cross-process shared resource and
/// is swapped atomically.
pub struct SessionStore {
    project_dir: PathBuf,
    sessions_dir: PathBuf,
    pointer: ActivePointer,
}

impl SessionStore {
    /// Store for a project, using the conventional
    /// `<project>/.tether/sessions` layout.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let sessions_dir = project_dir.join(STATE_DIR).join("sessions");
        Self::with_sessions_dir(project_dir, sessions_dir)
    }

    /// Store with an explicit sessions directory.
    pub fn with_sessions_dir(
        project_dir: impl Into<PathBuf>,
        sessions_dir: impl Into<PathBuf>,
    ) -> Self {
        let sessions_dir = sessions_dir.into();
        let pointer = ActivePointer::new(&sessions_dir);
        Self {
            project_dir: project_dir.into(),
            sessions_dir,
            pointer,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Create a fresh RUNNING record and atomically repoint the active
    /// pointer at it.
    pub fn start_session(
        &self,
        harness: &str,
        budget: Option<SessionBudget>,
        project_dir: Option<&Path>,
    ) -> Result<RunSession, SessionError> {
        self.ensure_dir()?;

        let run_id = generate_run_id(Utc::now());
        let session = RunSession::new(
            run_id,
            harness,
            project_dir.unwrap_or(&self.project_dir),
            budget.unwrap_or_default(),
        );
        self.save(&session)?;
        self.pointer
            .set(&session.run_id)
            .map_err(|e| self.io_error(&self.sessions_dir.join(ACTIVE_POINTER_NAME), e))?;

        info!(run_id = %session.run_id, harness, "started run session");
        Ok(session)
    }

    /// Dereference the active pointer. A missing pointer, or a pointer
    /// whose target record is missing or unreadable, means "no active
    /// session"; the stale pointer is removed on the way out so the next
    /// call is clean.
    pub fn get_active_session(&self) -> Result<Option<RunSession>, SessionError> {
        let Some(run_id) = self
            .pointer
            .read()
            .map_err(|e| self.io_error(&self.sessions_dir.join(ACTIVE_POINTER_NAME), e))?
        else {
            return Ok(None);
        };

        match self.get_session(&run_id) {
            Ok(session) => Ok(Some(session)),
            Err(SessionError::NotFound(_) | SessionError::Corrupt { .. }) => {
                warn!(
                    run_id = %run_id,
                    "active pointer names a missing or unreadable record; clearing it"
                );
                self.pointer
                    .clear()
                    .map_err(|e| self.io_error(&self.sessions_dir.join(ACTIVE_POINTER_NAME), e))?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Load one record by id. Unlike the bulk scan, a corrupt record here
    /// is the caller's problem and is returned as an error.
    pub fn get_session(&self, run_id: &str) -> Result<RunSession, SessionError> {
        validate_run_id(run_id)?;
        let path = self.record_path(run_id);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(run_id.to_string()));
            }
            Err(e) => return Err(self.io_error(&path, e)),
        };

        serde_json::from_reader(BufReader::new(file))
            .map_err(|source| SessionError::Corrupt { path, source })
    }

    /// Merge fields onto an existing record.
    pub fn update_session(
        &self,
        run_id: &str,
        update: SessionUpdate,
    ) -> Result<RunSession, SessionError> {
        let mut session = self.get_session(run_id)?;
        update.apply(&mut session);
        self.save(&session)?;
        debug!(run_id = %session.run_id, "session record updated");
        Ok(session)
    }

    /// Mark a session completed. Clears the active pointer only when it
    /// names this session; ending an old session must not disturb
    /// whichever session is currently active.
    pub fn end_session(&self, run_id: &str) -> Result<RunSession, SessionError> {
        let mut session = self.get_session(run_id)?;
        session.status = SessionStatus::Completed;
        session.ended_at = Some(Utc::now());
        self.save(&session)?;

        let active = self
            .pointer
            .read()
            .map_err(|e| self.io_error(&self.sessions_dir.join(ACTIVE_POINTER_NAME), e))?;
        if active.as_deref() == Some(run_id) {
            self.pointer
                .clear()
                .map_err(|e| self.io_error(&self.sessions_dir.join(ACTIVE_POINTER_NAME), e))?;
        }

        info!(run_id = %session.run_id, "run session completed");
        Ok(session)
    }

    /// Scan every record and mark RUNNING sessions that are not the
    /// active pointer's target as orphaned. Unreadable records are
    /// skipped with a warning; the scan is best effort. Returns only the
    /// sessions newly marked by this call, so a second consecutive call
    /// returns an empty list.
    pub fn detect_orphans(&self) -> Result<Vec<RunSession>, SessionError> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let active = self
            .pointer
            .read()
            .map_err(|e| self.io_error(&self.sessions_dir.join(ACTIVE_POINTER_NAME), e))?;

        let entries = fs::read_dir(&self.sessions_dir)
            .map_err(|e| self.io_error(&self.sessions_dir, e))?;

        let mut orphaned = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let mut session: RunSession = match File::open(&path)
                .map_err(anyhow::Error::from)
                .and_then(|f| serde_json::from_reader(BufReader::new(f)).map_err(Into::into))
            {
                Ok(session) => session,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session record");
                    continue;
                }
            };

            if session.status != SessionStatus::Running {
                continue;
            }
            if active.as_deref() == Some(session.run_id.as_str()) {
                continue;
            }

            session.status = SessionStatus::Orphaned;
            session.orphaned_at = Some(Utc::now());
            session.orphaned_reason = Some(ORPHANED_REASON.to_string());
            self.save(&session)?;
            warn!(run_id = %session.run_id, "marked session as orphaned");
            orphaned.push(session);
        }

        orphaned.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(orphaned)
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{run_id}.json"))
    }

    fn ensure_dir(&self) -> Result<(), SessionError> {
        fs::create_dir_all(&self.sessions_dir).map_err(|e| self.io_error(&self.sessions_dir, e))
    }

    fn save(&self, session: &RunSession) -> Result<(), SessionError> {
        let path = self.record_path(&session.run_id);
        let file = File::create(&path).map_err(|e| self.io_error(&path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), session)
            .map_err(|source| SessionError::Corrupt { path, source })
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
