use std::collections::HashMap;
use std::future::Future;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    commitment::{
        BoardCellView, BoardView, CommitmentEntry, CommitmentStatus, CurriculumItem, DailyReport,
    },
    student::Student,
};

/// Why a board operation was refused or failed. Precondition refusals are
/// decided locally and never reach the store; `Persist`/`Store` carry the
/// underlying transport error for a retryable message.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("nothing has been checked on this board yet")]
    NothingChecked,
    #[error("reports for this class and date were already sent")]
    AlreadySent,
    #[error("student or curriculum item does not belong to this board")]
    UnknownCell,
    #[error("this cell was changed by someone else, reload the board")]
    StaleCell,
    #[error("failed to save commitment status")]
    Persist(#[source] anyhow::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl BoardError {
    /// Precondition refusals map to 4xx; everything else is a server fault.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            BoardError::NothingChecked
                | BoardError::AlreadySent
                | BoardError::UnknownCell
                | BoardError::StaleCell
        )
    }
}

/// Persistence side of the board, injected so tests can run against an
/// in-memory fake with failure injection.
pub trait BoardStore: Send + Sync {
    fn class_students(
        &self,
        class_id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Vec<Student>>> + Send;

    fn items_for(
        &self,
        class_id: Uuid,
        date: NaiveDate,
    ) -> impl Future<Output = anyhow::Result<Vec<CurriculumItem>>> + Send;

    fn entries_for(
        &self,
        class_id: Uuid,
        date: NaiveDate,
    ) -> impl Future<Output = anyhow::Result<Vec<CommitmentEntry>>> + Send;

    fn reports_for(
        &self,
        class_id: Uuid,
        date: NaiveDate,
    ) -> impl Future<Output = anyhow::Result<Vec<DailyReport>>> + Send;

    /// Compare-and-set keyed by (student, item, date): persists `next` only
    /// while the stored status still equals `prev`. Returns false when
    /// another writer got there first.
    fn upsert_entry(
        &self,
        student_id: Uuid,
        item_id: Uuid,
        date: NaiveDate,
        prev: CommitmentStatus,
        next: CommitmentStatus,
        updated_by: Uuid,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;

    /// Marks every student of the class as sent for the date.
    fn mark_sent(
        &self,
        class_id: Uuid,
        date: NaiveDate,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub struct PgBoardStore {
    pool: PgPool,
}

impl PgBoardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BoardStore for PgBoardStore {
    async fn class_students(&self, class_id: Uuid) -> anyhow::Result<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT * FROM students
             WHERE class_id = $1 AND is_active = TRUE
             ORDER BY native_name",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(students)
    }

    async fn items_for(&self, class_id: Uuid, date: NaiveDate) -> anyhow::Result<Vec<CurriculumItem>> {
        let items = sqlx::query_as::<_, CurriculumItem>(
            "SELECT * FROM curriculum_items
             WHERE class_id = $1 AND scheduled_date = $2
             ORDER BY subject, title",
        )
        .bind(class_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn entries_for(&self, class_id: Uuid, date: NaiveDate) -> anyhow::Result<Vec<CommitmentEntry>> {
        let entries = sqlx::query_as::<_, CommitmentEntry>(
            "SELECT ce.* FROM commitment_entries ce
             JOIN students s ON s.id = ce.student_id
             WHERE s.class_id = $1 AND ce.entry_date = $2",
        )
        .bind(class_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn reports_for(&self, class_id: Uuid, date: NaiveDate) -> anyhow::Result<Vec<DailyReport>> {
        let reports = sqlx::query_as::<_, DailyReport>(
            "SELECT dr.* FROM daily_reports dr
             JOIN students s ON s.id = dr.student_id
             WHERE s.class_id = $1 AND dr.report_date = $2",
        )
        .bind(class_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(reports)
    }

    // Entry rows are never deleted, so the insert path only fires for cells
    // that have never been written. Zero affected rows means the status
    // guard failed and the caller lost the race.
    async fn upsert_entry(
        &self,
        student_id: Uuid,
        item_id: Uuid,
        date: NaiveDate,
        prev: CommitmentStatus,
        next: CommitmentStatus,
        updated_by: Uuid,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO commitment_entries (student_id, item_id, entry_date, status, updated_by)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (student_id, item_id, entry_date) DO UPDATE SET
                 status     = EXCLUDED.status,
                 updated_by = EXCLUDED.updated_by,
                 updated_at = NOW()
             WHERE commitment_entries.status = $6",
        )
        .bind(student_id)
        .bind(item_id)
        .bind(date)
        .bind(next.to_string())
        .bind(updated_by)
        .bind(prev.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_sent(&self, class_id: Uuid, date: NaiveDate) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO daily_reports (student_id, report_date, send_status, sent_at)
             SELECT id, $2, 'sent', NOW() FROM students
             WHERE class_id = $1 AND is_active = TRUE
             ON CONFLICT (student_id, report_date) DO UPDATE SET
                 send_status = 'sent',
                 sent_at     = NOW()",
        )
        .bind(class_id)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub student_id: Uuid,
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Default)]
struct CellState {
    status: CommitmentStatus,
    note: Option<String>,
}

/// Command record for one optimistic advance. Rollback is a pure function of
/// (key, prev) — no captured closures.
#[derive(Debug, Clone, Copy)]
pub struct CellAdvance {
    pub key: CellKey,
    pub prev: CommitmentStatus,
    pub next: CommitmentStatus,
}

impl CellAdvance {
    pub fn new(key: CellKey, prev: CommitmentStatus) -> Self {
        Self {
            key,
            prev,
            next: prev.next(),
        }
    }
}

/// Session-scoped commitment grid for one (class, date).
///
/// Rebuilt fully on every `load`; the backing store stays the source of
/// truth. `advance_cell` takes `&mut self`, so advances on one board are
/// serialized. Across boards the store's compare-and-set guard decides the
/// winner, so two sessions tapping the same cell apply two distinct steps or
/// one of them is told to reload.
pub struct CommitmentBoard<S> {
    store: S,
    class_id: Uuid,
    date: NaiveDate,
    students: Vec<Student>,
    items: Vec<CurriculumItem>,
    grid: HashMap<CellKey, CellState>,
    sent: bool,
}

impl<S: BoardStore> CommitmentBoard<S> {
    /// Builds the grid for (class, date); cells with no stored entry default
    /// to `unchecked`. Entries referencing students or items outside the
    /// board (stale rows) are silently ignored.
    pub async fn load(store: S, class_id: Uuid, date: NaiveDate) -> Result<Self, BoardError> {
        let students = store.class_students(class_id).await?;
        let items = store.items_for(class_id, date).await?;
        let entries = store.entries_for(class_id, date).await?;
        let reports = store.reports_for(class_id, date).await?;

        let mut grid = HashMap::with_capacity(students.len() * items.len());
        for student in &students {
            for item in &items {
                grid.insert(
                    CellKey {
                        student_id: student.id,
                        item_id: item.id,
                    },
                    CellState::default(),
                );
            }
        }

        for entry in entries {
            let key = CellKey {
                student_id: entry.student_id,
                item_id: entry.item_id,
            };
            if let Some(cell) = grid.get_mut(&key) {
                cell.status = entry.status.parse().unwrap_or_default();
                cell.note = entry.note;
            }
        }

        let sent = !students.is_empty()
            && students.iter().all(|s| {
                reports
                    .iter()
                    .any(|r| r.student_id == s.id && r.send_status == "sent")
            });

        Ok(Self {
            store,
            class_id,
            date,
            students,
            items,
            grid,
            sent,
        })
    }

    pub fn status_of(&self, student_id: Uuid, item_id: Uuid) -> Option<CommitmentStatus> {
        self.grid
            .get(&CellKey { student_id, item_id })
            .map(|c| c.status)
    }

    /// Any cell advanced past `unchecked`?
    pub fn has_progress(&self) -> bool {
        self.grid
            .values()
            .any(|c| c.status != CommitmentStatus::Unchecked)
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Advances one cell a single step in the cycle, optimistically. The
    /// grid is updated before the store round-trip; a failed or lost upsert
    /// restores the cell from the command record and returns the failure.
    /// The store only accepts the write while its row still matches the
    /// status this board advanced from.
    pub async fn advance_cell(
        &mut self,
        student_id: Uuid,
        item_id: Uuid,
        actor: Uuid,
    ) -> Result<CommitmentStatus, BoardError> {
        let key = CellKey {
            student_id,
            item_id,
        };
        let cell = self.grid.get_mut(&key).ok_or(BoardError::UnknownCell)?;

        let advance = CellAdvance::new(key, cell.status);
        cell.status = advance.next;

        let applied = match self
            .store
            .upsert_entry(student_id, item_id, self.date, advance.prev, advance.next, actor)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                self.roll_back(&advance);
                return Err(BoardError::Persist(e));
            }
        };
        if !applied {
            self.roll_back(&advance);
            return Err(BoardError::StaleCell);
        }

        Ok(advance.next)
    }

    fn roll_back(&mut self, advance: &CellAdvance) {
        if let Some(cell) = self.grid.get_mut(&advance.key) {
            cell.status = advance.prev;
        }
    }

    /// One-way send gate. Refused before any store call when nothing has
    /// been checked or the class is already sent for this date. A store
    /// failure leaves the gate open so the user can retry.
    pub async fn send_to_parents(&mut self) -> Result<(), BoardError> {
        if self.sent {
            return Err(BoardError::AlreadySent);
        }
        if !self.has_progress() {
            return Err(BoardError::NothingChecked);
        }

        self.store.mark_sent(self.class_id, self.date).await?;
        self.sent = true;
        Ok(())
    }

    pub fn view(&self) -> BoardView {
        let mut cells = Vec::with_capacity(self.grid.len());
        for student in &self.students {
            for item in &self.items {
                let key = CellKey {
                    student_id: student.id,
                    item_id: item.id,
                };
                if let Some(cell) = self.grid.get(&key) {
                    cells.push(BoardCellView {
                        student_id: student.id,
                        item_id: item.id,
                        status: cell.status,
                        note: cell.note.clone(),
                    });
                }
            }
        }
        BoardView {
            class_id: self.class_id,
            date: self.date,
            students: self.students.clone(),
            items: self.items.clone(),
            cells,
            sent: self.sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeBoardStore {
        students: Vec<Student>,
        items: Vec<CurriculumItem>,
        entries: Mutex<HashMap<(Uuid, Uuid, NaiveDate), CommitmentStatus>>,
        sent_students: Mutex<Vec<Uuid>>,
        mark_sent_calls: Mutex<u32>,
        fail_upserts: Mutex<bool>,
        fail_sends: Mutex<bool>,
    }

    impl FakeBoardStore {
        fn new(students: Vec<Student>, items: Vec<CurriculumItem>) -> Self {
            Self {
                students,
                items,
                entries: Mutex::new(HashMap::new()),
                sent_students: Mutex::new(Vec::new()),
                mark_sent_calls: Mutex::new(0),
                fail_upserts: Mutex::new(false),
                fail_sends: Mutex::new(false),
            }
        }
    }

    impl BoardStore for &FakeBoardStore {
        async fn class_students(&self, _class_id: Uuid) -> anyhow::Result<Vec<Student>> {
            Ok(self.students.clone())
        }

        async fn items_for(&self, _class_id: Uuid, _date: NaiveDate) -> anyhow::Result<Vec<CurriculumItem>> {
            Ok(self.items.clone())
        }

        async fn entries_for(&self, _class_id: Uuid, date: NaiveDate) -> anyhow::Result<Vec<CommitmentEntry>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .iter()
                .filter(|((_, _, d), _)| *d == date)
                .map(|((student_id, item_id, d), status)| CommitmentEntry {
                    id: Uuid::new_v4(),
                    student_id: *student_id,
                    item_id: *item_id,
                    entry_date: *d,
                    status: status.to_string(),
                    note: None,
                    updated_by: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .collect())
        }

        async fn reports_for(&self, _class_id: Uuid, date: NaiveDate) -> anyhow::Result<Vec<DailyReport>> {
            let sent = self.sent_students.lock().unwrap();
            Ok(sent
                .iter()
                .map(|student_id| DailyReport {
                    id: Uuid::new_v4(),
                    student_id: *student_id,
                    report_date: date,
                    send_status: "sent".into(),
                    sent_at: Some(Utc::now()),
                })
                .collect())
        }

        async fn upsert_entry(
            &self,
            student_id: Uuid,
            item_id: Uuid,
            date: NaiveDate,
            prev: CommitmentStatus,
            next: CommitmentStatus,
            _updated_by: Uuid,
        ) -> anyhow::Result<bool> {
            if *self.fail_upserts.lock().unwrap() {
                anyhow::bail!("backend unavailable");
            }
            let mut entries = self.entries.lock().unwrap();
            let key = (student_id, item_id, date);
            let current = entries.get(&key).copied().unwrap_or_default();
            if current != prev {
                return Ok(false);
            }
            entries.insert(key, next);
            Ok(true)
        }

        async fn mark_sent(&self, _class_id: Uuid, _date: NaiveDate) -> anyhow::Result<()> {
            *self.mark_sent_calls.lock().unwrap() += 1;
            if *self.fail_sends.lock().unwrap() {
                anyhow::bail!("backend unavailable");
            }
            let mut sent = self.sent_students.lock().unwrap();
            sent.clear();
            sent.extend(self.students.iter().map(|s| s.id));
            Ok(())
        }
    }

    fn student(name: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            native_name: name.into(),
            english_name: None,
            campus: "main".into(),
            class_id: Some(Uuid::new_v4()),
            contact_phone: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(title: &str, date: NaiveDate) -> CurriculumItem {
        CurriculumItem {
            id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            subject: "reading".into(),
            title: title.into(),
            scheduled_date: date,
            created_at: Utc::now(),
        }
    }

    fn date() -> NaiveDate {
        "2026-03-02".parse().unwrap()
    }

    #[tokio::test]
    async fn load_defaults_every_cell_to_unchecked() {
        let store = FakeBoardStore::new(vec![student("김하은"), student("이준서")], vec![item("p.12", date())]);
        let board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();

        let view = board.view();
        assert_eq!(view.cells.len(), 2);
        assert!(view
            .cells
            .iter()
            .all(|c| c.status == CommitmentStatus::Unchecked));
        assert!(!view.sent);
    }

    #[tokio::test]
    async fn four_advances_cycle_back_and_persist_each_step() {
        let s = student("김하은");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s.clone()], vec![i.clone()]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();
        let actor = Uuid::new_v4();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(board.advance_cell(s.id, i.id, actor).await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                CommitmentStatus::Done,
                CommitmentStatus::Partial,
                CommitmentStatus::NotDone,
                CommitmentStatus::Unchecked,
            ]
        );
        let persisted = store.entries.lock().unwrap()[&(s.id, i.id, date())];
        assert_eq!(persisted, CommitmentStatus::Unchecked);
    }

    #[tokio::test]
    async fn failed_upsert_rolls_the_cell_back_exactly() {
        let s = student("김하은");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s.clone()], vec![i.clone()]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();
        let actor = Uuid::new_v4();

        board.advance_cell(s.id, i.id, actor).await.unwrap();
        assert_eq!(board.status_of(s.id, i.id), Some(CommitmentStatus::Done));

        *store.fail_upserts.lock().unwrap() = true;
        let err = board.advance_cell(s.id, i.id, actor).await.unwrap_err();
        assert!(matches!(err, BoardError::Persist(_)));
        assert!(!err.is_refusal());
        assert_eq!(board.status_of(s.id, i.id), Some(CommitmentStatus::Done));

        // A retry is a fresh tap and succeeds once the backend is back.
        *store.fail_upserts.lock().unwrap() = false;
        let status = board.advance_cell(s.id, i.id, actor).await.unwrap();
        assert_eq!(status, CommitmentStatus::Partial);
    }

    #[tokio::test]
    async fn racing_boards_cannot_collapse_two_taps_into_one_step() {
        let s = student("김하은");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s.clone()], vec![i.clone()]);

        // Two sessions load the same blank cell before either taps it.
        let mut first = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();
        let mut second = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();

        first.advance_cell(s.id, i.id, Uuid::new_v4()).await.unwrap();
        let err = second.advance_cell(s.id, i.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BoardError::StaleCell));
        assert!(err.is_refusal());

        // The losing session rolled back instead of re-applying the same step.
        assert_eq!(
            second.status_of(s.id, i.id),
            Some(CommitmentStatus::Unchecked)
        );
        let persisted = store.entries.lock().unwrap()[&(s.id, i.id, date())];
        assert_eq!(persisted, CommitmentStatus::Done);
    }

    #[tokio::test]
    async fn unknown_cell_is_refused_without_a_write() {
        let s = student("김하은");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s.clone()], vec![i]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();

        let err = board
            .advance_cell(s.id, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::UnknownCell));
        assert!(store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_with_blank_grid_is_refused_before_any_store_call() {
        let store = FakeBoardStore::new(vec![student("김하은")], vec![item("p.12", date())]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();

        let err = board.send_to_parents().await.unwrap_err();
        assert!(matches!(err, BoardError::NothingChecked));
        assert!(err.is_refusal());
        assert_eq!(*store.mark_sent_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn send_gate_is_one_way_per_class_and_date() {
        let s1 = student("김하은");
        let s2 = student("이준서");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s1.clone(), s2.clone()], vec![i.clone()]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();

        board.advance_cell(s1.id, i.id, Uuid::new_v4()).await.unwrap();
        board.send_to_parents().await.unwrap();
        assert!(board.is_sent());
        assert_eq!(*store.mark_sent_calls.lock().unwrap(), 1);
        // Every class student is marked, not just the advanced one.
        assert_eq!(store.sent_students.lock().unwrap().len(), 2);

        let err = board.send_to_parents().await.unwrap_err();
        assert!(matches!(err, BoardError::AlreadySent));
        assert_eq!(*store.mark_sent_calls.lock().unwrap(), 1);
        assert_eq!(store.sent_students.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reloaded_board_sees_the_sent_gate() {
        let s = student("김하은");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s.clone()], vec![i.clone()]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();
        board.advance_cell(s.id, i.id, Uuid::new_v4()).await.unwrap();
        board.send_to_parents().await.unwrap();

        let reloaded = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();
        assert!(reloaded.is_sent());
        assert_eq!(
            reloaded.status_of(s.id, i.id),
            Some(CommitmentStatus::Done)
        );
    }

    #[tokio::test]
    async fn failed_send_leaves_the_gate_open_for_retry() {
        let s = student("김하은");
        let i = item("p.12", date());
        let store = FakeBoardStore::new(vec![s.clone()], vec![i.clone()]);
        let mut board = CommitmentBoard::load(&store, Uuid::new_v4(), date()).await.unwrap();
        board.advance_cell(s.id, i.id, Uuid::new_v4()).await.unwrap();

        *store.fail_sends.lock().unwrap() = true;
        let err = board.send_to_parents().await.unwrap_err();
        assert!(matches!(err, BoardError::Store(_)));
        assert!(!board.is_sent());
        assert!(store.sent_students.lock().unwrap().is_empty());

        *store.fail_sends.lock().unwrap() = false;
        board.send_to_parents().await.unwrap();
        assert!(board.is_sent());
    }
}
