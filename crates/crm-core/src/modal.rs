//! Create dialogs for meetings, notes and
//! tasks. Each dialog is a small state
//! machine: `Closed -> Editing -> Saving`,
//! back to `Closed` on success or to
//! `Editing` on failure.

use anyhow::anyhow;
use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use crm_shared::{
  ActivityCreate,
  ActivityType,
  TaskCreate,
  TaskPriority,
  TaskStatus,
  TaskType
};
use tracing::{
  debug,
  error,
  info
};

use crate::api::CrmApi;
use crate::calendar::{
  CalendarDay,
  DatePicker
};
use crate::datetime::{
  format_date_peru,
  format_iso_date,
  parse_iso_date
};
use crate::editor::Editor;
use crate::entity::EntityRef;
use crate::feed::FeedItem;
use crate::keyboard::{
  KeyChord,
  ShortcutAction,
  ShortcutHub,
  Subscription
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalPhase {
  Closed,
  Editing,
  Saving
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// Required field empty; nothing sent.
  Blocked,
  /// Dialog not in a state that accepts a
  /// submit.
  Ignored,
  Saved,
  Failed
}

/// Request body a draft turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
  Activity(ActivityCreate),
  Task(TaskCreate)
}

pub trait Draft {
  const NAME: &'static str;

  fn fresh(today: NaiveDate) -> Self;

  /// The required text field.
  fn title(&self) -> &str;

  fn submission(
    &self,
    target: EntityRef
  ) -> Submission;
}

/// Optional `YYYY-MM-DD` field with its
/// picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueDateField {
  value:  Option<String>,
  picker: DatePicker
}

impl DueDateField {
  pub fn new(today: NaiveDate) -> Self {
    Self {
      value:  None,
      picker: DatePicker::new(today)
    }
  }

  pub fn value(&self) -> Option<&str> {
    self.value.as_deref()
  }

  /// `DD/MM/YYYY` for the read-only input.
  pub fn display(&self) -> String {
    format_date_peru(self.value.as_deref())
  }

  pub fn picker(&self) -> &DatePicker {
    &self.picker
  }

  pub fn picker_mut(
    &mut self
  ) -> &mut DatePicker {
    &mut self.picker
  }

  pub fn open_picker(&mut self) {
    self.picker.open_at(self.value.as_deref());
  }

  pub fn pick(&mut self, cell: &CalendarDay) {
    self.value = Some(self.picker.select(cell));
  }

  pub fn set(
    &mut self,
    raw: &str
  ) -> anyhow::Result<()> {
    let date = parse_iso_date(raw.trim())
      .ok_or_else(|| {
        anyhow!(
          "invalid due date {raw:?}; \
           expected YYYY-MM-DD"
        )
      })?;
    self.picker.open_at(Some(raw.trim()));
    self.value = Some(format_iso_date(date));
    Ok(())
  }

  pub fn clear(&mut self) {
    self.value = None;
    self.picker.clear();
  }
}

fn description_html(editor: &Editor) -> String {
  if editor.is_empty() {
    String::new()
  } else {
    editor.html()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingDraft {
  pub subject:     String,
  pub description: Editor,
  pub due:         DueDateField
}

impl Draft for MeetingDraft {
  const NAME: &'static str = "meeting";

  fn fresh(today: NaiveDate) -> Self {
    Self {
      subject:     String::new(),
      description: Editor::new(),
      due:         DueDateField::new(today)
    }
  }

  fn title(&self) -> &str {
    &self.subject
  }

  fn submission(
    &self,
    target: EntityRef
  ) -> Submission {
    Submission::Activity(ActivityCreate {
      kind:        ActivityType::Meeting,
      subject:     self.subject.trim().to_string(),
      description: description_html(
        &self.description
      ),
      due_date:    self.due.value.clone(),
      links:       target.links()
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
  pub subject:     String,
  pub description: Editor
}

impl Draft for NoteDraft {
  const NAME: &'static str = "note";

  fn fresh(_today: NaiveDate) -> Self {
    Self {
      subject:     String::new(),
      description: Editor::new()
    }
  }

  fn title(&self) -> &str {
    &self.subject
  }

  fn submission(
    &self,
    target: EntityRef
  ) -> Submission {
    Submission::Activity(ActivityCreate {
      kind:        ActivityType::Note,
      subject:     self.subject.trim().to_string(),
      description: description_html(
        &self.description
      ),
      due_date:    None,
      links:       target.links()
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
  pub title:       String,
  pub description: Editor,
  pub priority:    TaskPriority,
  pub due:         DueDateField
}

impl Draft for TaskDraft {
  const NAME: &'static str = "task";

  fn fresh(today: NaiveDate) -> Self {
    Self {
      title:       String::new(),
      description: Editor::new(),
      priority:    TaskPriority::Medium,
      due:         DueDateField::new(today)
    }
  }

  fn title(&self) -> &str {
    &self.title
  }

  fn submission(
    &self,
    target: EntityRef
  ) -> Submission {
    Submission::Task(TaskCreate {
      title:       self.title.trim().to_string(),
      description: description_html(
        &self.description
      ),
      kind:        TaskType::Todo,
      priority:    self.priority,
      status:      TaskStatus::NotStarted,
      due_date:    self.due.value.clone(),
      links:       target.links()
    })
  }
}

/// Sends a submission and maps the reply
/// into a feed row.
pub async fn send_submission<A: CrmApi>(
  api: &A,
  submission: &Submission
) -> crate::api::ApiResult<FeedItem> {
  match submission {
    | Submission::Activity(payload) => api
      .create_activity(payload)
      .await
      .map(FeedItem::from),
    | Submission::Task(payload) => api
      .create_task(payload)
      .await
      .map(FeedItem::from)
  }
}

/// Fills fields the backend left out of
/// its reply from what the user entered.
/// A missing creation time becomes `now`
/// so the item sorts as the newest.
pub fn complete_saved_item(
  item: &mut FeedItem,
  submission: &Submission,
  now: DateTime<Utc>
) {
  let (title, description, due_date) =
    match submission {
      | Submission::Activity(p) => {
        (&p.subject, &p.description, &p.due_date)
      }
      | Submission::Task(p) => {
        (&p.title, &p.description, &p.due_date)
      }
    };
  if item.title.trim().is_empty() {
    item.title = title.clone();
  }
  if item.description_html.is_empty() {
    item.description_html = description.clone();
  }
  if item.due_date.is_none() {
    item.due_date = due_date.clone();
  }
  if item.created_at.is_none() {
    item.created_at = Some(now);
  }
}

pub type MeetingModal = ModalController<MeetingDraft>;
pub type NoteModal = ModalController<NoteDraft>;
pub type TaskModal = ModalController<TaskDraft>;

#[derive(Debug)]
pub struct ModalController<D: Draft> {
  target:       EntityRef,
  today:        NaiveDate,
  phase:        ModalPhase,
  draft:        D,
  subscription: Option<Subscription>,
  last_error:   Option<String>
}

impl<D: Draft> ModalController<D> {
  pub fn new(
    target: EntityRef,
    today: NaiveDate
  ) -> Self {
    Self {
      target,
      today,
      phase: ModalPhase::Closed,
      draft: D::fresh(today),
      subscription: None,
      last_error: None
    }
  }

  pub fn target(&self) -> EntityRef {
    self.target
  }

  pub fn phase(&self) -> ModalPhase {
    self.phase
  }

  pub fn is_open(&self) -> bool {
    self.phase != ModalPhase::Closed
  }

  pub fn draft(&self) -> &D {
    &self.draft
  }

  pub fn draft_mut(&mut self) -> &mut D {
    &mut self.draft
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  /// Starts a fresh form and takes over the
  /// keyboard shortcuts.
  #[tracing::instrument(skip(self, hub), fields(modal = D::NAME, target = %self.target))]
  pub fn open(&mut self, hub: &ShortcutHub) {
    self.draft = D::fresh(self.today);
    self.last_error = None;
    self.subscription =
      Some(hub.subscribe(D::NAME));
    self.phase = ModalPhase::Editing;
    debug!("modal opened");
  }

  pub fn close(&mut self) {
    self.subscription = None;
    self.phase = ModalPhase::Closed;
    debug!(modal = D::NAME, "modal closed");
  }

  /// Routes a key press. Escape closes the
  /// dialog here; a returned `Submit` asks
  /// the caller to run [`Self::submit`].
  pub fn handle_key(
    &mut self,
    chord: KeyChord
  ) -> Option<ShortcutAction> {
    if self.phase != ModalPhase::Editing {
      return None;
    }
    let action = self
      .subscription
      .as_ref()?
      .dispatch(chord)?;
    if action == ShortcutAction::Close {
      self.close();
    }
    Some(action)
  }

  #[tracing::instrument(
    skip(self, api, on_save),
    fields(
      modal = D::NAME,
      target = %self.target,
      link = self.target.kind.foreign_key()
    )
  )]
  pub async fn submit<A: CrmApi>(
    &mut self,
    api: &A,
    on_save: impl FnOnce(FeedItem)
  ) -> SubmitOutcome {
    if self.phase != ModalPhase::Editing {
      debug!(phase = ?self.phase, "submit ignored");
      return SubmitOutcome::Ignored;
    }
    if self.draft.title().trim().is_empty() {
      debug!("submit blocked; required field is empty");
      return SubmitOutcome::Blocked;
    }

    let submission =
      self.draft.submission(self.target);
    self.phase = ModalPhase::Saving;

    match send_submission(api, &submission).await
    {
      | Ok(mut item) => {
        complete_saved_item(
          &mut item,
          &submission,
          Utc::now()
        );
        info!(id = item.id, kind = ?item.kind, "saved");
        self.last_error = None;
        self.close();
        on_save(item);
        SubmitOutcome::Saved
      }
      | Err(err) => {
        error!(error = %err, "save failed");
        self.last_error = Some(err.to_string());
        self.phase = ModalPhase::Editing;
        SubmitOutcome::Failed
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::keyboard::Key;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5)
      .expect("valid date")
  }

  #[test]
  fn task_submission_uses_todo_and_link() {
    let mut draft = TaskDraft::fresh(today());
    draft.title = "  Llamar a Luis ".to_string();
    draft.priority = TaskPriority::Urgent;
    draft.due.set("2024-03-09").expect("due date");

    let Submission::Task(payload) = draft
      .submission(EntityRef::deal(4))
    else {
      panic!("task draft must build a task");
    };
    assert_eq!(payload.title, "Llamar a Luis");
    assert_eq!(payload.kind, TaskType::Todo);
    assert_eq!(payload.links.deal_id, Some(4));
    assert_eq!(
      payload.due_date.as_deref(),
      Some("2024-03-09")
    );
    assert_eq!(payload.description, "");
  }

  #[test]
  fn due_date_field_tracks_picker() {
    let mut due = DueDateField::new(today());
    assert!(due.set("2024-02-30").is_err());
    due.open_picker();
    let cell = due
      .picker()
      .grid()
      .into_iter()
      .find(|cell| {
        cell.is_current_month && cell.day == 21
      })
      .expect("day 21");
    due.pick(&cell);
    assert_eq!(due.value(), Some("2024-03-21"));
    assert_eq!(due.display(), "21/03/2024");
  }

  #[test]
  fn escape_closes_and_releases_shortcuts() {
    let hub = ShortcutHub::new();
    let mut modal =
      NoteModal::new(EntityRef::deal(1), today());
    assert_eq!(
      modal.handle_key(KeyChord::plain(Key::Escape)),
      None
    );

    modal.open(&hub);
    assert_eq!(hub.active_count(), 1);
    assert_eq!(
      modal.handle_key(KeyChord::ctrl(Key::Enter)),
      Some(ShortcutAction::Submit)
    );
    assert!(modal.is_open());
    assert_eq!(
      modal.handle_key(KeyChord::plain(Key::Escape)),
      Some(ShortcutAction::Close)
    );
    assert_eq!(modal.phase(), ModalPhase::Closed);
    assert_eq!(hub.active_count(), 0);
  }

  #[test]
  fn dropping_an_open_modal_unsubscribes() {
    let hub = ShortcutHub::new();
    {
      let mut modal = MeetingModal::new(
        EntityRef::deal(1),
        today()
      );
      modal.open(&hub);
      assert_eq!(hub.active_count(), 1);
    }
    assert_eq!(hub.active_count(), 0);
  }

  #[test]
  fn saved_item_without_timestamp_is_stamped() {
    let mut draft = NoteDraft::fresh(today());
    draft.subject = "Llamada".to_string();
    let submission =
      draft.submission(EntityRef::deal(2));
    let now = DateTime::parse_from_rfc3339(
      "2024-03-05T18:30:00Z"
    )
    .expect("valid instant")
    .with_timezone(&Utc);

    let mut item = FeedItem {
      id: 9,
      kind: ActivityType::Note,
      is_task: false,
      title: String::new(),
      description_html: String::new(),
      due_date: None,
      created_at: None,
      author: None,
      priority: None,
      status: None
    };
    complete_saved_item(&mut item, &submission, now);
    assert_eq!(item.title, "Llamada");
    assert_eq!(item.created_at, Some(now));

    let earlier = now - chrono::TimeDelta::hours(1);
    item.created_at = Some(earlier);
    complete_saved_item(&mut item, &submission, now);
    assert_eq!(item.created_at, Some(earlier));
  }
}
