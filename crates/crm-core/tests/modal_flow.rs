mod support;

use chrono::NaiveDate;
use crm_core::entity::{EntityKind, EntityRef};
use crm_core::feed::FeedItem;
use crm_core::keyboard::{Key, KeyChord, ShortcutAction, ShortcutHub};
use crm_core::modal::{MeetingModal, ModalPhase, NoteModal, SubmitOutcome, TaskModal};
use crm_shared::{ActivityType, TaskPriority, TaskType};
use support::FakeApi;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).expect("valid date")
}

#[tokio::test]
async fn empty_subject_blocks_without_sending() {
    let api = FakeApi::default();
    let hub = ShortcutHub::new();
    let mut modal = MeetingModal::new(EntityRef::deal(1), today());
    modal.open(&hub);
    modal.draft_mut().subject = "   ".to_string();

    let mut saved = Vec::new();
    let outcome = modal.submit(&api, |item| saved.push(item)).await;

    assert_eq!(outcome, SubmitOutcome::Blocked);
    assert!(saved.is_empty());
    assert!(api.calls().is_empty());
    assert_eq!(modal.phase(), ModalPhase::Editing);
    assert_eq!(hub.active_count(), 1);
}

#[tokio::test]
async fn meeting_save_reports_kind_and_local_due_date() {
    let api = FakeApi::default();
    let hub = ShortcutHub::new();
    let mut modal = MeetingModal::new(EntityRef::deal(1), today());
    modal.open(&hub);
    {
        let draft = modal.draft_mut();
        draft.subject = "Kickoff con ACME".to_string();
        draft.description.insert_text("Agenda inicial");
        draft.due.open_picker();
        let cell = draft
            .due
            .picker()
            .grid()
            .into_iter()
            .find(|cell| cell.is_current_month && cell.day == 9)
            .expect("day 9");
        draft.due.pick(&cell);
    }

    let mut saved: Vec<FeedItem> = Vec::new();
    let outcome = modal.submit(&api, |item| saved.push(item)).await;

    assert_eq!(outcome, SubmitOutcome::Saved);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].kind, ActivityType::Meeting);
    assert_eq!(saved[0].due_date.as_deref(), Some("2024-03-09"));
    assert_eq!(saved[0].title, "Kickoff con ACME");
    assert_eq!(modal.phase(), ModalPhase::Closed);
    assert_eq!(hub.active_count(), 0);

    let sent = api.activities.lock().expect("activities lock");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, ActivityType::Meeting);
    assert_eq!(sent[0].links.deal_id, Some(1));
    assert_eq!(sent[0].description, "<p>Agenda inicial</p>");
}

#[tokio::test]
async fn failed_save_keeps_dialog_open_with_error() {
    let api = FakeApi::default();
    api.set_failing(true);
    let hub = ShortcutHub::new();
    let target = EntityRef::new(EntityKind::Contact, 8);
    let mut modal = NoteModal::new(target, today());
    modal.open(&hub);
    modal.draft_mut().subject = "Llamada perdida".to_string();

    let mut calls = 0;
    let outcome = modal.submit(&api, |_| calls += 1).await;
    assert_eq!(outcome, SubmitOutcome::Failed);
    assert_eq!(calls, 0);
    assert_eq!(modal.phase(), ModalPhase::Editing);
    assert!(
        modal
            .last_error()
            .is_some_and(|err| err.contains("HTTP 500"))
    );
    assert_eq!(modal.draft().subject, "Llamada perdida");

    api.set_failing(false);
    let outcome = modal.submit(&api, |_| calls += 1).await;
    assert_eq!(outcome, SubmitOutcome::Saved);
    assert_eq!(calls, 1);
    assert_eq!(modal.last_error(), None);

    let sent = api.activities.lock().expect("activities lock");
    assert_eq!(sent[0].kind, ActivityType::Note);
    assert_eq!(sent[0].links.contact_id, Some(8));
    assert_eq!(sent[0].links.deal_id, None);
}

#[tokio::test]
async fn closed_dialog_ignores_submit() {
    let api = FakeApi::default();
    let mut modal = TaskModal::new(EntityRef::deal(1), today());
    modal.draft_mut().title = "Preparar demo".to_string();

    let outcome = modal.submit(&api, |_| {}).await;
    assert_eq!(outcome, SubmitOutcome::Ignored);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn task_dialog_posts_todo_and_submits_on_ctrl_enter() {
    let api = FakeApi::default();
    let hub = ShortcutHub::new();
    let mut modal = TaskModal::new(EntityRef::new(EntityKind::Ticket, 31), today());
    modal.open(&hub);
    modal.draft_mut().title = "Responder ticket".to_string();
    modal.draft_mut().priority = TaskPriority::Urgent;
    modal.draft_mut().due.set("2024-03-07").expect("due date");

    let action = modal.handle_key(KeyChord::meta(Key::Enter));
    assert_eq!(action, Some(ShortcutAction::Submit));

    let mut saved = None;
    let outcome = modal.submit(&api, |item| saved = Some(item)).await;
    assert_eq!(outcome, SubmitOutcome::Saved);

    let item = saved.expect("saved item");
    assert!(item.is_task);
    assert_eq!(item.kind, ActivityType::Task);
    assert_eq!(item.priority, Some(TaskPriority::Urgent));
    assert_eq!(item.due_date.as_deref(), Some("2024-03-07"));

    let sent = api.tasks.lock().expect("tasks lock");
    assert_eq!(sent[0].kind, TaskType::Todo);
    assert_eq!(sent[0].links.ticket_id, Some(31));
    assert_eq!(api.calls(), vec!["POST tasks type=Todo".to_string()]);
}

#[test]
fn reopening_resets_the_draft() {
    let hub = ShortcutHub::new();
    let mut modal = MeetingModal::new(EntityRef::deal(1), today());
    modal.open(&hub);
    modal.draft_mut().subject = "borrador".to_string();
    modal.handle_key(KeyChord::plain(Key::Escape));
    assert!(!modal.is_open());

    modal.open(&hub);
    assert_eq!(modal.draft().subject, "");
    assert!(modal.draft().description.is_empty());
    assert_eq!(modal.draft().due.value(), None);
}
