mod support;

use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
use crm_core::associate::AssociatePanel;
use crm_core::deal::{DealDetail, NoticeKind};
use crm_core::editor::{EditorError, Mark};
use crm_core::entity::EntityKind;
use crm_core::feed::TimeRange;
use crm_core::modal::{Draft, SubmitOutcome, TaskDraft};
use crm_shared::{ActivityType, CompanyDto, TaskDto, TaskPriority, TaskStatus, TaskType};
use support::{FakeApi, activity, deal};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).expect("valid date")
}

fn task(id: u64, created_at: &str) -> TaskDto {
    TaskDto {
        id,
        title: format!("tarea {id}"),
        description: None,
        kind: Some(TaskType::Todo),
        priority: Some(TaskPriority::High),
        status: Some(TaskStatus::NotStarted),
        due_date: Some("2024-03-08".to_string()),
        created_at: Some(created_at.to_string()),
        assigned_to: None,
        created_by: None,
        deal_id: Some(1),
    }
}

fn loaded_api() -> FakeApi {
    let mut api = FakeApi::with_deal(deal(1));
    api.feed_activities = vec![
        activity(1, ActivityType::Note, "2024-03-01T15:00:00Z"),
        activity(2, ActivityType::Meeting, "2024-03-04T15:00:00Z"),
    ];
    api.feed_tasks = vec![task(3, "2024-03-02T15:00:00Z")];
    api
}

#[tokio::test]
async fn load_merges_activities_and_tasks_newest_first() {
    let api = loaded_api();
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");

    let ids: Vec<_> = detail.feed().iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert!(detail.feed()[1].is_task);
    assert_eq!(detail.description().plain_text(), "Contrato anual");

    let calls = api.calls();
    assert!(calls.contains(&"GET deals/1".to_string()));
    assert!(calls.contains(&"GET activities dealId=1".to_string()));
    assert!(calls.contains(&"GET tasks dealId=1".to_string()));

    detail.filter_mut().range = TimeRange::ThisWeek;
    let visible: Vec<_> = detail.visible(today()).iter().map(|item| item.id).collect();
    assert_eq!(visible, vec![2]);

    detail.filter_mut().range = TimeRange::All;
    detail.filter_mut().kinds.insert(ActivityType::Task);
    let visible: Vec<_> = detail.visible(today()).iter().map(|item| item.id).collect();
    assert_eq!(visible, vec![3]);
}

#[tokio::test]
async fn missing_deal_fails_to_load() {
    let api = FakeApi::default();
    let err = DealDetail::load(&api, 9).await.expect_err("no deal");
    assert!(format!("{err:#}").contains("HTTP 404"));
}

#[tokio::test]
async fn add_task_updates_feed_and_raises_notice() {
    let api = loaded_api();
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");
    let now = Utc
        .with_ymd_and_hms(2024, 3, 5, 16, 0, 0)
        .single()
        .expect("valid instant");

    let mut draft = TaskDraft::fresh(today());
    draft.title = "Enviar propuesta".to_string();
    draft.due.set("2024-03-12").expect("due date");

    let outcome = detail.add_task(&api, &draft, now).await;
    assert_eq!(outcome, SubmitOutcome::Saved);
    assert_eq!(detail.feed().len(), 4);
    let newest = &detail.feed()[0];
    assert_eq!(newest.title, "Enviar propuesta");
    assert_eq!(newest.due_date.as_deref(), Some("2024-03-12"));

    let notice = detail.notice(now).expect("notice shown");
    assert_eq!(notice.kind, NoticeKind::Success);
    assert_eq!(notice.message, "Tarea creada correctamente");
    assert!(detail.notice(now + TimeDelta::seconds(3)).is_none());

    detail.expire_notice(now + TimeDelta::seconds(3));
    assert!(detail.notice(now).is_none());

    let sent = api.tasks.lock().expect("tasks lock");
    assert_eq!(sent[0].links.deal_id, Some(1));
}

#[tokio::test]
async fn task_saved_without_timestamp_lands_on_top() {
    let mut api = loaded_api();
    api.omit_created_at = true;
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");
    detail.filter_mut().range = TimeRange::Today;
    let now = Utc
        .with_ymd_and_hms(2024, 3, 5, 16, 0, 0)
        .single()
        .expect("valid instant");

    let mut draft = TaskDraft::fresh(today());
    draft.title = "Confirmar reunión".to_string();
    let outcome = detail.add_task(&api, &draft, now).await;

    assert_eq!(outcome, SubmitOutcome::Saved);
    assert_eq!(detail.feed()[0].title, "Confirmar reunión");
    assert_eq!(detail.feed()[0].created_at, Some(now));
    let visible: Vec<_> = detail
        .visible(today())
        .iter()
        .map(|item| item.title.clone())
        .collect();
    assert_eq!(visible, vec!["Confirmar reunión".to_string()]);
}

#[tokio::test]
async fn add_task_failure_shows_error_notice() {
    let api = loaded_api();
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");
    api.set_failing(true);
    let now = Utc::now();

    let mut draft = TaskDraft::fresh(today());
    draft.title = "Seguimiento".to_string();
    let outcome = detail.add_task(&api, &draft, now).await;

    assert_eq!(outcome, SubmitOutcome::Failed);
    assert_eq!(detail.feed().len(), 3);
    let notice = detail.notice(now).expect("notice shown");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.message.starts_with("No se pudo crear la tarea"));
}

#[tokio::test]
async fn add_task_without_title_is_blocked() {
    let api = loaded_api();
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");
    let before = api.calls().len();

    let draft = TaskDraft::fresh(today());
    let outcome = detail.add_task(&api, &draft, Utc::now()).await;

    assert_eq!(outcome, SubmitOutcome::Blocked);
    assert_eq!(api.calls().len(), before);
    assert!(detail.notice(Utc::now()).is_none());
}

#[tokio::test]
async fn save_description_sends_editor_html() {
    let api = loaded_api();
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");
    {
        let editor = detail.description_mut();
        editor.move_to_end();
        editor.split_block();
        editor.toggle_mark(Mark::Bold);
        editor.insert_text("Firmado");
    }
    let html = detail.description().html();
    assert_eq!(html, "<p>Contrato anual</p><p><strong>Firmado</strong></p>");

    detail.save_description(&api).await.expect("save description");

    let patches = api.patches.lock().expect("patches lock");
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].description.as_deref(), Some(html.as_str()));
    assert_eq!(patches[0].name, None);
    assert_eq!(detail.deal().description.as_deref(), Some(html.as_str()));
    assert!(api.calls().contains(&"PUT deals/1".to_string()));
}

#[tokio::test]
async fn plain_description_with_less_than_survives_a_save() {
    let mut stored = deal(1);
    stored.description = Some("Llamar si monto < 5000 y luego enviar contrato".to_string());
    let api = FakeApi::with_deal(stored);
    let mut detail = DealDetail::load(&api, 1).await.expect("load deal");

    assert_eq!(
        detail.description().plain_text(),
        "Llamar si monto < 5000 y luego enviar contrato"
    );
    detail.save_description(&api).await.expect("save description");

    let patches = api.patches.lock().expect("patches lock");
    assert_eq!(
        patches[0].description.as_deref(),
        Some("<p>Llamar si monto &lt; 5000 y luego enviar contrato</p>")
    );
}

#[tokio::test]
async fn associate_scopes_listing_until_a_term_is_typed() {
    let mut api = FakeApi::with_deal(deal(1));
    api.companies = vec![
        CompanyDto {
            id: 10,
            name: "ACME".to_string(),
            domain: Some("acme.pe".to_string()),
        },
        CompanyDto {
            id: 11,
            name: "Andes SAC".to_string(),
            domain: None,
        },
    ];
    let mut panel = AssociatePanel::new(&deal(1), EntityKind::Company).expect("company panel");

    panel.search(&api).await.expect("scoped search");
    panel.set_search("andes");
    panel.search(&api).await.expect("term search");

    {
        let queries = api.queries.lock().expect("queries lock");
        assert_eq!(queries[0].deal_id, Some(1));
        assert_eq!(queries[0].search, None);
        assert_eq!(queries[1].deal_id, None);
        assert_eq!(queries[1].search.as_deref(), Some("andes"));
    }

    assert_eq!(panel.candidates().len(), 2);
    assert!(panel.is_checked(10));
    assert!(!panel.is_checked(11));

    assert!(panel.toggle(11));
    assert!(!panel.toggle(10));
    let changes = panel.save();
    assert_eq!(changes.added, vec![11]);
    assert_eq!(changes.removed, vec![10]);
}

#[test]
fn associate_rejects_tasks() {
    assert!(AssociatePanel::new(&deal(1), EntityKind::Task).is_err());
}

#[test]
fn zero_row_table_leaves_description_untouched() {
    let mut detail = DealDetail::from_parts(deal(1), Vec::new());
    let before = detail.description().html();

    let err = detail
        .description_mut()
        .insert_table("0", "3")
        .expect_err("zero rows");
    assert!(matches!(err, EditorError::InvalidTableSize { .. }));
    assert_eq!(detail.description().html(), before);

    detail
        .description_mut()
        .insert_table("2", "2")
        .expect("valid table");
    assert!(detail.description().html().contains("<table>"));
}
