use std::collections::BTreeSet;

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use crm_shared::{ActivityType, DealDto, TaskPriority};
use tracing::{info, instrument, warn};

use crate::api::{CrmApi, HttpApi};
use crate::associate::AssociatePanel;
use crate::calendar::DatePicker;
use crate::cli::{Command, CreateArgs};
use crate::config::Config;
use crate::datetime::{
    DateInput, current_date_peru, format_date_input_peru, format_date_peru, format_date_time_peru,
    parse_iso_date,
};
use crate::deal::DealDetail;
use crate::editor::Editor;
use crate::entity::EntityKind;
use crate::feed::{FeedFilter, parse_activity_type};
use crate::keyboard::ShortcutHub;
use crate::modal::{Draft, MeetingDraft, ModalController, NoteDraft, SubmitOutcome, TaskDraft};
use crate::render::Renderer;

#[instrument(skip(cfg, renderer, command))]
pub async fn dispatch(
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Date { input } => cmd_date(renderer, &input),
        Command::Calendar { month, selected } => {
            cmd_calendar(renderer, month.as_deref(), selected.as_deref())
        }
        Command::Deal {
            id,
            search,
            kinds,
            range,
        } => {
            let api = HttpApi::from_config(cfg)?;
            let kinds = kinds
                .iter()
                .map(|kind| parse_activity_type(kind))
                .collect::<anyhow::Result<BTreeSet<ActivityType>>>()?;
            let filter = FeedFilter {
                search: search.unwrap_or_default(),
                kinds,
                range,
            };
            cmd_deal(&api, renderer, id, filter).await
        }
        Command::Meeting(args) => {
            let api = HttpApi::from_config(cfg)?;
            cmd_create::<MeetingDraft, _>(&api, renderer, args, |draft, args| {
                draft.subject = args.title.clone();
                draft.description = description_editor(args);
                if let Some(due) = &args.due {
                    draft.due.set(due)?;
                }
                Ok(())
            })
            .await
        }
        Command::Note(args) => {
            let api = HttpApi::from_config(cfg)?;
            if args.due.is_some() {
                warn!("notes have no due date; ignoring --due");
            }
            cmd_create::<NoteDraft, _>(&api, renderer, args, |draft, args| {
                draft.subject = args.title.clone();
                draft.description = description_editor(args);
                Ok(())
            })
            .await
        }
        Command::Task(task) => {
            let api = HttpApi::from_config(cfg)?;
            let priority = task.priority;
            if task.base.on.kind == EntityKind::Deal {
                return cmd_deal_task(&api, renderer, &task.base, priority).await;
            }
            cmd_create::<TaskDraft, _>(&api, renderer, task.base, move |draft, args| {
                draft.title = args.title.clone();
                draft.description = description_editor(args);
                draft.priority = priority;
                if let Some(due) = &args.due {
                    draft.due.set(due)?;
                }
                Ok(())
            })
            .await
        }
        Command::Describe { deal_id, html } => {
            let api = HttpApi::from_config(cfg)?;
            cmd_describe(&api, deal_id, &html).await
        }
        Command::Associate {
            deal_id,
            kind,
            search,
            add,
            remove,
        } => {
            let api = HttpApi::from_config(cfg)?;
            cmd_associate(&api, renderer, deal_id, kind, search, &add, &remove).await
        }
    }
}

#[instrument(skip(renderer))]
fn cmd_date(renderer: &mut Renderer, input: &str) -> anyhow::Result<()> {
    let value = if input.trim().eq_ignore_ascii_case("now") {
        DateInput::Instant(Utc::now())
    } else {
        DateInput::Text(input)
    };
    let date = format_date_peru(value);
    if date.is_empty() {
        bail!("unrecognised date: {input}");
    }
    renderer.print_dates(
        &date,
        &format_date_time_peru(value),
        &format_date_input_peru(value),
    )
}

#[instrument(skip(renderer))]
fn cmd_calendar(
    renderer: &mut Renderer,
    month: Option<&str>,
    selected: Option<&str>,
) -> anyhow::Result<()> {
    let mut picker = DatePicker::new(current_date_peru());
    if let Some(value) = selected {
        if parse_iso_date(value).is_none() {
            bail!("invalid --selected date {value:?}; expected YYYY-MM-DD");
        }
        picker.open_at(Some(value));
    }
    if let Some(month) = month {
        let first = parse_iso_date(&format!("{}-01", month.trim()))
            .ok_or_else(|| anyhow!("invalid --month {month:?}; expected YYYY-MM"))?;
        picker.show_month(first);
    }
    renderer.print_calendar(&picker)
}

#[instrument(skip(api, renderer, filter))]
async fn cmd_deal<A: CrmApi>(
    api: &A,
    renderer: &mut Renderer,
    id: u64,
    filter: FeedFilter,
) -> anyhow::Result<()> {
    let mut detail = DealDetail::load(api, id).await?;
    *detail.filter_mut() = filter;
    let today = current_date_peru();
    let items = detail.visible(today);
    info!(shown = items.len(), total = detail.feed().len(), "feed filtered");
    renderer.print_deal(&detail, &items)
}

fn description_editor(args: &CreateArgs) -> Editor {
    args.description
        .as_deref()
        .map(Editor::from_html)
        .unwrap_or_default()
}

/// Drives a create dialog the way the UI
/// does: open, fill, submit.
async fn cmd_create<D, A>(
    api: &A,
    renderer: &mut Renderer,
    args: CreateArgs,
    fill: impl FnOnce(&mut D, &CreateArgs) -> anyhow::Result<()>,
) -> anyhow::Result<()>
where
    D: Draft,
    A: CrmApi,
{
    let hub = ShortcutHub::new();
    let mut modal = ModalController::<D>::new(args.on, current_date_peru());
    modal.open(&hub);
    fill(modal.draft_mut(), &args)?;

    let mut saved = None;
    let outcome = modal.submit(api, |item| saved = Some(item)).await;
    match outcome {
        SubmitOutcome::Saved => {
            let item = saved.ok_or_else(|| anyhow!("save reported success without an item"))?;
            renderer.print_saved(&item)
        }
        SubmitOutcome::Blocked => Err(anyhow!("a title is required")),
        SubmitOutcome::Ignored => Err(anyhow!("the {} form is not open", D::NAME)),
        SubmitOutcome::Failed => Err(anyhow!(
            "failed to save {}: {}",
            D::NAME,
            modal.last_error().unwrap_or("unknown error")
        )),
    }
}

/// Inline task form on the deal page.
#[instrument(skip(api, renderer, args))]
async fn cmd_deal_task<A: CrmApi>(
    api: &A,
    renderer: &mut Renderer,
    args: &CreateArgs,
    priority: TaskPriority,
) -> anyhow::Result<()> {
    let mut detail = DealDetail::load(api, args.on.id).await?;
    let mut draft = TaskDraft::fresh(current_date_peru());
    draft.title = args.title.clone();
    draft.description = description_editor(args);
    draft.priority = priority;
    if let Some(due) = &args.due {
        draft.due.set(due)?;
    }

    let now = Utc::now();
    let outcome = detail.add_task(api, &draft, now).await;
    if let Some(notice) = detail.notice(now) {
        renderer.print_notice(notice)?;
    }
    match outcome {
        SubmitOutcome::Saved => Ok(()),
        SubmitOutcome::Blocked => Err(anyhow!("a title is required")),
        SubmitOutcome::Ignored | SubmitOutcome::Failed => {
            Err(anyhow!("task was not created on deal {}", args.on.id))
        }
    }
}

#[instrument(skip(api, html))]
async fn cmd_describe<A: CrmApi>(api: &A, deal_id: u64, html: &str) -> anyhow::Result<()> {
    let mut detail = DealDetail::load(api, deal_id).await?;
    if !detail.description_mut().sync_from_html(html) {
        info!("description unchanged; nothing to save");
        return Ok(());
    }
    detail.save_description(api).await?;
    info!(deal = deal_id, "description updated");
    Ok(())
}

#[instrument(skip(api, renderer, add, remove))]
async fn cmd_associate<A: CrmApi>(
    api: &A,
    renderer: &mut Renderer,
    deal_id: u64,
    kind: EntityKind,
    search: Option<String>,
    add: &[u64],
    remove: &[u64],
) -> anyhow::Result<()> {
    let deal: DealDto = api
        .get_deal(deal_id)
        .await
        .with_context(|| format!("failed loading deal {deal_id}"))?;
    let mut panel = AssociatePanel::new(&deal, kind)?;
    if let Some(term) = search {
        panel.set_search(term);
    }
    panel.search(api).await?;

    for id in add {
        if !panel.is_checked(*id) {
            panel.toggle(*id);
        }
    }
    for id in remove {
        if panel.is_checked(*id) {
            panel.toggle(*id);
        }
    }

    renderer.print_candidates(&panel)?;
    renderer.print_changes(&panel.save())
}
