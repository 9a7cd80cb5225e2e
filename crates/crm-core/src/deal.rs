use anyhow::Context;
use chrono::{
  DateTime,
  NaiveDate,
  TimeDelta,
  Utc
};
use crm_shared::{
  DealDto,
  DealPatch
};
use tracing::{
  error,
  info
};

use crate::api::CrmApi;
use crate::editor::Editor;
use crate::entity::EntityRef;
use crate::feed::{
  FeedFilter,
  FeedItem,
  merge_feed,
  sort_feed
};
use crate::modal::{
  Draft,
  SubmitOutcome,
  TaskDraft,
  complete_saved_item,
  send_submission
};

pub const NOTICE_SECS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
  Success,
  Error
}

/// Transient banner shown after a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub kind:       NoticeKind,
  pub message:    String,
  pub expires_at: DateTime<Utc>
}

impl Notice {
  fn new(
    kind: NoticeKind,
    message: impl Into<String>,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      kind,
      message: message.into(),
      expires_at: now
        + TimeDelta::seconds(NOTICE_SECS)
    }
  }

  pub fn is_visible(
    &self,
    now: DateTime<Utc>
  ) -> bool {
    now < self.expires_at
  }
}

/// Deal page state: the deal, its merged
/// activity feed and the description
/// editor.
#[derive(Debug, Clone)]
pub struct DealDetail {
  deal:        DealDto,
  feed:        Vec<FeedItem>,
  filter:      FeedFilter,
  description: Editor,
  notice:      Option<Notice>
}

impl DealDetail {
  /// Fetches the deal, its activities and
  /// its tasks concurrently.
  #[tracing::instrument(skip(api))]
  pub async fn load<A: CrmApi>(
    api: &A,
    id: u64
  ) -> anyhow::Result<Self> {
    let (deal, activities, tasks) = tokio::try_join!(
      api.get_deal(id),
      api.list_activities(id),
      api.list_tasks(id)
    )
    .with_context(|| {
      format!("failed loading deal {id}")
    })?;

    info!(
      deal = deal.id,
      activities = activities.len(),
      tasks = tasks.len(),
      "loaded deal"
    );
    Ok(Self::from_parts(
      deal,
      merge_feed(activities, tasks)
    ))
  }

  pub fn from_parts(
    deal: DealDto,
    feed: Vec<FeedItem>
  ) -> Self {
    let description = Editor::from_html(
      deal.description.as_deref().unwrap_or("")
    );
    Self {
      deal,
      feed,
      filter: FeedFilter::default(),
      description,
      notice: None
    }
  }

  pub fn deal(&self) -> &DealDto {
    &self.deal
  }

  pub fn entity(&self) -> EntityRef {
    EntityRef::deal(self.deal.id)
  }

  pub fn feed(&self) -> &[FeedItem] {
    &self.feed
  }

  pub fn filter(&self) -> &FeedFilter {
    &self.filter
  }

  pub fn filter_mut(
    &mut self
  ) -> &mut FeedFilter {
    &mut self.filter
  }

  pub fn visible(
    &self,
    today: NaiveDate
  ) -> Vec<&FeedItem> {
    self.filter.apply(&self.feed, today)
  }

  pub fn description(&self) -> &Editor {
    &self.description
  }

  pub fn description_mut(
    &mut self
  ) -> &mut Editor {
    &mut self.description
  }

  /// Adds an item a create dialog just
  /// saved.
  pub fn push_saved(&mut self, item: FeedItem) {
    self.feed.push(item);
    sort_feed(&mut self.feed);
  }

  #[tracing::instrument(skip(self, api), fields(deal = self.deal.id))]
  pub async fn save_description<A: CrmApi>(
    &mut self,
    api: &A
  ) -> anyhow::Result<()> {
    let html = if self.description.is_empty() {
      String::new()
    } else {
      self.description.html()
    };
    let patch = DealPatch {
      description: Some(html.clone()),
      ..DealPatch::default()
    };
    let updated = api
      .update_deal(self.deal.id, &patch)
      .await
      .with_context(|| {
        format!(
          "failed saving description of deal {}",
          self.deal.id
        )
      })?;

    self.deal.description =
      updated.description.or(Some(html));
    info!(bytes = self.deal.description.as_ref().map_or(0, String::len), "description saved");
    Ok(())
  }

  /// Creates a task on this deal from the
  /// inline form and raises a banner with
  /// the result.
  #[tracing::instrument(skip(self, api, draft), fields(deal = self.deal.id))]
  pub async fn add_task<A: CrmApi>(
    &mut self,
    api: &A,
    draft: &TaskDraft,
    now: DateTime<Utc>
  ) -> SubmitOutcome {
    if draft.title.trim().is_empty() {
      return SubmitOutcome::Blocked;
    }
    let submission =
      draft.submission(self.entity());

    match send_submission(api, &submission).await
    {
      | Ok(mut item) => {
        complete_saved_item(
          &mut item,
          &submission,
          now
        );
        info!(task = item.id, "task added");
        self.push_saved(item);
        self.notice = Some(Notice::new(
          NoticeKind::Success,
          "Tarea creada correctamente",
          now
        ));
        SubmitOutcome::Saved
      }
      | Err(err) => {
        error!(error = %err, "task creation failed");
        self.notice = Some(Notice::new(
          NoticeKind::Error,
          format!("No se pudo crear la tarea: {err}"),
          now
        ));
        SubmitOutcome::Failed
      }
    }
  }

  /// The banner, if it has not expired.
  pub fn notice(
    &self,
    now: DateTime<Utc>
  ) -> Option<&Notice> {
    self
      .notice
      .as_ref()
      .filter(|notice| notice.is_visible(now))
  }

  pub fn expire_notice(
    &mut self,
    now: DateTime<Utc>
  ) {
    if self
      .notice
      .as_ref()
      .is_some_and(|notice| !notice.is_visible(now))
    {
      self.notice = None;
    }
  }
}
