use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use crm_shared::EntityLinks;

/// Records an activity or task can hang
/// off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Deal,
  Company,
  Contact,
  Task,
  Ticket
}

impl EntityKind {
  pub const ALL: [EntityKind; 5] = [
    EntityKind::Deal,
    EntityKind::Company,
    EntityKind::Contact,
    EntityKind::Task,
    EntityKind::Ticket
  ];

  pub fn as_key(self) -> &'static str {
    match self {
      | EntityKind::Deal => "deal",
      | EntityKind::Company => "company",
      | EntityKind::Contact => "contact",
      | EntityKind::Task => "task",
      | EntityKind::Ticket => "ticket"
    }
  }

  /// JSON field carrying the foreign key
  /// on activity and task payloads.
  pub fn foreign_key(
    self
  ) -> &'static str {
    match self {
      | EntityKind::Deal => "dealId",
      | EntityKind::Company => {
        "companyId"
      }
      | EntityKind::Contact => {
        "contactId"
      }
      | EntityKind::Task => "taskId",
      | EntityKind::Ticket => "ticketId"
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

impl FromStr for EntityKind {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let key = s.trim().to_ascii_lowercase();
    EntityKind::ALL
      .into_iter()
      .find(|kind| kind.as_key() == key)
      .ok_or_else(|| {
        anyhow!(
          "unknown entity type: {s} \
           (expected deal, company, \
           contact, task or ticket)"
        )
      })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
  pub kind: EntityKind,
  pub id:   u64
}

impl EntityRef {
  pub fn new(
    kind: EntityKind,
    id: u64
  ) -> Self {
    Self { kind, id }
  }

  pub fn deal(id: u64) -> Self {
    Self::new(EntityKind::Deal, id)
  }

  pub fn links(&self) -> EntityLinks {
    let mut links = EntityLinks::default();
    let slot = match self.kind {
      | EntityKind::Deal => {
        &mut links.deal_id
      }
      | EntityKind::Company => {
        &mut links.company_id
      }
      | EntityKind::Contact => {
        &mut links.contact_id
      }
      | EntityKind::Task => {
        &mut links.task_id
      }
      | EntityKind::Ticket => {
        &mut links.ticket_id
      }
    };
    *slot = Some(self.id);
    links
  }
}

impl fmt::Display for EntityRef {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.id)
  }
}

/// Parses `KIND:ID`, e.g. `deal:42`.
impl FromStr for EntityRef {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let (kind, id) =
      s.split_once(':').ok_or_else(|| {
        anyhow!(
          "expected KIND:ID, got: {s}"
        )
      })?;
    let kind = kind.parse()?;
    let id = id.trim().parse().map_err(
      |err| {
        anyhow!(
          "invalid entity id {id:?}: \
           {err}"
        )
      }
    )?;
    Ok(Self { kind, id })
  }
}
