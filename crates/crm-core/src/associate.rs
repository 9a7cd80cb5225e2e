use std::collections::BTreeSet;

use anyhow::{
  Context,
  bail
};
use crm_shared::{
  DealDto,
  ListQuery
};
use tracing::{
  debug,
  info,
  warn
};

use crate::api::CrmApi;
use crate::entity::EntityKind;

/// A record offered in the associate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
  pub id:     u64,
  pub label:  String,
  pub detail: Option<String>
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationChanges {
  pub added:   Vec<u64>,
  pub removed: Vec<u64>
}

impl AssociationChanges {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty()
  }
}

/// Staging area for linking companies,
/// contacts or other deals to a deal.
#[derive(Debug, Clone)]
pub struct AssociatePanel {
  deal_id:    u64,
  kind:       EntityKind,
  linked:     BTreeSet<u64>,
  staged:     BTreeSet<u64>,
  search:     String,
  candidates: Vec<Candidate>
}

impl AssociatePanel {
  pub fn new(
    deal: &DealDto,
    kind: EntityKind
  ) -> anyhow::Result<Self> {
    let linked: BTreeSet<u64> = match kind {
      | EntityKind::Company => deal
        .companies
        .iter()
        .map(|company| company.id)
        .collect(),
      | EntityKind::Contact => deal
        .contacts
        .iter()
        .map(|contact| contact.id)
        .collect(),
      | EntityKind::Deal => BTreeSet::new(),
      | EntityKind::Task | EntityKind::Ticket => {
        bail!(
          "cannot associate {kind} records \
           with a deal"
        )
      }
    };
    Ok(Self {
      deal_id: deal.id,
      kind,
      staged: linked.clone(),
      linked,
      search: String::new(),
      candidates: Vec::new()
    })
  }

  pub fn kind(&self) -> EntityKind {
    self.kind
  }

  pub fn candidates(&self) -> &[Candidate] {
    &self.candidates
  }

  pub fn set_search(
    &mut self,
    term: impl Into<String>
  ) {
    self.search = term.into();
  }

  /// Without a search term the listing is
  /// scoped to the deal's links; with one
  /// it searches everything.
  pub fn query(&self) -> ListQuery {
    let term = self.search.trim();
    if term.is_empty() {
      ListQuery {
        search:  None,
        deal_id: Some(self.deal_id)
      }
    } else {
      ListQuery {
        search:  Some(term.to_string()),
        deal_id: None
      }
    }
  }

  #[tracing::instrument(skip(self, api), fields(deal = self.deal_id, kind = %self.kind))]
  pub async fn search<A: CrmApi>(
    &mut self,
    api: &A
  ) -> anyhow::Result<&[Candidate]> {
    let query = self.query();
    let candidates = match self.kind {
      | EntityKind::Company => api
        .list_companies(&query)
        .await
        .context("failed listing companies")?
        .into_iter()
        .map(|company| Candidate {
          id:     company.id,
          label:  company.name,
          detail: company.domain
        })
        .collect(),
      | EntityKind::Contact => api
        .list_contacts(&query)
        .await
        .context("failed listing contacts")?
        .into_iter()
        .map(|contact| Candidate {
          id:     contact.id,
          label:  contact.full_name(),
          detail: contact.email
        })
        .collect(),
      | EntityKind::Deal => {
        let own = self.deal_id;
        api
          .list_deals(&query)
          .await
          .context("failed listing deals")?
          .into_iter()
          .filter(|deal| deal.id != own)
          .map(|deal| Candidate {
            id:     deal.id,
            label:  deal.name,
            detail: deal.stage
          })
          .collect()
      }
      | EntityKind::Task | EntityKind::Ticket => {
        Vec::new()
      }
    };
    self.candidates = candidates;
    debug!(found = self.candidates.len(), "associate candidates loaded");
    Ok(&self.candidates)
  }

  /// Flips the staged state of `id` and
  /// returns whether it is now checked.
  pub fn toggle(&mut self, id: u64) -> bool {
    if self.staged.remove(&id) {
      false
    } else {
      self.staged.insert(id);
      true
    }
  }

  pub fn is_checked(&self, id: u64) -> bool {
    self.staged.contains(&id)
  }

  pub fn changes(&self) -> AssociationChanges {
    AssociationChanges {
      added:   self
        .staged
        .difference(&self.linked)
        .copied()
        .collect(),
      removed: self
        .linked
        .difference(&self.staged)
        .copied()
        .collect()
    }
  }

  /// Reports the staged changes.
  // TODO: persist once the backend exposes
  // an endpoint for writing deal
  // associations; until then nothing is
  // sent.
  #[tracing::instrument(skip(self), fields(deal = self.deal_id, kind = %self.kind))]
  pub fn save(&self) -> AssociationChanges {
    let changes = self.changes();
    if changes.is_empty() {
      info!("no association changes staged");
    } else {
      warn!(
        added = ?changes.added,
        removed = ?changes.removed,
        "association changes staged but not persisted"
      );
    }
    changes
  }
}
