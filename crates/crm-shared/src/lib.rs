use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
  Note,
  Email,
  Call,
  Meeting,
  Task
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  Low,
  Medium,
  High,
  Urgent
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  NotStarted,
  InProgress,
  Completed,
  Cancelled,
  /// Any status this client does not
  /// know; read only.
  #[serde(other)]
  Unknown
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
  Todo,
  Call,
  Email,
  #[serde(other)]
  Unknown
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
  pub id:         u64,
  #[serde(default)]
  pub first_name: Option<String>,
  #[serde(default)]
  pub last_name:  Option<String>,
  #[serde(default)]
  pub email:      Option<String>
}

impl UserRef {
  pub fn display_name(
    &self
  ) -> Option<String> {
    let full = [
      self.first_name.as_deref(),
      self.last_name.as_deref()
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    if full.is_empty() {
      self.email.clone()
    } else {
      Some(full)
    }
  }
}

/// Activity row as returned by
/// `GET /activities` and
/// `POST /activities`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
  pub id:          u64,
  #[serde(rename = "type")]
  pub kind:        ActivityType,
  #[serde(default)]
  pub subject:     Option<String>,
  #[serde(default)]
  pub title:       Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub created_at:  Option<String>,
  #[serde(
    default,
    rename = "User"
  )]
  pub user:        Option<UserRef>,
  #[serde(
    default,
    rename = "CreatedBy"
  )]
  pub created_by:  Option<UserRef>,
  #[serde(
    default,
    rename = "AssignedTo"
  )]
  pub assigned_to: Option<UserRef>,
  #[serde(default)]
  pub deal_id:     Option<u64>,
  #[serde(default)]
  pub company_id:  Option<u64>,
  #[serde(default)]
  pub contact_id:  Option<u64>,
  #[serde(default)]
  pub task_id:     Option<u64>,
  #[serde(default)]
  pub ticket_id:   Option<u64>
}

/// Foreign keys shared by activity and
/// task payloads. Exactly one is set by
/// the form controllers.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct EntityLinks {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub deal_id:    Option<u64>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub company_id: Option<u64>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub contact_id: Option<u64>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub task_id:    Option<u64>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub ticket_id:  Option<u64>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCreate {
  #[serde(rename = "type")]
  pub kind:        ActivityType,
  pub subject:     String,
  pub description: String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date:    Option<String>,
  #[serde(flatten)]
  pub links:       EntityLinks
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  pub id:          u64,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(
    default,
    rename = "type"
  )]
  pub kind:        Option<TaskType>,
  #[serde(default)]
  pub priority:    Option<TaskPriority>,
  #[serde(default)]
  pub status:      Option<TaskStatus>,
  #[serde(default)]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub created_at:  Option<String>,
  #[serde(
    default,
    rename = "AssignedTo"
  )]
  pub assigned_to: Option<UserRef>,
  #[serde(
    default,
    rename = "CreatedBy"
  )]
  pub created_by:  Option<UserRef>,
  #[serde(default)]
  pub deal_id:     Option<u64>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
  pub title:       String,
  pub description: String,
  #[serde(rename = "type")]
  pub kind:        TaskType,
  pub priority:    TaskPriority,
  pub status:      TaskStatus,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date:    Option<String>,
  #[serde(flatten)]
  pub links:       EntityLinks
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDto {
  pub id:     u64,
  pub name:   String,
  #[serde(default)]
  pub domain: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct ContactDto {
  pub id:         u64,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name:  Option<String>,
  #[serde(default)]
  pub email:      Option<String>
}

impl ContactDto {
  pub fn full_name(&self) -> String {
    match self.last_name.as_deref() {
      | Some(last)
        if !last.trim().is_empty() =>
      {
        format!(
          "{} {}",
          self.first_name.trim(),
          last.trim()
        )
      }
      | _ => {
        self.first_name.trim().to_string()
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct DealDto {
  pub id:          u64,
  pub name:        String,
  #[serde(default)]
  pub amount:      Option<f64>,
  #[serde(default)]
  pub stage:       Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub close_date:  Option<String>,
  #[serde(default)]
  pub created_at:  Option<String>,
  #[serde(
    default,
    rename = "Companies"
  )]
  pub companies:   Vec<CompanyDto>,
  #[serde(
    default,
    rename = "Contacts"
  )]
  pub contacts:    Vec<ContactDto>
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct DealPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub name:        Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub stage:       Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub amount:      Option<f64>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub close_date:  Option<String>
}

/// Query for the list endpoints. With
/// no search term the backend scopes the
/// listing to `deal_id`.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub search:  Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub deal_id: Option<u64>
}
