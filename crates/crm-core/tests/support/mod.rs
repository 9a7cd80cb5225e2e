#![allow(dead_code)]

use std::sync::Mutex;

use crm_core::api::{ApiError, ApiResult, CrmApi};
use crm_shared::{
    ActivityCreate, ActivityDto, ActivityType, CompanyDto, ContactDto, DealDto, DealPatch,
    ListQuery, TaskCreate, TaskDto, TaskType,
};

/// In-memory backend recording every call.
#[derive(Debug, Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<String>>,
    pub activities: Mutex<Vec<ActivityCreate>>,
    pub tasks: Mutex<Vec<TaskCreate>>,
    pub queries: Mutex<Vec<ListQuery>>,
    pub patches: Mutex<Vec<DealPatch>>,
    pub fail_writes: Mutex<bool>,
    pub omit_created_at: bool,
    pub deal: Option<DealDto>,
    pub feed_activities: Vec<ActivityDto>,
    pub feed_tasks: Vec<TaskDto>,
    pub companies: Vec<CompanyDto>,
}

impl FakeApi {
    pub fn with_deal(deal: DealDto) -> Self {
        Self {
            deal: Some(deal),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_writes.lock().expect("fail lock") = failing;
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn check_write(&self, path: &str) -> ApiResult<()> {
        if *self.fail_writes.lock().expect("fail lock") {
            return Err(ApiError::Status {
                path: path.to_string(),
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }

    fn created_at(&self, at: &str) -> Option<String> {
        (!self.omit_created_at).then(|| at.to_string())
    }

    fn next_id(&self) -> u64 {
        100 + self.calls.lock().expect("calls lock").len() as u64
    }
}

pub fn deal(id: u64) -> DealDto {
    DealDto {
        id,
        name: "Renovación ACME".to_string(),
        amount: Some(12000.0),
        stage: Some("negotiation".to_string()),
        description: Some("<p>Contrato anual</p>".to_string()),
        close_date: Some("2024-04-30".to_string()),
        created_at: None,
        companies: vec![CompanyDto {
            id: 10,
            name: "ACME".to_string(),
            domain: Some("acme.pe".to_string()),
        }],
        contacts: vec![],
    }
}

pub fn activity(id: u64, kind: ActivityType, created_at: &str) -> ActivityDto {
    ActivityDto {
        id,
        kind,
        subject: Some(format!("actividad {id}")),
        title: None,
        description: None,
        due_date: None,
        created_at: Some(created_at.to_string()),
        user: None,
        created_by: None,
        assigned_to: None,
        deal_id: Some(1),
        company_id: None,
        contact_id: None,
        task_id: None,
        ticket_id: None,
    }
}

impl CrmApi for FakeApi {
    async fn create_activity(&self, payload: &ActivityCreate) -> ApiResult<ActivityDto> {
        self.check_write("activities")?;
        let id = self.next_id();
        self.record(format!("POST activities type={:?}", payload.kind));
        self.activities
            .lock()
            .expect("activities lock")
            .push(payload.clone());
        // The backend does not echo the due date.
        Ok(ActivityDto {
            id,
            kind: payload.kind,
            subject: Some(payload.subject.clone()),
            title: None,
            description: Some(payload.description.clone()),
            due_date: None,
            created_at: self.created_at("2024-03-05T15:00:00Z"),
            user: None,
            created_by: None,
            assigned_to: None,
            deal_id: payload.links.deal_id,
            company_id: payload.links.company_id,
            contact_id: payload.links.contact_id,
            task_id: payload.links.task_id,
            ticket_id: payload.links.ticket_id,
        })
    }

    async fn create_task(&self, payload: &TaskCreate) -> ApiResult<TaskDto> {
        self.check_write("tasks")?;
        let id = self.next_id();
        self.record(format!("POST tasks type={:?}", payload.kind));
        self.tasks.lock().expect("tasks lock").push(payload.clone());
        Ok(TaskDto {
            id,
            title: payload.title.clone(),
            description: Some(payload.description.clone()),
            kind: Some(TaskType::Todo),
            priority: Some(payload.priority),
            status: Some(payload.status),
            due_date: None,
            created_at: self.created_at("2024-03-05T16:00:00Z"),
            assigned_to: None,
            created_by: None,
            deal_id: payload.links.deal_id,
        })
    }

    async fn get_deal(&self, id: u64) -> ApiResult<DealDto> {
        self.record(format!("GET deals/{id}"));
        self.deal.clone().ok_or_else(|| ApiError::Status {
            path: format!("deals/{id}"),
            status: 404,
            body: "not found".to_string(),
        })
    }

    async fn update_deal(&self, id: u64, patch: &DealPatch) -> ApiResult<DealDto> {
        self.check_write("deals")?;
        self.record(format!("PUT deals/{id}"));
        self.patches.lock().expect("patches lock").push(patch.clone());
        let mut updated = self.deal.clone().unwrap_or_else(|| deal(id));
        updated.description = patch.description.clone();
        Ok(updated)
    }

    async fn list_activities(&self, deal_id: u64) -> ApiResult<Vec<ActivityDto>> {
        self.record(format!("GET activities dealId={deal_id}"));
        Ok(self.feed_activities.clone())
    }

    async fn list_tasks(&self, deal_id: u64) -> ApiResult<Vec<TaskDto>> {
        self.record(format!("GET tasks dealId={deal_id}"));
        Ok(self.feed_tasks.clone())
    }

    async fn list_companies(&self, query: &ListQuery) -> ApiResult<Vec<CompanyDto>> {
        self.record("GET companies".to_string());
        self.queries.lock().expect("queries lock").push(query.clone());
        Ok(self.companies.clone())
    }

    async fn list_contacts(&self, query: &ListQuery) -> ApiResult<Vec<ContactDto>> {
        self.record("GET contacts".to_string());
        self.queries.lock().expect("queries lock").push(query.clone());
        Ok(vec![])
    }

    async fn list_deals(&self, query: &ListQuery) -> ApiResult<Vec<DealDto>> {
        self.record("GET deals".to_string());
        self.queries.lock().expect("queries lock").push(query.clone());
        Ok(vec![])
    }
}
