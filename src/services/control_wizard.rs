//! Multi-step creation of a control work.
//!
//! The draft moves through `details -> tasks -> settings -> confirm`. Each step validates its
//! input and merges it into the draft; earlier steps may be revisited without losing later
//! input unless that input no longer fits. Drafts live in Redis under `wizard:{id}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::redis::RedisHandle;
use crate::services::errors::DomainError;
use crate::services::variant_builder::{check_plan, VariantPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WizardStep {
    Details,
    Tasks,
    Settings,
    Confirm,
}

impl WizardStep {
    fn next(self) -> Self {
        match self {
            WizardStep::Details => WizardStep::Tasks,
            WizardStep::Tasks => WizardStep::Settings,
            WizardStep::Settings | WizardStep::Confirm => WizardStep::Confirm,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            WizardStep::Details => "details",
            WizardStep::Tasks => "tasks",
            WizardStep::Settings => "settings",
            WizardStep::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct WizardDraft {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    /// The furthest step the draft may be submitted at.
    pub(crate) step: WizardStep,
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) task_pool: Vec<String>,
    pub(crate) tasks_per_variant: Option<usize>,
    pub(crate) variants_count: Option<usize>,
    pub(crate) time_limit_minutes: Option<i32>,
}

/// Everything needed to create the control work and its variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfirmedDraft {
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) task_pool: Vec<String>,
    pub(crate) plan: VariantPlan,
    pub(crate) time_limit_minutes: Option<i32>,
}

impl WizardDraft {
    pub(crate) fn new(id: String, owner_id: String) -> Self {
        Self {
            id,
            owner_id,
            step: WizardStep::Details,
            title: None,
            description: None,
            task_pool: Vec::new(),
            tasks_per_variant: None,
            variants_count: None,
            time_limit_minutes: None,
        }
    }

    pub(crate) fn apply_details(
        &mut self,
        title: &str,
        description: Option<&str>,
    ) -> Result<(), DomainError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DomainError::Invalid("Title must not be empty".to_string()));
        }
        self.title = Some(title.to_string());
        self.description =
            description.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string);
        self.reached(WizardStep::Details);
        Ok(())
    }

    /// Replaces the pool. Duplicate ids collapse, first occurrence wins. Settings that no
    /// longer fit the new pool are dropped.
    pub(crate) fn apply_tasks(&mut self, task_ids: &[String]) -> Result<(), DomainError> {
        self.require(WizardStep::Tasks)?;

        let mut pool: Vec<String> = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            if !pool.contains(task_id) {
                pool.push(task_id.clone());
            }
        }
        if pool.is_empty() {
            return Err(DomainError::Invalid("Select at least one task".to_string()));
        }

        self.task_pool = pool;
        if self.tasks_per_variant.is_some_and(|per_variant| per_variant > self.task_pool.len()) {
            self.tasks_per_variant = None;
            self.variants_count = None;
            self.step = WizardStep::Settings;
        }
        self.reached(WizardStep::Tasks);
        Ok(())
    }

    pub(crate) fn apply_settings(
        &mut self,
        tasks_per_variant: usize,
        variants_count: usize,
        time_limit_minutes: Option<i32>,
    ) -> Result<(), DomainError> {
        self.require(WizardStep::Settings)?;
        check_plan(
            self.task_pool.len(),
            VariantPlan { tasks_per_variant, variant_count: variants_count },
        )?;
        if time_limit_minutes.is_some_and(|minutes| minutes <= 0) {
            return Err(DomainError::Invalid("Time limit must be positive".to_string()));
        }

        self.tasks_per_variant = Some(tasks_per_variant);
        self.variants_count = Some(variants_count);
        self.time_limit_minutes = time_limit_minutes;
        self.reached(WizardStep::Settings);
        Ok(())
    }

    pub(crate) fn confirm(&self) -> Result<ConfirmedDraft, DomainError> {
        self.require(WizardStep::Confirm)?;
        let (Some(title), Some(tasks_per_variant), Some(variant_count)) =
            (self.title.clone(), self.tasks_per_variant, self.variants_count)
        else {
            return Err(DomainError::Invalid("Wizard is incomplete".to_string()));
        };
        let plan = VariantPlan { tasks_per_variant, variant_count };
        check_plan(self.task_pool.len(), plan)?;

        Ok(ConfirmedDraft {
            title,
            description: self.description.clone(),
            task_pool: self.task_pool.clone(),
            plan,
            time_limit_minutes: self.time_limit_minutes,
        })
    }

    fn require(&self, step: WizardStep) -> Result<(), DomainError> {
        if self.step < step {
            return Err(DomainError::Invalid(format!(
                "Complete the '{}' step before '{}'",
                self.step.as_str(),
                step.as_str()
            )));
        }
        Ok(())
    }

    fn reached(&mut self, step: WizardStep) {
        self.step = self.step.max(step.next());
    }
}

#[derive(Debug, Error)]
pub(crate) enum WizardStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid wizard payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub(crate) fn wizard_key(id: &str) -> String {
    format!("wizard:{id}")
}

pub(crate) async fn load_draft(
    redis: &RedisHandle,
    id: &str,
) -> Result<Option<WizardDraft>, WizardStoreError> {
    let Some(raw) = redis.get_string(&wizard_key(id)).await? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Writes the draft and restarts its TTL.
pub(crate) async fn store_draft(
    redis: &RedisHandle,
    draft: &WizardDraft,
    ttl_seconds: u64,
) -> Result<(), WizardStoreError> {
    let raw = serde_json::to_string(draft)?;
    redis.set_string_with_ttl(&wizard_key(&draft.id), &raw, ttl_seconds).await?;
    Ok(())
}

pub(crate) async fn discard_draft(redis: &RedisHandle, id: &str) -> Result<(), WizardStoreError> {
    redis.delete(&wizard_key(id)).await?;
    Ok(())
}
