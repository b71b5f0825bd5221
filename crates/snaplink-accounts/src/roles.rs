use std::sync::Arc;

use jiff::Timestamp;
use snaplink_core::{
    list_page, NewRole, Page, PageLimits, RecordId, RoleFilter, RolePatch, RoleRecord,
    RoleRepository,
};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::{AccountError, Result};
use crate::validation::{self, MAX_DESCRIPTION_CHARS, MAX_ROLE_NAME_CHARS};

/// Input for [`RoleService::create`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateRole {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default, setter(strip_option, into))]
    pub description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub created_by: Option<String>,
}

/// Input for [`RoleService::update`]. A blank description clears it.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option, into)))]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub updated_by: Option<String>,
}

#[derive(Debug)]
pub struct RoleService<R> {
    repository: Arc<R>,
    page_limits: PageLimits,
}

impl<R> Clone for RoleService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            page_limits: self.page_limits,
        }
    }
}

impl<R: RoleRepository> RoleService<R> {
    pub fn new(repository: R, page_limits: PageLimits) -> Self {
        Self::from_shared(Arc::new(repository), page_limits)
    }

    pub fn from_shared(repository: Arc<R>, page_limits: PageLimits) -> Self {
        Self {
            repository,
            page_limits,
        }
    }

    pub async fn create(&self, role: CreateRole) -> Result<RoleRecord> {
        self.create_at(role, Timestamp::now()).await
    }

    pub async fn create_at(&self, role: CreateRole, now: Timestamp) -> Result<RoleRecord> {
        let new_role = NewRole {
            name: validation::required_text("name", &role.name, MAX_ROLE_NAME_CHARS)?,
            description: validation::optional_text(
                "description",
                role.description.as_deref(),
                MAX_DESCRIPTION_CHARS,
            )?,
            created_by: role.created_by,
            created_at: now,
        };

        let created = self.repository.insert(new_role).await?;
        info!(id = %created.id, name = %created.name, "role created");
        Ok(created)
    }

    pub async fn get(&self, id: RecordId, include_deleted: bool) -> Result<RoleRecord> {
        self.repository
            .get(id, include_deleted)
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("role {id}")))
    }

    pub async fn list(
        &self,
        filter: RoleFilter,
        cursor: Option<&str>,
        requested_limit: Option<i64>,
    ) -> Result<Page<RoleRecord>> {
        let limit = self.page_limits.clamp(requested_limit);
        Ok(list_page(self.repository.as_ref(), filter, cursor, limit).await?)
    }

    pub async fn update(&self, id: RecordId, changes: UpdateRole) -> Result<RoleRecord> {
        let patch = RolePatch {
            name: changes
                .name
                .as_deref()
                .map(|name| validation::required_text("name", name, MAX_ROLE_NAME_CHARS))
                .transpose()?,
            description: changes
                .description
                .as_deref()
                .map(|text| {
                    validation::optional_text("description", Some(text), MAX_DESCRIPTION_CHARS)
                })
                .transpose()?,
            is_active: changes.is_active,
        };
        if patch.is_empty() {
            return Err(AccountError::Validation("nothing to update".to_string()));
        }

        let updated = self
            .repository
            .update(id, patch, changes.updated_by)
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("role {id}")))?;
        info!(id = %id, name = %updated.name, "role updated");
        Ok(updated)
    }

    /// Soft-deletes a role. Users keep referring to it.
    pub async fn delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<()> {
        if !self.repository.soft_delete(id, deleted_by).await? {
            return Err(AccountError::NotFound(format!("role {id}")));
        }
        info!(id = %id, "role deleted");
        Ok(())
    }
}
