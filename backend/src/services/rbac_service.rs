//! Role-based access control: permissions, org-scoped roles, assignments.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::rbac::{OrgRole, Permission, RolePermission, UserOrgRole};

pub struct RbacService {
    db: PgPool,
}

impl RbacService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ===== Permissions =====

    pub async fn create_permission(
        &self,
        name: &str,
        description: Option<&str>,
        resource: &str,
        action: &str,
    ) -> Result<Permission> {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM permissions WHERE resource = $1 AND action = $2")
                .bind(resource)
                .bind(action)
                .fetch_optional(&self.db)
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Permission {resource}:{action} already exists"
            )));
        }

        let permission = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (name, description, resource, action)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(resource)
        .bind(action)
        .fetch_one(&self.db)
        .await?;
        Ok(permission)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let rows = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions ORDER BY resource, action",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn delete_permission(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Permission {id} not found")));
        }
        Ok(())
    }

    // ===== Roles =====

    pub async fn create_role(
        &self,
        organization_id: Uuid,
        name: &str,
        description: Option<&str>,
        created_by: Option<Uuid>,
    ) -> Result<OrgRole> {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM org_roles WHERE organization_id = $1 AND name = $2")
                .bind(organization_id)
                .bind(name)
                .fetch_optional(&self.db)
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Role '{name}' already exists in this organization"
            )));
        }

        let role = sqlx::query_as::<_, OrgRole>(
            r#"
            INSERT INTO org_roles (organization_id, name, description, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(name)
        .bind(description)
        .bind(created_by)
        .fetch_one(&self.db)
        .await?;
        Ok(role)
    }

    /// Find or create the organization's "member" role, used when a user
    /// joins without an explicit role.
    pub async fn default_role(&self, organization_id: Uuid) -> Result<OrgRole> {
        let existing = sqlx::query_as::<_, OrgRole>(
            "SELECT * FROM org_roles WHERE organization_id = $1 AND name = 'member'",
        )
        .bind(organization_id)
        .fetch_optional(&self.db)
        .await?;
        match existing {
            Some(role) => Ok(role),
            None => {
                self.create_role(organization_id, "member", Some("Default member role"), None)
                    .await
            }
        }
    }

    pub async fn get_role(&self, id: Uuid) -> Result<OrgRole> {
        sqlx::query_as::<_, OrgRole>("SELECT * FROM org_roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role {id} not found")))
    }

    pub async fn list_roles(&self, organization_id: Uuid) -> Result<Vec<OrgRole>> {
        let rows = sqlx::query_as::<_, OrgRole>(
            "SELECT * FROM org_roles WHERE organization_id = $1 ORDER BY name",
        )
        .bind(organization_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn delete_role(&self, id: Uuid) -> Result<()> {
        let role = self.get_role(id).await?;
        if role.is_system_role {
            return Err(AppError::Validation(
                "System roles cannot be deleted".into(),
            ));
        }
        sqlx::query("DELETE FROM org_roles WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ===== Role permissions =====

    pub async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<RolePermission> {
        let grant = sqlx::query_as::<_, RolePermission>(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_id) DO UPDATE SET role_id = EXCLUDED.role_id
            RETURNING *
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .fetch_one(&self.db)
        .await?;
        Ok(grant)
    }

    pub async fn revoke_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "Permission is not granted to this role".into(),
            ));
        }
        Ok(())
    }

    pub async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>> {
        let rows = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.*
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    // ===== User role assignments =====

    pub async fn assign_role(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<UserOrgRole> {
        let role = self.get_role(role_id).await?;
        if role.organization_id != organization_id {
            return Err(AppError::Validation(
                "Role belongs to a different organization".into(),
            ));
        }

        let assignment = sqlx::query_as::<_, UserOrgRole>(
            r#"
            INSERT INTO user_org_roles (user_id, organization_id, role_id, assigned_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, organization_id, role_id) DO UPDATE SET role_id = EXCLUDED.role_id
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(role_id)
        .bind(assigned_by)
        .fetch_one(&self.db)
        .await?;
        Ok(assignment)
    }

    pub async fn remove_role(&self, user_id: Uuid, organization_id: Uuid, role_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM user_org_roles WHERE user_id = $1 AND organization_id = $2 AND role_id = $3",
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(role_id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Role assignment not found".into()));
        }
        Ok(())
    }

    pub async fn user_roles(&self, user_id: Uuid, organization_id: Uuid) -> Result<Vec<OrgRole>> {
        let rows = sqlx::query_as::<_, OrgRole>(
            r#"
            SELECT r.*
            FROM org_roles r
            JOIN user_org_roles uor ON uor.role_id = r.id
            WHERE uor.user_id = $1 AND uor.organization_id = $2
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Organizations where the user holds at least one role.
    pub async fn user_organizations(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT organization_id FROM user_org_roles WHERE user_id = $1 \
             ORDER BY organization_id",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Whether the user holds any role granting `resource`:`action` in the
    /// org. A `manage` grant on the resource covers every action on it.
    pub async fn user_has_permission(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool> {
        let granted: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.action
            FROM user_org_roles uor
            JOIN role_permissions rp ON rp.role_id = uor.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE uor.user_id = $1
              AND uor.organization_id = $2
              AND p.resource = $3
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(resource)
        .fetch_all(&self.db)
        .await?;
        Ok(granted
            .iter()
            .any(|(granted,)| action_grants(granted, action)))
    }
}

/// Whether a granted action covers a requested one.
fn action_grants(granted: &str, requested: &str) -> bool {
    granted == requested || granted == "manage"
}
