//! Organization CRUD.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::organization::Organization;
use crate::models::user::User;

pub struct NewOrganization {
    pub company_name: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub struct OrganizationUpdate {
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

pub struct OrganizationService {
    db: PgPool,
}

impl OrganizationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewOrganization) -> Result<Organization> {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (company_name, tax_id, phone, email)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.company_name)
        .bind(&new.tax_id)
        .bind(&new.phone)
        .bind(&new.email)
        .fetch_one(&self.db)
        .await?;
        Ok(org)
    }

    pub async fn get(&self, id: Uuid) -> Result<Organization> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Organization {id} not found")))
    }

    pub async fn update(&self, id: Uuid, update: OrganizationUpdate) -> Result<Organization> {
        sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET company_name = COALESCE($2, company_name),
                tax_id = COALESCE($3, tax_id),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.company_name)
        .bind(&update.tax_id)
        .bind(&update.phone)
        .bind(&update.email)
        .bind(update.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organization {id} not found")))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Organization {id} not found")));
        }
        Ok(())
    }

    /// All users holding at least one role in the organization.
    pub async fn list_members(&self, id: Uuid) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT DISTINCT u.*
            FROM users u
            JOIN user_org_roles uor ON uor.user_id = u.id
            WHERE uor.organization_id = $1
            ORDER BY u.email
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
