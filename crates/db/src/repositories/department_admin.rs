use chrono::Utc;
use sqlx::Row;

use edara_core::domain::department::{DepartmentAdmin, DepartmentId};

use super::{decode_err, DepartmentAdminRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDepartmentAdminRepository {
    pool: DbPool,
}

impl SqlDepartmentAdminRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_admin(row: &sqlx::sqlite::SqliteRow) -> Result<DepartmentAdmin, RepositoryError> {
    let department_id: String = row.try_get("department_id").map_err(decode_err)?;
    let user_id: String = row.try_get("user_id").map_err(decode_err)?;
    let admin_order: i64 = row.try_get("admin_order").map_err(decode_err)?;
    let is_purchase_admin: bool = row.try_get("is_purchase_admin").map_err(decode_err)?;

    Ok(DepartmentAdmin {
        department_id: DepartmentId(department_id),
        user_id,
        admin_order: u32::try_from(admin_order).map_err(decode_err)?,
        is_purchase_admin,
    })
}

#[async_trait::async_trait]
impl DepartmentAdminRepository for SqlDepartmentAdminRepository {
    async fn list_for_department(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Vec<DepartmentAdmin>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT department_id, user_id, admin_order, is_purchase_admin
             FROM department_admin
             WHERE department_id = ?
             ORDER BY admin_order ASC, is_purchase_admin ASC, user_id ASC",
        )
        .bind(&department_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_admin).collect::<Result<Vec<_>, _>>()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DepartmentAdmin>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT department_id, user_id, admin_order, is_purchase_admin
             FROM department_admin
             WHERE user_id = ?
             ORDER BY department_id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_admin).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, admin: DepartmentAdmin) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO department_admin (department_id, user_id, admin_order, is_purchase_admin,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(department_id, user_id) DO UPDATE SET
                 admin_order = excluded.admin_order,
                 is_purchase_admin = excluded.is_purchase_admin,
                 updated_at = excluded.updated_at",
        )
        .bind(&admin.department_id.0)
        .bind(&admin.user_id)
        .bind(i64::from(admin.admin_order))
        .bind(admin.is_purchase_admin)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(
        &self,
        department_id: &DepartmentId,
        user_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM department_admin WHERE department_id = ? AND user_id = ?")
                .bind(&department_id.0)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use edara_core::domain::department::{DepartmentAdmin, DepartmentId};

    use super::SqlDepartmentAdminRepository;
    use crate::repositories::DepartmentAdminRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn roster_lists_in_approval_order() {
        let repo = SqlDepartmentAdminRepository::new(setup().await);
        let dept = DepartmentId("DEP-1".to_string());

        repo.save(DepartmentAdmin::purchase(&dept, "buyer-1", 1)).await.expect("save");
        repo.save(DepartmentAdmin::regular(&dept, "reg-1", 1)).await.expect("save");
        repo.save(DepartmentAdmin::regular(&dept, "reg-0", 0)).await.expect("save");
        repo.save(DepartmentAdmin::regular(&DepartmentId("DEP-2".to_string()), "other", 0))
            .await
            .expect("save");

        let roster = repo.list_for_department(&dept).await.expect("list");
        let users: Vec<&str> = roster.iter().map(|admin| admin.user_id.as_str()).collect();
        assert_eq!(users, vec!["reg-0", "reg-1", "buyer-1"]);
        assert!(roster[2].is_purchase_admin);
    }

    #[tokio::test]
    async fn save_replaces_existing_membership() {
        let repo = SqlDepartmentAdminRepository::new(setup().await);
        let dept = DepartmentId("DEP-1".to_string());

        repo.save(DepartmentAdmin::regular(&dept, "admin-1", 0)).await.expect("save");
        repo.save(DepartmentAdmin::purchase(&dept, "admin-1", 3)).await.expect("resave");

        let roster = repo.list_for_department(&dept).await.expect("list");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].admin_order, 3);
        assert!(roster[0].is_purchase_admin);
    }

    #[tokio::test]
    async fn list_for_user_spans_departments() {
        let repo = SqlDepartmentAdminRepository::new(setup().await);
        repo.save(DepartmentAdmin::regular(&DepartmentId("DEP-1".to_string()), "admin-1", 0))
            .await
            .expect("save");
        repo.save(DepartmentAdmin::purchase(&DepartmentId("DEP-2".to_string()), "admin-1", 2))
            .await
            .expect("save");

        let memberships = repo.list_for_user("admin-1").await.expect("list");
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[1].department_id.0, "DEP-2");
    }

    #[tokio::test]
    async fn remove_reports_whether_row_existed() {
        let repo = SqlDepartmentAdminRepository::new(setup().await);
        let dept = DepartmentId("DEP-1".to_string());
        repo.save(DepartmentAdmin::regular(&dept, "admin-1", 0)).await.expect("save");

        assert!(repo.remove(&dept, "admin-1").await.expect("remove"));
        assert!(!repo.remove(&dept, "admin-1").await.expect("remove again"));
        assert!(repo.list_for_department(&dept).await.expect("list").is_empty());
    }
}
