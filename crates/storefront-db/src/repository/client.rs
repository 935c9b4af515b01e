//! # Client Repository
//!
//! Minimal account records: enough for checkout to ask "does this client
//! exist, and are they blocked?".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use storefront_core::ClientStatus;

/// A stored client account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// A freshly registered client in `pending` status.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Client {
            id: id.into(),
            name: name.into(),
            email: None,
            status: ClientStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    /// Inserts a client, or updates name/email/status if the id exists.
    pub async fn upsert(&self, client: &Client) -> DbResult<()> {
        debug!(id = %client.id, status = ?client.status, "Upserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (id, name, email, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&client.id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(client.status)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, email, status, created_at, updated_at
            FROM clients
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// Status only; `None` when the client does not exist.
    pub async fn get_status(&self, id: &str) -> DbResult<Option<ClientStatus>> {
        let status: Option<ClientStatus> =
            sqlx::query_scalar("SELECT status FROM clients WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(status)
    }

    /// Approves or rejects a client.
    pub async fn set_status(&self, id: &str, status: ClientStatus) -> DbResult<()> {
        debug!(id = %id, status = ?status, "Setting client status");

        let result = sqlx::query("UPDATE clients SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }

        Ok(())
    }
}
