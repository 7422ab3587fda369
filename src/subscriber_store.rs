use crate::{
    domain::{ChatId, SenderMeta, Subscriber},
    effective_settings::PersistedSettings,
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Subscriber store query failed")]
    Query(#[from] sqlx::Error),
}

/// Persisted subscriber rows and the admin-edited settings row.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Creates the row on first contact. An existing row keeps its subscription and block flags.
    async fn upsert_subscriber(&self, chat_id: ChatId, sender: &SenderMeta)
        -> Result<(), StoreError>;

    /// Creates the row if absent.
    async fn set_subscribed(
        &self,
        chat_id: ChatId,
        sender: &SenderMeta,
        subscribed: bool,
    ) -> Result<(), StoreError>;

    /// Rows that are subscribed and not blocked.
    async fn list_subscribed(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Every row, most recently active first.
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError>;

    async fn get_settings(&self) -> Result<Option<PersistedSettings>, StoreError>;
}

#[derive(Clone)]
pub struct PgSubscriberStore {
    db_pool: PgPool,
}

impl PgSubscriberStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    #[tracing::instrument(skip(self, sender), fields(chat_id = %chat_id))]
    async fn upsert_subscriber(
        &self,
        chat_id: ChatId,
        sender: &SenderMeta,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, first_name, last_name, username, last_active_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chat_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username,
                last_active_at = EXCLUDED.last_active_at
            "#,
        )
        .bind(chat_id.as_i64())
        .bind(sender.first_name.as_deref())
        .bind(sender.last_name.as_deref())
        .bind(sender.username.as_deref())
        .bind(OffsetDateTime::now_utc())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, sender), fields(chat_id = %chat_id))]
    async fn set_subscribed(
        &self,
        chat_id: ChatId,
        sender: &SenderMeta,
        subscribed: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers
                (chat_id, first_name, last_name, username, subscribed, last_active_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (chat_id) DO UPDATE SET
                subscribed = EXCLUDED.subscribed,
                last_active_at = EXCLUDED.last_active_at
            "#,
        )
        .bind(chat_id.as_i64())
        .bind(sender.first_name.as_deref())
        .bind(sender.last_name.as_deref())
        .bind(sender.username.as_deref())
        .bind(subscribed)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_subscribed(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriberRecord>(
            r#"
            SELECT chat_id, first_name, last_name, username,
                   subscribed, blocked, location, last_active_at
            FROM subscribers
            WHERE subscribed = TRUE AND blocked = FALSE
            ORDER BY chat_id
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriberRecord>(
            r#"
            SELECT chat_id, first_name, last_name, username,
                   subscribed, blocked, location, last_active_at
            FROM subscribers
            ORDER BY last_active_at DESC
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_settings(&self) -> Result<Option<PersistedSettings>, StoreError> {
        let settings = sqlx::query_as::<_, PersistedSettings>(
            r#"
            SELECT bot_token, weather_api_key, welcome_message, subscribe_message,
                   unsubscribe_message, notification_time, notifications_enabled
            FROM bot_settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(settings)
    }
}

#[derive(FromRow)]
struct SubscriberRecord {
    chat_id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    subscribed: bool,
    blocked: bool,
    location: Option<String>,
    last_active_at: OffsetDateTime,
}

impl From<SubscriberRecord> for Subscriber {
    fn from(record: SubscriberRecord) -> Self {
        Self {
            chat_id: ChatId::new(record.chat_id),
            sender: SenderMeta {
                first_name: record.first_name,
                last_name: record.last_name,
                username: record.username,
            },
            subscribed: record.subscribed,
            blocked: record.blocked,
            location: record.location,
            last_active_at: record.last_active_at,
        }
    }
}
