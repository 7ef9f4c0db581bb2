//! SQLite-backed subscriber registry.
//!
//! Subscribers are keyed by their push-destination endpoint; re-subscribing
//! the same endpoint replaces the record. The subscription object and contact
//! metadata are stored as opaque JSON.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::{GeoPoint, PushSubscription, Subscriber};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    /// Create a new registry and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:trunklink.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let registry = Self { pool };
        registry.initialize_schema().await?;

        Ok(registry)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                endpoint TEXT PRIMARY KEY,
                subscription TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                contact TEXT NOT NULL,
                subscribed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a subscriber, replacing any existing record for the same
    /// endpoint.
    pub async fn upsert(&self, subscriber: &Subscriber) -> anyhow::Result<()> {
        let subscription = serde_json::to_string(&subscriber.subscription)?;
        let contact = serde_json::to_string(&subscriber.contact)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO subscribers
                (endpoint, subscription, latitude, longitude, contact, subscribed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscriber.endpoint())
        .bind(subscription)
        .bind(subscriber.location.map(|l| l.latitude))
        .bind(subscriber.location.map(|l| l.longitude))
        .bind(contact)
        .bind(subscriber.subscribed_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update a subscriber's last-known location.
    ///
    /// Returns `false` when no subscriber with that endpoint exists.
    pub async fn update_location(
        &self,
        endpoint: &str,
        location: GeoPoint,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers SET latitude = ?, longitude = ?
            WHERE endpoint = ?
            "#,
        )
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(endpoint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a subscriber whose destination reported permanent failure.
    ///
    /// Returns `false` when the endpoint was already gone.
    pub async fn remove(&self, endpoint: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM subscribers WHERE endpoint = ?")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All registered subscribers.
    pub async fn all(&self) -> anyhow::Result<Vec<Subscriber>> {
        let rows = sqlx::query(
            r#"
            SELECT endpoint, subscription, latitude, longitude, contact, subscribed_at
            FROM subscribers
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut subscribers = Vec::with_capacity(rows.len());
        for row in &rows {
            let subscription: String = row.get("subscription");
            let subscription: PushSubscription = serde_json::from_str(&subscription)?;

            let latitude: Option<f64> = row.get("latitude");
            let longitude: Option<f64> = row.get("longitude");
            let contact: String = row.get("contact");
            let subscribed_at: i64 = row.get("subscribed_at");

            subscribers.push(Subscriber {
                subscription,
                location: latitude.zip(longitude).map(|(latitude, longitude)| GeoPoint {
                    latitude,
                    longitude,
                }),
                contact: serde_json::from_str(&contact).unwrap_or(Value::Null),
                subscribed_at: DateTime::from_timestamp(subscribed_at, 0)
                    .unwrap_or_else(Utc::now),
            });
        }

        Ok(subscribers)
    }

    /// Number of registered subscribers.
    pub async fn count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM subscribers")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("total"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn subscriber(endpoint: &str, location: Option<GeoPoint>) -> Subscriber {
        Subscriber {
            subscription: PushSubscription {
                endpoint: endpoint.to_string(),
                details: serde_json::Map::new(),
            },
            location,
            contact: json!({"phone": "+9477000000"}),
            subscribed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_count() {
        let registry = Registry::new("sqlite::memory:").await.unwrap();

        assert_eq!(registry.count().await.unwrap(), 0);

        registry
            .upsert(&subscriber("https://push/1", None))
            .await
            .unwrap();
        registry
            .upsert(&subscriber("https://push/2", None))
            .await
            .unwrap();

        assert_eq!(registry.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_record() {
        let registry = Registry::new("sqlite::memory:").await.unwrap();

        registry
            .upsert(&subscriber("https://push/1", None))
            .await
            .unwrap();
        registry
            .upsert(&subscriber(
                "https://push/1",
                Some(GeoPoint {
                    latitude: 6.5,
                    longitude: 80.1,
                }),
            ))
            .await
            .unwrap();

        assert_eq!(registry.count().await.unwrap(), 1);

        let all = registry.all().await.unwrap();
        assert_eq!(all[0].location.unwrap().latitude, 6.5);
    }

    #[tokio::test]
    async fn test_update_location() {
        let registry = Registry::new("sqlite::memory:").await.unwrap();
        registry
            .upsert(&subscriber("https://push/1", None))
            .await
            .unwrap();

        let updated = registry
            .update_location(
                "https://push/1",
                GeoPoint {
                    latitude: 1.0,
                    longitude: 2.0,
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let missing = registry
            .update_location(
                "https://push/unknown",
                GeoPoint {
                    latitude: 1.0,
                    longitude: 2.0,
                },
            )
            .await
            .unwrap();
        assert!(!missing);

        let all = registry.all().await.unwrap();
        assert_eq!(
            all[0].location,
            Some(GeoPoint {
                latitude: 1.0,
                longitude: 2.0
            })
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = Registry::new("sqlite::memory:").await.unwrap();
        registry
            .upsert(&subscriber("https://push/1", None))
            .await
            .unwrap();

        assert!(tokio_test::assert_ok!(registry.remove("https://push/1").await));
        assert!(!tokio_test::assert_ok!(
            registry.remove("https://push/1").await
        ));
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_contact_metadata_round_trips() {
        let registry = Registry::new("sqlite::memory:").await.unwrap();
        registry
            .upsert(&subscriber("https://push/1", None))
            .await
            .unwrap();

        let all = registry.all().await.unwrap();
        assert_eq!(all[0].contact["phone"], "+9477000000");
    }
}
