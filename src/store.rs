//! SQLite implementation of the persistence ports.
//!
//! Decimal dimensions are stored as normalized text: `10.00` and `10` end up
//! as the same row, and no precision is lost to floating point.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::model::{BoxTemplate, Product};
use crate::repository::{
    BoxCatalog, BoxTemplateId, OrderId, OrderRepository, PersistenceError, ProductId, UnitOfWork,
};
use crate::types::Dimensional;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Order repository backed by an `sqlx::SqlitePool`.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for the configured database, creating the file if needed.
    ///
    /// WAL lets readers run beside the single writer; writers queue on the
    /// busy timeout instead of failing.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(config.url())?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections())
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations, including the seeded boxes.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fresh migrated in-memory database.
    ///
    /// A single connection that never expires, since every in-memory
    /// connection would otherwise see its own empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        let store = Self::new(pool);
        store.migrate().await.expect("migrations apply");
        store
    }
}

impl BoxCatalog for SqliteStore {
    async fn list_box_templates(&self) -> Result<Vec<BoxTemplate>, PersistenceError> {
        let rows = sqlx::query("SELECT box_type, height, width, length FROM boxes ORDER BY box_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(box_template_from_row).collect()
    }
}

impl OrderRepository for SqliteStore {
    type UnitOfWork = SqliteUnitOfWork;

    /// Takes the write lock up front. A deferred transaction would read
    /// first and fail with `SQLITE_BUSY` when upgrading under contention.
    async fn begin(&self) -> Result<SqliteUnitOfWork, PersistenceError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(SqliteUnitOfWork { tx })
    }
}

/// One open SQLite transaction. Dropping it without `commit` rolls back.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork for SqliteUnitOfWork {
    async fn find_or_create_product(&mut self, product: &Product) -> Result<ProductId, PersistenceError> {
        let dims = product.dimensions().normalized();
        let (height, width, length) = (
            dims.height.to_string(),
            dims.width.to_string(),
            dims.length.to_string(),
        );

        let existing = sqlx::query(
            "SELECT product_id FROM products
             WHERE name = ?1 AND height = ?2 AND width = ?3 AND length = ?4",
        )
        .bind(&product.name)
        .bind(&height)
        .bind(&width)
        .bind(&length)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = existing {
            return Ok(row.try_get("product_id")?);
        }

        let product_id = sqlx::query(
            "INSERT INTO products (name, height, width, length) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&product.name)
        .bind(&height)
        .bind(&width)
        .bind(&length)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        debug!(product = %product.name, product_id, "created product");
        Ok(product_id)
    }

    async fn create_order(
        &mut self,
        owner_id: i64,
        created_at: DateTime<Utc>,
        items: &[ProductId],
    ) -> Result<OrderId, PersistenceError> {
        let order_id = sqlx::query("INSERT INTO orders (owner_id, created_at) VALUES (?1, ?2)")
            .bind(owner_id)
            .bind(created_at)
            .execute(&mut *self.tx)
            .await?
            .last_insert_rowid();

        for product_id in items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity) VALUES (?1, ?2, 1)",
            )
            .bind(order_id)
            .bind(*product_id)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(order_id)
    }

    async fn find_box_template(
        &mut self,
        box_type: &str,
    ) -> Result<Option<BoxTemplateId>, PersistenceError> {
        let row = sqlx::query("SELECT box_id FROM boxes WHERE box_type = ?1 ORDER BY box_id LIMIT 1")
            .bind(box_type)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|row| row.try_get("box_id")).transpose()?)
    }

    async fn link_order_box(
        &mut self,
        order_id: OrderId,
        box_id: BoxTemplateId,
        observation: Option<&str>,
    ) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO order_boxes (order_id, box_id, observation) VALUES (?1, ?2, ?3)")
            .bind(order_id)
            .bind(box_id)
            .bind(observation)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), PersistenceError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn box_template_from_row(row: &SqliteRow) -> Result<BoxTemplate, PersistenceError> {
    Ok(BoxTemplate {
        box_type: row.try_get("box_type")?,
        height: decimal_column(row, "height")?,
        width: decimal_column(row, "width")?,
        length: decimal_column(row, "length")?,
    })
}

fn decimal_column(row: &SqliteRow, column: &'static str) -> Result<Decimal, PersistenceError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(raw.trim())
        .map_err(|_| PersistenceError::InvalidDecimal { column, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, h: Decimal, w: Decimal, l: Decimal) -> Product {
        Product::new(name, h, w, l)
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(store.pool())
            .await
            .expect("count query")
            .get("n")
    }

    #[tokio::test]
    async fn migrations_seed_the_box_catalog() {
        let store = SqliteStore::in_memory().await;
        let templates = store.list_box_templates().await.expect("catalog");

        assert_eq!(
            templates,
            vec![
                BoxTemplate::new("Box 1", Decimal::from(30), Decimal::from(40), Decimal::from(80)),
                BoxTemplate::new("Box 2", Decimal::from(80), Decimal::from(50), Decimal::from(40)),
                BoxTemplate::new("Box 3", Decimal::from(50), Decimal::from(80), Decimal::from(60)),
            ]
        );
    }

    #[tokio::test]
    async fn find_or_create_product_matches_exact_dimensions() {
        let store = SqliteStore::in_memory().await;
        let mut uow = store.begin().await.expect("begin");

        let first = uow
            .find_or_create_product(&product("Mouse", Decimal::from(5), Decimal::from(8), Decimal::from(12)))
            .await
            .expect("create");
        // Same value written with a different scale.
        let again = uow
            .find_or_create_product(&product(
                "Mouse",
                Decimal::new(500, 2),
                Decimal::new(80, 1),
                Decimal::from(12),
            ))
            .await
            .expect("find");
        let other = uow
            .find_or_create_product(&product("Mouse", Decimal::from(5), Decimal::from(8), Decimal::from(13)))
            .await
            .expect("create other");
        uow.commit().await.expect("commit");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(count(&store, "products").await, 2);
    }

    #[tokio::test]
    async fn order_items_and_box_links_are_written() {
        let store = SqliteStore::in_memory().await;
        let mut uow = store.begin().await.expect("begin");

        let p = uow
            .find_or_create_product(&product("Cube", Decimal::from(1), Decimal::from(1), Decimal::from(1)))
            .await
            .expect("product");
        let order_id = uow
            .create_order(3, Utc::now(), &[p, p])
            .await
            .expect("order");
        let box_id = uow
            .find_box_template("Box 2")
            .await
            .expect("lookup")
            .expect("seeded box");
        uow.link_order_box(order_id, box_id, None).await.expect("link");
        uow.link_order_box(order_id, box_id, Some("note")).await.expect("second link");
        uow.commit().await.expect("commit");

        assert!(order_id > 0);
        assert_eq!(count(&store, "orders").await, 1);
        assert_eq!(count(&store, "order_items").await, 2);
        assert_eq!(count(&store, "order_boxes").await, 2);

        let owner: i64 = sqlx::query("SELECT owner_id FROM orders WHERE order_id = ?1")
            .bind(order_id)
            .fetch_one(store.pool())
            .await
            .expect("order row")
            .get("owner_id");
        assert_eq!(owner, 3);
    }

    #[tokio::test]
    async fn unknown_box_type_resolves_to_none() {
        let store = SqliteStore::in_memory().await;
        let mut uow = store.begin().await.expect("begin");
        assert_eq!(uow.find_box_template("Ghost").await.expect("lookup"), None);
        uow.rollback().await.expect("rollback");
    }

    #[tokio::test]
    async fn rollback_discards_everything() {
        let store = SqliteStore::in_memory().await;
        let mut uow = store.begin().await.expect("begin");
        let p = uow
            .find_or_create_product(&product("Lost", Decimal::from(1), Decimal::from(1), Decimal::from(1)))
            .await
            .expect("product");
        uow.create_order(1, Utc::now(), &[p]).await.expect("order");
        uow.rollback().await.expect("rollback");

        assert_eq!(count(&store, "products").await, 0);
        assert_eq!(count(&store, "orders").await, 0);
        assert_eq!(count(&store, "order_items").await, 0);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = SqliteStore::in_memory().await;
        {
            let mut uow = store.begin().await.expect("begin");
            uow.create_order(1, Utc::now(), &[]).await.expect("order");
        }
        assert_eq!(count(&store, "orders").await, 0);
    }

    #[tokio::test]
    async fn invalid_decimal_in_catalog_is_reported() {
        let store = SqliteStore::in_memory().await;
        sqlx::query("INSERT INTO boxes (box_type, height, width, length) VALUES ('Broken', 'ten', '1', '1')")
            .execute(store.pool())
            .await
            .expect("insert");

        let err = store.list_box_templates().await.expect_err("bad decimal");
        assert!(matches!(
            err,
            PersistenceError::InvalidDecimal { column: "height", .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_units_of_work_on_a_file_database_all_commit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("orders.db").display());
        let store = SqliteStore::connect(&DatabaseConfig::for_url(url, 5))
            .await
            .expect("connect");
        store.migrate().await.expect("migrate");

        let mut tasks = Vec::new();
        for task in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for order in 0..5 {
                    let mut uow = store.begin().await?;
                    // Shared names race on find-or-create.
                    let shared = uow
                        .find_or_create_product(&product("Shared", Decimal::ONE, Decimal::ONE, Decimal::ONE))
                        .await?;
                    let own = uow
                        .find_or_create_product(&product(
                            &format!("Task {task} item {order}"),
                            Decimal::from(2),
                            Decimal::from(2),
                            Decimal::from(2),
                        ))
                        .await?;
                    let order_id = uow.create_order(1, Utc::now(), &[shared, own]).await?;
                    if let Some(box_id) = uow.find_box_template("Box 1").await? {
                        uow.link_order_box(order_id, box_id, None).await?;
                    }
                    uow.commit().await?;
                }
                Ok::<_, PersistenceError>(())
            }));
        }
        for task in tasks {
            task.await.expect("task panicked").expect("unit of work failed");
        }

        assert_eq!(count(&store, "orders").await, 80);
        assert_eq!(count(&store, "order_items").await, 160);
        assert_eq!(count(&store, "order_boxes").await, 80);
        assert_eq!(count(&store, "products").await, 81);
    }
}
