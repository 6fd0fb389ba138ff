//! Local advisory store backed by PostgreSQL full-text search

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, FromQueryResult,
    Statement, Value,
};
use tracing::{debug, info};

use crate::application::errors::AdvisoryError;
use crate::config::DatabaseConfig;
use crate::domain::{AdvisoryRow, FixRow, ProductRow, VendorRow, VulnerabilityRow};

/// Rows returned per search
pub const SEARCH_LIMIT: i64 = 5;

/// Full-text searches over the curated advisory tables. `tsquery` is a ready
/// `to_tsquery('english', ..)` expression.
#[async_trait]
pub trait AdvisoryStore: Send + Sync {
    async fn search_advisories(&self, tsquery: &str) -> Result<Vec<AdvisoryRow>, AdvisoryError>;

    async fn search_vulnerabilities(
        &self,
        tsquery: &str,
    ) -> Result<Vec<VulnerabilityRow>, AdvisoryError>;

    async fn search_fixes(&self, tsquery: &str) -> Result<Vec<FixRow>, AdvisoryError>;

    async fn search_products(&self, tsquery: &str) -> Result<Vec<ProductRow>, AdvisoryError>;

    async fn search_vendors(&self, tsquery: &str) -> Result<Vec<VendorRow>, AdvisoryError>;

    /// Cheap connectivity probe used by the detailed health check
    async fn ping(&self) -> Result<(), AdvisoryError>;
}

const ADVISORIES_SQL: &str = r#"
SELECT id::text AS id, advisory_text::text AS advisory_text, description::text AS description,
       published_date::text AS published_date, assigner::text AS assigner
FROM advisories
WHERE to_tsvector('english', advisory_text || ' ' || description) @@ to_tsquery('english', $1)
ORDER BY ts_rank(to_tsvector('english', advisory_text || ' ' || description), to_tsquery('english', $1)) DESC
LIMIT $2"#;

const VULNERABILITIES_SQL: &str = r#"
SELECT cve_id::text AS cve_id, description::text AS description, severity::text AS severity
FROM vulnerabilities
WHERE to_tsvector('english', cve_id || ' ' || description) @@ to_tsquery('english', $1)
ORDER BY severity DESC
LIMIT $2"#;

const FIXES_SQL: &str = r#"
SELECT fix_id::text AS fix_id, fix_description::text AS fix_description,
       fixed_product_id::text AS fixed_product_id
FROM fixes
WHERE to_tsvector('english', fix_description) @@ to_tsquery('english', $1)
LIMIT $2"#;

const PRODUCTS_SQL: &str = r#"
SELECT product_id::text AS product_id, product_name::text AS product_name, version::text AS version,
       vendor_id::text AS vendor_id, release_date::text AS release_date
FROM products
WHERE to_tsvector('english', product_name || ' ' || version) @@ to_tsquery('english', $1)
LIMIT $2"#;

const VENDORS_SQL: &str = r#"
SELECT vendor_id::text AS vendor_id, vendor_name::text AS vendor_name,
       contact_info::text AS contact_info
FROM vendors
WHERE to_tsvector('english', vendor_name || ' ' || contact_info) @@ to_tsquery('english', $1)
LIMIT $2"#;

#[derive(Debug, FromQueryResult)]
struct AdvisoryModel {
    id: Option<String>,
    advisory_text: Option<String>,
    description: Option<String>,
    published_date: Option<String>,
    assigner: Option<String>,
}

impl From<AdvisoryModel> for AdvisoryRow {
    fn from(m: AdvisoryModel) -> Self {
        AdvisoryRow {
            id: m.id,
            advisory_text: m.advisory_text,
            description: m.description,
            published_date: m.published_date,
            assigner: m.assigner,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct VulnerabilityModel {
    cve_id: Option<String>,
    description: Option<String>,
    severity: Option<String>,
}

impl From<VulnerabilityModel> for VulnerabilityRow {
    fn from(m: VulnerabilityModel) -> Self {
        VulnerabilityRow {
            cve_id: m.cve_id,
            description: m.description,
            severity: m.severity,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct FixModel {
    fix_id: Option<String>,
    fix_description: Option<String>,
    fixed_product_id: Option<String>,
}

impl From<FixModel> for FixRow {
    fn from(m: FixModel) -> Self {
        FixRow {
            fix_id: m.fix_id,
            fix_description: m.fix_description,
            fixed_product_id: m.fixed_product_id,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct ProductModel {
    product_id: Option<String>,
    product_name: Option<String>,
    version: Option<String>,
    vendor_id: Option<String>,
    release_date: Option<String>,
}

impl From<ProductModel> for ProductRow {
    fn from(m: ProductModel) -> Self {
        ProductRow {
            product_id: m.product_id,
            product_name: m.product_name,
            version: m.version,
            vendor_id: m.vendor_id,
            release_date: m.release_date,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct VendorModel {
    vendor_id: Option<String>,
    vendor_name: Option<String>,
    contact_info: Option<String>,
}

impl From<VendorModel> for VendorRow {
    fn from(m: VendorModel) -> Self {
        VendorRow {
            vendor_id: m.vendor_id,
            vendor_name: m.vendor_name,
            contact_info: m.contact_info,
        }
    }
}

/// PostgreSQL implementation over a pooled sea-orm connection
pub struct PostgresAdvisoryStore {
    db: DatabaseConnection,
}

impl PostgresAdvisoryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, AdvisoryError> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(config.max_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        info!(
            max_connections = config.max_connections,
            "Connected to advisory store"
        );
        Ok(Self::new(db))
    }

    fn statement(sql: &str, tsquery: &str) -> Statement {
        Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [Value::from(tsquery), Value::from(SEARCH_LIMIT)],
        )
    }

    async fn search<M, R>(
        &self,
        table: &str,
        sql: &str,
        tsquery: &str,
    ) -> Result<Vec<R>, AdvisoryError>
    where
        M: FromQueryResult + Send + Sync,
        R: From<M>,
    {
        let rows = M::find_by_statement(Self::statement(sql, tsquery))
            .all(&self.db)
            .await?;
        debug!(table = table, rows = rows.len(), "Advisory store search completed");
        Ok(rows.into_iter().map(R::from).collect())
    }
}

#[async_trait]
impl AdvisoryStore for PostgresAdvisoryStore {
    async fn search_advisories(&self, tsquery: &str) -> Result<Vec<AdvisoryRow>, AdvisoryError> {
        self.search::<AdvisoryModel, _>("advisories", ADVISORIES_SQL, tsquery)
            .await
    }

    async fn search_vulnerabilities(
        &self,
        tsquery: &str,
    ) -> Result<Vec<VulnerabilityRow>, AdvisoryError> {
        self.search::<VulnerabilityModel, _>("vulnerabilities", VULNERABILITIES_SQL, tsquery)
            .await
    }

    async fn search_fixes(&self, tsquery: &str) -> Result<Vec<FixRow>, AdvisoryError> {
        self.search::<FixModel, _>("fixes", FIXES_SQL, tsquery).await
    }

    async fn search_products(&self, tsquery: &str) -> Result<Vec<ProductRow>, AdvisoryError> {
        self.search::<ProductModel, _>("products", PRODUCTS_SQL, tsquery)
            .await
    }

    async fn search_vendors(&self, tsquery: &str) -> Result<Vec<VendorRow>, AdvisoryError> {
        self.search::<VendorModel, _>("vendors", VENDORS_SQL, tsquery)
            .await
    }

    async fn ping(&self) -> Result<(), AdvisoryError> {
        self.db
            .execute(Statement::from_string(DbBackend::Postgres, "SELECT 1"))
            .await?;
        Ok(())
    }
}

/// Store used when no database URL is configured; every search fails
pub struct DisabledAdvisoryStore;

#[async_trait]
impl AdvisoryStore for DisabledAdvisoryStore {
    async fn search_advisories(&self, _tsquery: &str) -> Result<Vec<AdvisoryRow>, AdvisoryError> {
        Err(AdvisoryError::StoreNotConfigured)
    }

    async fn search_vulnerabilities(
        &self,
        _tsquery: &str,
    ) -> Result<Vec<VulnerabilityRow>, AdvisoryError> {
        Err(AdvisoryError::StoreNotConfigured)
    }

    async fn search_fixes(&self, _tsquery: &str) -> Result<Vec<FixRow>, AdvisoryError> {
        Err(AdvisoryError::StoreNotConfigured)
    }

    async fn search_products(&self, _tsquery: &str) -> Result<Vec<ProductRow>, AdvisoryError> {
        Err(AdvisoryError::StoreNotConfigured)
    }

    async fn search_vendors(&self, _tsquery: &str) -> Result<Vec<VendorRow>, AdvisoryError> {
        Err(AdvisoryError::StoreNotConfigured)
    }

    async fn ping(&self) -> Result<(), AdvisoryError> {
        Err(AdvisoryError::StoreNotConfigured)
    }
}
