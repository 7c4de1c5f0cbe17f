use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::views::{DIAGNOSTICS_QUERY, SUMMARY_QUERY};
use crate::catalog::Catalog;
use crate::config::{AppConfig, QueryConfig};
use crate::credential::CredentialProvider;
use crate::database::{ConnectionFactory, PgConnectionFactory, QueryError, Record, Session};
use crate::error::DataAccessError;
use crate::filter::{Filter, FilterSet, PageQueries, PageRequest, SqlResult};

#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub records: Vec<Record>,
    pub total_matching: u64,
    pub total_pages: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Entry point for reading catalog views and running write statements.
///
/// Every call acquires a credential, opens one session, runs its queries and
/// closes the session before returning, whether or not the queries succeeded.
pub struct DataAccess<F: ConnectionFactory> {
    credentials: Arc<CredentialProvider>,
    factory: F,
    catalog: Arc<Catalog>,
    query: QueryConfig,
}

impl DataAccess<PgConnectionFactory> {
    /// Facade over Postgres with the configured identity sources and the
    /// built-in catalog.
    pub fn from_config(config: &AppConfig) -> Result<Self, DataAccessError> {
        let credentials = Arc::new(CredentialProvider::from_config(&config.credential));
        let factory = PgConnectionFactory::from_config(config)?;
        Ok(Self::new(credentials, factory, Catalog::lego(), config.query.clone()))
    }
}

impl<F: ConnectionFactory> DataAccess<F> {
    pub fn new(credentials: Arc<CredentialProvider>, factory: F, catalog: Arc<Catalog>, query: QueryConfig) -> Self {
        Self {
            credentials,
            factory,
            catalog,
            query,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }

    pub async fn fetch_page(
        &self,
        view_name: &str,
        filters: &FilterSet,
        page: PageRequest,
    ) -> Result<PageResult, DataAccessError> {
        let view = self.catalog.view(view_name)?;
        let capped = page.capped(self.query.max_page_size);
        if capped != page {
            warn!(
                "Page size {} for {} exceeds maximum {}, capping",
                page.page_size(),
                view_name,
                self.query.max_page_size
            );
        }
        let queries = Filter::build(view, filters, capped)?;
        debug!("Page query for {}: {}", view_name, queries.page.query);

        let mut session = self.open_session().await?;
        let outcome = run_page(&mut session, &queries).await;
        session.close().await;

        let (total, records) = outcome.map_err(|e| {
            error!("Listing {} failed: {}", view_name, e);
            DataAccessError::from(e)
        })?;
        let total_matching = total.max(0) as u64;

        Ok(PageResult {
            records,
            total_matching,
            total_pages: capped.total_pages(total_matching),
            page: capped.page(),
            page_size: capped.page_size(),
        })
    }

    /// Run a named write statement and return the affected row count.
    pub async fn execute_write(
        &self,
        statement_id: &str,
        params: &HashMap<String, Value>,
    ) -> Result<u64, DataAccessError> {
        let statement = self.catalog.statement(statement_id)?.bind(params)?;

        let mut session = self.open_session().await?;
        let outcome = session.execute(&statement).await;
        session.close().await;

        let affected = outcome.map_err(|e| {
            error!("Statement {} failed: {}", statement_id, e);
            DataAccessError::from(e)
        })?;
        info!("Statement {} affected {} row(s)", statement_id, affected);
        Ok(affected)
    }

    /// Dashboard totals.
    pub async fn fetch_summary(&self) -> Result<Record, DataAccessError> {
        self.fetch_single_row(SUMMARY_QUERY).await
    }

    /// Server version, effective user, database name and table count.
    pub async fn diagnostics(&self) -> Result<Record, DataAccessError> {
        self.fetch_single_row(DIAGNOSTICS_QUERY).await
    }

    async fn fetch_single_row(&self, sql: &str) -> Result<Record, DataAccessError> {
        let query = SqlResult {
            query: sql.to_string(),
            params: vec![],
        };

        let mut session = self.open_session().await?;
        let outcome = session.fetch_records(&query).await;
        session.close().await;

        let rows = outcome.map_err(DataAccessError::from)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| QueryError::Database("query returned no rows".to_string()).into())
    }

    /// Acquire a credential and open a session, refreshing the credential at
    /// most once if the server rejected it.
    async fn open_session(&self) -> Result<F::Session, DataAccessError> {
        let credential = self.credentials.acquire().await?;

        match self.factory.open(&credential).await {
            Ok(session) => Ok(session),
            Err(err) if err.is_retryable_with_fresh_credential() => {
                warn!(
                    "Credential #{} rejected ({}), retrying once with a fresh credential",
                    credential.serial(),
                    err
                );
                let fresh = self.credentials.acquire_fresh(&credential).await?;
                self.factory.open(&fresh).await.map_err(|err| {
                    error!("Session open failed after credential refresh: {}", err);
                    DataAccessError::from(err)
                })
            }
            Err(err) => {
                error!("Session open failed ({}): {}", err.kind_name(), err);
                Err(err.into())
            }
        }
    }
}

async fn run_page<S: Session>(session: &mut S, queries: &PageQueries) -> Result<(i64, Vec<Record>), QueryError> {
    let total = session.fetch_count(&queries.count).await?;
    let records = session.fetch_records(&queries.page).await?;
    debug!("Fetched {} of {} matching records", records.len(), total);
    Ok((total, records))
}
