//! PostgreSQL record store
//!
//! Pages are read with `ORDER BY <primary key> LIMIT/OFFSET`; each page of
//! updates runs in one transaction. Identifiers are always quoted.

use super::client::PostgreSQLClient;
use super::value::{row_to_fields, to_sql};
use crate::adapters::store::{Page, PageToken, RecordStore, RecordUpdate};
use crate::domain::{EntitySpec, Record, Result, StoreError, Value};
use async_trait::async_trait;
use tokio_postgres::types::ToSql;

/// [`RecordStore`] over a PostgreSQL database
pub struct PostgresStore {
    name: String,
    client: PostgreSQLClient,
}

impl PostgresStore {
    pub fn new(name: &str, client: PostgreSQLClient) -> Self {
        Self {
            name: name.to_string(),
            client,
        }
    }

    pub fn client(&self) -> &PostgreSQLClient {
        &self.client
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name
pub fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// `SELECT` for one page, fetching one extra row to detect the last page
fn select_page_sql(spec: &EntitySpec, limit: usize, offset: usize) -> String {
    let order_by = spec
        .primary_key
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT * FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        quote_table(spec.table_name()),
        discriminator_clause(spec),
        order_by,
        limit + 1,
        offset
    )
}

fn discriminator_clause(spec: &EntitySpec) -> String {
    match spec.discriminator {
        Some(_) => format!(" WHERE {}::text = $1", quote_ident(&spec.discriminator_column)),
        None => String::new(),
    }
}

/// `UPDATE` of the given columns; parameters are the columns then the key
fn update_sql(spec: &EntitySpec, columns: &[&String]) -> String {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let key = spec
        .primary_key
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), columns.len() + i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_table(spec.table_name()),
        assignments,
        key
    )
}

fn delete_sql(spec: &EntitySpec) -> String {
    format!(
        "DELETE FROM {}{}",
        quote_table(spec.table_name()),
        discriminator_clause(spec)
    )
}

#[async_trait]
impl RecordStore for PostgresStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn list_eligible(
        &self,
        spec: &EntitySpec,
        token: Option<&PageToken>,
        limit: usize,
    ) -> Result<Page> {
        let table = spec.table_name();
        let fetch_failed = |message: String| StoreError::FetchFailed {
            table: table.to_string(),
            message,
        };

        let offset = match token {
            Some(token) => token
                .as_str()
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidPageToken(token.as_str().to_string()))?,
            None => 0,
        };

        let client = self.client.get_connection().await?;
        let sql = select_page_sql(spec, limit, offset);
        tracing::trace!(table = %table, offset, limit, "Fetching page");

        let rows = match spec.discriminator.as_deref() {
            Some(discriminator) => client.query(sql.as_str(), &[&discriminator]).await,
            None => client.query(sql.as_str(), &[]).await,
        }
        .map_err(|e| fetch_failed(e.to_string()))?;

        let has_more = rows.len() > limit;
        let mut records = Vec::with_capacity(rows.len().min(limit));
        for row in rows.iter().take(limit) {
            let fields = row_to_fields(row)
                .map_err(|(column, message)| StoreError::Conversion { column, message })?;
            records.push(Record::keyed_by(&spec.primary_key, fields));
        }

        let next = has_more.then(|| PageToken::new((offset + records.len()).to_string()));
        Ok(Page { records, next })
    }

    /// Dropping the transaction without committing rolls the page back, so
    /// every early return below leaves the table untouched.
    async fn apply_updates(&self, spec: &EntitySpec, updates: &[RecordUpdate]) -> Result<()> {
        let table = spec.table_name();
        let commit_failed = |message: String| StoreError::CommitFailed {
            table: table.to_string(),
            message,
        };

        let mut client = self.client.get_connection().await?;
        let transaction = client
            .transaction()
            .await
            .map_err(|e| commit_failed(e.to_string()))?;

        for update in updates {
            let columns: Vec<&String> = update.fields.keys().collect();
            if columns.is_empty() {
                continue;
            }
            let statement = transaction
                .prepare(&update_sql(spec, &columns))
                .await
                .map_err(|e| commit_failed(e.to_string()))?;

            let values: Vec<&Value> = update
                .fields
                .values()
                .chain(update.key.values().iter())
                .collect();
            let names: Vec<&str> = columns
                .iter()
                .map(|c| c.as_str())
                .chain(spec.primary_key.iter().map(String::as_str))
                .collect();

            let mut params = Vec::with_capacity(values.len());
            for ((value, ty), column) in values.iter().zip(statement.params()).zip(&names) {
                let param = to_sql(value, ty).map_err(|message| StoreError::Conversion {
                    column: column.to_string(),
                    message,
                })?;
                params.push(param);
            }
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();

            let affected = transaction
                .execute(&statement, &refs)
                .await
                .map_err(|e| commit_failed(e.to_string()))?;
            if affected == 0 {
                return Err(commit_failed(format!("no row with key {}", update.key)).into());
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| commit_failed(e.to_string()))?;
        Ok(())
    }

    async fn truncate(&self, spec: &EntitySpec) -> Result<u64> {
        let table = spec.table_name();
        let client = self.client.get_connection().await?;
        let sql = delete_sql(spec);

        match spec.discriminator.as_deref() {
            Some(discriminator) => client.execute(sql.as_str(), &[&discriminator]).await,
            None => client.execute(sql.as_str(), &[]).await,
        }
        .map_err(|e| {
            StoreError::TruncateFailed {
                table: table.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("email"), "\"email\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_table("crm.contacts"), "\"crm\".\"contacts\"");
    }

    #[test]
    fn test_select_page_sql() {
        let spec = EntitySpec::new("users");
        assert_eq!(
            select_page_sql(&spec, 100, 200),
            "SELECT * FROM \"users\" ORDER BY \"id\" LIMIT 101 OFFSET 200"
        );

        let spec = EntitySpec::new("people").discriminated("kind", "customer");
        assert_eq!(
            select_page_sql(&spec, 10, 0),
            "SELECT * FROM \"people\" WHERE \"kind\"::text = $1 ORDER BY \"id\" LIMIT 11 OFFSET 0"
        );
    }

    #[test]
    fn test_update_sql_numbers_key_after_columns() {
        let spec = EntitySpec {
            primary_key: vec!["tenant".to_string(), "id".to_string()],
            ..EntitySpec::new("accounts")
        };
        let email = "email".to_string();
        let marker = "anonymized".to_string();
        assert_eq!(
            update_sql(&spec, &[&marker, &email]),
            "UPDATE \"accounts\" SET \"anonymized\" = $1, \"email\" = $2 \
             WHERE \"tenant\" = $3 AND \"id\" = $4"
        );
    }

    #[test]
    fn test_delete_sql() {
        assert_eq!(delete_sql(&EntitySpec::new("sessions")), "DELETE FROM \"sessions\"");
        let spec = EntitySpec::new("people").discriminated("dtype", "lead");
        assert_eq!(
            delete_sql(&spec),
            "DELETE FROM \"people\" WHERE \"dtype\"::text = $1"
        );
    }
}
