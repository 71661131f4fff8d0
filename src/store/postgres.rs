use std::fmt;

use parking_lot::Mutex;
use postgres::types::Json;
use postgres::{Client, NoTls};
use tracing::{debug, info, trace};

use super::Store;
use crate::{Breakdown, Feature, Result, RuleSet, ValidationError, ValueSet};

/// Table used when none is configured.
pub const DEFAULT_TABLE: &str = "flipside_features";

/// Postgres store: one row per feature, rules in a `jsonb` document.
///
/// Merges happen inside the database. `enable` is a single upsert whose
/// `SET` clause computes the set union from the row it locks, and `disable`
/// is a single `UPDATE` computing the difference, so concurrent writers never
/// read-modify-write on the client. `rename` and `load` run in explicit
/// transactions.
pub struct PostgresStore {
    client: Mutex<Client>,
    table: String,
}

impl PostgresStore {
    /// Wrap an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTable`] if `table` is not a plain or
    /// schema-qualified SQL identifier.
    pub fn new(client: Client, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(ValidationError::InvalidTable { table }.into());
        }
        Ok(Self {
            client: Mutex::new(client),
            table,
        })
    }

    /// Connect without TLS using a libpq-style connection string or URL.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the connection fails, or a validation error
    /// for a bad table name.
    pub fn connect(params: &str, table: impl Into<String>) -> Result<Self> {
        let client = Client::connect(params, NoTls)?;
        let store = Self::new(client, table)?;
        info!(table = %store.table, "connected to postgres");
        Ok(store)
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the features table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the statement fails.
    pub fn setup(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                name text NOT NULL CHECK (name <> ''),
                rules jsonb NOT NULL DEFAULT '{{}}'::jsonb,
                CONSTRAINT {constraint} UNIQUE (name)
            )",
            table = self.table,
            constraint = format!("{}_unique_name", self.table.replace('.', "_")),
        );
        self.client.lock().batch_execute(&sql)?;
        info!(table = %self.table, "ensured features table");
        Ok(())
    }

    /// Drop the features table.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the statement fails.
    pub fn teardown(&self) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.table);
        self.client.lock().batch_execute(&sql)?;
        info!(table = %self.table, "dropped features table");
        Ok(())
    }
}

impl fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Store for PostgresStore {
    fn add(&self, feature: &Feature) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            self.table
        );
        self.client.lock().execute(sql.as_str(), &[&feature.as_str()])?;
        trace!(%feature, "added feature");
        Ok(())
    }

    fn remove(&self, feature: &Feature) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE name = $1", self.table);
        let removed = self.client.lock().execute(sql.as_str(), &[&feature.as_str()])?;
        debug!(%feature, removed, "removed feature");
        Ok(())
    }

    fn enable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} AS t (name, rules)
             VALUES ($1, jsonb_build_object($2::text, $3::jsonb))
             ON CONFLICT (name) DO UPDATE
             SET rules = jsonb_set(
                 t.rules,
                 ARRAY[$2::text],
                 (SELECT COALESCE(jsonb_agg(merged.value ORDER BY merged.value), '[]'::jsonb)
                  FROM (SELECT jsonb_array_elements(COALESCE(t.rules -> $2::text, '[]'::jsonb)) AS value
                        UNION
                        SELECT jsonb_array_elements($3::jsonb) AS value) AS merged)
             )",
            table = self.table
        );
        self.client
            .lock()
            .execute(sql.as_str(), &[&feature.as_str(), &group, &Json(values)])?;
        debug!(%feature, group, %values, "enabled group");
        Ok(())
    }

    fn disable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()> {
        let mut client = self.client.lock();
        if values.is_empty() {
            let sql = format!(
                "UPDATE {} SET rules = rules - $2::text WHERE name = $1",
                self.table
            );
            client.execute(sql.as_str(), &[&feature.as_str(), &group])?;
        } else {
            let sql = format!(
                "UPDATE {table} AS t
                 SET rules = jsonb_set(
                     t.rules,
                     ARRAY[$2::text],
                     (SELECT COALESCE(jsonb_agg(kept.value ORDER BY kept.value), '[]'::jsonb)
                      FROM (SELECT jsonb_array_elements(t.rules -> $2::text) AS value
                            EXCEPT
                            SELECT jsonb_array_elements($3::jsonb) AS value) AS kept)
                 )
                 WHERE t.name = $1 AND t.rules ? $2::text",
                table = self.table
            );
            client.execute(sql.as_str(), &[&feature.as_str(), &group, &Json(values)])?;
        }
        debug!(%feature, group, %values, "disabled group");
        Ok(())
    }

    fn rename(&self, old: &Feature, new: &Feature) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let mut client = self.client.lock();
        let mut tx = client.transaction()?;
        let lock_sql = format!("SELECT 1 FROM {} WHERE name = $1 FOR UPDATE", self.table);
        if tx.query_opt(lock_sql.as_str(), &[&old.as_str()])?.is_none() {
            return Ok(());
        }
        let delete_sql = format!("DELETE FROM {} WHERE name = $1", self.table);
        tx.execute(delete_sql.as_str(), &[&new.as_str()])?;
        let update_sql = format!("UPDATE {} SET name = $1 WHERE name = $2", self.table);
        tx.execute(update_sql.as_str(), &[&new.as_str(), &old.as_str()])?;
        tx.commit()?;
        debug!(%old, %new, "renamed feature");
        Ok(())
    }

    fn rules(&self, feature: &Feature) -> Result<Option<RuleSet>> {
        let sql = format!("SELECT rules FROM {} WHERE name = $1", self.table);
        let row = self.client.lock().query_opt(sql.as_str(), &[&feature.as_str()])?;
        match row {
            Some(row) => {
                let Json(rules): Json<RuleSet> = row.try_get(0)?;
                Ok(Some(rules))
            }
            None => Ok(None),
        }
    }

    fn exists(&self, feature: &Feature, group: Option<&str>) -> Result<bool> {
        let mut client = self.client.lock();
        let row = match group {
            None => {
                let sql = format!(
                    "SELECT EXISTS (SELECT 1 FROM {} WHERE name = $1)",
                    self.table
                );
                client.query_one(sql.as_str(), &[&feature.as_str()])?
            }
            Some(group) => {
                let sql = format!(
                    "SELECT EXISTS (SELECT 1 FROM {} WHERE name = $1 AND rules ? $2::text)",
                    self.table
                );
                client.query_one(sql.as_str(), &[&feature.as_str(), &group])?
            }
        };
        Ok(row.try_get(0)?)
    }

    fn features(&self, group: Option<&str>) -> Result<Vec<String>> {
        let mut client = self.client.lock();
        let rows = match group {
            None => {
                let sql = format!("SELECT name FROM {} ORDER BY name COLLATE \"C\"", self.table);
                client.query(sql.as_str(), &[])?
            }
            Some(group) => {
                let sql = format!(
                    "SELECT name FROM {} WHERE rules ? $1::text ORDER BY name COLLATE \"C\"",
                    self.table
                );
                client.query(sql.as_str(), &[&group])?
            }
        };
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(Into::into))
            .collect()
    }

    fn breakdown(&self) -> Result<Breakdown> {
        let sql = format!("SELECT name, rules FROM {}", self.table);
        let rows = self.client.lock().query(sql.as_str(), &[])?;
        let mut breakdown = Breakdown::new();
        for row in rows {
            let name: String = row.try_get(0)?;
            let Json(rules): Json<RuleSet> = row.try_get(1)?;
            breakdown.insert(name, rules);
        }
        Ok(breakdown)
    }

    fn load(&self, rules: &Breakdown) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (name, rules) VALUES ($1, $2::jsonb)
             ON CONFLICT (name) DO UPDATE SET rules = EXCLUDED.rules",
            self.table
        );
        let mut client = self.client.lock();
        let mut tx = client.transaction()?;
        for (feature, feature_rules) in rules {
            let feature = Feature::parse(feature)?;
            tx.execute(sql.as_str(), &[&feature.as_str(), &Json(feature_rules)])?;
        }
        tx.commit()?;
        debug!(features = rules.len(), "loaded rules");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let sql = format!("TRUNCATE {}", self.table);
        self.client.lock().batch_execute(&sql)?;
        debug!(table = %self.table, "cleared features");
        Ok(())
    }
}

/// Accepts `name` or `schema.name` where each part is a plain SQL identifier.
fn is_identifier(table: &str) -> bool {
    let parts: Vec<&str> = table.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
