//! Domain types for models, joins, and queries.
//!
//! Wire field names match the restbi JSON contract exactly (`dbName`,
//! `joinType`, `sortBy`, `dbTables`, ...) so payloads exchanged with the
//! completion service and the validator deserialize without translation.

use serde::{Deserialize, Serialize};

/// Logical data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnDataType {
    String,
    Number,
    Date,
    Boolean,
    Json,
}

/// Role of a column in a model.
///
/// Only meaningful together with an aggregation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnRole {
    Measure,
    Dimension,
}

/// Supported database engines for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseType {
    Postgres,
    Mysql,
    Oracle,
    SqlServer,
    Sqlite,
    Snowflake,
}

/// A column within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub db_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ColumnRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<ColumnDataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
}

/// A table with its ordered columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    pub db_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    /// Whether `name` refers to this table by display name or storage name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name == name || self.db_name == name
    }
}

/// One equality/comparison clause of a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub column1: String,
    pub column2: String,
    pub operator: String,
}

/// A join between two tables of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
    pub table1: String,
    pub table2: String,
    #[serde(default)]
    pub clauses: Vec<JoinClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<String>,
}

/// A named expression attached to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub id: String,
    pub name: String,
    pub expression: String,
}

/// A named filter expression attached to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub id: String,
    pub name: String,
    pub expression: String,
}

/// Connection details for a database, owned by the caller.
///
/// The synthesizer never fabricates one of these; the caller re-attaches the
/// real connection before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A data model: tables, joins, and attached expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Absent on synthesized candidates; attached by the caller before
    /// validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub formulas: Vec<Formula>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// An unvalidated model suggestion produced by the suggestion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleModel {
    pub name: String,
    pub tables: Vec<String>,
    pub reason: String,
}

/// Validator output: the server's normalized view of the model plus the
/// database-side tables used for cross-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub model: Model,
    #[serde(default)]
    pub db_tables: Vec<Table>,
}

/// Sort direction for a query sort clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort clause of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    pub name: String,
    pub direction: SortDirection,
}

/// `sortBy` accepts a single clause or a list on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortBy {
    One(SortClause),
    Many(Vec<SortClause>),
}

/// A filter value: string, number, boolean, or string list.
///
/// Dates travel as strings; an absent value means the operator is unary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
}

/// One filter predicate of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub column: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FilterValue>,
}

/// A structured query consumable by the execution collaborator.
///
/// Column names must be verifiable against the column set supplied to the
/// translator; enforcement happens downstream, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<QueryFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// Collect human-readable messages for every table or column whose validity
/// flag is not set to `true`.
///
/// An unset flag counts as invalid: the validator's normalized result always
/// carries explicit flags, so anything unset never passed validation. An
/// empty return value is the sole acceptance criterion of the repair loop.
pub fn collect_validation_errors(tables: &[Table]) -> Vec<String> {
    let mut errors = Vec::new();
    for table in tables {
        if table.validated != Some(true) {
            errors.push(format!("Invalid Table: {}", table.name));
        }
        for column in &table.columns {
            if column.validated != Some(true) {
                errors.push(format!(
                    "Invalid Column: {} in Table: {}",
                    column.name, table.name
                ));
            }
        }
    }
    errors
}
