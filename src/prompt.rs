//! Prompt builders for each synthesis task.
//!
//! Each builder is a pure function from domain context (plus an optional
//! free-text user hint) to the final prompt text. The structural contract the
//! model must emit is embedded verbatim from stable `const` strings, and
//! context serialization covers only the minimal relevant subset of the
//! schema (names, never validity flags), so cache fingerprints stay stable
//! for semantically identical requests. The hint clause is appended verbatim
//! when present and omitted entirely when absent; a hint is a different
//! request and intentionally a different fingerprint.

use serde_json::{json, Value};

use crate::model::{Model, Table};

/// Payload contract for model suggestions.
const POSSIBLE_MODEL_CONTRACT: &str =
    r#"PossibleModel = {"name": string, "tables": string[], "reason": string}"#;

/// Payload contract for a single table.
const TABLE_CONTRACT: &str = r#"Column = {"id": string, "dbName": string, "name": string, "alias"?: string, "type"?: "MEASURE" | "DIMENSION", "dataType"?: "STRING" | "NUMBER" | "DATE" | "BOOLEAN" | "JSON", "aggregationType"?: string}
Table = {"id": string, "dbName": string, "name": string, "schema"?: string, "alias"?: string, "columns": Column[]}"#;

/// Payload contract for joins.
const JOIN_CONTRACT: &str = r#"JoinClause = {"column1": string, "column2": string, "operator": string}
Join = {"id": string, "table1": string, "table2": string, "clauses": JoinClause[], "joinType"?: string}"#;

/// Payload contract for a whole model.
const MODEL_CONTRACT: &str = r#"Column = {"id": string, "dbName": string, "name": string, "alias"?: string, "type"?: "MEASURE" | "DIMENSION", "dataType"?: "STRING" | "NUMBER" | "DATE" | "BOOLEAN" | "JSON", "aggregationType"?: string}
Table = {"id": string, "dbName": string, "name": string, "schema"?: string, "alias"?: string, "columns": Column[]}
JoinClause = {"column1": string, "column2": string, "operator": string}
Join = {"id": string, "table1": string, "table2": string, "clauses": JoinClause[], "joinType"?: string}
Formula = {"id": string, "name": string, "expression": string}
Filter = {"id": string, "name": string, "expression": string}
Model = {"id": string, "name": string, "displayName"?: string, "tables": Table[], "joins": Join[], "formulas": Formula[], "filters": Filter[]}"#;

/// Payload contract for a query.
const QUERY_CONTRACT: &str = r#"SortClause = {"name": string, "direction": "ASC" | "DESC"}
QueryFilter = {"column": string, "operator": string, "value"?: string | number | boolean | string[]}
Query = {"columns": string[], "filters"?: QueryFilter[], "sortBy"?: SortClause | SortClause[], "limit"?: number, "offset"?: number}"#;

/// Closing instruction shared by every builder.
const JSON_ONLY: &str = "Do not provide any other words or text in the response.";

/// Minimal overview of one table: display name, optional schema, column names.
fn table_overview(table: &Table, include_schema: bool) -> Value {
    let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let mut overview = json!({"table": table.name, "columns": columns});
    if include_schema {
        if let Some(schema) = &table.schema {
            overview["schema"] = json!(schema);
        }
    }
    overview
}

fn metadata_section(tables: &[&Table], include_schema: bool) -> String {
    tables
        .iter()
        .map(|t| table_overview(t, include_schema).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn hint_clause(hint: Option<&str>) -> String {
    match hint {
        Some(hint) => format!("Here are an additional set of instructions to consider: {hint}\n"),
        None => String::new(),
    }
}

/// Prompt asking the model to suggest possible models for a schema.
pub fn suggest_models(metadata: &[Table], hint: Option<&str>) -> String {
    let tables: Vec<&Table> = metadata.iter().collect();
    format!(
        "The following is a list of all tables in the database, and the columns within those tables, in JSON format:\n\
        {context}\n\
        A Model is a collection of tables and columns that can be used to create queries. \
        Analyze the tables and columns above and suggest what models could be created from them. \
        This could be one or several models, depending on the dataset. \
        A model typically represents a set of business questions, and tables that can be properly joined together to answer those questions.\n\
        {hint}\
        Here is the type definition for a suggestion:\n\
        {contract}\n\
        Provide your suggestions in JSON format as a list of PossibleModel. {json_only}",
        context = metadata_section(&tables, false),
        hint = hint_clause(hint),
        contract = POSSIBLE_MODEL_CONTRACT,
        json_only = JSON_ONLY,
    )
}

/// Prompt asking the model to build one table from its metadata definition.
pub fn build_table(source: &Table, table_name: &str, hint: Option<&str>) -> String {
    format!(
        "The following is the definition of the table {table_name} in JSON format:\n\
        {context}\n\
        Create a valid Table based on the definition above. The table should be named {table_name}. \
        Include the columns most people would find useful, and make sure each display name is human readable. \
        Include schema if available.\n\
        {hint}\
        Here are the type definitions for creating the table:\n\
        {contract}\n\
        Provide your answer in JSON format as a single Table. {json_only}",
        context = table_overview(source, true),
        hint = hint_clause(hint),
        contract = TABLE_CONTRACT,
        json_only = JSON_ONLY,
    )
}

/// Prompt asking the model to build the joins for a set of tables.
pub fn build_joins(tables: &[&Table], hint: Option<&str>) -> String {
    format!(
        "The following is a list of all tables in the database, and the columns within those tables, in JSON format:\n\
        {context}\n\
        Create a valid list of Join objects based on the tables and columns above.\n\
        {hint}\
        Here are the type definitions for creating the joins:\n\
        {contract}\n\
        Provide your answer in JSON format as a list of Join. {json_only}",
        context = metadata_section(tables, true),
        hint = hint_clause(hint),
        contract = JOIN_CONTRACT,
        json_only = JSON_ONLY,
    )
}

/// Prompt asking the model to build a whole model in one shot.
pub fn build_model(tables: &[&Table], model_name: &str, hint: Option<&str>) -> String {
    format!(
        "The following is a list of all tables in the database, and the columns within those tables, in JSON format:\n\
        {context}\n\
        Create a valid Model based on the tables and columns above. The model should be named {model_name}.\n\
        {hint}\
        Here are the type definitions for creating the model:\n\
        {contract}\n\
        Do not include a connection object in the model. Include tables, joins, formulas, and filters as needed. \
        Include schema in tables if available. Limit columns to those that are necessary for the model.\n\
        Provide your answer in JSON format as a Model. {json_only}",
        context = metadata_section(tables, true),
        hint = hint_clause(hint),
        contract = MODEL_CONTRACT,
        json_only = JSON_ONLY,
    )
}

/// Prompt asking the model to fix an invalid candidate, given the collected
/// validation errors.
pub fn repair_model(
    tables: &[&Table],
    candidate: &Model,
    errors: &str,
    hint: Option<&str>,
) -> String {
    format!(
        "The following is a list of all tables in the database, and the columns within those tables, in JSON format:\n\
        {context}\n\
        Fix the following model. The model should be named {model_name}.\n\
        {candidate}\n\
        These validation errors were reported: {errors}\n\
        {hint}\
        Here are the type definitions for fixing the model:\n\
        {contract}\n\
        Do not include a connection object in the model. Include tables, joins, formulas, and filters as needed. \
        Include schema in tables if available. Limit columns to those that are necessary for the model.\n\
        Provide your answer in JSON format as a Model. {json_only}",
        context = metadata_section(tables, true),
        model_name = candidate.name,
        candidate = json!(candidate),
        hint = hint_clause(hint),
        contract = MODEL_CONTRACT,
        json_only = JSON_ONLY,
    )
}

/// Prompt asking the model to translate a free-text question into a query.
pub fn translate_question(metadata: &[Table], question: &str) -> String {
    let columns: Vec<&str> = metadata
        .iter()
        .flat_map(|t| t.columns.iter().map(|c| c.name.as_str()))
        .collect();
    format!(
        "The following is a list of all columns available to us:\n\
        {columns}\n\
        I want to answer the following question: {question}\n\
        Convert this into a Query. The query in this case is a custom JSON syntax:\n\
        {contract}\n\
        Columns can only contain column names with exact spelling; do not include aggregation or aliasing.\n\
        Provide your query in JSON format. {json_only}",
        columns = columns.join(", "),
        contract = QUERY_CONTRACT,
        json_only = JSON_ONLY,
    )
}
