//! SQL statements for the `persons` table.
//!
//! The builders here are pure: they turn a filter, pagination and partial
//! metadata into parameterized SQL plus an ordered argument list. Executing
//! the statements is the relational adapter's job.

use persona_core::{PersonFilter, PersonalMetaData};

pub const CREATE_PERSONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS persons (\
    id TEXT PRIMARY KEY, \
    name TEXT NOT NULL, \
    surname TEXT NOT NULL, \
    patronymic TEXT NOT NULL DEFAULT '', \
    nation TEXT NOT NULL DEFAULT '', \
    gender TEXT NOT NULL DEFAULT '', \
    age INT NOT NULL DEFAULT 0 CHECK (age >= 0))";

pub const INSERT_PERSON: &str = "INSERT INTO persons (id, name, surname, patronymic, nation, gender, age) \
    VALUES ($1, $2, $3, $4, $5, $6, $7)";

pub const SELECT_PERSON_BY_ID: &str =
    "SELECT id, name, surname, patronymic, nation, gender, age FROM persons WHERE id = $1";

pub const DELETE_PERSON: &str = "DELETE FROM persons WHERE id = $1";

const SELECT_PERSONS: &str =
    "SELECT p.id, p.name, p.surname, p.patronymic, p.nation, p.gender, p.age FROM persons AS p";

/// A bound statement argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryArg {
    /// Age bounds and age values (`INT`).
    Int(i32),
    /// LIMIT / OFFSET (`BIGINT`).
    BigInt(i64),
    Text(String),
}

/// Parameterized SQL with its arguments in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<QueryArg>,
}

/// Hands out `$n` placeholders in emission order.
#[derive(Default)]
struct Binder {
    args: Vec<QueryArg>,
}

impl Binder {
    fn bind(&mut self, arg: QueryArg) -> String {
        self.args.push(arg);
        format!("${}", self.args.len())
    }

    fn predicates(&mut self, filter: &PersonFilter) -> Vec<String> {
        let mut preds = Vec::new();
        if let Some(age) = filter.older_than {
            preds.push(format!("age > {}", self.bind(QueryArg::Int(age))));
        }
        if let Some(age) = filter.younger_than {
            preds.push(format!("age < {}", self.bind(QueryArg::Int(age))));
        }
        if let Some(gender) = &filter.gender {
            preds.push(format!(
                "gender = {}",
                self.bind(QueryArg::Text(gender.clone()))
            ));
        }
        match filter.nations.as_slice() {
            [] => {}
            [nation] => {
                preds.push(format!(
                    "nation = {}",
                    self.bind(QueryArg::Text(nation.clone()))
                ));
            }
            nations => {
                let slots: Vec<String> = nations
                    .iter()
                    .map(|n| self.bind(QueryArg::Text(n.clone())))
                    .collect();
                preds.push(format!("nation IN ({})", slots.join(",")));
            }
        }
        preds
    }
}

fn where_clause(preds: &[String]) -> String {
    if preds.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", preds.join(" AND "))
    }
}

/// Build the listing query.
///
/// With both `limit` and `offset` positive, pagination runs in a keyed
/// subquery joined back on `id`. With only `limit` positive it is applied
/// directly. Any other combination returns every matching row. Rows are
/// always ordered by id.
pub fn collect_statement(filter: &PersonFilter, limit: i64, offset: i64) -> Statement {
    let mut binder = Binder::default();
    let mut sql = String::from(SELECT_PERSONS);

    if limit > 0 && offset > 0 {
        let preds = binder.predicates(filter);
        let limit_slot = binder.bind(QueryArg::BigInt(limit));
        let offset_slot = binder.bind(QueryArg::BigInt(offset));
        sql.push_str(&format!(
            " JOIN (SELECT id FROM persons{} ORDER BY id LIMIT {} OFFSET {}) AS tmp ON tmp.id = p.id ORDER BY p.id",
            where_clause(&preds),
            limit_slot,
            offset_slot
        ));
    } else if limit > 0 {
        let preds = binder.predicates(filter);
        sql.push_str(&where_clause(&preds));
        let limit_slot = binder.bind(QueryArg::BigInt(limit));
        sql.push_str(&format!(" ORDER BY p.id LIMIT {limit_slot}"));
    } else {
        let preds = binder.predicates(filter);
        sql.push_str(&where_clause(&preds));
        sql.push_str(" ORDER BY p.id");
    }

    Statement {
        sql,
        args: binder.args,
    }
}

/// Build a partial metadata update. Returns `None` when `meta` has no
/// present field.
pub fn update_statement(id: &str, meta: &PersonalMetaData) -> Option<Statement> {
    let mut binder = Binder::default();
    let mut sets = Vec::new();

    if let Some(nation) = meta.nation() {
        sets.push(format!(
            "nation = {}",
            binder.bind(QueryArg::Text(nation.to_string()))
        ));
    }
    if let Some(gender) = meta.gender() {
        sets.push(format!(
            "gender = {}",
            binder.bind(QueryArg::Text(gender.to_string()))
        ));
    }
    if let Some(age) = meta.age() {
        sets.push(format!("age = {}", binder.bind(QueryArg::Int(age))));
    }
    if sets.is_empty() {
        return None;
    }

    let id_slot = binder.bind(QueryArg::Text(id.to_string()));
    Some(Statement {
        sql: format!("UPDATE persons SET {} WHERE id = {}", sets.join(", "), id_slot),
        args: binder.args,
    })
}
