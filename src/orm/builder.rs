//! SQL statement builders
//!
//! One builder per statement, accumulated fluently:
//!
//! ```rust,ignore
//! let select = QueryBuilder
//!     .select()
//!     .from("contacts")
//!     .set(["id", "first_name"])
//!     .filter(criteria.gt("id", 10))
//!     .order("first_name DESC")
//!     .limit(10);
//!
//! select.to_sql();  // literal SQL text
//! select.build();   // `?` placeholders plus bound values
//! ```
//!
//! Table names are used as given; column names go through
//! [`escape_identifier`].

use super::criteria::{PLACEHOLDER, Predicate, bind_value, is_function_call, render_literal};
use super::filter::Filter;
use crate::db::Value;

/// A rendered statement with its bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Backtick-quote an identifier.
///
/// Comma lists are escaped item by item and dotted names segment by
/// segment; `*`, function calls and blank literals pass through.
pub fn escape_identifier(field: &str) -> String {
    if is_function_call(field) {
        return field.to_string();
    }

    if field.contains(',') {
        return field
            .split(',')
            .map(|f| escape_identifier(f.trim()))
            .collect::<Vec<_>>()
            .join(",");
    }

    if field.contains('.') {
        return field
            .split('.')
            .map(escape_identifier)
            .collect::<Vec<_>>()
            .join(".");
    }

    if field.contains('*') || field == "\" \"" || field == "' '" {
        return field.to_string();
    }

    format!("`{}`", field)
}

/// Entry point for the MySQL-flavored dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn insert(&self) -> Insert {
        Insert::default()
    }

    pub fn update(&self) -> Update {
        Update::default()
    }

    pub fn delete(&self) -> Delete {
        Delete::default()
    }

    pub fn select(&self) -> Select {
        Select::default()
    }
}

/// State shared by every statement kind.
#[derive(Debug, Clone, Default)]
pub struct Clauses {
    table: Option<String>,
    predicate: Option<Predicate>,
}

impl Clauses {
    fn table(&self) -> &str {
        self.table.as_deref().unwrap_or_default()
    }

    fn where_sql(&self) -> String {
        match &self.predicate {
            Some(predicate) => format!(" WHERE {}", predicate),
            None => String::new(),
        }
    }

    fn bind_where(&self, params: &mut Vec<Value>) -> String {
        match &self.predicate {
            Some(predicate) => format!(" WHERE {}", predicate.bind(params)),
            None => String::new(),
        }
    }
}

/// Behavior common to all builders: target table, filter, rendering.
pub trait QueryBuilderQueries: Sized {
    fn clauses(&self) -> &Clauses;

    fn clauses_mut(&mut self) -> &mut Clauses;

    /// Render with values inlined as literals.
    fn to_sql(&self) -> String;

    /// Render with `?` placeholders and collect the values to bind.
    fn build(&self) -> Statement;

    /// Set the target table.
    fn table(mut self, table: &str) -> Self {
        self.clauses_mut().table = Some(table.to_string());
        self
    }

    /// `FROM table`
    fn from(self, table: &str) -> Self {
        self.table(table)
    }

    /// The `WHERE` clause. Replaces any earlier filter; empty filters clear it.
    fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.clauses_mut().predicate = filter.into().into_predicate();
        self
    }

    /// Literal form of a value, as used in rendered statements.
    fn treat_value(&self, value: &Value, quote_strings: bool) -> String {
        render_literal(value, quote_strings)
    }

    fn table_name(&self) -> Option<&str> {
        self.clauses().table.as_deref()
    }
}

/// Column/value pairs for INSERT and UPDATE, in insertion order.
#[derive(Debug, Clone, Default)]
struct Assignments(Vec<(String, Value)>);

impl Assignments {
    fn set(&mut self, field: &str, value: Value) {
        let column = escape_identifier(field);
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|(_, value)| value)
    }
}

macro_rules! impl_assignments {
    ($builder:ty) => {
        impl $builder {
            /// `INTO table`
            pub fn into(self, table: &str) -> Self {
                self.table(table)
            }

            /// Assign a column. Setting the same column again replaces the value.
            pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
                self.fields.set(field, value.into());
                self
            }

            /// Assign several columns at once.
            pub fn set_all<K, V, I>(mut self, pairs: I) -> Self
            where
                K: AsRef<str>,
                V: Into<Value>,
                I: IntoIterator<Item = (K, V)>,
            {
                for (field, value) in pairs {
                    self.fields.set(field.as_ref(), value.into());
                }
                self
            }

            pub fn is_empty(&self) -> bool {
                self.fields.0.is_empty()
            }
        }
    };
}

#[derive(Debug, Clone, Default)]
pub struct Insert {
    clauses: Clauses,
    fields: Assignments,
}

impl_assignments!(Insert);

impl QueryBuilderQueries for Insert {
    fn clauses(&self) -> &Clauses {
        &self.clauses
    }

    fn clauses_mut(&mut self) -> &mut Clauses {
        &mut self.clauses
    }

    fn to_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.clauses.table(),
            self.fields.columns().collect::<Vec<_>>().join(", "),
            self.fields
                .values()
                .map(|v| render_literal(v, true))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn build(&self) -> Statement {
        let params: Vec<Value> = self.fields.values().map(bind_value).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.clauses.table(),
            self.fields.columns().collect::<Vec<_>>().join(", "),
            vec![PLACEHOLDER; params.len()].join(", ")
        );
        Statement { sql, params }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Update {
    clauses: Clauses,
    fields: Assignments,
}

impl_assignments!(Update);

impl QueryBuilderQueries for Update {
    fn clauses(&self) -> &Clauses {
        &self.clauses
    }

    fn clauses_mut(&mut self) -> &mut Clauses {
        &mut self.clauses
    }

    fn to_sql(&self) -> String {
        let assignments = self
            .fields
            .0
            .iter()
            .map(|(column, value)| format!("{} = {}", column, render_literal(value, true)))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "UPDATE {} SET {}{};",
            self.clauses.table(),
            assignments,
            self.clauses.where_sql()
        )
    }

    fn build(&self) -> Statement {
        let mut params = Vec::with_capacity(self.fields.0.len());
        let assignments = self
            .fields
            .0
            .iter()
            .map(|(column, value)| {
                params.push(bind_value(value));
                format!("{} = {}", column, PLACEHOLDER)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let where_sql = self.clauses.bind_where(&mut params);

        Statement {
            sql: format!("UPDATE {} SET {}{};", self.clauses.table(), assignments, where_sql),
            params,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Delete {
    clauses: Clauses,
}

impl QueryBuilderQueries for Delete {
    fn clauses(&self) -> &Clauses {
        &self.clauses
    }

    fn clauses_mut(&mut self) -> &mut Clauses {
        &mut self.clauses
    }

    fn to_sql(&self) -> String {
        format!("DELETE FROM {}{};", self.clauses.table(), self.clauses.where_sql())
    }

    fn build(&self) -> Statement {
        let mut params = Vec::new();
        let where_sql = self.clauses.bind_where(&mut params);
        Statement {
            sql: format!("DELETE FROM {}{};", self.clauses.table(), where_sql),
            params,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Select {
    clauses: Clauses,
    fields: Vec<String>,
    joins: Vec<String>,
    groups: Vec<String>,
    having: Option<Predicate>,
    orders: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    /// Prefix a bare column with the table, when one is already set.
    fn qualify(&self, field: String) -> String {
        match self.table_name() {
            Some(table) if !field.contains('.') && !is_function_call(&field) => {
                format!("{}.{}", escape_identifier(table), field)
            }
            _ => field,
        }
    }

    /// Add selected columns. Bare names are escaped and qualified with the
    /// table if [`from`](QueryBuilderQueries::from) was already called.
    pub fn set<S: AsRef<str>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        for field in fields {
            let escaped = escape_identifier(field.as_ref());
            let qualified = self.qualify(escaped);
            self.fields.push(qualified);
        }
        self
    }

    /// Add `expr AS alias`, qualified the same way as [`set`](Self::set).
    pub fn set_as(mut self, expr: &str, alias: &str) -> Self {
        let expr = self.qualify(escape_identifier(expr));
        self.fields.push(format!("{} AS {}", expr, alias));
        self
    }

    /// Append `<KIND> JOIN table ON on`.
    pub fn join(mut self, kind: &str, table: &str, on: &str) -> Self {
        self.joins
            .push(format!("{} JOIN {} ON {}", kind.to_uppercase(), table, on));
        self
    }

    pub fn group<S: AsRef<str>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        for field in fields {
            let qualified = self.qualify(field.as_ref().to_string());
            self.groups.push(qualified);
        }
        self
    }

    pub fn having(mut self, having: impl Into<Filter>) -> Self {
        self.having = having.into().into_predicate();
        self
    }

    /// Append one ORDER BY item, e.g. `"name DESC"`.
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.orders.push(order.into());
        self
    }

    /// Append several ORDER BY items, keeping their order.
    pub fn orders<S: Into<String>>(self, orders: impl IntoIterator<Item = S>) -> Self {
        orders.into_iter().fold(self, |select, order| select.order(order))
    }

    /// Zero means no limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Zero means no offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn render(&self, where_sql: String, having_sql: Option<String>) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.fields.join(", "), self.clauses.table());

        if !self.joins.is_empty() {
            sql.push(' ');
            sql.push_str(&self.joins.join(" "));
        }

        sql.push_str(&where_sql);

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if let Some(having) = having_sql {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }

        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql.push(';');
        sql
    }
}

impl QueryBuilderQueries for Select {
    fn clauses(&self) -> &Clauses {
        &self.clauses
    }

    fn clauses_mut(&mut self) -> &mut Clauses {
        &mut self.clauses
    }

    fn to_sql(&self) -> String {
        let having = self.having.as_ref().map(ToString::to_string);
        self.render(self.clauses.where_sql(), having)
    }

    fn build(&self) -> Statement {
        let mut params = Vec::new();
        let where_sql = self.clauses.bind_where(&mut params);
        let having = self.having.as_ref().map(|h| h.bind(&mut params));
        Statement {
            sql: self.render(where_sql, having),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::SqlCriteria;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("table.field"), "`table`.`field`");
        assert_eq!(escape_identifier("*"), "*");
        assert_eq!(escape_identifier("COUNT(*)"), "COUNT(*)");
        assert_eq!(escape_identifier("name"), "`name`");
        assert_eq!(escape_identifier("a, b"), "`a`,`b`");
        assert_eq!(escape_identifier("t.*"), "`t`.*");
    }

    #[test]
    fn test_insert_common_way() {
        let sql = QueryBuilder
            .insert()
            .into("table_name")
            .set_all([
                ("name", Value::from("person name")),
                ("birth_year", Value::from(1992)),
                ("status", Value::from(true)),
            ])
            .to_sql();

        assert_eq!(
            sql,
            "INSERT INTO table_name (`name`, `birth_year`, `status`) VALUES (\"person name\", 1992, 1);"
        );
    }

    #[test]
    fn test_insert_detailed_way_with_date() {
        let when = NaiveDate::from_ymd_opt(2017, 10, 20)
            .unwrap()
            .and_hms_opt(16, 50, 0)
            .unwrap();
        let sql = QueryBuilder
            .insert()
            .into("logs")
            .set("user_id", 1)
            .set("message", "Inserted something on database")
            .set("when", when)
            .to_sql();

        assert_eq!(
            sql,
            "INSERT INTO logs (`user_id`, `message`, `when`) \
             VALUES (1, \"Inserted something on database\", \"2017-10-20 16:50:00\");"
        );
    }

    #[test]
    fn test_insert_build_binds_normalized_values() {
        let statement = QueryBuilder
            .insert()
            .into("flags")
            .set("name", "beta")
            .set("enabled", false)
            .build();

        assert_eq!(statement.sql, "INSERT INTO flags (`name`, `enabled`) VALUES (?, ?);");
        assert_eq!(statement.params, vec![Value::from("beta"), Value::Int(0)]);
    }

    #[test]
    fn test_update_with_where() {
        let expr = SqlCriteria;
        let update = QueryBuilder
            .update()
            .into("contacts")
            .set("first_name", "Ann")
            .set("age", 30)
            .filter(expr.eq("id", 4));

        assert_eq!(
            update.to_sql(),
            "UPDATE contacts SET `first_name` = \"Ann\", `age` = 30 WHERE id = 4;"
        );

        let statement = update.build();
        assert_eq!(statement.sql, "UPDATE contacts SET `first_name` = ?, `age` = ? WHERE id = ?;");
        assert_eq!(
            statement.params,
            vec![Value::from("Ann"), Value::Int(30), Value::Int(4)]
        );
    }

    #[test]
    fn test_delete_with_and_without_where() {
        assert_eq!(QueryBuilder.delete().from("logs").to_sql(), "DELETE FROM logs;");
        assert_eq!(
            QueryBuilder.delete().from("logs").filter("id < 10").to_sql(),
            "DELETE FROM logs WHERE id < 10;"
        );
    }

    #[test]
    fn test_select_qualifies_bare_fields() {
        let sql = QueryBuilder
            .select()
            .from("table_name")
            .set(["id", "name", "table_name.active"])
            .to_sql();

        assert_eq!(
            sql,
            "SELECT `table_name`.`id`, `table_name`.`name`, `table_name`.`active` FROM table_name;"
        );
    }

    #[test]
    fn test_select_join() {
        let sql = QueryBuilder
            .select()
            .from("table_name")
            .set(["table_name.*"])
            .join("left", "other_table", "table_name.id = other_table.fk_id")
            .to_sql();

        assert_eq!(
            sql,
            "SELECT `table_name`.* FROM table_name LEFT JOIN other_table ON table_name.id = other_table.fk_id;"
        );
    }

    #[test]
    fn test_select_group() {
        let sql = QueryBuilder
            .select()
            .from("table_name")
            .set(["*"])
            .group(["table_name.average"])
            .to_sql();

        assert_eq!(sql, "SELECT `table_name`.* FROM table_name GROUP BY table_name.average;");
    }

    #[test]
    fn test_select_alias_limit_offset() {
        let sql = QueryBuilder
            .select()
            .from("table_name")
            .set(["id"])
            .set_as("first_name", "name")
            .limit(10)
            .offset(20)
            .to_sql();

        assert_eq!(
            sql,
            "SELECT `table_name`.`id`, `table_name`.`first_name` AS name FROM table_name LIMIT 10 OFFSET 20;"
        );
    }

    #[test]
    fn test_select_with_criteria() {
        let expr = SqlCriteria;
        let sql = QueryBuilder
            .select()
            .from("table_name")
            .set(["*"])
            .filter(
                expr.and_x([expr.eq("active", 1), expr.gt("value", 100), expr.lt("value", 1000)])
                    .unwrap(),
            )
            .to_sql();

        assert_eq!(
            sql,
            "SELECT `table_name`.* FROM table_name WHERE (active = 1 AND value > 100 AND value < 1000);"
        );
    }

    #[test]
    fn test_select_having_and_order() {
        let expr = SqlCriteria;
        let sql = QueryBuilder
            .select()
            .set(["*"])
            .from("table_name")
            .having(expr.eq("active", false))
            .orders(["name DESC", "id"])
            .to_sql();

        assert_eq!(sql, "SELECT * FROM table_name HAVING active = 0 ORDER BY name DESC, id;");
    }

    #[test]
    fn test_select_clause_order_and_binding() {
        let expr = SqlCriteria;
        let select = QueryBuilder
            .select()
            .from("orders")
            .set(["customer_id"])
            .set_as("COUNT(*)", "total")
            .join("inner", "customers", "customers.id = orders.customer_id")
            .filter(expr.gte("orders.amount", 10))
            .group(["customer_id"])
            .having(expr.gt("COUNT(*)", 2))
            .order("total DESC")
            .limit(5)
            .offset(5);

        let statement = select.build();
        assert_eq!(
            statement.sql,
            "SELECT `orders`.`customer_id`, COUNT(*) AS total FROM orders \
             INNER JOIN customers ON customers.id = orders.customer_id \
             WHERE orders.amount >= ? GROUP BY `orders`.customer_id \
             HAVING COUNT(*) > ? ORDER BY total DESC LIMIT 5 OFFSET 5;"
        );
        assert_eq!(statement.params, vec![Value::Int(10), Value::Int(2)]);
    }

    #[test]
    fn test_zero_limit_and_offset_are_omitted() {
        let sql = QueryBuilder.select().set(["*"]).from("t").limit(0).offset(0).to_sql();
        assert_eq!(sql, "SELECT * FROM t;");
    }

    #[test]
    fn test_count_before_from_is_not_qualified() {
        let sql = QueryBuilder
            .select()
            .set_as("COUNT(*)", "total")
            .from("contacts")
            .filter(SqlCriteria.like("first_name", "Joabe"))
            .to_sql();

        assert_eq!(
            sql,
            "SELECT COUNT(*) AS total FROM contacts WHERE first_name LIKE \"%Joabe%\";"
        );
    }
}
