//! PostgreSQL dialect.
//!
//! PostgreSQL runs DDL inside transactions, has native sequences, serial
//! columns, INHERITS, real schemas and user-defined types, so most of the
//! default rendering applies unchanged.

use super::{
    Capabilities, DialectAdapter, Feature, FeaturePolicies, FeaturePolicy, IdentifierQuoting,
};
use crate::catalog::ResolvedTable;

/// PostgreSQL (8.x and later) dialect.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect {
    quoting: IdentifierQuoting,
    policies: FeaturePolicies,
}

impl PostgresDialect {
    /// Creates the dialect with default quoting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Quotes every identifier.
    #[must_use]
    pub const fn quote_all_names(mut self, quote_all: bool) -> Self {
        self.quoting = if quote_all {
            IdentifierQuoting::All
        } else {
            IdentifierQuoting::IllegalOnly
        };
        self
    }

    /// Overrides the policy for an unsupported feature.
    #[must_use]
    pub fn with_policy(mut self, feature: Feature, policy: FeaturePolicy) -> Self {
        self.policies.set(feature, policy);
        self
    }
}

impl DialectAdapter for PostgresDialect {
    fn name(&self) -> &'static str {
        "pgsql8"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactional_ddl: true,
            indexes_coupled_to_foreign_keys: false,
            native_sequences: true,
            primary_key_carries_auto_increment: false,
            named_primary_keys: true,
            table_inheritance: true,
            multiple_schemas: true,
            check_constraints: true,
            user_defined_types: true,
        }
    }

    fn quoting(&self) -> IdentifierQuoting {
        self.quoting
    }

    fn feature_policy(&self, feature: Feature) -> FeaturePolicy {
        self.policies.get(feature)
    }

    fn is_implicit_schema(&self, schema: &str) -> bool {
        schema.eq_ignore_ascii_case("public")
    }

    fn create_table(&self, table: &ResolvedTable<'_>) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("\t{}", self.column_definition(c)))
            .collect();
        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)",
            self.table_ref(table.schema_name(), table.name()),
            columns.join(",\n")
        );
        if let Some(ref parent) = table.inherits {
            sql.push_str(&format!(
                " INHERITS ({})",
                self.table_ref(&parent.schema, &parent.name)
            ));
        }
        sql
    }

    fn serial_reset(&self, schema: &str, table: &str, column: &str) -> Option<String> {
        let table_ref = self.table_ref(schema, table);
        let column_ref = self.quote_identifier(column);
        Some(format!(
            "SELECT setval(pg_get_serial_sequence('{}', '{}'), MAX({column_ref}), TRUE) FROM {table_ref}",
            table_ref.replace('\'', "''"),
            column.replace('\'', "''"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResolvedColumn;
    use crate::model::{Function, FunctionParameter, Grant, Index, TypeDef, TypeKind};

    use super::super::GrantTarget;

    fn dialect() -> PostgresDialect {
        PostgresDialect::new()
    }

    #[test]
    fn quoting_illegal_only() {
        let d = dialect();
        assert_eq!(d.quote_identifier("users"), "users");
        assert_eq!(d.quote_identifier("user"), "\"user\"");
        assert_eq!(d.quote_identifier("first name"), "\"first name\"");
        assert_eq!(d.table_ref("app", "order"), "app.\"order\"");
    }

    #[test]
    fn quoting_all() {
        let d = dialect().quote_all_names(true);
        assert_eq!(d.quote_identifier("users"), "\"users\"");
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn literals() {
        let d = dialect();
        assert_eq!(d.literal("42", "integer"), "42");
        assert_eq!(d.literal("4x", "integer"), "'4x'");
        assert_eq!(d.literal("t", "boolean"), "TRUE");
        assert_eq!(d.literal("O'Brien", "text"), "'O''Brien'");
    }

    #[test]
    fn column_definition() {
        let d = dialect();
        let mut col = ResolvedColumn::new("created_at", "timestamp");
        col.nullable = false;
        col.default = Some("now()".into());
        assert_eq!(
            d.column_definition(&col),
            "created_at timestamp NOT NULL DEFAULT now()"
        );
    }

    #[test]
    fn index_statements() {
        let d = dialect();
        let mut idx = Index::new("users_email_idx", &["lower(email)"]).unique();
        idx.using = Some("btree".into());
        assert_eq!(
            d.create_index("app", "app.users", &idx),
            "CREATE UNIQUE INDEX users_email_idx ON app.users USING btree (lower(email))"
        );
        assert_eq!(
            d.drop_index("app", "app.users", &idx),
            "DROP INDEX app.users_email_idx"
        );
    }

    #[test]
    fn serial_reset_uses_pg_get_serial_sequence() {
        let sql = dialect().serial_reset("app", "users", "id").unwrap();
        assert_eq!(
            sql,
            "SELECT setval(pg_get_serial_sequence('app.users', 'id'), MAX(id), TRUE) FROM app.users"
        );
    }

    #[test]
    fn type_and_function_statements() {
        let d = dialect();
        let mood = TypeDef {
            name: "mood".into(),
            kind: TypeKind::Enum {
                values: vec!["sad".into(), "happy".into()],
            },
        };
        assert_eq!(
            d.create_type("app", &mood),
            "CREATE TYPE app.mood AS ENUM ('sad', 'happy')"
        );

        let f = Function {
            name: "add_one".into(),
            returns: "integer".into(),
            language: Some("plpgsql".into()),
            parameters: vec![FunctionParameter {
                name: Some("x".into()),
                data_type: "integer".into(),
            }],
            definitions: Vec::new(),
            grants: vec![Grant::new(&["app_user"], &["EXECUTE"])],
        };
        assert_eq!(
            d.drop_function("app", &f),
            "DROP FUNCTION IF EXISTS app.add_one(integer)"
        );
        let create = d.create_function("app", &f, "BEGIN RETURN x + 1; END;");
        assert!(create[0].starts_with("CREATE OR REPLACE FUNCTION app.add_one(x integer) RETURNS integer"));
        assert!(create[0].ends_with("LANGUAGE plpgsql"));
    }

    #[test]
    fn grants() {
        let d = dialect();
        let ops = vec!["SELECT".to_string(), "INSERT".to_string()];
        assert_eq!(
            d.grant(GrantTarget::Table, "app.users", &ops, "app_user", false),
            Some("GRANT SELECT, INSERT ON TABLE app.users TO app_user".to_string())
        );
        assert_eq!(
            d.revoke(GrantTarget::Schema, "app", &ops[..1], "app_user"),
            Some("REVOKE SELECT ON SCHEMA app FROM app_user".to_string())
        );
    }

    #[test]
    fn envelope_is_transactional() {
        let envelope = dialect().transaction_envelope().unwrap();
        assert_eq!(envelope.begin, "BEGIN;");
        assert_eq!(envelope.commit, "COMMIT;");
    }
}
