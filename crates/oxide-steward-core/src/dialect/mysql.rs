//! MySQL dialect.
//!
//! MySQL auto-commits DDL, keeps the auto-increment flag on the primary
//! key column and requires an index behind every foreign key, so index and
//! foreign-key changes travel together in multi-clause ALTER TABLE
//! statements. Sequences are emulated with a `__sequences` table and a
//! `nextval` function; schemas only exist as an optional table-name prefix.

use super::{
    is_boolean_type, parse_boolean, quote_string, Capabilities, DialectAdapter, Feature,
    FeaturePolicies, FeaturePolicy, GrantTarget, IdentifierQuoting,
};
use crate::catalog::{ResolvedColumn, ResolvedConstraint};
use crate::model::{ConstraintKind, Function, Index, Sequence, Trigger};

const SEQUENCE_TABLE: &str = "__sequences";

/// MySQL 5.x dialect.
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect {
    quoting: IdentifierQuoting,
    use_schema_prefix: bool,
    policies: FeaturePolicies,
}

impl MySqlDialect {
    /// Creates the dialect with default quoting and no schema prefix.
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

    /// Prefixes table and object names with their schema name
    /// (`schema_table`).
    #[must_use]
    pub const fn use_schema_prefix(mut self, prefix: bool) -> Self {
        self.use_schema_prefix = prefix;
        self
    }

    /// Overrides the policy for an unsupported feature.
    #[must_use]
    pub fn with_policy(mut self, feature: Feature, policy: FeaturePolicy) -> Self {
        self.policies.set(feature, policy);
        self
    }

    fn physical_name(&self, schema: &str, name: &str) -> String {
        if self.use_schema_prefix {
            format!("{schema}_{name}")
        } else {
            name.to_string()
        }
    }

    fn sequence_key(&self, schema: &str, name: &str) -> String {
        quote_string(&self.physical_name(schema, name))
    }

    fn modify_column(&self, table_ref: &str, column: &ResolvedColumn, auto_increment: bool) -> String {
        let mut clause = format!("MODIFY COLUMN {}", self.column_definition(column));
        if auto_increment {
            clause.push_str(" AUTO_INCREMENT");
        }
        self.alter_table(table_ref, &[clause])
    }

    fn serial_names(table: &str, column: &str) -> (String, String) {
        (
            format!("__{table}_{column}_serial_seq"),
            format!("__{table}_{column}_serial_trigger"),
        )
    }
}

impl DialectAdapter for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql5"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactional_ddl: false,
            indexes_coupled_to_foreign_keys: true,
            native_sequences: false,
            primary_key_carries_auto_increment: true,
            named_primary_keys: false,
            table_inheritance: false,
            multiple_schemas: false,
            check_constraints: false,
            user_defined_types: false,
        }
    }

    fn quoting(&self) -> IdentifierQuoting {
        self.quoting
    }

    fn feature_policy(&self, feature: Feature) -> FeaturePolicy {
        self.policies.get(feature)
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn table_ref(&self, schema: &str, table: &str) -> String {
        self.quote_identifier(&self.physical_name(schema, table))
    }

    fn serial_base_type(&self, declared: &str) -> &'static str {
        if declared.trim().eq_ignore_ascii_case("bigserial") {
            "bigint"
        } else {
            "int"
        }
    }

    fn literal(&self, value: &str, data_type: &str) -> String {
        if is_boolean_type(data_type) {
            if let Some(b) = parse_boolean(value) {
                return if b { "1" } else { "0" }.to_string();
            }
        }
        if super::is_numeric_type(data_type) && value.trim().parse::<f64>().is_ok() {
            return value.trim().to_string();
        }
        quote_string(&value.replace('\\', "\\\\"))
    }

    fn convert_default(&self, default: &str, data_type: &str) -> String {
        let trimmed = default.trim();
        let bare = trimmed
            .split("::")
            .next()
            .unwrap_or(trimmed)
            .trim_matches('\'');
        if bare.eq_ignore_ascii_case("epoch") {
            return "'1970-01-01 00:00:00'".to_string();
        }
        if trimmed.eq_ignore_ascii_case("now()") {
            return "CURRENT_TIMESTAMP".to_string();
        }
        if is_boolean_type(data_type) {
            if let Some(b) = parse_boolean(bare) {
                return if b { "1" } else { "0" }.to_string();
            }
        }
        trimmed.to_string()
    }

    fn column_type(&self, column: &ResolvedColumn) -> String {
        if column.serial {
            column.base_type.clone()
        } else {
            column.data_type.clone()
        }
    }

    fn rename_table(&self, schema: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.table_ref(schema, old_name),
            self.table_ref(schema, new_name)
        )
    }

    fn move_table(&self, old_schema: &str, table: &str, new_schema: &str) -> Option<String> {
        let from = self.table_ref(old_schema, table);
        let to = self.table_ref(new_schema, table);
        (from != to).then(|| format!("RENAME TABLE {from} TO {to}"))
    }

    fn rename_column(&self, table_ref: &str, old_name: &str, column: &ResolvedColumn) -> String {
        let mut clause = format!(
            "CHANGE COLUMN {} {}",
            self.quote_identifier(old_name),
            self.column_definition(column)
        );
        if column.auto_increment {
            clause.push_str(" AUTO_INCREMENT");
        }
        self.alter_table(table_ref, &[clause])
    }

    fn alter_column_type(
        &self,
        table_ref: &str,
        column: &ResolvedColumn,
        _using: Option<&str>,
    ) -> String {
        self.modify_column(table_ref, column, column.auto_increment)
    }

    fn alter_column_nullability(&self, table_ref: &str, column: &ResolvedColumn) -> String {
        self.modify_column(table_ref, column, column.auto_increment)
    }

    fn add_constraint_clause(&self, constraint: &ResolvedConstraint) -> String {
        match constraint.kind {
            ConstraintKind::PrimaryKey => format!("ADD PRIMARY KEY {}", constraint.definition),
            _ => format!(
                "ADD CONSTRAINT {} {} {}",
                self.quote_identifier(&constraint.name),
                constraint.kind.as_sql(),
                constraint.definition
            ),
        }
    }

    fn drop_constraint_clause(&self, constraint: &ResolvedConstraint) -> String {
        let name = self.quote_identifier(&constraint.name);
        match constraint.kind {
            ConstraintKind::PrimaryKey => "DROP PRIMARY KEY".to_string(),
            ConstraintKind::ForeignKey => format!("DROP FOREIGN KEY {name}"),
            ConstraintKind::Unique => format!("DROP INDEX {name}"),
            ConstraintKind::Check => format!("DROP CHECK {name}"),
        }
    }

    fn strip_auto_increment(&self, table_ref: &str, column: &ResolvedColumn) -> Option<String> {
        Some(self.modify_column(table_ref, column, false))
    }

    fn restore_auto_increment(&self, table_ref: &str, column: &ResolvedColumn) -> Option<String> {
        Some(self.modify_column(table_ref, column, true))
    }

    fn supports_index_method(&self, method: &str) -> bool {
        method.eq_ignore_ascii_case("btree") || method.eq_ignore_ascii_case("hash")
    }

    fn create_index(&self, _schema: &str, table_ref: &str, index: &Index) -> String {
        self.alter_table(table_ref, &[self.add_index_clause(index)])
    }

    fn drop_index(&self, _schema: &str, table_ref: &str, index: &Index) -> String {
        self.alter_table(table_ref, &[self.drop_index_clause(index)])
    }

    fn add_index_clause(&self, index: &Index) -> String {
        let dims: Vec<String> = index
            .dimensions
            .iter()
            .map(|d| self.index_dimension(d))
            .collect();
        let unique = if index.unique { "UNIQUE " } else { "" };
        let mut clause = format!(
            "ADD {unique}INDEX {} ({})",
            self.quote_identifier(&index.name),
            dims.join(", ")
        );
        if let Some(ref using) = index.using {
            if self.supports_index_method(using) {
                clause.push_str(" USING ");
                clause.push_str(&using.to_ascii_uppercase());
            }
        }
        clause
    }

    fn create_sequence(&self, schema: &str, sequence: &Sequence) -> Vec<String> {
        vec![format!(
            "INSERT INTO {} (`name`, `increment`, `min_value`, `max_value`, `cur_value`, `cycle`) VALUES ({}, {}, {}, {}, {}, {})",
            self.quote_identifier(SEQUENCE_TABLE),
            self.sequence_key(schema, &sequence.name),
            sequence.increment.unwrap_or(1),
            sequence.min_value.unwrap_or(1),
            sequence
                .max_value
                .map_or_else(|| "18446744073709551615".to_string(), |v| v.to_string()),
            sequence.start.unwrap_or(1),
            if sequence.cycle { "TRUE" } else { "FALSE" },
        )]
    }

    fn alter_sequence(&self, schema: &str, sequence: &Sequence) -> Vec<String> {
        let mut sets = vec![
            format!("`increment` = {}", sequence.increment.unwrap_or(1)),
            format!("`min_value` = {}", sequence.min_value.unwrap_or(1)),
            format!(
                "`max_value` = {}",
                sequence
                    .max_value
                    .map_or_else(|| "18446744073709551615".to_string(), |v| v.to_string())
            ),
            format!("`cycle` = {}", if sequence.cycle { "TRUE" } else { "FALSE" }),
        ];
        if let Some(start) = sequence.start {
            sets.push(format!("`cur_value` = {start}"));
        }
        vec![format!(
            "UPDATE {} SET {} WHERE `name` = {}",
            self.quote_identifier(SEQUENCE_TABLE),
            sets.join(", "),
            self.sequence_key(schema, &sequence.name)
        )]
    }

    fn drop_sequence(&self, schema: &str, name: &str) -> Vec<String> {
        vec![format!(
            "DELETE FROM {} WHERE `name` = {}",
            self.quote_identifier(SEQUENCE_TABLE),
            self.sequence_key(schema, name)
        )]
    }

    fn sequence_support(&self) -> Vec<String> {
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n\
                 \t`name` VARCHAR(100) NOT NULL,\n\
                 \t`increment` INT UNSIGNED NOT NULL DEFAULT 1,\n\
                 \t`min_value` BIGINT UNSIGNED NOT NULL DEFAULT 1,\n\
                 \t`max_value` BIGINT UNSIGNED NOT NULL DEFAULT 18446744073709551615,\n\
                 \t`cur_value` BIGINT UNSIGNED DEFAULT 1,\n\
                 \t`cycle` BOOLEAN NOT NULL DEFAULT FALSE,\n\
                 \tPRIMARY KEY (`name`)\n\
                 ) ENGINE=InnoDB",
                self.quote_identifier(SEQUENCE_TABLE)
            ),
            "DROP FUNCTION IF EXISTS `nextval`".to_string(),
            format!(
                "CREATE FUNCTION `nextval` (`seq_name` VARCHAR(100)) RETURNS BIGINT UNSIGNED\n\
                 MODIFIES SQL DATA\n\
                 BEGIN\n\
                 \tDECLARE cur BIGINT UNSIGNED;\n\
                 \tSELECT `cur_value` INTO cur FROM {table} WHERE `name` = seq_name FOR UPDATE;\n\
                 \tUPDATE {table} SET `cur_value` = IF(\n\
                 \t\t`cur_value` + `increment` > `max_value`,\n\
                 \t\tIF(`cycle`, `min_value`, NULL),\n\
                 \t\t`cur_value` + `increment`)\n\
                 \tWHERE `name` = seq_name;\n\
                 \tRETURN cur;\n\
                 END",
                table = self.quote_identifier(SEQUENCE_TABLE)
            ),
        ]
    }

    fn serial_emulation(&self, schema: &str, table: &str, column: &ResolvedColumn) -> Vec<String> {
        let (sequence, trigger) = Self::serial_names(table, &column.name);
        let mut seq = Sequence::new(sequence.clone());
        seq.start = column.serial_start;
        let mut statements = self.create_sequence(schema, &seq);
        let column_ref = self.quote_identifier(&column.name);
        statements.push(format!(
            "CREATE TRIGGER {} BEFORE INSERT ON {} FOR EACH ROW SET NEW.{column_ref} = COALESCE(NEW.{column_ref}, nextval({}))",
            self.quote_identifier(&trigger),
            self.table_ref(schema, table),
            self.sequence_key(schema, &sequence),
        ));
        statements
    }

    fn drop_serial_emulation(&self, schema: &str, table: &str, column: &str) -> Vec<String> {
        let (sequence, trigger) = Self::serial_names(table, column);
        let mut statements = vec![format!(
            "DROP TRIGGER IF EXISTS {}",
            self.quote_identifier(&trigger)
        )];
        statements.extend(self.drop_sequence(schema, &sequence));
        statements
    }

    fn supports_statement_triggers(&self) -> bool {
        false
    }

    fn create_trigger(&self, _schema: &str, table_ref: &str, trigger: &Trigger) -> Vec<String> {
        let split = trigger.events.len() > 1;
        trigger
            .events
            .iter()
            .map(|event| {
                let name = if split {
                    format!("{}_{}", trigger.name, event.to_ascii_lowercase())
                } else {
                    trigger.name.clone()
                };
                format!(
                    "CREATE TRIGGER {} {} {} ON {table_ref} FOR EACH ROW {}",
                    self.quote_identifier(&name),
                    trigger.timing.to_ascii_uppercase(),
                    event.to_ascii_uppercase(),
                    trigger.function.trim().trim_end_matches(';')
                )
            })
            .collect()
    }

    fn drop_trigger(&self, _schema: &str, _table_ref: &str, trigger: &Trigger) -> Vec<String> {
        let split = trigger.events.len() > 1;
        trigger
            .events
            .iter()
            .map(|event| {
                let name = if split {
                    format!("{}_{}", trigger.name, event.to_ascii_lowercase())
                } else {
                    trigger.name.clone()
                };
                format!("DROP TRIGGER IF EXISTS {}", self.quote_identifier(&name))
            })
            .collect()
    }

    fn create_function(&self, schema: &str, function: &Function, body: &str) -> Vec<String> {
        let params: Vec<String> = function
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let name = p.name.clone().unwrap_or_else(|| format!("arg{}", i + 1));
                format!("{} {}", self.quote_identifier(&name), p.data_type)
            })
            .collect();
        vec![
            self.drop_function(schema, function),
            format!(
                "CREATE FUNCTION {} ({}) RETURNS {}\n{}",
                self.object_ref(schema, &function.name),
                params.join(", "),
                function.returns,
                body.trim()
            ),
        ]
    }

    fn drop_function(&self, schema: &str, function: &Function) -> String {
        format!(
            "DROP FUNCTION IF EXISTS {}",
            self.object_ref(schema, &function.name)
        )
    }

    fn grant_object_keyword(&self, target: GrantTarget) -> Option<&'static str> {
        match target {
            GrantTarget::Table | GrantTarget::View => Some(""),
            GrantTarget::Function => Some("FUNCTION "),
            GrantTarget::Schema | GrantTarget::Sequence => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(definition: &str) -> ResolvedConstraint {
        ResolvedConstraint::new("t_pkey", ConstraintKind::PrimaryKey, definition)
    }

    #[test]
    fn backtick_quoting_and_prefix() {
        let d = MySqlDialect::new();
        assert_eq!(d.table_ref("app", "users"), "users");
        assert_eq!(d.table_ref("app", "order"), "`order`");

        let d = MySqlDialect::new().use_schema_prefix(true).quote_all_names(true);
        assert_eq!(d.table_ref("app", "users"), "`app_users`");
    }

    #[test]
    fn no_transaction_envelope() {
        assert!(MySqlDialect::new().transaction_envelope().is_none());
    }

    #[test]
    fn literals_and_defaults() {
        let d = MySqlDialect::new();
        assert_eq!(d.literal("true", "boolean"), "1");
        assert_eq!(d.literal("a\\b", "text"), "'a\\\\b'");
        assert_eq!(d.convert_default("'epoch'::timestamp", "timestamp"), "'1970-01-01 00:00:00'");
        assert_eq!(d.convert_default("now()", "timestamp"), "CURRENT_TIMESTAMP");
        assert_eq!(d.convert_default("false", "boolean"), "0");
    }

    #[test]
    fn primary_key_clauses() {
        let d = MySqlDialect::new();
        let c = pk("(id)");
        assert_eq!(d.add_constraint("t", &c), "ALTER TABLE t ADD PRIMARY KEY (id)");
        assert_eq!(d.drop_constraint("t", &c), "ALTER TABLE t DROP PRIMARY KEY");
    }

    #[test]
    fn auto_increment_strip_and_restore() {
        let d = MySqlDialect::new();
        let mut id = ResolvedColumn::new("id", "serial");
        id.serial = true;
        id.base_type = "int".into();
        id.nullable = false;
        id.auto_increment = true;
        assert_eq!(
            d.strip_auto_increment("t", &id).unwrap(),
            "ALTER TABLE t MODIFY COLUMN id int NOT NULL"
        );
        assert_eq!(
            d.restore_auto_increment("t", &id).unwrap(),
            "ALTER TABLE t MODIFY COLUMN id int NOT NULL AUTO_INCREMENT"
        );
    }

    #[test]
    fn merged_alter_table() {
        let d = MySqlDialect::new();
        let idx = Index::new("t_owner_idx", &["owner_id"]);
        let fk = ResolvedConstraint::new(
            "t_owner_fkey",
            ConstraintKind::ForeignKey,
            "(owner_id) REFERENCES owners (id)",
        );
        let sql = d.alter_table(
            "t",
            &[d.drop_constraint_clause(&fk), d.drop_index_clause(&idx)],
        );
        assert_eq!(
            sql,
            "ALTER TABLE t\n\tDROP FOREIGN KEY t_owner_fkey,\n\tDROP INDEX t_owner_idx"
        );
    }

    #[test]
    fn emulated_sequences() {
        let d = MySqlDialect::new();
        let mut seq = Sequence::new("invoice_no");
        seq.start = Some(1000);
        let sql = d.create_sequence("app", &seq);
        assert_eq!(
            sql[0],
            "INSERT INTO __sequences (`name`, `increment`, `min_value`, `max_value`, `cur_value`, `cycle`) VALUES ('invoice_no', 1, 1, 18446744073709551615, 1000, FALSE)"
        );
        assert_eq!(
            d.drop_sequence("app", "invoice_no")[0],
            "DELETE FROM __sequences WHERE `name` = 'invoice_no'"
        );
        assert_eq!(d.sequence_support().len(), 3);
    }

    #[test]
    fn serial_emulation_uses_trigger() {
        let d = MySqlDialect::new();
        let mut col = ResolvedColumn::new("ticket", "serial");
        col.serial = true;
        let sql = d.serial_emulation("app", "orders", &col);
        assert_eq!(sql.len(), 2);
        assert!(sql[1].starts_with("CREATE TRIGGER __orders_ticket_serial_trigger BEFORE INSERT ON orders"));
        assert!(sql[1].contains("nextval('__orders_ticket_serial_seq')"));
    }

    #[test]
    fn multi_event_triggers_split() {
        let d = MySqlDialect::new();
        let trigger = Trigger {
            name: "audit".into(),
            timing: "after".into(),
            events: vec!["insert".into(), "update".into()],
            for_each: "ROW".into(),
            function: "INSERT INTO log VALUES (NEW.id);".into(),
            sql_format: None,
        };
        let sql = d.create_trigger("app", "users", &trigger);
        assert_eq!(
            sql,
            vec![
                "CREATE TRIGGER audit_insert AFTER INSERT ON users FOR EACH ROW INSERT INTO log VALUES (NEW.id)",
                "CREATE TRIGGER audit_update AFTER UPDATE ON users FOR EACH ROW INSERT INTO log VALUES (NEW.id)",
            ]
        );
    }

    #[test]
    fn no_schema_or_sequence_grants() {
        let d = MySqlDialect::new();
        let ops = vec!["SELECT".to_string()];
        assert!(d.grant(GrantTarget::Schema, "app", &ops, "r", false).is_none());
        assert_eq!(
            d.grant(GrantTarget::Table, "users", &ops, "r", false).unwrap(),
            "GRANT SELECT ON users TO r"
        );
    }
}
