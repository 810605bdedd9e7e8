//! Permission differ.
//!
//! Grants are compared as `(role, operation, with grant option)` triples.
//! Revokes run at the start of stage 1 against the old object names;
//! grants run after the structural changes against the new names.

use crate::dialect::{DialectAdapter, GrantTarget};
use crate::model::{eq_ci, Grant, Schema};
use crate::stage::Stage;

use super::objects::{old_schema, ViewPlan};
use super::{DiffContext, StageWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Privilege {
    role: String,
    operation: String,
    with_grant_option: bool,
}

fn privileges(grants: &[Grant]) -> Vec<Privilege> {
    let mut out: Vec<Privilege> = Vec::new();
    for grant in grants {
        for role in &grant.roles {
            for operation in &grant.operations {
                let privilege = Privilege {
                    role: role.trim().to_string(),
                    operation: operation.trim().to_ascii_uppercase(),
                    with_grant_option: grant.with_grant_option,
                };
                if !out.contains(&privilege) {
                    out.push(privilege);
                }
            }
        }
    }
    out
}

/// Groups privileges by `(role, with grant option)`, in first-seen order.
fn by_role(privileges: &[&Privilege]) -> Vec<(String, bool, Vec<String>)> {
    let mut groups: Vec<(String, bool, Vec<String>)> = Vec::new();
    for p in privileges {
        match groups
            .iter_mut()
            .find(|(role, wgo, _)| eq_ci(role, &p.role) && *wgo == p.with_grant_option)
        {
            Some((_, _, operations)) => operations.push(p.operation.clone()),
            None => groups.push((p.role.clone(), p.with_grant_option, vec![p.operation.clone()])),
        }
    }
    groups
}

/// One grantable object in both versions.
struct GrantObject<'g> {
    target: GrantTarget,
    label: String,
    /// Reference before the structural changes; `None` when the object is
    /// new or recreated.
    old_ref: Option<String>,
    new_ref: String,
    old: &'g [Grant],
    new: &'g [Grant],
}

impl GrantObject<'_> {
    fn revoked(&self) -> Vec<Privilege> {
        if self.old_ref.is_none() {
            return Vec::new();
        }
        let new = privileges(self.new);
        privileges(self.old)
            .into_iter()
            .filter(|p| !new.contains(p))
            .collect()
    }

    fn granted(&self) -> Vec<Privilege> {
        let old = if self.old_ref.is_some() {
            privileges(self.old)
        } else {
            Vec::new()
        };
        privileges(self.new)
            .into_iter()
            .filter(|p| !old.contains(p))
            .collect()
    }
}

/// Grant changes of every object in a run.
pub(crate) struct GrantPlan<'g> {
    objects: Vec<GrantObject<'g>>,
}

impl<'g> GrantPlan<'g> {
    pub(crate) fn build(ctx: &DiffContext<'_, 'g>, views: &ViewPlan<'_>) -> Self {
        let dialect = ctx.dialect;
        let mut objects = Vec::new();

        if ctx.options.includes_schema_objects() {
            for schema in &ctx.new.tree.schemas {
                let previous = old_schema(ctx.old.tree, schema);
                objects.push(GrantObject {
                    target: GrantTarget::Schema,
                    label: schema.name.clone(),
                    old_ref: previous.map(|s| dialect.quote_identifier(&s.name)),
                    new_ref: dialect.quote_identifier(&schema.name),
                    old: previous.map_or(&[][..], |s| s.grants.as_slice()),
                    new: &schema.grants,
                });
            }
        }

        for new in ctx.new.tables_in_order() {
            let old = ctx.old_table(new);
            objects.push(GrantObject {
                target: GrantTarget::Table,
                label: new.key.to_string(),
                old_ref: old.map(|o| ctx.table_ref(o)),
                new_ref: ctx.table_ref(new),
                old: old.map_or(&[][..], |o| o.table.grants.as_slice()),
                new: &new.table.grants,
            });
        }

        if ctx.options.includes_schema_objects() {
            for schema in &ctx.new.tree.schemas {
                schema_objects(dialect, ctx, views, schema, &mut objects);
            }
        }
        Self { objects }
    }

    /// Revokes privileges the new version no longer holds.
    pub(crate) fn emit_revokes(&self, dialect: &dyn DialectAdapter, out: &mut StageWriter) {
        for object in &self.objects {
            let Some(ref object_ref) = object.old_ref else {
                continue;
            };
            let revoked = object.revoked();
            let revoked: Vec<&Privilege> = revoked.iter().collect();
            for (role, _, operations) in by_role(&revoked) {
                match dialect.revoke(object.target, object_ref, &operations, &role) {
                    Some(sql) => out.emit(Stage::Stage1, sql),
                    None => unsupported(dialect, out, object),
                }
            }
        }
    }

    /// Grants privileges the old version did not hold.
    pub(crate) fn emit_grants(&self, dialect: &dyn DialectAdapter, out: &mut StageWriter) {
        for object in &self.objects {
            let granted = object.granted();
            let granted: Vec<&Privilege> = granted.iter().collect();
            for (role, with_grant_option, operations) in by_role(&granted) {
                match dialect.grant(
                    object.target,
                    &object.new_ref,
                    &operations,
                    &role,
                    with_grant_option,
                ) {
                    Some(sql) => out.emit(Stage::Stage1, sql),
                    None => unsupported(dialect, out, object),
                }
            }
        }
    }
}

fn unsupported(dialect: &dyn DialectAdapter, out: &mut StageWriter, object: &GrantObject<'_>) {
    out.warn(
        Stage::Stage1,
        object.label.clone(),
        format!(
            "{} cannot grant permissions on a {}; skipped",
            dialect.name(),
            target_name(object.target)
        ),
    );
}

const fn target_name(target: GrantTarget) -> &'static str {
    match target {
        GrantTarget::Schema => "schema",
        GrantTarget::Table => "table",
        GrantTarget::View => "view",
        GrantTarget::Sequence => "sequence",
        GrantTarget::Function => "function",
    }
}

fn schema_objects<'g>(
    dialect: &dyn DialectAdapter,
    ctx: &DiffContext<'_, 'g>,
    views: &ViewPlan<'_>,
    schema: &'g Schema,
    objects: &mut Vec<GrantObject<'g>>,
) {
    let previous = old_schema(ctx.old.tree, schema);
    let label = |name: &str| format!("{}.{}", schema.name, name);

    for view in &schema.views {
        let old = previous
            .and_then(|s| s.view(&view.name).map(|v| (s, v)))
            .filter(|_| !views.is_recreated(&schema.name, &view.name));
        objects.push(GrantObject {
            target: GrantTarget::View,
            label: label(&view.name),
            old_ref: old.map(|(s, v)| dialect.object_ref(&s.name, &v.name)),
            new_ref: dialect.object_ref(&schema.name, &view.name),
            old: old.map_or(&[][..], |(_, v)| v.grants.as_slice()),
            new: &view.grants,
        });
    }

    for sequence in &schema.sequences {
        let old = previous.and_then(|s| s.sequence(&sequence.name).map(|q| (s, q)));
        objects.push(GrantObject {
            target: GrantTarget::Sequence,
            label: label(&sequence.name),
            old_ref: old.map(|(s, q)| dialect.object_ref(&s.name, &q.name)),
            new_ref: dialect.object_ref(&schema.name, &sequence.name),
            old: old.map_or(&[][..], |(_, q)| q.grants.as_slice()),
            new: &sequence.grants,
        });
    }

    for function in &schema.functions {
        let signature = |schema: &str| {
            format!(
                "{}({})",
                dialect.object_ref(schema, &function.name),
                function.parameter_types()
            )
        };
        let old = previous.and_then(|s| s.function(&function.signature_key()).map(|f| (s, f)));
        objects.push(GrantObject {
            target: GrantTarget::Function,
            label: label(&function.name),
            old_ref: old.map(|(s, _)| signature(&s.name)),
            new_ref: signature(&schema.name),
            old: old.map_or(&[][..], |(_, f)| f.grants.as_slice()),
            new: &function.grants,
        });
    }
}
