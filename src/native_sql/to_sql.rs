//! Finalized expression tree to SQLite SQL
//!
//! Class references read through class views (see
//! [`view_generator`](super::view_generator)), so a property path always
//! renders as `[alias].[access string]` whatever table the column lives in.
//! Parameters are renumbered: every native `?N` is described by the writer's
//! binding list.

use std::sync::Arc;

use crate::db_mapping::{MappingSnapshot, PropertyMap};
use crate::ec_catalog::{ClassId, PrimitiveType};
use crate::ecsql_parser::ast::JoinKind;
use crate::ecsql_parser::{ExpKind, ExpTree, LiteralValue, NodeId};
use crate::ecsql_prepare::finalize::{property_shape, PathTarget, PropertyShape, Semantics, SystemProperty};
use crate::ecsql_prepare::prepare_ctx::{PrepareContext, RangeClass};
use crate::utils::quote_ident;

use super::embedded::{expand_value, ColumnSource, EmbeddedPlanner};
use super::errors::NativeSqlError;
use super::function_registry::FunctionRegistry;
use super::plan::{Binding, ColumnInfo, EmbeddedPlan, ValueShape};
use super::view_generator::class_view;

pub struct SqlWriter<'w, 'p> {
    pub tree: &'w ExpTree,
    pub semantics: &'w Semantics,
    pub snapshot: &'w MappingSnapshot,
    pub functions: &'w FunctionRegistry,
    pub planner: &'w EmbeddedPlanner<'w>,
    pub ctx: &'w PrepareContext<'p>,
    bindings: Vec<Binding>,
}

impl<'w, 'p> SqlWriter<'w, 'p> {
    pub fn new(
        tree: &'w ExpTree,
        semantics: &'w Semantics,
        snapshot: &'w MappingSnapshot,
        functions: &'w FunctionRegistry,
        planner: &'w EmbeddedPlanner<'w>,
        ctx: &'w PrepareContext<'p>,
    ) -> Self {
        SqlWriter {
            tree,
            semantics,
            snapshot,
            functions,
            planner,
            ctx,
            bindings: Vec::new(),
        }
    }

    /// Native placeholder for `binding`; equal bindings share a placeholder
    pub fn bind(&mut self, binding: Binding) -> String {
        let index = match self.bindings.iter().position(|b| *b == binding) {
            Some(i) => i,
            None => {
                self.bindings.push(binding);
                self.bindings.len() - 1
            }
        };
        format!("?{}", index + 1)
    }

    /// Bindings of the statement written so far; the writer starts over
    pub fn take_bindings(&mut self) -> Vec<Binding> {
        std::mem::take(&mut self.bindings)
    }

    pub fn range_alias(&self, range: &RangeClass) -> String {
        quote_ident(range.effective_alias())
    }

    /// SQL of a scalar expression
    pub fn expression(&mut self, id: NodeId) -> Result<String, NativeSqlError> {
        let tree = self.tree;
        Ok(match tree.kind(id) {
            ExpKind::Literal(literal) => literal_sql(literal),
            ExpKind::Parameter { index, .. } => self.bind(Binding::parameter(*index)),
            ExpKind::PropertyPath { .. } => self.path(id)?,
            ExpKind::Unary { op, operand } => format!("({}{})", op.sql(), self.expression(*operand)?),
            ExpKind::Binary { op, lhs, rhs } => format!(
                "({} {} {})",
                self.expression(*lhs)?,
                op.sql(),
                self.expression(*rhs)?
            ),
            ExpKind::IsNull { operand, negated } => format!(
                "({} IS {}NULL)",
                self.expression(*operand)?,
                not(*negated)
            ),
            ExpKind::Between {
                operand,
                low,
                high,
                negated,
            } => format!(
                "({} {}BETWEEN {} AND {})",
                self.expression(*operand)?,
                not(*negated),
                self.expression(*low)?,
                self.expression(*high)?
            ),
            ExpKind::InList {
                operand,
                list,
                negated,
            } => {
                let operand = self.expression(*operand)?;
                let items = list
                    .iter()
                    .map(|item| self.expression(*item))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("({} {}IN ({}))", operand, not(*negated), items.join(", "))
            }
            ExpKind::InSubquery {
                operand,
                subquery,
                negated,
            } => {
                let operand = self.expression(*operand)?;
                let (select, _) = self.select(*subquery)?;
                format!("({} {}IN ({}))", operand, not(*negated), select)
            }
            ExpKind::Like {
                operand,
                pattern,
                escape,
                negated,
            } => {
                let mut sql = format!(
                    "({} {}LIKE {}",
                    self.expression(*operand)?,
                    not(*negated),
                    self.expression(*pattern)?
                );
                if let Some(escape) = escape {
                    sql.push_str(&format!(" ESCAPE {}", self.expression(*escape)?));
                }
                sql.push(')');
                sql
            }
            ExpKind::Exists { subquery } => format!("EXISTS ({})", self.select(*subquery)?.0),
            ExpKind::Subquery { select } => format!("({})", self.select(*select)?.0),
            ExpKind::Case {
                operand,
                when_then,
                else_expr,
            } => {
                let mut sql = String::from("CASE");
                if let Some(operand) = operand {
                    sql.push_str(&format!(" {}", self.expression(*operand)?));
                }
                for (when, then) in when_then {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.expression(*when)?,
                        self.expression(*then)?
                    ));
                }
                if let Some(else_expr) = else_expr {
                    sql.push_str(&format!(" ELSE {}", self.expression(*else_expr)?));
                }
                sql.push_str(" END");
                sql
            }
            ExpKind::FunctionCall {
                name,
                distinct,
                star,
                args,
            } => {
                if *star {
                    format!("{}(*)", name)
                } else {
                    let args = args
                        .iter()
                        .map(|arg| self.expression(*arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    format!("{}({}{})", name, if *distinct { "DISTINCT " } else { "" }, args.join(", "))
                }
            }
            other => {
                return Err(NativeSqlError::unsupported(
                    tree.display(id),
                    format!("{} is not an expression", variant_name(other)),
                ))
            }
        })
    }

    fn path(&mut self, id: NodeId) -> Result<String, NativeSqlError> {
        let resolved = self
            .semantics
            .path(id)
            .ok_or_else(|| NativeSqlError::Internal(format!("'{}' was not resolved", self.tree.display(id))))?;
        let alias = match resolved.range.and_then(|r| self.semantics.range(r)) {
            Some(range) => self.range_alias(range),
            None => String::new(),
        };
        let column = match &resolved.target {
            PathTarget::System(system) => system.name().to_string(),
            PathTarget::FunctionColumn(column) => column.clone(),
            PathTarget::SelectAlias(name) => return Ok(quote_ident(name)),
            PathTarget::Property { access_string, shape } => match shape {
                PropertyShape::Navigation { .. } => format!("{}.Id", access_string),
                shape if shape.is_composite() => {
                    return Err(NativeSqlError::unsupported(
                        self.tree.display(id),
                        "a value spanning several columns cannot be used as an operand",
                    ))
                }
                _ => access_string.clone(),
            },
        };
        Ok(format!("{}.{}", alias, quote_ident(&column)))
    }

    /// Does the subtree at `id` read a property of some range
    pub fn references_properties(&self, id: NodeId) -> bool {
        self.tree
            .pre_order(id)
            .into_iter()
            .any(|node| self.semantics.path(node).is_some_and(|p| p.range.is_some()))
    }

    /// Source of a class reference in a FROM or JOIN clause
    fn source(&mut self, class_ref: NodeId) -> Result<String, NativeSqlError> {
        let range = self
            .semantics
            .range_of(class_ref)
            .ok_or_else(|| NativeSqlError::Internal(format!("'{}' was not resolved", self.tree.display(class_ref))))?;
        let alias = self.range_alias(range);
        if let Some(function) = &range.function {
            let args = match self.tree.kind(class_ref) {
                ExpKind::ClassRef { args: Some(args), .. } => args.clone(),
                _ => Vec::new(),
            };
            let args = args
                .iter()
                .map(|arg| self.expression(*arg))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(format!("{}({}) AS {}", function, args.join(", "), alias));
        }
        let class_id = range
            .class_id
            .ok_or_else(|| NativeSqlError::Internal(format!("range '{}' has no class", range.effective_alias())))?;
        let view = class_view(self.snapshot, class_id, range.only)?;
        Ok(format!("({}) AS {}", view.sql, alias))
    }

    /// SQL of a SELECT node and the typed columns it returns
    pub fn select(&mut self, id: NodeId) -> Result<(String, Vec<ColumnInfo>), NativeSqlError> {
        let ExpKind::Select(select) = self.tree.kind(id).clone() else {
            return Err(NativeSqlError::Internal("SELECT node expected".to_string()));
        };

        let ranges: Vec<RangeClass> = select
            .from
            .iter()
            .copied()
            .chain(select.joins.iter().filter_map(|join| match self.tree.kind(*join) {
                ExpKind::Join { class_ref, .. } => Some(*class_ref),
                _ => None,
            }))
            .filter_map(|node| self.semantics.range_of(node).cloned())
            .collect();

        let mut exprs = Vec::new();
        let mut columns = Vec::new();
        for item in &select.items {
            self.select_item(*item, &ranges, &mut exprs, &mut columns)?;
        }

        let mut sql = String::from("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&exprs.join(", "));

        let sources = select
            .from
            .iter()
            .map(|node| self.source(*node))
            .collect::<Result<Vec<_>, _>>()?;
        if !sources.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&sources.join(", "));
        }
        for join in &select.joins {
            let ExpKind::Join { kind, class_ref, on } = self.tree.kind(*join).clone() else {
                continue;
            };
            let keyword = match kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            let source = self.source(class_ref)?;
            let on = self.expression(on)?;
            sql.push_str(&format!(" {} {} ON {}", keyword, source, on));
        }
        if let Some(where_clause) = select.where_clause {
            sql.push_str(&format!(" WHERE {}", self.expression(where_clause)?));
        }
        if !select.group_by.is_empty() {
            let keys = select
                .group_by
                .iter()
                .map(|key| self.expression(*key))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&format!(" GROUP BY {}", keys.join(", ")));
        }
        if let Some(having) = select.having {
            sql.push_str(&format!(" HAVING {}", self.expression(having)?));
        }
        if !select.order_by.is_empty() {
            let mut keys = Vec::new();
            for order in &select.order_by {
                let ExpKind::OrderBy { expression, descending } = self.tree.kind(*order).clone() else {
                    continue;
                };
                let key = self.expression(expression)?;
                keys.push(if descending { format!("{} DESC", key) } else { key });
            }
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        if let Some(limit) = select.limit {
            sql.push_str(&format!(" LIMIT {}", self.expression(limit)?));
            if let Some(offset) = select.offset {
                sql.push_str(&format!(" OFFSET {}", self.expression(offset)?));
            }
        }
        log::trace!("SELECT {} -> {}", self.tree.display(id), sql);
        Ok((sql, columns))
    }

    fn select_item(
        &mut self,
        item: NodeId,
        ranges: &[RangeClass],
        exprs: &mut Vec<String>,
        columns: &mut Vec<ColumnInfo>,
    ) -> Result<(), NativeSqlError> {
        match self.tree.kind(item).clone() {
            ExpKind::Wildcard { alias } => {
                for range in ranges {
                    let matches = alias
                        .as_deref()
                        .is_none_or(|a| range.effective_alias().eq_ignore_ascii_case(a));
                    if matches {
                        self.expand_range(range, exprs, columns)?;
                    }
                }
                Ok(())
            }
            ExpKind::SelectItem { expression, alias } => {
                let resolved = self.semantics.path(expression).cloned();
                let first = exprs.len();
                if let Some(resolved) = &resolved {
                    if let PathTarget::Property { access_string, shape } = &resolved.target {
                        let whole = shape.is_composite() || matches!(shape, PropertyShape::Navigation { .. });
                        if whole {
                            let range = resolved
                                .range
                                .and_then(|r| self.semantics.range(r))
                                .cloned()
                                .ok_or_else(|| NativeSqlError::Internal(format!("'{}' has no range", access_string)))?;
                            let mut source = self.view_columns(&range)?;
                            let value = expand_value(&self.snapshot.catalog, shape, access_string, &mut source, exprs)?;
                            columns.push(ColumnInfo {
                                name: alias.unwrap_or_else(|| access_string.clone()),
                                shape: value,
                                first,
                            });
                            return Ok(());
                        }
                    }
                }

                let sql = self.expression(expression)?;
                let shape = match resolved.as_ref().map(|r| &r.target) {
                    Some(PathTarget::System(_)) => ValueShape::Scalar(Some(PrimitiveType::Long)),
                    Some(PathTarget::Property { shape, .. }) => match shape {
                        PropertyShape::Primitive(pt) => ValueShape::Scalar(Some(*pt)),
                        PropertyShape::PrimitiveArray(pt) => ValueShape::PrimitiveArray(*pt),
                        PropertyShape::Coordinate => ValueShape::Scalar(Some(PrimitiveType::Double)),
                        _ => ValueShape::Scalar(Some(PrimitiveType::Long)),
                    },
                    _ => ValueShape::Scalar(None),
                };
                let name = match (&alias, resolved.as_ref().map(|r| &r.target)) {
                    (Some(alias), _) => alias.clone(),
                    (None, Some(PathTarget::System(system))) => system.name().to_string(),
                    (None, Some(PathTarget::Property { access_string, .. })) => access_string.clone(),
                    (None, Some(PathTarget::FunctionColumn(column))) => column.clone(),
                    _ => self.tree.display(expression),
                };
                exprs.push(match &alias {
                    Some(alias) => format!("{} AS {}", sql, quote_ident(alias)),
                    None => sql,
                });
                columns.push(ColumnInfo { name, shape, first });
                Ok(())
            }
            _ => Err(NativeSqlError::Internal(format!(
                "'{}' is not a select item",
                self.tree.display(item)
            ))),
        }
    }

    /// Every column of a range, as `*` returns them
    fn expand_range(
        &mut self,
        range: &RangeClass,
        exprs: &mut Vec<String>,
        columns: &mut Vec<ColumnInfo>,
    ) -> Result<(), NativeSqlError> {
        let alias = self.range_alias(range);
        if let Some(function) = &range.function {
            let def = self
                .functions
                .table_valued(function)
                .ok_or_else(|| NativeSqlError::Internal(format!("unknown table-valued function '{}'", function)))?;
            for column in &def.columns {
                columns.push(ColumnInfo {
                    name: column.clone(),
                    shape: ValueShape::Scalar(None),
                    first: exprs.len(),
                });
                exprs.push(format!("{}.{}", alias, quote_ident(column)));
            }
            return Ok(());
        }
        let class_id = range
            .class_id
            .ok_or_else(|| NativeSqlError::Internal(format!("range '{}' has no class", range.effective_alias())))?;
        let catalog = &self.snapshot.catalog;

        let mut system = vec![SystemProperty::InstanceId, SystemProperty::ClassId];
        if catalog.get(class_id).is_some_and(|c| c.class.is_relationship()) {
            system.extend([
                SystemProperty::SourceInstanceId,
                SystemProperty::SourceClassId,
                SystemProperty::TargetInstanceId,
                SystemProperty::TargetClassId,
            ]);
        }
        for property in system {
            columns.push(ColumnInfo {
                name: property.name().to_string(),
                shape: ValueShape::Scalar(Some(PrimitiveType::Long)),
                first: exprs.len(),
            });
            exprs.push(format!("{}.{}", alias, quote_ident(property.name())));
        }

        let mut source = self.view_columns(range)?;
        for property in catalog.all_properties(class_id) {
            let shape = property_shape(catalog, &property)?;
            let first = exprs.len();
            let value = expand_value(catalog, &shape, &property.property.name, &mut source, exprs)?;
            columns.push(ColumnInfo {
                name: property.property.name.clone(),
                shape: value,
                first,
            });
        }
        Ok(())
    }

    fn view_columns(&self, range: &RangeClass) -> Result<ViewColumns<'w, 'w>, NativeSqlError> {
        let class_id = range
            .class_id
            .ok_or_else(|| NativeSqlError::Internal(format!("range '{}' has no class", range.effective_alias())))?;
        Ok(ViewColumns {
            alias: self.range_alias(range),
            class_id,
            snapshot: self.snapshot,
            planner: self.planner,
            ctx: self.ctx,
        })
    }
}

/// Columns of a class view under a range alias
struct ViewColumns<'a, 'w> {
    alias: String,
    class_id: ClassId,
    snapshot: &'w MappingSnapshot,
    planner: &'w EmbeddedPlanner<'w>,
    ctx: &'a PrepareContext<'a>,
}

impl ViewColumns<'_, '_> {
    /// Map of the struct array at `access`; a class without rows borrows the
    /// map of a mapped subclass
    fn struct_array_map(&self, access: &str) -> Option<Arc<PropertyMap>> {
        std::iter::once(self.class_id)
            .chain(self.snapshot.mapped_classes(self.class_id))
            .filter_map(|class| self.snapshot.class_map(class))
            .find_map(|map| map.property_maps.find(access).cloned())
    }
}

impl ColumnSource for ViewColumns<'_, '_> {
    fn leaf(&self, access: &str) -> String {
        format!("{}.{}", self.alias, quote_ident(access))
    }

    fn row_id(&self) -> String {
        format!("{}.{}", self.alias, quote_ident(SystemProperty::InstanceId.name()))
    }

    fn struct_array(&mut self, access: &str) -> Result<Arc<EmbeddedPlan>, NativeSqlError> {
        let map = self.struct_array_map(access).ok_or_else(|| NativeSqlError::UnmappedProperty {
            class: self.snapshot.catalog.full_name(self.class_id),
            access_string: access.to_string(),
        })?;
        self.planner.plan(access, &map, self.ctx)
    }
}

fn not(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

fn literal_sql(literal: &LiteralValue) -> String {
    match literal {
        LiteralValue::Integer(i) => i.to_string(),
        // Debug keeps the decimal point so SQLite reads a REAL
        LiteralValue::Real(f) => format!("{:?}", f),
        LiteralValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        LiteralValue::Blob(digits) => format!("X'{}'", digits),
        LiteralValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        LiteralValue::Null => "NULL".to_string(),
    }
}

fn variant_name(kind: &ExpKind) -> &'static str {
    match kind {
        ExpKind::Select(_) => "a SELECT",
        ExpKind::SelectItem { .. } | ExpKind::Wildcard { .. } => "a select item",
        ExpKind::ClassRef { .. } | ExpKind::Join { .. } => "a class reference",
        ExpKind::OrderBy { .. } => "an ORDER BY term",
        ExpKind::Insert { .. } | ExpKind::Update { .. } | ExpKind::Delete { .. } => "a statement",
        ExpKind::Assignment { .. } => "an assignment",
        _ => "this construct",
    }
}
