//! Statement translation
//!
//! SELECT compiles to one query over class views. INSERT writes the primary
//! row, the overflow row and the struct array elements of one new instance.
//! UPDATE and DELETE first collect the ids of the affected instances into
//! [`DML_TARGETS_TABLE`], then touch every physical table holding rows of the
//! target class (and its subclasses unless ONLY) by id.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::db_mapping::db_schema::{CLASS_ID_COLUMN, INSTANCE_ID_COLUMN};
use crate::db_mapping::{ClassMap, ColumnId, DbColumnKind, LeafColumn, MappingSnapshot, PropertyMap, TableId};
use crate::ec_catalog::ClassId;
use crate::ecsql_parser::{ExpKind, ExpTree, LiteralValue, NodeId, StatementKind};
use crate::ecsql_prepare::finalize::{PathTarget, PropertyShape, Semantics, SystemProperty};
use crate::ecsql_prepare::prepare_ctx::{PrepareContext, RangeClass};
use crate::utils::quote_ident;

use super::embedded::{array_write_plan, EmbeddedPlanner};
use super::errors::NativeSqlError;
use super::function_registry::FunctionRegistry;
use super::plan::{ArrayWritePlan, Binding, CompiledPlan, IdSource, NativeStep, SqlStep, DML_TARGETS_TABLE};
use super::to_sql::SqlWriter;
use super::view_generator::{class_view, table_groups};

/// Value written into one column
#[derive(Debug, Clone)]
enum Cell {
    /// A scalar ECSQL expression
    Expr(NodeId),
    Bind(Binding),
    Sql(String),
    /// Class id of the instance whose id `id` holds, looked up in a class view
    ClassIdOf { view: String, id: Box<Cell> },
}

#[derive(Debug, Clone)]
enum Assigned {
    Column(ColumnId, Cell),
    Array(Arc<ArrayWritePlan>, Option<Binding>),
}

/// Compile a finalized statement
pub fn translate(
    ecsql: &str,
    tree: &ExpTree,
    semantics: &Semantics,
    snapshot: &MappingSnapshot,
    functions: &FunctionRegistry,
    planner: &EmbeddedPlanner<'_>,
    ctx: &PrepareContext<'_>,
) -> Result<CompiledPlan, NativeSqlError> {
    let root = tree
        .root()
        .ok_or_else(|| NativeSqlError::Internal("empty expression tree".to_string()))?;
    let kind = tree
        .statement_kind()
        .ok_or_else(|| NativeSqlError::Internal("statement expected".to_string()))?;
    let mut translator = Translator {
        writer: SqlWriter::new(tree, semantics, snapshot, functions, planner, ctx),
    };

    let mut instance_id = IdSource::Generated;
    let mut columns = Vec::new();
    let steps = match kind {
        StatementKind::Select => {
            let (sql, select_columns) = translator.writer.select(root)?;
            columns = select_columns;
            vec![NativeStep::Sql(SqlStep {
                sql,
                bindings: translator.writer.take_bindings(),
            })]
        }
        StatementKind::Insert => {
            let (steps, id) = translator.insert(root)?;
            instance_id = id;
            steps
        }
        StatementKind::Update => translator.update(root)?,
        StatementKind::Delete => translator.delete(root)?,
    };
    debug!("Compiled {:?} into {} native step(s)", kind, steps.len());

    Ok(CompiledPlan {
        ecsql: ecsql.to_string(),
        kind,
        steps,
        columns,
        parameters: tree.parameters().to_vec(),
        instance_id,
    })
}

struct Translator<'w, 'p> {
    writer: SqlWriter<'w, 'p>,
}

impl<'w> Translator<'w, '_> {
    fn target(&self, class_ref: NodeId) -> Result<(RangeClass, ClassId), NativeSqlError> {
        let range = self
            .writer
            .semantics
            .range_of(class_ref)
            .cloned()
            .ok_or_else(|| NativeSqlError::Internal("DML target was not resolved".to_string()))?;
        let class_id = range
            .class_id
            .ok_or_else(|| NativeSqlError::unsupported(range.effective_alias(), "DML target must be a class"))?;
        Ok((range, class_id))
    }

    fn class_map(&self, class_id: ClassId) -> Result<&'w ClassMap, NativeSqlError> {
        let snapshot = self.writer.snapshot;
        snapshot
            .class_map(class_id)
            .filter(|m| m.is_mapped())
            .ok_or_else(|| NativeSqlError::UnmappedClass {
                class: snapshot.catalog.full_name(class_id),
            })
    }

    fn insert(&mut self, root: NodeId) -> Result<(Vec<NativeStep>, IdSource), NativeSqlError> {
        let tree = self.writer.tree;
        let ExpKind::Insert {
            class_ref,
            properties,
            values,
        } = tree.kind(root).clone()
        else {
            return Err(NativeSqlError::Internal("INSERT node expected".to_string()));
        };
        let (_, class_id) = self.target(class_ref)?;
        let class_map = self.class_map(class_id)?;
        let snapshot = self.writer.snapshot;
        let db = &snapshot.db_schema;
        let primary = class_map
            .primary_table
            .ok_or_else(|| NativeSqlError::UnmappedClass {
                class: snapshot.catalog.full_name(class_id),
            })?;

        let mut instance_id = IdSource::Generated;
        let mut assigned = Vec::new();
        for (property, value) in properties.iter().zip(&values) {
            let resolved = self
                .writer
                .semantics
                .path(*property)
                .ok_or_else(|| NativeSqlError::Internal(format!("'{}' was not resolved", tree.display(*property))))?;
            match &resolved.target {
                PathTarget::System(SystemProperty::InstanceId) => {
                    instance_id = match tree.kind(*value) {
                        ExpKind::Parameter { index, .. } => IdSource::Parameter(*index),
                        ExpKind::Literal(LiteralValue::Integer(id)) => IdSource::Literal(*id),
                        ExpKind::Literal(LiteralValue::Null) => IdSource::Generated,
                        _ => {
                            return Err(NativeSqlError::unsupported(
                                tree.display(*value),
                                "ECInstanceId must be a parameter or an integer literal",
                            ))
                        }
                    };
                }
                PathTarget::System(system) => {
                    let column = db.system_column(primary, system.column_kind()).ok_or_else(|| {
                        NativeSqlError::UnmappedProperty {
                            class: snapshot.catalog.full_name(class_id),
                            access_string: system.name().to_string(),
                        }
                    })?;
                    assigned.push(Assigned::Column(column, Cell::Expr(*value)));
                }
                PathTarget::Property { access_string, shape } => {
                    assigned.extend(self.assign(class_id, class_map, access_string, shape, *value)?);
                }
                PathTarget::FunctionColumn(name) | PathTarget::SelectAlias(name) => {
                    return Err(NativeSqlError::unsupported(name.clone(), "not a property of the target class"))
                }
            }
        }
        self.navigation_defaults(class_map, &mut assigned);
        self.link_class_defaults(class_id, primary, &mut assigned)?;

        let (columns, arrays) = split(assigned);
        let mut per_table = by_table(db, class_map, columns)?;
        // every table of the class gets its row, primary first, whatever was assigned
        for (position, table) in class_map.tables(db).into_iter().enumerate() {
            if !per_table.iter().any(|(t, _)| *t == table) {
                per_table.insert(position, (table, Vec::new()));
            }
        }
        let mut steps = Vec::new();
        for (table, cells) in per_table {
            let mut names = vec![quote_ident(INSTANCE_ID_COLUMN), quote_ident(CLASS_ID_COLUMN)];
            let mut exprs = vec![self.writer.bind(Binding::InstanceId), class_id.to_string()];
            for (column, cell) in &cells {
                names.push(quote_ident(db.column_name(*column)));
                exprs.push(self.cell_sql(cell)?);
            }
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(db.table_name(table)),
                names.join(", "),
                exprs.join(", ")
            );
            steps.push(NativeStep::Sql(SqlStep {
                sql,
                bindings: self.writer.take_bindings(),
            }));
        }
        for (plan, source) in arrays {
            if let Some(source) = source {
                steps.push(NativeStep::InsertArray { plan, source });
            }
        }
        Ok((steps, instance_id))
    }

    /// Columns written for one property assignment
    fn assign(
        &self,
        class_id: ClassId,
        class_map: &ClassMap,
        access: &str,
        shape: &PropertyShape,
        value: NodeId,
    ) -> Result<Vec<Assigned>, NativeSqlError> {
        let tree = self.writer.tree;
        let snapshot = self.writer.snapshot;
        let leaves: Vec<LeafColumn> = class_map.property_maps.iter().flat_map(|m| m.leaf_columns()).collect();
        let unmapped = || NativeSqlError::UnmappedProperty {
            class: snapshot.catalog.full_name(class_id),
            access_string: access.to_string(),
        };
        let value_kind = tree.kind(value);

        Ok(match shape {
            PropertyShape::Primitive(_)
            | PropertyShape::Coordinate
            | PropertyShape::NavigationId
            | PropertyShape::NavigationRelClassId => {
                let column = leaf_column(&leaves, access).ok_or_else(unmapped)?;
                vec![Assigned::Column(column, Cell::Expr(value))]
            }
            PropertyShape::PrimitiveArray(_) => {
                let column = leaf_column(&leaves, access).ok_or_else(unmapped)?;
                let cell = match value_kind {
                    ExpKind::Parameter { index, .. } => Cell::Bind(Binding::ParameterJson {
                        index: *index,
                        leaf: None,
                    }),
                    _ => Cell::Expr(value),
                };
                vec![Assigned::Column(column, cell)]
            }
            PropertyShape::Point(_) | PropertyShape::Struct(_) | PropertyShape::Navigation { .. } => {
                let prefix = format!("{}.", access);
                let members: Vec<&LeafColumn> = leaves
                    .iter()
                    .filter(|leaf| {
                        leaf.access_string.len() > prefix.len()
                            && leaf.access_string[..prefix.len()].eq_ignore_ascii_case(&prefix)
                    })
                    .collect();
                if members.is_empty() {
                    return Err(unmapped());
                }
                let relationship = match shape {
                    PropertyShape::Navigation { relationship } => Some(*relationship),
                    _ => None,
                };
                let mut out = Vec::new();
                for leaf in members {
                    let relative = leaf.access_string[prefix.len()..].to_string();
                    let cell = match value_kind {
                        ExpKind::Parameter { index, .. } => {
                            let default = relationship.filter(|_| relative.eq_ignore_ascii_case("RelECClassId"));
                            Cell::Bind(Binding::Parameter {
                                index: *index,
                                leaf: Some(relative),
                                default,
                            })
                        }
                        ExpKind::Literal(LiteralValue::Null) => Cell::Sql("NULL".to_string()),
                        _ => {
                            return Err(NativeSqlError::unsupported(
                                tree.display(value),
                                format!("a value for '{}' must be a parameter or NULL", access),
                            ))
                        }
                    };
                    out.push(Assigned::Column(leaf.column, cell));
                }
                out
            }
            PropertyShape::StructArray(_) => {
                let map = class_map.property_maps.find(access).ok_or_else(unmapped)?;
                let plan = Arc::new(array_write_plan(snapshot, map.access_string(), map)?);
                let source = match value_kind {
                    ExpKind::Parameter { index, .. } => Some(Binding::parameter(*index)),
                    ExpKind::Literal(LiteralValue::Null) => None,
                    _ => {
                        return Err(NativeSqlError::unsupported(
                            tree.display(value),
                            format!("a value for '{}' must be a parameter or NULL", access),
                        ))
                    }
                };
                vec![Assigned::Array(plan, source)]
            }
        })
    }

    /// A navigation id written without its RelECClassId gets the
    /// relationship's class id
    fn navigation_defaults(&self, class_map: &ClassMap, assigned: &mut Vec<Assigned>) {
        let written: HashSet<ColumnId> = assigned
            .iter()
            .filter_map(|a| match a {
                Assigned::Column(column, _) => Some(*column),
                Assigned::Array(..) => None,
            })
            .collect();
        for map in class_map.property_maps.iter() {
            if let PropertyMap::Navigation(nav) = map.as_ref() {
                if written.contains(&nav.id_column) && !written.contains(&nav.rel_class_id_column) {
                    assigned.push(Assigned::Column(
                        nav.rel_class_id_column,
                        Cell::Sql(nav.relationship.to_string()),
                    ));
                }
            }
        }
    }

    /// Source/target class ids of a link-table row default to the classes of
    /// the referenced instances
    fn link_class_defaults(
        &self,
        class_id: ClassId,
        table: TableId,
        assigned: &mut Vec<Assigned>,
    ) -> Result<(), NativeSqlError> {
        let snapshot = self.writer.snapshot;
        let db = &snapshot.db_schema;
        if !snapshot.class_map(class_id).is_some_and(|m| m.is_link_table) {
            return Ok(());
        }
        let (source, target) = snapshot.catalog.relationship_ends(class_id)?;
        let ends = [
            (source, DbColumnKind::SourceInstanceId, DbColumnKind::SourceClassId),
            (target, DbColumnKind::TargetInstanceId, DbColumnKind::TargetClassId),
        ];
        for (end_class, id_kind, class_kind) in ends {
            let (Some(id_column), Some(class_column)) =
                (db.system_column(table, id_kind), db.system_column(table, class_kind))
            else {
                continue;
            };
            let find = |column: ColumnId| {
                assigned.iter().find_map(|a| match a {
                    Assigned::Column(c, cell) if *c == column => Some(cell.clone()),
                    _ => None,
                })
            };
            if find(class_column).is_some() {
                continue;
            }
            if let Some(id) = find(id_column) {
                let view = class_view(snapshot, end_class, false)?;
                assigned.push(Assigned::Column(
                    class_column,
                    Cell::ClassIdOf {
                        view: view.sql,
                        id: Box::new(id),
                    },
                ));
            }
        }
        Ok(())
    }

    fn cell_sql(&mut self, cell: &Cell) -> Result<String, NativeSqlError> {
        Ok(match cell {
            Cell::Expr(node) => self.writer.expression(*node)?,
            Cell::Bind(binding) => self.writer.bind(binding.clone()),
            Cell::Sql(sql) => sql.clone(),
            Cell::ClassIdOf { view, id } => format!(
                "(SELECT [ECClassId] FROM ({}) WHERE [ECInstanceId] = {})",
                view,
                self.cell_sql(id)?
            ),
        })
    }

    /// Step collecting the ids of the instances a DML statement affects
    fn fill_targets(
        &mut self,
        range: &RangeClass,
        class_id: ClassId,
        where_clause: Option<NodeId>,
    ) -> Result<(NativeStep, String), NativeSqlError> {
        let view = class_view(self.writer.snapshot, class_id, range.only)?;
        let alias = self.writer.range_alias(range);
        let mut sql = format!(
            "INSERT INTO {} (Id) SELECT {}.[ECInstanceId] FROM ({}) AS {}",
            DML_TARGETS_TABLE, alias, view.sql, alias
        );
        if let Some(where_clause) = where_clause {
            sql.push_str(&format!(" WHERE {}", self.writer.expression(where_clause)?));
        }
        let step = NativeStep::FillTargets(SqlStep {
            sql,
            bindings: self.writer.take_bindings(),
        });
        Ok((step, view.sql))
    }

    fn update(&mut self, root: NodeId) -> Result<Vec<NativeStep>, NativeSqlError> {
        let tree = self.writer.tree;
        let ExpKind::Update {
            class_ref,
            assignments,
            where_clause,
        } = tree.kind(root).clone()
        else {
            return Err(NativeSqlError::Internal("UPDATE node expected".to_string()));
        };
        let (range, class_id) = self.target(class_ref)?;
        let (fill, view) = self.fill_targets(&range, class_id, where_clause)?;
        let mut steps = vec![fill];

        let pairs: Vec<(NodeId, NodeId)> = assignments
            .iter()
            .filter_map(|a| match tree.kind(*a) {
                ExpKind::Assignment { property, value } => Some((*property, *value)),
                _ => None,
            })
            .collect();

        let snapshot = self.writer.snapshot;
        let db = &snapshot.db_schema;
        let alias = self.writer.range_alias(&range);
        let targets = format!("SELECT Id FROM {}", DML_TARGETS_TABLE);
        let mut replaced_arrays: HashSet<String> = HashSet::new();

        for (table, classes) in table_groups(snapshot, class_id, range.only) {
            let class_map = self.class_map(classes[0])?;
            let mut assigned = Vec::new();
            for (property, value) in &pairs {
                let resolved = self.writer.semantics.path(*property).ok_or_else(|| {
                    NativeSqlError::Internal(format!("'{}' was not resolved", tree.display(*property)))
                })?;
                let PathTarget::Property { access_string, shape } = &resolved.target else {
                    return Err(NativeSqlError::unsupported(
                        tree.display(*property),
                        "only properties can be assigned in UPDATE",
                    ));
                };
                assigned.extend(self.assign(classes[0], class_map, access_string, shape, *value)?);
            }
            self.navigation_defaults(class_map, &mut assigned);

            let (columns, arrays) = split(assigned);
            let per_table = by_table(db, class_map, columns)?;
            if let Some(overflow) = db.table(table).and_then(|t| t.overflow) {
                if per_table.iter().any(|(t, _)| *t == overflow) {
                    steps.push(plain(format!(
                        "INSERT OR IGNORE INTO {ovf} ([ECInstanceId], [ECClassId]) SELECT [ECInstanceId], [ECClassId] FROM {t} WHERE [ECInstanceId] IN ({targets})",
                        ovf = quote_ident(db.table_name(overflow)),
                        t = quote_ident(db.table_name(table)),
                        targets = targets
                    )));
                }
            }
            for (physical, cells) in per_table {
                let physical_name = quote_ident(db.table_name(physical));
                let mut sets = Vec::new();
                for (column, cell) in &cells {
                    let mut value = self.cell_sql(cell)?;
                    if let Cell::Expr(node) = cell {
                        if self.writer.references_properties(*node) {
                            value = format!(
                                "(SELECT {} FROM ({}) AS {} WHERE {}.[ECInstanceId] = {}.[ECInstanceId])",
                                value, view, alias, alias, physical_name
                            );
                        }
                    }
                    sets.push(format!("{} = {}", quote_ident(db.column_name(*column)), value));
                }
                let sql = format!(
                    "UPDATE {} SET {} WHERE [ECInstanceId] IN ({})",
                    physical_name,
                    sets.join(", "),
                    targets
                );
                steps.push(NativeStep::Sql(SqlStep {
                    sql,
                    bindings: self.writer.take_bindings(),
                }));
            }
            for (plan, source) in arrays {
                if replaced_arrays.insert(plan.table.clone()) {
                    steps.push(NativeStep::ReplaceArray { plan, source });
                }
            }
        }
        Ok(steps)
    }

    fn delete(&mut self, root: NodeId) -> Result<Vec<NativeStep>, NativeSqlError> {
        let tree = self.writer.tree;
        let ExpKind::Delete {
            class_ref,
            where_clause,
        } = tree.kind(root).clone()
        else {
            return Err(NativeSqlError::Internal("DELETE node expected".to_string()));
        };
        let (range, class_id) = self.target(class_ref)?;
        let (fill, _) = self.fill_targets(&range, class_id, where_clause)?;
        let mut steps = vec![fill];

        let snapshot = self.writer.snapshot;
        let db = &snapshot.db_schema;
        let targets = format!("SELECT Id FROM {}", DML_TARGETS_TABLE);
        let mut cleared: HashSet<TableId> = HashSet::new();
        let mut array_tables: HashSet<String> = HashSet::new();

        for (table, classes) in table_groups(snapshot, class_id, range.only) {
            let mut arrays = Vec::new();
            for class in &classes {
                if let Some(map) = snapshot.class_map(*class) {
                    for property in map.property_maps.iter() {
                        collect_struct_arrays(property, &mut arrays);
                    }
                }
            }
            for map in arrays {
                let plan = array_write_plan(snapshot, map.access_string(), &map)?;
                if array_tables.insert(plan.table.clone()) {
                    steps.extend(plan.delete_sql_in(&targets).into_iter().map(plain));
                }
            }
            if let Some(overflow) = db.table(table).and_then(|t| t.overflow) {
                steps.push(plain(format!(
                    "DELETE FROM {} WHERE [ECInstanceId] IN ({})",
                    quote_ident(db.table_name(overflow)),
                    targets
                )));
            }
            steps.push(plain(format!(
                "DELETE FROM {} WHERE [ECInstanceId] IN ({})",
                quote_ident(db.table_name(table)),
                targets
            )));
            cleared.insert(table);
        }

        // Link-table rows pointing at a deleted instance go with it
        for map in snapshot.class_maps.iter().filter(|m| m.is_link_table && m.is_mapped()) {
            let Some(link) = map.primary_table else {
                continue;
            };
            if !cleared.insert(link) {
                continue;
            }
            let (Some(source), Some(target)) = (
                db.system_column(link, DbColumnKind::SourceInstanceId),
                db.system_column(link, DbColumnKind::TargetInstanceId),
            ) else {
                continue;
            };
            steps.push(plain(format!(
                "DELETE FROM {} WHERE {} IN ({t}) OR {} IN ({t})",
                quote_ident(db.table_name(link)),
                quote_ident(db.column_name(source)),
                quote_ident(db.column_name(target)),
                t = targets
            )));
        }
        Ok(steps)
    }
}

fn plain(sql: String) -> NativeStep {
    NativeStep::Sql(SqlStep {
        sql,
        bindings: Vec::new(),
    })
}

fn leaf_column(leaves: &[LeafColumn], access: &str) -> Option<ColumnId> {
    leaves
        .iter()
        .find(|leaf| leaf.access_string.eq_ignore_ascii_case(access))
        .map(|leaf| leaf.column)
}

#[allow(clippy::type_complexity)]
fn split(assigned: Vec<Assigned>) -> (Vec<(ColumnId, Cell)>, Vec<(Arc<ArrayWritePlan>, Option<Binding>)>) {
    let mut columns = Vec::new();
    let mut arrays = Vec::new();
    for a in assigned {
        match a {
            Assigned::Column(column, cell) => columns.push((column, cell)),
            Assigned::Array(plan, source) => arrays.push((plan, source)),
        }
    }
    (columns, arrays)
}

/// Cells grouped by physical table, primary table first
fn by_table(
    db: &crate::db_mapping::DbSchema,
    class_map: &ClassMap,
    columns: Vec<(ColumnId, Cell)>,
) -> Result<Vec<(TableId, Vec<(ColumnId, Cell)>)>, NativeSqlError> {
    let tables = class_map.tables(db);
    let mut groups: Vec<(TableId, Vec<(ColumnId, Cell)>)> = Vec::new();
    for (column, cell) in columns {
        let table = db
            .column(column)
            .map(|c| c.table)
            .filter(|t| tables.contains(t))
            .ok_or_else(|| NativeSqlError::Internal(format!("column {} is outside the class's tables", column)))?;
        match groups.iter_mut().find(|(t, _)| *t == table) {
            Some((_, cells)) => cells.push((column, cell)),
            None => groups.push((table, vec![(column, cell)])),
        }
    }
    groups.sort_by_key(|(t, _)| tables.iter().position(|x| x == t));
    Ok(groups)
}

fn collect_struct_arrays(map: &Arc<PropertyMap>, out: &mut Vec<Arc<PropertyMap>>) {
    if let PropertyMap::Compound(compound) = map.as_ref() {
        if compound.array_table.is_some() {
            out.push(map.clone());
        } else {
            for member in &compound.members {
                collect_struct_arrays(member, out);
            }
        }
    }
}
