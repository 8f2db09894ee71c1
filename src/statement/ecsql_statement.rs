//! Prepared ECSQL statement
//!
//! Executes a [`CompiledPlan`] over the store connection. A SELECT reads its
//! rows on the first `step()` and hands them out one per call; INSERT, UPDATE
//! and DELETE run all their native steps inside one savepoint on the first
//! `step()` and report `Done`.

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value as JsonValue};

use crate::ec_catalog::PrimitiveType;
use crate::ecsql_parser::StatementKind;
use crate::ecsql_prepare::{Issue, IssueCategory, IssueReporter};
use crate::native_sql::{
    ArrayWritePlan, Binding, ColumnInfo, CompiledPlan, EmbeddedPlan, IdSource, NativeStep, SqlStep,
    ValueShape, DML_TARGETS_TABLE,
};
use crate::store::{self, RepositoryBasedIdSequence};

use super::errors::StatementError;
use super::value::EcValue;

const DML_SAVEPOINT: &str = "ecdb_dml";

const DML_TARGETS_DDL: &str = "CREATE TEMP TABLE IF NOT EXISTS ecdb_dml_targets(Id INTEGER PRIMARY KEY);
DELETE FROM temp.ecdb_dml_targets;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

pub struct EcSqlStatement<'db> {
    conn: &'db Connection,
    ids: &'db RepositoryBasedIdSequence,
    reporter: &'db IssueReporter,
    plan: Arc<CompiledPlan>,
    bindings: Vec<EcValue>,
    rows: Option<VecDeque<Vec<Value>>>,
    current: Option<Vec<Value>>,
    done: bool,
    closed: bool,
    affected: usize,
    last_inserted_id: Option<i64>,
}

impl std::fmt::Debug for EcSqlStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcSqlStatement")
            .field("ecsql", &self.plan.ecsql)
            .field("kind", &self.plan.kind)
            .field("bindings", &self.bindings)
            .field("done", &self.done)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<'db> EcSqlStatement<'db> {
    pub(crate) fn new(
        conn: &'db Connection,
        ids: &'db RepositoryBasedIdSequence,
        reporter: &'db IssueReporter,
        plan: Arc<CompiledPlan>,
    ) -> Self {
        let bindings = vec![EcValue::Null; plan.parameter_count()];
        EcSqlStatement {
            conn,
            ids,
            reporter,
            plan,
            bindings,
            rows: None,
            current: None,
            done: false,
            closed: false,
            affected: 0,
            last_inserted_id: None,
        }
    }

    pub fn ecsql(&self) -> &str {
        &self.plan.ecsql
    }

    pub fn native_sql(&self) -> String {
        self.plan.native_sql()
    }

    pub fn kind(&self) -> StatementKind {
        self.plan.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), StatementError> {
        if self.closed {
            Err(StatementError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.plan.parameter_count()
    }

    /// 1-based index of the named parameter `:name`
    pub fn parameter_index(&self, name: &str) -> Result<usize, StatementError> {
        let name = name.trim_start_matches(':');
        self.plan
            .parameters
            .iter()
            .find(|p| p.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|p| p.index)
            .ok_or_else(|| StatementError::UnknownParameter(name.to_string()))
    }

    /// Bind the 1-based parameter `index`. Bindings stay in place across
    /// `reset()` until they are replaced or cleared.
    pub fn bind(&mut self, index: usize, value: impl Into<EcValue>) -> Result<(), StatementError> {
        self.ensure_open()?;
        let count = self.parameter_count();
        if index == 0 || index > count {
            return Err(StatementError::ParameterOutOfRange { index, count });
        }
        self.bindings[index - 1] = value.into();
        Ok(())
    }

    pub fn bind_null(&mut self, index: usize) -> Result<(), StatementError> {
        self.bind(index, EcValue::Null)
    }

    pub fn bind_by_name(&mut self, name: &str, value: impl Into<EcValue>) -> Result<(), StatementError> {
        self.ensure_open()?;
        let index = self.parameter_index(name)?;
        self.bind(index, value)
    }

    pub fn clear_bindings(&mut self) -> Result<(), StatementError> {
        self.ensure_open()?;
        self.bindings.iter_mut().for_each(|b| *b = EcValue::Null);
        Ok(())
    }

    /// Advance to the next row. After `Done` every further call returns `Done`
    /// until the statement is reset.
    pub fn step(&mut self) -> Result<StepResult, StatementError> {
        self.ensure_open()?;
        if self.done {
            return Ok(StepResult::Done);
        }
        let result = match self.plan.kind {
            StatementKind::Select => self.step_query(),
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => self.step_dml(),
        };
        if let Err(err) = &result {
            self.reporter.report(&Issue::error(
                IssueCategory::Execution,
                format!("'{}': {}", self.plan.ecsql, err),
            ));
        }
        result
    }

    /// Rewind to before the first row, keeping the bindings
    pub fn reset(&mut self) -> Result<(), StatementError> {
        self.ensure_open()?;
        self.rows = None;
        self.current = None;
        self.done = false;
        self.affected = 0;
        Ok(())
    }

    /// Release buffered rows and bindings. Every later call except
    /// `is_closed` fails with [`StatementError::Closed`].
    pub fn close(&mut self) {
        if !self.closed {
            debug!("Closing statement '{}'", self.plan.ecsql);
        }
        self.closed = true;
        self.rows = None;
        self.current = None;
        self.bindings.clear();
    }

    /// Instances touched by the last INSERT, UPDATE or DELETE
    pub fn affected_rows(&self) -> usize {
        self.affected
    }

    pub fn last_inserted_id(&self) -> Option<i64> {
        self.last_inserted_id
    }

    pub fn column_count(&self) -> usize {
        self.plan.columns.len()
    }

    pub fn column_info(&self, index: usize) -> Result<&ColumnInfo, StatementError> {
        self.ensure_open()?;
        self.plan
            .columns
            .get(index)
            .ok_or(StatementError::ColumnOutOfRange {
                index,
                count: self.plan.columns.len(),
            })
    }

    /// Typed value of result column `index` (0-based) of the current row
    pub fn get_value(&self, index: usize) -> Result<EcValue, StatementError> {
        let column = self.column_info(index)?;
        let row = self.current.as_ref().ok_or(StatementError::NoRow)?;
        read_value(self.conn, &column.shape, column_cells(row, column)?)
    }

    /// The current row as a JSON object keyed by column name
    pub fn row_json(&self) -> Result<JsonValue, StatementError> {
        let mut object = Map::new();
        for index in 0..self.column_count() {
            let name = self.column_info(index)?.name.clone();
            object.insert(name, self.get_value(index)?.to_json());
        }
        Ok(JsonValue::Object(object))
    }

    fn step_query(&mut self) -> Result<StepResult, StatementError> {
        if self.rows.is_none() {
            self.rows = Some(self.run_query()?);
        }
        self.current = self.rows.as_mut().and_then(VecDeque::pop_front);
        if self.current.is_some() {
            Ok(StepResult::Row)
        } else {
            self.done = true;
            Ok(StepResult::Done)
        }
    }

    fn run_query(&self) -> Result<VecDeque<Vec<Value>>, StatementError> {
        let step = self.plan.query().ok_or_else(|| {
            StatementError::invalid_value(self.plan.ecsql.clone(), "SELECT without a query step")
        })?;
        let values = self.native_values(step, None)?;
        let mut stmt = self.conn.prepare_cached(&step.sql)?;
        let rows = collect_rows(&mut stmt, params_from_iter(values.iter()))?;
        debug!("'{}' returned {} row(s)", self.plan.ecsql, rows.len());
        Ok(rows)
    }

    fn step_dml(&mut self) -> Result<StepResult, StatementError> {
        let plan = Arc::clone(&self.plan);
        let (affected, inserted) =
            store::with_savepoint(self.conn, DML_SAVEPOINT, |conn| self.run_steps(conn, &plan))?;
        self.affected = affected;
        if inserted.is_some() {
            self.last_inserted_id = inserted;
        }
        self.done = true;
        debug!("'{}' affected {} instance(s)", plan.ecsql, affected);
        Ok(StepResult::Done)
    }

    fn run_steps(
        &self,
        conn: &Connection,
        plan: &CompiledPlan,
    ) -> Result<(usize, Option<i64>), StatementError> {
        let instance_id = match plan.kind {
            StatementKind::Insert => Some(self.instance_id(conn, plan.instance_id)?),
            _ => None,
        };
        let mut affected = usize::from(instance_id.is_some());

        for step in &plan.steps {
            match step {
                NativeStep::Sql(step) => {
                    self.execute(conn, step, instance_id)?;
                }
                NativeStep::FillTargets(step) => {
                    conn.execute_batch(DML_TARGETS_DDL)?;
                    affected = self.execute(conn, step, instance_id)?;
                }
                NativeStep::InsertArray { plan: array, source } => {
                    let parent = instance_id.ok_or_else(|| {
                        StatementError::invalid_value(array.access_string.clone(), "no instance is being inserted")
                    })?;
                    let value = self.resolve(source);
                    write_elements(conn, self.ids, array, parent, &value)?;
                }
                NativeStep::ReplaceArray { plan: array, source } => {
                    let value = source.as_ref().map(|s| self.resolve(s)).unwrap_or(EcValue::Null);
                    for parent in target_ids(conn)? {
                        for sql in array.delete_sql() {
                            conn.prepare_cached(&sql)?.execute([parent])?;
                        }
                        write_elements(conn, self.ids, array, parent, &value)?;
                    }
                }
            }
        }
        Ok((affected, instance_id))
    }

    fn instance_id(&self, conn: &Connection, source: IdSource) -> Result<i64, StatementError> {
        match source {
            IdSource::Generated => Ok(self.ids.get_next_i64_value(conn)?),
            IdSource::Literal(id) => Ok(id),
            IdSource::Parameter(index) => match self.parameter_value(index, None) {
                EcValue::Null => Ok(self.ids.get_next_i64_value(conn)?),
                value => value
                    .as_i64()
                    .ok_or_else(|| StatementError::invalid_value("ECInstanceId", "expected an integer id")),
            },
        }
    }

    fn execute(
        &self,
        conn: &Connection,
        step: &SqlStep,
        instance_id: Option<i64>,
    ) -> Result<usize, StatementError> {
        let values = self.native_values(step, instance_id)?;
        let mut stmt = conn.prepare_cached(&step.sql)?;
        Ok(stmt.execute(params_from_iter(values.iter()))?)
    }

    fn native_values(&self, step: &SqlStep, instance_id: Option<i64>) -> Result<Vec<Value>, StatementError> {
        step.bindings
            .iter()
            .map(|binding| self.native_value(binding, instance_id))
            .collect()
    }

    fn native_value(&self, binding: &Binding, instance_id: Option<i64>) -> Result<Value, StatementError> {
        match binding {
            Binding::InstanceId => instance_id
                .map(Value::Integer)
                .ok_or_else(|| StatementError::invalid_value("ECInstanceId", "only available in INSERT")),
            Binding::Parameter { index, leaf, default } => {
                let value = self.parameter_value(*index, leaf.as_deref());
                Ok(match (value, default) {
                    (EcValue::Null, Some(default)) => Value::Integer(*default),
                    (value, _) => value.to_sql(),
                })
            }
            Binding::ParameterJson { index, leaf } => {
                Ok(json_text(&self.parameter_value(*index, leaf.as_deref())))
            }
        }
    }

    /// Whole value of a binding that feeds a struct array
    fn resolve(&self, binding: &Binding) -> EcValue {
        match binding {
            Binding::Parameter { index, leaf, .. } | Binding::ParameterJson { index, leaf } => {
                self.parameter_value(*index, leaf.as_deref())
            }
            Binding::InstanceId => EcValue::Null,
        }
    }

    /// Bound value of parameter `index`, or the leaf below it. An integer
    /// bound to a navigation parameter is its `Id`.
    fn parameter_value(&self, index: usize, leaf: Option<&str>) -> EcValue {
        let value = index
            .checked_sub(1)
            .and_then(|i| self.bindings.get(i))
            .cloned()
            .unwrap_or(EcValue::Null);
        match (leaf, value) {
            (None, value) => value,
            (Some(leaf), EcValue::Integer(id)) if leaf.eq_ignore_ascii_case("Id") => EcValue::Integer(id),
            (Some(leaf), value) => value.leaf(leaf),
        }
    }
}

impl Drop for EcSqlStatement<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn json_text(value: &EcValue) -> Value {
    if value.is_null() {
        Value::Null
    } else {
        Value::Text(value.to_json().to_string())
    }
}

fn target_ids(conn: &Connection) -> Result<Vec<i64>, StatementError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT Id FROM {}", DML_TARGETS_TABLE))?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Insert one row per element of `value` below `parent`, then the nested
/// arrays of every element below the element's own id
fn write_elements(
    conn: &Connection,
    ids: &RepositoryBasedIdSequence,
    plan: &ArrayWritePlan,
    parent: i64,
    value: &EcValue,
) -> Result<(), StatementError> {
    let elements = match value {
        EcValue::Null => return Ok(()),
        EcValue::Array(elements) => elements,
        _ => {
            return Err(StatementError::invalid_value(
                plan.access_string.clone(),
                "expected an array of structs",
            ))
        }
    };
    let mut insert = conn.prepare_cached(&plan.insert_sql)?;
    for (index, element) in elements.iter().enumerate() {
        let id = ids.get_next_i64_value(conn)?;
        let mut values = vec![
            Value::Integer(id),
            Value::Integer(plan.struct_class),
            Value::Integer(parent),
            Value::Integer(index as i64),
        ];
        for member in &plan.members {
            let leaf = element.leaf(&member.leaf);
            values.push(if member.json { json_text(&leaf) } else { leaf.to_sql() });
        }
        insert.execute(params_from_iter(values.iter()))?;
        for nested in &plan.nested {
            write_elements(conn, ids, nested, id, &element.leaf(&nested.access_string))?;
        }
    }
    Ok(())
}

fn collect_rows<P: rusqlite::Params>(
    stmt: &mut rusqlite::CachedStatement<'_>,
    params: P,
) -> Result<VecDeque<Vec<Value>>, StatementError> {
    let width = stmt.column_count();
    let mut rows = stmt.query(params)?;
    let mut out = VecDeque::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(row.get::<_, Value>(i)?);
        }
        out.push_back(cells);
    }
    Ok(out)
}

fn column_cells<'r>(row: &'r [Value], column: &ColumnInfo) -> Result<&'r [Value], StatementError> {
    row.get(column.first..column.first + column.width()).ok_or_else(|| {
        StatementError::invalid_value(column.name.clone(), "row is narrower than the column layout")
    })
}

fn read_value(conn: &Connection, shape: &ValueShape, cells: &[Value]) -> Result<EcValue, StatementError> {
    let first = cells.first();
    match shape {
        ValueShape::Scalar(primitive_type) => Ok(first
            .map(|cell| EcValue::from_sql(cell, *primitive_type))
            .unwrap_or(EcValue::Null)),
        ValueShape::Point(primitive_type) => Ok(read_point(*primitive_type, cells)),
        ValueShape::PrimitiveArray(primitive_type) => match first {
            None | Some(Value::Null) => Ok(EcValue::Null),
            Some(Value::Text(text)) => EcValue::from_json_array(text, *primitive_type)
                .ok_or_else(|| StatementError::invalid_value("primitive array", "stored text is not a JSON array")),
            _ => Err(StatementError::invalid_value(
                "primitive array",
                "stored value is not JSON text",
            )),
        },
        ValueShape::Navigation => Ok(match (first, cells.get(1)) {
            (Some(Value::Integer(id)), rel) => EcValue::Navigation {
                id: *id,
                rel_class_id: match rel {
                    Some(Value::Integer(rel)) => Some(*rel),
                    _ => None,
                },
            },
            _ => EcValue::Null,
        }),
        ValueShape::Struct(members) => {
            let mut offset = 0;
            let mut values = Vec::with_capacity(members.len());
            for (name, member) in members {
                let width = member.width();
                let member_cells = cells.get(offset..offset + width).ok_or_else(|| {
                    StatementError::invalid_value(name.clone(), "row is narrower than the struct layout")
                })?;
                values.push((name.clone(), read_value(conn, member, member_cells)?));
                offset += width;
            }
            if values.iter().all(|(_, v)| v.is_null()) {
                Ok(EcValue::Null)
            } else {
                Ok(EcValue::Struct(values))
            }
        }
        ValueShape::StructArray(plan) => match first {
            Some(Value::Integer(parent)) => read_struct_array(conn, plan, *parent),
            _ => Ok(EcValue::Null),
        },
    }
}

fn read_point(primitive_type: PrimitiveType, cells: &[Value]) -> EcValue {
    let coords: Option<Vec<f64>> = cells
        .iter()
        .map(|cell| match cell {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        })
        .collect();
    match (primitive_type, coords.as_deref()) {
        (PrimitiveType::Point2d, Some([x, y])) => EcValue::Point2d { x: *x, y: *y },
        (PrimitiveType::Point3d, Some([x, y, z])) => EcValue::Point3d {
            x: *x,
            y: *y,
            z: *z,
        },
        _ => EcValue::Null,
    }
}

/// Run the embedded statement of a struct array for one parent row
fn read_struct_array(conn: &Connection, plan: &EmbeddedPlan, parent: i64) -> Result<EcValue, StatementError> {
    let rows = {
        let mut stmt = conn.prepare_cached(&plan.sql)?;
        collect_rows(&mut stmt, [parent])?
    };
    let mut elements = Vec::with_capacity(rows.len());
    for row in rows {
        let mut members = Vec::with_capacity(plan.columns.len());
        for column in &plan.columns {
            let value = read_value(conn, &column.shape, column_cells(&row, column)?)?;
            members.push((column.name.clone(), value));
        }
        elements.push(EcValue::Struct(members));
    }
    Ok(EcValue::Array(elements))
}
