//! Compiled form of one ECSQL statement
//!
//! A [`CompiledPlan`] is a list of native steps plus the metadata needed to
//! bind ECSQL parameters to them and to read typed values back. Native SQL
//! always uses numbered parameters; `?N` in a step is `bindings[N - 1]`.

use std::fmt;
use std::sync::Arc;

use crate::ec_catalog::{ClassId, PrimitiveType};
use crate::ecsql_parser::exp_tree::ParameterInfo;
use crate::ecsql_parser::StatementKind;
use crate::utils::quote_ident;

/// Name of the temp table UPDATE and DELETE collect their target ids in
pub const DML_TARGETS_TABLE: &str = "temp.ecdb_dml_targets";

/// What a native parameter is bound to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// An ECSQL parameter, or one leaf of the composite value bound to it
    /// (`X` of a point, `Loc.Y` of a struct, `Id` of a navigation value).
    /// `default` is used when the leaf is null.
    Parameter {
        index: usize,
        leaf: Option<String>,
        default: Option<i64>,
    },
    /// A primitive array parameter written as JSON text
    ParameterJson { index: usize, leaf: Option<String> },
    /// Id of the row an INSERT creates
    InstanceId,
}

impl Binding {
    pub fn parameter(index: usize) -> Self {
        Binding::Parameter {
            index,
            leaf: None,
            default: None,
        }
    }

    pub fn parameter_leaf(index: usize, leaf: impl Into<String>) -> Self {
        Binding::Parameter {
            index,
            leaf: Some(leaf.into()),
            default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStep {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeStep {
    Sql(SqlStep),
    /// Refill the DML target table; the number of rows it selects is the
    /// number of instances the statement affects
    FillTargets(SqlStep),
    /// Write the element rows of a struct array for the row being inserted
    InsertArray {
        plan: Arc<ArrayWritePlan>,
        source: Binding,
    },
    /// Replace the element rows of a struct array for every target id;
    /// without a source the array is emptied
    ReplaceArray {
        plan: Arc<ArrayWritePlan>,
        source: Option<Binding>,
    },
}

/// One column of a struct array element row and the leaf it is read from
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMemberColumn {
    pub column: String,
    /// Access string relative to the element
    pub leaf: String,
    pub json: bool,
}

/// How to write the elements of one struct array property
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayWritePlan {
    pub access_string: String,
    pub table: String,
    pub struct_class: ClassId,
    /// `?1` element id, `?2` class id, `?3` parent id, `?4` array index,
    /// then one parameter per member column
    pub insert_sql: String,
    pub members: Vec<ArrayMemberColumn>,
    /// Struct arrays inside the element, keyed by the element's id
    pub nested: Vec<Arc<ArrayWritePlan>>,
}

impl ArrayWritePlan {
    /// Statements removing the element rows (nested first) below parent `?1`
    pub fn delete_sql(&self) -> Vec<String> {
        self.delete_sql_in("?1")
    }

    /// Same, for every parent id returned by the `parent_ids` subquery
    pub fn delete_sql_in(&self, parent_ids: &str) -> Vec<String> {
        let mut statements = Vec::new();
        self.collect_deletes(parent_ids, &mut statements);
        statements
    }

    fn collect_deletes(&self, parent_ids: &str, statements: &mut Vec<String>) {
        let table = quote_ident(&self.table);
        let element_ids = format!(
            "SELECT [ECInstanceId] FROM {} WHERE [ParentECInstanceId] IN ({})",
            table, parent_ids
        );
        for nested in &self.nested {
            nested.collect_deletes(&element_ids, statements);
        }
        statements.push(format!(
            "DELETE FROM {} WHERE [ParentECInstanceId] IN ({})",
            table, parent_ids
        ));
    }
}

/// Where the id of an inserted row comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdSource {
    Generated,
    Parameter(usize),
    Literal(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueShape {
    /// One column; the type is known for property references
    Scalar(Option<PrimitiveType>),
    Point(PrimitiveType),
    PrimitiveArray(PrimitiveType),
    /// `Id` and `RelECClassId` columns
    Navigation,
    Struct(Vec<(String, ValueShape)>),
    /// One column holding the owning row id; elements come from the plan
    StructArray(Arc<EmbeddedPlan>),
}

impl ValueShape {
    /// Native columns the value occupies
    pub fn width(&self) -> usize {
        match self {
            ValueShape::Scalar(_) | ValueShape::PrimitiveArray(_) | ValueShape::StructArray(_) => 1,
            ValueShape::Point(pt) => pt.column_count(),
            ValueShape::Navigation => 2,
            ValueShape::Struct(members) => members.iter().map(|(_, shape)| shape.width()).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub shape: ValueShape,
    /// Index of the first native column
    pub first: usize,
}

impl ColumnInfo {
    pub fn width(&self) -> usize {
        self.shape.width()
    }
}

/// Query reading the elements of one struct array for a parent row id (`?1`)
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPlan {
    pub access_string: String,
    pub sql: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub ecsql: String,
    pub kind: StatementKind,
    pub steps: Vec<NativeStep>,
    pub columns: Vec<ColumnInfo>,
    pub parameters: Vec<ParameterInfo>,
    pub instance_id: IdSource,
}

impl CompiledPlan {
    /// The single query of a SELECT
    pub fn query(&self) -> Option<&SqlStep> {
        match (self.kind, self.steps.first()) {
            (StatementKind::Select, Some(NativeStep::Sql(step))) => Some(step),
            _ => None,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Native SQL of every step, one per line
    pub fn native_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CompiledPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            match step {
                NativeStep::Sql(step) | NativeStep::FillTargets(step) => writeln!(f, "{};", step.sql)?,
                NativeStep::InsertArray { plan, .. } | NativeStep::ReplaceArray { plan, .. } => {
                    writeln!(f, "{};", plan.insert_sql)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_shape_width() {
        let shape = ValueShape::Struct(vec![
            ("Street".into(), ValueShape::Scalar(Some(PrimitiveType::String))),
            ("Loc".into(), ValueShape::Point(PrimitiveType::Point3d)),
            ("Owner".into(), ValueShape::Navigation),
        ]);
        assert_eq!(shape.width(), 6);
    }

    #[test]
    fn test_nested_array_deletes_run_deepest_first() {
        let inner = Arc::new(ArrayWritePlan {
            access_string: "Items.Parts".into(),
            table: "ts_Foo_Items_Parts".into(),
            struct_class: 3,
            insert_sql: String::new(),
            members: Vec::new(),
            nested: Vec::new(),
        });
        let outer = ArrayWritePlan {
            access_string: "Items".into(),
            table: "ts_Foo_Items".into(),
            struct_class: 2,
            insert_sql: String::new(),
            members: Vec::new(),
            nested: vec![inner],
        };
        let deletes = outer.delete_sql();
        assert_eq!(deletes.len(), 2);
        assert!(deletes[0].starts_with("DELETE FROM [ts_Foo_Items_Parts]"));
        assert!(deletes[0].contains("SELECT [ECInstanceId] FROM [ts_Foo_Items]"));
        assert_eq!(
            deletes[1],
            "DELETE FROM [ts_Foo_Items] WHERE [ParentECInstanceId] IN (?1)"
        );
    }
}
