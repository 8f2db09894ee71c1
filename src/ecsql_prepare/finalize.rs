//! Semantic pass over an [`ExpTree`]
//!
//! Resolves class references to catalog classes, property paths to the
//! property (or system property) they address, and checks function calls.
//! Each node moves Unfinalized → BeforeChildren → Completed (or Error).
//! Work that must precede the children (resolving the FROM clause of a
//! SELECT, checking a DML target) happens in the BeforeChildren step; the
//! frame pushed there is popped once the children are done.

use std::collections::HashMap;

use log::debug;

use crate::db_mapping::{DbColumnKind, MappingSnapshot};
use crate::ec_catalog::{
    ClassId, ClassModifier, PrimitiveType, PropertyKind, PropertyRef, SchemaCatalog, SchemaError,
};
use crate::ecsql_parser::{ExpKind, ExpTree, FinalizeState, LiteralValue, NodeId, StatementKind};
use crate::native_sql::function_registry::FunctionRegistry;

use super::issues::IssueCategory;
use super::prepare_ctx::{Frame, PrepareContext, RangeClass, RangeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemProperty {
    InstanceId,
    ClassId,
    SourceInstanceId,
    SourceClassId,
    TargetInstanceId,
    TargetClassId,
}

impl SystemProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [SystemProperty; 6] = [
            SystemProperty::InstanceId,
            SystemProperty::ClassId,
            SystemProperty::SourceInstanceId,
            SystemProperty::SourceClassId,
            SystemProperty::TargetInstanceId,
            SystemProperty::TargetClassId,
        ];
        ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemProperty::InstanceId => "ECInstanceId",
            SystemProperty::ClassId => "ECClassId",
            SystemProperty::SourceInstanceId => "SourceECInstanceId",
            SystemProperty::SourceClassId => "SourceECClassId",
            SystemProperty::TargetInstanceId => "TargetECInstanceId",
            SystemProperty::TargetClassId => "TargetECClassId",
        }
    }

    pub fn column_kind(self) -> DbColumnKind {
        match self {
            SystemProperty::InstanceId => DbColumnKind::InstanceId,
            SystemProperty::ClassId => DbColumnKind::ClassId,
            SystemProperty::SourceInstanceId => DbColumnKind::SourceInstanceId,
            SystemProperty::SourceClassId => DbColumnKind::SourceClassId,
            SystemProperty::TargetInstanceId => DbColumnKind::TargetInstanceId,
            SystemProperty::TargetClassId => DbColumnKind::TargetClassId,
        }
    }

    pub fn is_relationship_end(self) -> bool {
        !matches!(self, SystemProperty::InstanceId | SystemProperty::ClassId)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyShape {
    Primitive(PrimitiveType),
    PrimitiveArray(PrimitiveType),
    /// A whole Point2d/Point3d value
    Point(PrimitiveType),
    /// One coordinate of a point
    Coordinate,
    Struct(ClassId),
    StructArray(ClassId),
    Navigation { relationship: ClassId },
    NavigationId,
    NavigationRelClassId,
}

impl PropertyShape {
    /// Shapes that span several columns or rows and so cannot be an operand
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            PropertyShape::Point(_) | PropertyShape::Struct(_) | PropertyShape::StructArray(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathTarget {
    System(SystemProperty),
    /// `access_string` names the view column for leaf shapes and the
    /// property itself for composite shapes
    Property {
        access_string: String,
        shape: PropertyShape,
    },
    FunctionColumn(String),
    /// Reference to a select-list alias of the enclosing SELECT
    SelectAlias(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub range: Option<RangeId>,
    pub target: PathTarget,
}

/// Resolution results of one statement, keyed by node
#[derive(Debug, Clone, Default)]
pub struct Semantics {
    pub ranges: Vec<RangeClass>,
    pub class_refs: HashMap<NodeId, RangeId>,
    pub paths: HashMap<NodeId, ResolvedPath>,
}

impl Semantics {
    pub fn range(&self, id: RangeId) -> Option<&RangeClass> {
        self.ranges.get(id)
    }

    pub fn range_of(&self, class_ref: NodeId) -> Option<&RangeClass> {
        self.class_refs.get(&class_ref).and_then(|id| self.ranges.get(*id))
    }

    pub fn path(&self, node: NodeId) -> Option<&ResolvedPath> {
        self.paths.get(&node)
    }
}

/// Run the semantic pass; problems are reported into `ctx`
pub fn finalize(
    tree: &mut ExpTree,
    snapshot: &MappingSnapshot,
    functions: &FunctionRegistry,
    ctx: &mut PrepareContext<'_>,
) -> Semantics {
    let mut finalizer = Finalizer {
        snapshot,
        functions,
        semantics: Semantics::default(),
        select_aliases: Vec::new(),
    };
    if let Some(root) = tree.root() {
        let ok = finalizer.finalize_node(tree, root, ctx);
        debug!(
            "finalized {} node(s), {} range(s), ok={}",
            tree.len(),
            finalizer.semantics.ranges.len(),
            ok
        );
    }
    finalizer.semantics
}

struct Finalizer<'f> {
    snapshot: &'f MappingSnapshot,
    functions: &'f FunctionRegistry,
    semantics: Semantics,
    select_aliases: Vec<Vec<String>>,
}

impl Finalizer<'_> {
    fn finalize_node(&mut self, tree: &mut ExpTree, id: NodeId, ctx: &mut PrepareContext<'_>) -> bool {
        tree.set_state(id, FinalizeState::BeforeChildren);
        let kind = tree.kind(id).clone();
        let ok = match &kind {
            ExpKind::Select(_) => self.finalize_select(tree, id, ctx),
            ExpKind::Insert { .. } => self.finalize_dml(tree, id, StatementKind::Insert, ctx),
            ExpKind::Update { .. } => self.finalize_dml(tree, id, StatementKind::Update, ctx),
            ExpKind::Delete { .. } => self.finalize_dml(tree, id, StatementKind::Delete, ctx),
            ExpKind::PropertyPath { segments } => self.finalize_path(tree, id, segments, ctx),
            ExpKind::Wildcard { alias: Some(alias) } => {
                let visible = ctx
                    .frames()
                    .first()
                    .is_some_and(|frame| frame.iter().any(|r| r.effective_alias().eq_ignore_ascii_case(alias)));
                if !visible {
                    ctx.error(
                        IssueCategory::EcsqlSyntax,
                        format!("'{}.*' does not match any class in the FROM clause", alias),
                    );
                }
                visible
            }
            ExpKind::FunctionCall {
                name, star, args, ..
            } => {
                let mut ok = self.check_function(name, *star, args.len(), ctx);
                ok &= self.finalize_children(tree, id, ctx);
                ok
            }
            ExpKind::Literal(LiteralValue::Blob(digits)) => match hex::decode(digits) {
                Ok(_) => true,
                Err(e) => {
                    ctx.error(
                        IssueCategory::EcsqlSyntax,
                        format!("invalid blob literal X'{}': {}", digits, e),
                    );
                    false
                }
            },
            ExpKind::Subquery { select } | ExpKind::InSubquery { subquery: select, .. } => {
                let mut ok = self.check_single_column(tree, *select, ctx);
                ok &= self.finalize_children(tree, id, ctx);
                ok
            }
            _ => self.finalize_children(tree, id, ctx),
        };
        tree.set_state(id, if ok { FinalizeState::Completed } else { FinalizeState::Error });
        ok
    }

    fn finalize_children(&mut self, tree: &mut ExpTree, id: NodeId, ctx: &mut PrepareContext<'_>) -> bool {
        let mut ok = true;
        for child in tree.children(id) {
            ok &= self.finalize_node(tree, child, ctx);
        }
        ok
    }

    fn finalize_select(&mut self, tree: &mut ExpTree, id: NodeId, ctx: &mut PrepareContext<'_>) -> bool {
        let ExpKind::Select(select) = tree.kind(id).clone() else {
            unreachable!("finalize_select on a non-SELECT node");
        };

        let mut ok = true;
        let mut frame: Frame = Vec::new();
        let class_refs: Vec<NodeId> = select
            .from
            .iter()
            .copied()
            .chain(select.joins.iter().filter_map(|join| match tree.kind(*join) {
                ExpKind::Join { class_ref, .. } => Some(*class_ref),
                _ => None,
            }))
            .collect();
        for class_ref in class_refs {
            match self.resolve_class_ref(tree, class_ref, ctx) {
                Some(range) => {
                    if frame
                        .iter()
                        .any(|r| r.effective_alias().eq_ignore_ascii_case(range.effective_alias()))
                    {
                        ctx.error(
                            IssueCategory::EcsqlSyntax,
                            format!(
                                "'{}' is used more than once in the FROM clause; give each class reference its own alias",
                                range.effective_alias()
                            ),
                        );
                        ok = false;
                    }
                    frame.push(range);
                }
                None => ok = false,
            }
        }

        let aliases: Vec<String> = select
            .items
            .iter()
            .filter_map(|item| match tree.kind(*item) {
                ExpKind::SelectItem { alias: Some(alias), .. } => Some(alias.clone()),
                _ => None,
            })
            .collect();
        self.select_aliases.push(aliases);
        ok &= ctx.scoped(frame, |ctx| self.finalize_children(tree, id, ctx));
        self.select_aliases.pop();
        ok
    }

    /// Resolve a class reference into a range; the class-ref node is
    /// finalized later together with its function arguments
    fn resolve_class_ref(
        &mut self,
        tree: &ExpTree,
        node: NodeId,
        ctx: &mut PrepareContext<'_>,
    ) -> Option<RangeClass> {
        let ExpKind::ClassRef {
            only,
            schema,
            name,
            args,
            alias,
        } = tree.kind(node).clone()
        else {
            unreachable!("class reference expected");
        };

        let (class_id, function) = match args {
            Some(args) => {
                let Some(def) = self.functions.table_valued(&name) else {
                    ctx.error(
                        IssueCategory::EcsqlSyntax,
                        format!("unknown table-valued function '{}'", tree.display(node)),
                    );
                    return None;
                };
                if !def.accepts(args.len()) {
                    ctx.error(
                        IssueCategory::EcsqlSyntax,
                        format!("'{}' does not take {} argument(s)", def.name, args.len()),
                    );
                    return None;
                }
                (None, Some(def.name.clone()))
            }
            None => {
                let catalog = &self.snapshot.catalog;
                match catalog.find_class(schema.as_deref(), &name) {
                    Ok(class_id) => {
                        if catalog.get(class_id).is_some_and(|c| c.class.is_struct()) {
                            ctx.error(
                                IssueCategory::BusinessRule,
                                format!(
                                    "struct class '{}' cannot be used as a class reference",
                                    catalog.full_name(class_id)
                                ),
                            );
                            return None;
                        }
                        (Some(class_id), None)
                    }
                    Err(e) => {
                        ctx.error(
                            IssueCategory::EcsqlSyntax,
                            format!("invalid class reference '{}': {}", tree.display(node), e),
                        );
                        return None;
                    }
                }
            }
        };

        let range = RangeClass {
            id: self.semantics.ranges.len(),
            alias,
            class_id,
            name,
            only,
            function,
            node: Some(node),
        };
        self.semantics.class_refs.insert(node, range.id);
        self.semantics.ranges.push(range.clone());
        Some(range)
    }

    fn finalize_dml(
        &mut self,
        tree: &mut ExpTree,
        id: NodeId,
        statement: StatementKind,
        ctx: &mut PrepareContext<'_>,
    ) -> bool {
        let class_ref = match tree.kind(id) {
            ExpKind::Insert { class_ref, .. }
            | ExpKind::Update { class_ref, .. }
            | ExpKind::Delete { class_ref, .. } => *class_ref,
            _ => unreachable!("DML node expected"),
        };
        let verb = match statement {
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Select => "SELECT",
        };

        if let ExpKind::ClassRef { args: Some(_), name, .. } = tree.kind(class_ref) {
            ctx.error(
                IssueCategory::BusinessRule,
                format!("table-valued function '{}' cannot be the target of {}", name, verb),
            );
            tree.set_state(class_ref, FinalizeState::Error);
            return false;
        }

        let Some(range) = self.resolve_class_ref(tree, class_ref, ctx) else {
            tree.set_state(class_ref, FinalizeState::Error);
            return false;
        };
        let Some(class_id) = range.class_id else {
            return false;
        };
        if !self.check_dml_target(class_id, statement, range.only, verb, ctx) {
            tree.set_state(class_ref, FinalizeState::Error);
            return false;
        }

        ctx.scoped(vec![range], |ctx| {
            let mut ok = self.finalize_children(tree, id, ctx);
            ok &= self.check_dml_targets(tree, id, statement, ctx);
            ok
        })
    }

    fn check_dml_target(
        &self,
        class_id: ClassId,
        statement: StatementKind,
        only: bool,
        verb: &str,
        ctx: &mut PrepareContext<'_>,
    ) -> bool {
        let snapshot = self.snapshot;
        let full_name = snapshot.catalog.full_name(class_id);
        let own_map = snapshot.class_map(class_id);
        let is_mapped = own_map.is_some_and(|m| m.is_mapped());

        if !is_mapped {
            if let Some(entry) = snapshot.catalog.get(class_id) {
                if entry.class.is_relationship() && !snapshot.catalog.navigation_properties_for(class_id).is_empty() {
                    ctx.error(
                        IssueCategory::BusinessRule,
                        format!(
                            "relationship '{}' is stored in navigation properties; {} through the navigation property instead",
                            full_name,
                            verb.to_lowercase()
                        ),
                    );
                    return false;
                }
            }
        }

        let targets_rows = match statement {
            StatementKind::Insert => is_mapped,
            _ if only => is_mapped,
            _ => !snapshot.mapped_classes(class_id).is_empty(),
        };
        if !targets_rows {
            ctx.error(
                IssueCategory::BusinessRule,
                format!("class '{}' is not mapped to a table and cannot be the target of {}", full_name, verb),
            );
            return false;
        }

        if statement == StatementKind::Insert
            && snapshot
                .catalog
                .get(class_id)
                .is_some_and(|c| c.class.modifier == ClassModifier::Abstract)
        {
            ctx.error(
                IssueCategory::BusinessRule,
                format!("cannot insert into abstract class '{}'", full_name),
            );
            return false;
        }
        true
    }

    /// Property targets of INSERT and UPDATE must be writable
    fn check_dml_targets(
        &self,
        tree: &ExpTree,
        id: NodeId,
        statement: StatementKind,
        ctx: &mut PrepareContext<'_>,
    ) -> bool {
        let targets: Vec<NodeId> = match tree.kind(id) {
            ExpKind::Insert { properties, .. } => properties.clone(),
            ExpKind::Update { assignments, .. } => assignments
                .iter()
                .filter_map(|a| match tree.kind(*a) {
                    ExpKind::Assignment { property, .. } => Some(*property),
                    _ => None,
                })
                .collect(),
            _ => return true,
        };

        let mut ok = true;
        let mut seen: Vec<String> = Vec::new();
        for target in targets {
            let Some(resolved) = self.semantics.path(target) else {
                continue;
            };
            let (name, writable) = match &resolved.target {
                PathTarget::System(SystemProperty::InstanceId) => {
                    ("ECInstanceId".to_string(), statement == StatementKind::Insert)
                }
                PathTarget::System(system) => (
                    system.name().to_string(),
                    statement == StatementKind::Insert && system.is_relationship_end(),
                ),
                PathTarget::Property { access_string, .. } => (access_string.clone(), true),
                PathTarget::FunctionColumn(name) | PathTarget::SelectAlias(name) => (name.clone(), false),
            };
            if !writable {
                ctx.error(
                    IssueCategory::BusinessRule,
                    format!("'{}' cannot be assigned in {}", tree.display(target), tree.display(id)),
                );
                ok = false;
            }
            if seen.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
                ctx.error(
                    IssueCategory::BusinessRule,
                    format!("'{}' is assigned more than once", name),
                );
                ok = false;
            }
            seen.push(name);
        }
        ok
    }

    fn check_function(&self, name: &str, star: bool, arg_count: usize, ctx: &mut PrepareContext<'_>) -> bool {
        if star && !name.eq_ignore_ascii_case("count") {
            ctx.error(
                IssueCategory::EcsqlSyntax,
                format!("'*' is only allowed in count(*), not in {}(*)", name),
            );
            return false;
        }
        match self.functions.resolve(name, arg_count) {
            Ok(_) => true,
            Err(message) => {
                ctx.error(IssueCategory::EcsqlSyntax, message);
                false
            }
        }
    }

    fn check_single_column(&self, tree: &ExpTree, select: NodeId, ctx: &mut PrepareContext<'_>) -> bool {
        let ExpKind::Select(node) = tree.kind(select) else {
            return true;
        };
        let single = node.items.len() == 1
            && matches!(tree.kind(node.items[0]), ExpKind::SelectItem { .. });
        if !single {
            ctx.error(
                IssueCategory::BusinessRule,
                format!("subquery '{}' must return exactly one column", tree.display(select)),
            );
        }
        single
    }

    fn finalize_path(
        &mut self,
        tree: &ExpTree,
        id: NodeId,
        segments: &[String],
        ctx: &mut PrepareContext<'_>,
    ) -> bool {
        let resolved = match self.resolve_path(segments, ctx) {
            Ok(resolved) => resolved,
            Err(message) => {
                ctx.error(IssueCategory::EcsqlSyntax, message);
                return false;
            }
        };

        if let PathTarget::Property { shape, .. } = &resolved.target {
            if shape.is_composite() && !composite_allowed(tree, id) {
                ctx.error(
                    IssueCategory::BusinessRule,
                    format!(
                        "'{}' spans several columns and cannot be used in an expression",
                        segments.join(".")
                    ),
                );
                return false;
            }
        }
        self.semantics.paths.insert(id, resolved);
        true
    }

    fn resolve_path(&self, segments: &[String], ctx: &PrepareContext<'_>) -> Result<ResolvedPath, String> {
        let path = segments.join(".");
        if segments.len() >= 2 {
            if let Some(range) = ctx.lookup_alias(&segments[0]) {
                return self
                    .resolve_in_range(range, &segments[1..])
                    .map(|target| ResolvedPath {
                        range: Some(range.id),
                        target,
                    })
                    .ok_or_else(|| {
                        format!("'{}' has no property '{}'", range.effective_alias(), segments[1..].join("."))
                    });
            }
        }

        for frame in ctx.frames() {
            let mut matches: Vec<(&RangeClass, PathTarget)> = frame
                .iter()
                .filter_map(|range| self.resolve_in_range(range, segments).map(|t| (range, t)))
                .collect();
            match matches.len() {
                0 => continue,
                1 => {
                    if let Some((range, target)) = matches.pop() {
                        return Ok(ResolvedPath {
                            range: Some(range.id),
                            target,
                        });
                    }
                }
                _ => {
                    let candidates: Vec<&str> = matches.iter().map(|(r, _)| r.effective_alias()).collect();
                    return Err(format!(
                        "property '{}' is ambiguous; it exists in {}",
                        path,
                        candidates.join(", ")
                    ));
                }
            }
        }

        if let [single] = segments {
            if let Some(aliases) = self.select_aliases.last() {
                if let Some(alias) = aliases.iter().find(|a| a.eq_ignore_ascii_case(single)) {
                    return Ok(ResolvedPath {
                        range: None,
                        target: PathTarget::SelectAlias(alias.clone()),
                    });
                }
            }
        }
        Err(format!("property '{}' not found", path))
    }

    fn resolve_in_range(&self, range: &RangeClass, segments: &[String]) -> Option<PathTarget> {
        if let Some(function) = &range.function {
            let def = self.functions.table_valued(function)?;
            return match segments {
                [column] => def
                    .columns
                    .iter()
                    .find(|c| c.eq_ignore_ascii_case(column))
                    .map(|c| PathTarget::FunctionColumn(c.clone())),
                _ => None,
            };
        }
        let class_id = range.class_id?;
        if let [single] = segments {
            if let Some(system) = SystemProperty::from_name(single) {
                let is_relationship = self
                    .snapshot
                    .catalog
                    .get(class_id)
                    .is_some_and(|c| c.class.is_relationship());
                if !system.is_relationship_end() || is_relationship {
                    return Some(PathTarget::System(system));
                }
                return None;
            }
        }
        self.resolve_member(class_id, segments, "")
    }

    fn resolve_member(&self, class_id: ClassId, segments: &[String], prefix: &str) -> Option<PathTarget> {
        let catalog = &self.snapshot.catalog;
        let (first, rest) = segments.split_first()?;
        let property = catalog.find_property(class_id, first)?;
        let access = format!("{}{}", prefix, property.property.name);
        let leaf = |access_string: String, shape: PropertyShape| {
            Some(PathTarget::Property {
                access_string,
                shape,
            })
        };

        match &property.property.kind {
            PropertyKind::Primitive { primitive_type } => match rest {
                [] if primitive_type.is_point() => leaf(access, PropertyShape::Point(*primitive_type)),
                [] => leaf(access, PropertyShape::Primitive(*primitive_type)),
                [component] => primitive_type
                    .components()
                    .iter()
                    .find(|c| c.eq_ignore_ascii_case(component))
                    .and_then(|c| leaf(format!("{}.{}", access, c), PropertyShape::Coordinate)),
                _ => None,
            },
            PropertyKind::PrimitiveArray { primitive_type } if rest.is_empty() => {
                leaf(access, PropertyShape::PrimitiveArray(*primitive_type))
            }
            PropertyKind::PrimitiveArray { .. } => None,
            PropertyKind::Struct { .. } => {
                let struct_class = catalog.struct_class_of(&property).ok()?;
                if rest.is_empty() {
                    leaf(access, PropertyShape::Struct(struct_class))
                } else {
                    self.resolve_member(struct_class, rest, &format!("{}.", access))
                }
            }
            PropertyKind::StructArray { .. } if rest.is_empty() => {
                let struct_class = catalog.struct_class_of(&property).ok()?;
                leaf(access, PropertyShape::StructArray(struct_class))
            }
            PropertyKind::StructArray { .. } => None,
            PropertyKind::Navigation { .. } => {
                let relationship = catalog.relationship_of(&property).ok()?;
                match rest {
                    [] => leaf(access, PropertyShape::Navigation { relationship }),
                    [member] if member.eq_ignore_ascii_case("Id") => {
                        leaf(format!("{}.Id", access), PropertyShape::NavigationId)
                    }
                    [member] if member.eq_ignore_ascii_case("RelECClassId") => {
                        leaf(format!("{}.RelECClassId", access), PropertyShape::NavigationRelClassId)
                    }
                    _ => None,
                }
            }
        }
    }
}

/// Shape of a whole catalog property
pub fn property_shape(catalog: &SchemaCatalog, property: &PropertyRef<'_>) -> Result<PropertyShape, SchemaError> {
    Ok(match &property.property.kind {
        PropertyKind::Primitive { primitive_type } if primitive_type.is_point() => {
            PropertyShape::Point(*primitive_type)
        }
        PropertyKind::Primitive { primitive_type } => PropertyShape::Primitive(*primitive_type),
        PropertyKind::PrimitiveArray { primitive_type } => PropertyShape::PrimitiveArray(*primitive_type),
        PropertyKind::Struct { .. } => PropertyShape::Struct(catalog.struct_class_of(property)?),
        PropertyKind::StructArray { .. } => PropertyShape::StructArray(catalog.struct_class_of(property)?),
        PropertyKind::Navigation { .. } => PropertyShape::Navigation {
            relationship: catalog.relationship_of(property)?,
        },
    })
}

/// Composite values are allowed as whole select items and as INSERT/UPDATE
/// targets or values bound through parameters
fn composite_allowed(tree: &ExpTree, id: NodeId) -> bool {
    match tree.parent(id).map(|p| tree.kind(p)) {
        Some(ExpKind::SelectItem { .. }) => true,
        Some(ExpKind::Insert { properties, .. }) => properties.contains(&id),
        Some(ExpKind::Assignment { property, .. }) => *property == id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcDbConfig;
    use crate::db_mapping::{ClassMapRegistry, ClassMappingManager, DbSchema};
    use crate::ec_catalog::{EcClass, EcProperty, EcSchema, NavigationDirection, SchemaCatalog};
    use crate::ecsql_parser::parse_ecsql;

    fn snapshot() -> MappingSnapshot {
        let schema = EcSchema::new("TestSchema", "ts")
            .with_class(
                EcClass::struct_class("Address")
                    .with_property(EcProperty::primitive("Street", PrimitiveType::String))
                    .with_property(EcProperty::primitive("Loc", PrimitiveType::Point2d)),
            )
            .with_class(
                EcClass::entity("Foo")
                    .with_property(EcProperty::primitive("Name", PrimitiveType::String))
                    .with_property(EcProperty::struct_property("Addr", "Address"))
                    .with_property(EcProperty::struct_array("History", "Address"))
                    .with_property(EcProperty::navigation("Parent", "FooOwnsFoo", NavigationDirection::Backward)),
            )
            .with_class(EcClass::entity("Bar").with_property(EcProperty::primitive("Name", PrimitiveType::String)))
            .with_class(EcClass::relationship("FooOwnsFoo", "Foo", "Foo"));
        let catalog = SchemaCatalog::build(vec![schema], &[]).unwrap();
        let config = EcDbConfig::default();
        let mut db = DbSchema::new();
        let mut maps = ClassMapRegistry::new();
        let report = ClassMappingManager::new(&catalog, &config, &mut db, &mut maps).map_classes();
        assert!(!report.has_errors(), "{:?}", report.errors);
        MappingSnapshot {
            catalog,
            db_schema: db,
            class_maps: maps,
        }
    }

    fn run(ecsql: &str) -> (ExpTree, Semantics, Vec<crate::ecsql_prepare::Issue>, (usize, usize)) {
        let snapshot = snapshot();
        let functions = FunctionRegistry::new();
        let mut tree = parse_ecsql(ecsql).unwrap();
        let mut ctx = PrepareContext::new();
        let semantics = finalize(&mut tree, &snapshot, &functions, &mut ctx);
        let balance = ctx.balance();
        (tree, semantics, ctx.take_issues(), balance)
    }

    fn targets(tree: &ExpTree, semantics: &Semantics) -> Vec<PathTarget> {
        tree.pre_order(tree.root().unwrap())
            .into_iter()
            .filter_map(|id| semantics.path(id).map(|p| p.target.clone()))
            .collect()
    }

    #[test]
    fn test_resolves_struct_members_and_navigation() {
        let (tree, semantics, issues, _) =
            run("SELECT f.Addr.Loc.X, Parent.Id, Addr, ECInstanceId FROM ts.Foo f");
        assert!(issues.is_empty(), "{:?}", issues);
        let resolved = targets(&tree, &semantics);
        assert_eq!(resolved.len(), 4);
        assert_eq!(
            resolved[0],
            PathTarget::Property {
                access_string: "Addr.Loc.X".into(),
                shape: PropertyShape::Coordinate
            }
        );
        assert_eq!(
            resolved[1],
            PathTarget::Property {
                access_string: "Parent.Id".into(),
                shape: PropertyShape::NavigationId
            }
        );
        assert!(matches!(
            &resolved[2],
            PathTarget::Property { access_string, shape: PropertyShape::Struct(_) } if access_string == "Addr"
        ));
        assert_eq!(resolved[3], PathTarget::System(SystemProperty::InstanceId));
        assert_eq!(tree.state(tree.root().unwrap()), FinalizeState::Completed);
    }

    #[test]
    fn test_ambiguous_property_reported() {
        let (_, _, issues, balance) = run("SELECT Name FROM ts.Foo, ts.Bar");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("ambiguous"));
        assert_eq!(balance, (1, 1));
    }

    #[test]
    fn test_composite_in_expression_rejected() {
        let (_, _, issues, _) = run("SELECT Name FROM ts.Foo WHERE Addr = 1");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::BusinessRule);
    }

    #[test]
    fn test_delete_from_function_rejected_before_children() {
        let (tree, _, issues, balance) = run("DELETE FROM json_each(?) WHERE value = 1");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::BusinessRule);
        assert!(issues[0].message.contains("DELETE"));
        assert_eq!(balance, (0, 0));
        let root = tree.root().unwrap();
        assert_eq!(tree.state(root), FinalizeState::Error);
        // WHERE clause was never visited
        let where_node = tree.children(root)[1];
        assert_eq!(tree.state(where_node), FinalizeState::Unfinalized);
    }

    #[test]
    fn test_correlated_subquery_sees_outer_range() {
        let (_, _, issues, balance) = run(
            "SELECT f.Name FROM ts.Foo f WHERE EXISTS (SELECT 1 FROM ts.Bar b WHERE b.Name = f.Name)",
        );
        assert!(issues.is_empty(), "{:?}", issues);
        assert_eq!(balance, (2, 2));
    }

    #[test]
    fn test_function_checks() {
        let (_, _, issues, _) = run("SELECT lower(Name, 1), sum(*) FROM ts.Foo");
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_order_by_select_alias() {
        let (tree, semantics, issues, _) = run("SELECT Name AS n FROM ts.Foo ORDER BY n");
        assert!(issues.is_empty(), "{:?}", issues);
        assert!(targets(&tree, &semantics).contains(&PathTarget::SelectAlias("n".into())));
    }

    #[test]
    fn test_insert_target_checks() {
        let (_, _, issues, _) = run("INSERT INTO ts.Foo (ECClassId, Name, name) VALUES (1, 'a', 'b')");
        assert_eq!(issues.len(), 2, "{:?}", issues);
    }
}
