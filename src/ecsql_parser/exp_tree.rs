//! Arena-backed expression tree
//!
//! The borrowed [`EcSqlAst`] is lowered breadth-first into an [`ExpTree`]:
//! every node lives in one `Vec`, children are addressed by [`NodeId`]
//! handles and each handle carries the generation of the tree that issued
//! it. A handle from a cleared tree, or from another tree, never resolves.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use super::ast::{
    Assignment, BinaryOperator, ClassRef, DeleteStatement, EcSqlAst, Expression, InsertStatement,
    JoinKind, Literal, OrderByItem, Parameter, SelectItem, SelectStatement, UnaryOperator,
    UpdateStatement,
};

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);

fn next_generation() -> u32 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeState {
    Unfinalized,
    BeforeChildren,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Real(f64),
    /// Unescaped text
    String(String),
    /// Hex digits as written; validated during finalize
    Blob(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    pub distinct: bool,
    pub items: Vec<NodeId>,
    pub from: Vec<NodeId>,
    pub joins: Vec<NodeId>,
    pub where_clause: Option<NodeId>,
    pub group_by: Vec<NodeId>,
    pub having: Option<NodeId>,
    pub order_by: Vec<NodeId>,
    pub limit: Option<NodeId>,
    pub offset: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    Select(SelectNode),
    SelectItem {
        expression: NodeId,
        alias: Option<String>,
    },
    Wildcard {
        alias: Option<String>,
    },
    ClassRef {
        only: bool,
        schema: Option<String>,
        name: String,
        args: Option<Vec<NodeId>>,
        alias: Option<String>,
    },
    Join {
        kind: JoinKind,
        class_ref: NodeId,
        on: NodeId,
    },
    OrderBy {
        expression: NodeId,
        descending: bool,
    },
    Insert {
        class_ref: NodeId,
        properties: Vec<NodeId>,
        values: Vec<NodeId>,
    },
    Update {
        class_ref: NodeId,
        assignments: Vec<NodeId>,
        where_clause: Option<NodeId>,
    },
    Assignment {
        property: NodeId,
        value: NodeId,
    },
    Delete {
        class_ref: NodeId,
        where_clause: Option<NodeId>,
    },
    PropertyPath {
        segments: Vec<String>,
    },
    Literal(LiteralValue),
    Parameter {
        name: Option<String>,
        /// 1-based binding index
        index: usize,
    },
    Unary {
        op: UnaryOperator,
        operand: NodeId,
    },
    Binary {
        op: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    },
    IsNull {
        operand: NodeId,
        negated: bool,
    },
    Between {
        operand: NodeId,
        low: NodeId,
        high: NodeId,
        negated: bool,
    },
    InList {
        operand: NodeId,
        list: Vec<NodeId>,
        negated: bool,
    },
    InSubquery {
        operand: NodeId,
        subquery: NodeId,
        negated: bool,
    },
    Like {
        operand: NodeId,
        pattern: NodeId,
        escape: Option<NodeId>,
        negated: bool,
    },
    Exists {
        subquery: NodeId,
    },
    Subquery {
        select: NodeId,
    },
    Case {
        operand: Option<NodeId>,
        when_then: Vec<(NodeId, NodeId)>,
        else_expr: Option<NodeId>,
    },
    FunctionCall {
        name: String,
        distinct: bool,
        star: bool,
        args: Vec<NodeId>,
    },
}

impl ExpKind {
    /// Children in textual order
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            ExpKind::Select(s) => {
                out.extend(&s.items);
                out.extend(&s.from);
                out.extend(&s.joins);
                out.extend(s.where_clause);
                out.extend(&s.group_by);
                out.extend(s.having);
                out.extend(&s.order_by);
                out.extend(s.limit);
                out.extend(s.offset);
            }
            ExpKind::SelectItem { expression, .. } => out.push(*expression),
            ExpKind::Wildcard { .. }
            | ExpKind::PropertyPath { .. }
            | ExpKind::Literal(_)
            | ExpKind::Parameter { .. } => {}
            ExpKind::ClassRef { args, .. } => {
                if let Some(args) = args {
                    out.extend(args);
                }
            }
            ExpKind::Join { class_ref, on, .. } => out.extend([*class_ref, *on]),
            ExpKind::OrderBy { expression, .. } => out.push(*expression),
            ExpKind::Insert {
                class_ref,
                properties,
                values,
            } => {
                out.push(*class_ref);
                out.extend(properties);
                out.extend(values);
            }
            ExpKind::Update {
                class_ref,
                assignments,
                where_clause,
            } => {
                out.push(*class_ref);
                out.extend(assignments);
                out.extend(*where_clause);
            }
            ExpKind::Assignment { property, value } => out.extend([*property, *value]),
            ExpKind::Delete {
                class_ref,
                where_clause,
            } => {
                out.push(*class_ref);
                out.extend(*where_clause);
            }
            ExpKind::Unary { operand, .. } | ExpKind::IsNull { operand, .. } => out.push(*operand),
            ExpKind::Binary { lhs, rhs, .. } => out.extend([*lhs, *rhs]),
            ExpKind::Between {
                operand, low, high, ..
            } => out.extend([*operand, *low, *high]),
            ExpKind::InList { operand, list, .. } => {
                out.push(*operand);
                out.extend(list);
            }
            ExpKind::InSubquery {
                operand, subquery, ..
            } => out.extend([*operand, *subquery]),
            ExpKind::Like {
                operand,
                pattern,
                escape,
                ..
            } => {
                out.extend([*operand, *pattern]);
                out.extend(*escape);
            }
            ExpKind::Exists { subquery } => out.push(*subquery),
            ExpKind::Subquery { select } => out.push(*select),
            ExpKind::Case {
                operand,
                when_then,
                else_expr,
            } => {
                out.extend(*operand);
                for (when, then) in when_then {
                    out.extend([*when, *then]);
                }
                out.extend(*else_expr);
            }
            ExpKind::FunctionCall { args, .. } => out.extend(args),
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ExpNode {
    pub kind: ExpKind,
    pub parent: Option<NodeId>,
    pub state: FinalizeState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub index: usize,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExpTree {
    nodes: Vec<ExpNode>,
    generation: u32,
    root: Option<NodeId>,
    parameters: Vec<ParameterInfo>,
}

impl Default for ExpTree {
    fn default() -> Self {
        ExpTree {
            nodes: Vec::new(),
            generation: next_generation(),
            root: None,
            parameters: Vec::new(),
        }
    }
}

/// Borrowed syntax waiting for its reserved slot to be filled
enum Pending<'s, 'a> {
    Select(&'s SelectStatement<'a>),
    SelectItem(&'s SelectItem<'a>),
    ClassRef(&'s ClassRef<'a>),
    Join(&'s crate::ecsql_parser::ast::Join<'a>),
    OrderBy(&'s OrderByItem<'a>),
    Insert(&'s InsertStatement<'a>),
    Update(&'s UpdateStatement<'a>),
    Assignment(&'s Assignment<'a>),
    Delete(&'s DeleteStatement<'a>),
    Path(&'s [&'a str]),
    Expr(&'s Expression<'a>),
}

struct Lowering<'s, 'a> {
    tree: ExpTree,
    queue: VecDeque<(NodeId, Pending<'s, 'a>)>,
}

impl<'s, 'a> Lowering<'s, 'a> {
    /// Reserve a slot for `pending` under `parent`; it is filled when dequeued
    fn reserve(&mut self, parent: Option<NodeId>, pending: Pending<'s, 'a>) -> NodeId {
        let id = NodeId {
            index: self.tree.nodes.len() as u32,
            generation: self.tree.generation,
        };
        self.tree.nodes.push(ExpNode {
            kind: ExpKind::Literal(LiteralValue::Null),
            parent,
            state: FinalizeState::Unfinalized,
        });
        self.queue.push_back((id, pending));
        id
    }

    fn reserve_all<T>(
        &mut self,
        parent: NodeId,
        items: &'s [T],
        wrap: impl Fn(&'s T) -> Pending<'s, 'a>,
    ) -> Vec<NodeId> {
        items.iter().map(|item| self.reserve(Some(parent), wrap(item))).collect()
    }

    fn reserve_opt(&mut self, parent: NodeId, expr: &'s Option<Expression<'a>>) -> Option<NodeId> {
        expr.as_ref().map(|e| self.reserve(Some(parent), Pending::Expr(e)))
    }

    fn run(mut self) -> ExpTree {
        while let Some((id, pending)) = self.queue.pop_front() {
            let kind = self.fill(id, pending);
            self.tree.nodes[id.index()].kind = kind;
        }
        self.tree
    }

    fn fill(&mut self, id: NodeId, pending: Pending<'s, 'a>) -> ExpKind {
        match pending {
            Pending::Select(select) => {
                let items = self.reserve_all(id, &select.items, Pending::SelectItem);
                let from = self.reserve_all(id, &select.from, Pending::ClassRef);
                let joins = self.reserve_all(id, &select.joins, Pending::Join);
                let where_clause = self.reserve_opt(id, &select.where_clause);
                let group_by = self.reserve_all(id, &select.group_by, Pending::Expr);
                let having = self.reserve_opt(id, &select.having);
                let order_by = self.reserve_all(id, &select.order_by, Pending::OrderBy);
                let limit = self.reserve_opt(id, &select.limit);
                let offset = self.reserve_opt(id, &select.offset);
                ExpKind::Select(SelectNode {
                    distinct: select.distinct,
                    items,
                    from,
                    joins,
                    where_clause,
                    group_by,
                    having,
                    order_by,
                    limit,
                    offset,
                })
            }
            Pending::SelectItem(SelectItem::Wildcard(alias)) => ExpKind::Wildcard {
                alias: alias.map(str::to_string),
            },
            Pending::SelectItem(SelectItem::Expression { expression, alias }) => ExpKind::SelectItem {
                expression: self.reserve(Some(id), Pending::Expr(expression)),
                alias: alias.map(str::to_string),
            },
            Pending::ClassRef(class_ref) => ExpKind::ClassRef {
                only: class_ref.only,
                schema: class_ref.schema.map(str::to_string),
                name: class_ref.name.to_string(),
                args: class_ref
                    .function_args
                    .as_ref()
                    .map(|args| self.reserve_all(id, args, Pending::Expr)),
                alias: class_ref.alias.map(str::to_string),
            },
            Pending::Join(join) => ExpKind::Join {
                kind: join.kind,
                class_ref: self.reserve(Some(id), Pending::ClassRef(&join.class_ref)),
                on: self.reserve(Some(id), Pending::Expr(&join.on)),
            },
            Pending::OrderBy(item) => ExpKind::OrderBy {
                expression: self.reserve(Some(id), Pending::Expr(&item.expression)),
                descending: item.descending,
            },
            Pending::Insert(insert) => ExpKind::Insert {
                class_ref: self.reserve(Some(id), Pending::ClassRef(&insert.class_ref)),
                properties: insert
                    .properties
                    .iter()
                    .map(|path| self.reserve(Some(id), Pending::Path(path)))
                    .collect(),
                values: self.reserve_all(id, &insert.values, Pending::Expr),
            },
            Pending::Update(update) => ExpKind::Update {
                class_ref: self.reserve(Some(id), Pending::ClassRef(&update.class_ref)),
                assignments: self.reserve_all(id, &update.assignments, Pending::Assignment),
                where_clause: self.reserve_opt(id, &update.where_clause),
            },
            Pending::Assignment(assignment) => ExpKind::Assignment {
                property: self.reserve(Some(id), Pending::Path(&assignment.property)),
                value: self.reserve(Some(id), Pending::Expr(&assignment.value)),
            },
            Pending::Delete(delete) => ExpKind::Delete {
                class_ref: self.reserve(Some(id), Pending::ClassRef(&delete.class_ref)),
                where_clause: self.reserve_opt(id, &delete.where_clause),
            },
            Pending::Path(segments) => ExpKind::PropertyPath {
                segments: segments.iter().map(|s| s.to_string()).collect(),
            },
            Pending::Expr(expr) => self.fill_expression(id, expr),
        }
    }

    fn fill_expression(&mut self, id: NodeId, expr: &'s Expression<'a>) -> ExpKind {
        let child = |this: &mut Self, e: &'s Expression<'a>| this.reserve(Some(id), Pending::Expr(e));
        match expr {
            Expression::Literal(literal) => ExpKind::Literal(match literal {
                Literal::Integer(v) => LiteralValue::Integer(*v),
                Literal::Real(v) => LiteralValue::Real(*v),
                Literal::String(raw) => LiteralValue::String(raw.replace("''", "'")),
                Literal::Blob(hex) => LiteralValue::Blob(hex.to_string()),
                Literal::Boolean(v) => LiteralValue::Boolean(*v),
                Literal::Null => LiteralValue::Null,
            }),
            Expression::Parameter(parameter) => ExpKind::Parameter {
                name: match parameter {
                    Parameter::Positional => None,
                    Parameter::Named(name) => Some(name.to_string()),
                },
                index: 0,
            },
            Expression::Property(segments) => ExpKind::PropertyPath {
                segments: segments.iter().map(|s| s.to_string()).collect(),
            },
            Expression::Unary(op, operand) => ExpKind::Unary {
                op: *op,
                operand: child(self, operand),
            },
            Expression::Binary(op, lhs, rhs) => ExpKind::Binary {
                op: *op,
                lhs: child(self, lhs),
                rhs: child(self, rhs),
            },
            Expression::IsNull { operand, negated } => ExpKind::IsNull {
                operand: child(self, operand),
                negated: *negated,
            },
            Expression::Between {
                operand,
                low,
                high,
                negated,
            } => ExpKind::Between {
                operand: child(self, operand),
                low: child(self, low),
                high: child(self, high),
                negated: *negated,
            },
            Expression::InList {
                operand,
                list,
                negated,
            } => ExpKind::InList {
                operand: child(self, operand),
                list: self.reserve_all(id, list, Pending::Expr),
                negated: *negated,
            },
            Expression::InSubquery {
                operand,
                subquery,
                negated,
            } => ExpKind::InSubquery {
                operand: child(self, operand),
                subquery: self.reserve(Some(id), Pending::Select(subquery)),
                negated: *negated,
            },
            Expression::Like {
                operand,
                pattern,
                escape,
                negated,
            } => ExpKind::Like {
                operand: child(self, operand),
                pattern: child(self, pattern),
                escape: escape.as_deref().map(|e| child(self, e)),
                negated: *negated,
            },
            Expression::Exists(select) => ExpKind::Exists {
                subquery: self.reserve(Some(id), Pending::Select(select)),
            },
            Expression::Subquery(select) => ExpKind::Subquery {
                select: self.reserve(Some(id), Pending::Select(select)),
            },
            Expression::Case(case) => ExpKind::Case {
                operand: case.operand.as_deref().map(|e| child(self, e)),
                when_then: case
                    .when_then
                    .iter()
                    .map(|(when, then)| (child(self, when), child(self, then)))
                    .collect(),
                else_expr: case.else_expr.as_deref().map(|e| child(self, e)),
            },
            Expression::FunctionCall(call) => ExpKind::FunctionCall {
                name: call.name.to_string(),
                distinct: call.distinct,
                star: call.star,
                args: self.reserve_all(id, &call.args, Pending::Expr),
            },
        }
    }
}

impl ExpTree {
    /// Lower a parsed statement breadth-first and number its parameters
    pub fn lower(ast: &EcSqlAst<'_>) -> ExpTree {
        let mut lowering = Lowering {
            tree: ExpTree::default(),
            queue: VecDeque::new(),
        };
        let root = match ast {
            EcSqlAst::Select(s) => lowering.reserve(None, Pending::Select(s)),
            EcSqlAst::Insert(s) => lowering.reserve(None, Pending::Insert(s)),
            EcSqlAst::Update(s) => lowering.reserve(None, Pending::Update(s)),
            EcSqlAst::Delete(s) => lowering.reserve(None, Pending::Delete(s)),
        };
        let mut tree = lowering.run();
        tree.root = Some(root);
        tree.number_parameters();
        tree
    }

    /// Positional parameters get the next index in textual order; a named
    /// parameter keeps the index of its first occurrence
    fn number_parameters(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut parameters = Vec::new();
        for id in self.pre_order(root) {
            if let ExpKind::Parameter { name, index } = &mut self.nodes[id.index()].kind {
                let assigned = match name {
                    Some(name) => *by_name.entry(name.to_ascii_lowercase()).or_insert_with(|| {
                        parameters.push(ParameterInfo {
                            index: parameters.len() + 1,
                            name: Some(name.clone()),
                        });
                        parameters.len()
                    }),
                    None => {
                        parameters.push(ParameterInfo {
                            index: parameters.len() + 1,
                            name: None,
                        });
                        parameters.len()
                    }
                };
                *index = assigned;
            }
        }
        self.parameters = parameters;
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn statement_kind(&self) -> Option<StatementKind> {
        let root = self.root?;
        match &self.get(root)?.kind {
            ExpKind::Select(_) => Some(StatementKind::Select),
            ExpKind::Insert { .. } => Some(StatementKind::Insert),
            ExpKind::Update { .. } => Some(StatementKind::Update),
            ExpKind::Delete { .. } => Some(StatementKind::Delete),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.generation == self.generation && id.index() < self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&ExpNode> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get(id.index())
    }

    /// Node lookup for handles issued by this tree; a foreign or stale handle panics
    pub fn node(&self, id: NodeId) -> &ExpNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale expression handle {:?} (tree generation {})", id, self.generation),
        }
    }

    pub fn kind(&self, id: NodeId) -> &ExpKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).children()
    }

    pub fn state(&self, id: NodeId) -> FinalizeState {
        self.node(id).state
    }

    pub fn set_state(&mut self, id: NodeId, state: FinalizeState) {
        assert!(self.contains(id), "stale expression handle {:?}", id);
        self.nodes[id.index()].state = state;
    }

    /// Nodes reachable from `start` in textual order
    pub fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        let name = name.trim_start_matches(':');
        self.parameters
            .iter()
            .find(|p| p.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|p| p.index)
    }

    /// Drop every node; handles issued so far stop resolving
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.parameters.clear();
        self.root = None;
        self.generation = next_generation();
    }

    /// ECSQL-like rendering of a subtree, used in diagnostics
    pub fn display(&self, id: NodeId) -> String {
        let join = |ids: &[NodeId]| ids.iter().map(|c| self.display(*c)).collect::<Vec<_>>().join(", ");
        let opt_clause = |kw: &str, id: Option<NodeId>| {
            id.map(|id| format!(" {} {}", kw, self.display(id))).unwrap_or_default()
        };
        match self.kind(id) {
            ExpKind::Select(s) => {
                let mut out = format!(
                    "SELECT {}{} FROM {}",
                    if s.distinct { "DISTINCT " } else { "" },
                    join(&s.items),
                    join(&s.from)
                );
                for j in &s.joins {
                    out.push(' ');
                    out.push_str(&self.display(*j));
                }
                out.push_str(&opt_clause("WHERE", s.where_clause));
                if !s.group_by.is_empty() {
                    out.push_str(&format!(" GROUP BY {}", join(&s.group_by)));
                }
                out.push_str(&opt_clause("HAVING", s.having));
                if !s.order_by.is_empty() {
                    out.push_str(&format!(" ORDER BY {}", join(&s.order_by)));
                }
                out.push_str(&opt_clause("LIMIT", s.limit));
                out.push_str(&opt_clause("OFFSET", s.offset));
                out
            }
            ExpKind::SelectItem { expression, alias } => match alias {
                Some(alias) => format!("{} AS {}", self.display(*expression), alias),
                None => self.display(*expression),
            },
            ExpKind::Wildcard { alias } => match alias {
                Some(alias) => format!("{}.*", alias),
                None => "*".to_string(),
            },
            ExpKind::ClassRef {
                only,
                schema,
                name,
                args,
                alias,
            } => {
                let mut out = String::new();
                if *only {
                    out.push_str("ONLY ");
                }
                if let Some(schema) = schema {
                    out.push_str(schema);
                    out.push('.');
                }
                out.push_str(name);
                if let Some(args) = args {
                    out.push_str(&format!("({})", join(args)));
                }
                if let Some(alias) = alias {
                    out.push_str(&format!(" {}", alias));
                }
                out
            }
            ExpKind::Join { kind, class_ref, on } => format!(
                "{} {} ON {}",
                match kind {
                    JoinKind::Inner => "JOIN",
                    JoinKind::Left => "LEFT JOIN",
                },
                self.display(*class_ref),
                self.display(*on)
            ),
            ExpKind::OrderBy {
                expression,
                descending,
            } => format!(
                "{}{}",
                self.display(*expression),
                if *descending { " DESC" } else { "" }
            ),
            ExpKind::Insert {
                class_ref,
                properties,
                values,
            } => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.display(*class_ref),
                join(properties),
                join(values)
            ),
            ExpKind::Update {
                class_ref,
                assignments,
                where_clause,
            } => format!(
                "UPDATE {} SET {}{}",
                self.display(*class_ref),
                join(assignments),
                opt_clause("WHERE", *where_clause)
            ),
            ExpKind::Assignment { property, value } => {
                format!("{} = {}", self.display(*property), self.display(*value))
            }
            ExpKind::Delete {
                class_ref,
                where_clause,
            } => format!(
                "DELETE FROM {}{}",
                self.display(*class_ref),
                opt_clause("WHERE", *where_clause)
            ),
            ExpKind::PropertyPath { segments } => segments.join("."),
            ExpKind::Literal(literal) => match literal {
                LiteralValue::Integer(v) => v.to_string(),
                LiteralValue::Real(v) => v.to_string(),
                LiteralValue::String(s) => format!("'{}'", s.replace('\'', "''")),
                LiteralValue::Blob(h) => format!("X'{}'", h),
                LiteralValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
                LiteralValue::Null => "NULL".to_string(),
            },
            ExpKind::Parameter { name, .. } => match name {
                Some(name) => format!(":{}", name),
                None => "?".to_string(),
            },
            ExpKind::Unary { op, operand } => format!("{}{}", op.sql(), self.display(*operand)),
            ExpKind::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.display(*lhs), op.sql(), self.display(*rhs))
            }
            ExpKind::IsNull { operand, negated } => format!(
                "{} IS {}NULL",
                self.display(*operand),
                if *negated { "NOT " } else { "" }
            ),
            ExpKind::Between {
                operand,
                low,
                high,
                negated,
            } => format!(
                "{} {}BETWEEN {} AND {}",
                self.display(*operand),
                if *negated { "NOT " } else { "" },
                self.display(*low),
                self.display(*high)
            ),
            ExpKind::InList {
                operand,
                list,
                negated,
            } => format!(
                "{} {}IN ({})",
                self.display(*operand),
                if *negated { "NOT " } else { "" },
                join(list)
            ),
            ExpKind::InSubquery {
                operand,
                subquery,
                negated,
            } => format!(
                "{} {}IN ({})",
                self.display(*operand),
                if *negated { "NOT " } else { "" },
                self.display(*subquery)
            ),
            ExpKind::Like {
                operand,
                pattern,
                escape,
                negated,
            } => format!(
                "{} {}LIKE {}{}",
                self.display(*operand),
                if *negated { "NOT " } else { "" },
                self.display(*pattern),
                opt_clause("ESCAPE", *escape)
            ),
            ExpKind::Exists { subquery } => format!("EXISTS ({})", self.display(*subquery)),
            ExpKind::Subquery { select } => format!("({})", self.display(*select)),
            ExpKind::Case {
                operand,
                when_then,
                else_expr,
            } => {
                let mut out = "CASE".to_string();
                if let Some(operand) = operand {
                    out.push_str(&format!(" {}", self.display(*operand)));
                }
                for (when, then) in when_then {
                    out.push_str(&format!(" WHEN {} THEN {}", self.display(*when), self.display(*then)));
                }
                out.push_str(&opt_clause("ELSE", *else_expr));
                out.push_str(" END");
                out
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
                    format!("{}({}{})", name, if *distinct { "DISTINCT " } else { "" }, join(args))
                }
            }
        }
    }
}
