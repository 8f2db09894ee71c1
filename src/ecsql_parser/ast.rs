//! ECSQL syntax tree
//!
//! Produced by the nom parsers; every identifier and literal borrows the
//! statement text. The tree is lowered into an [`ExpTree`](super::exp_tree::ExpTree)
//! before semantic analysis.

#[derive(Debug, PartialEq, Clone)]
pub enum EcSqlAst<'a> {
    Select(SelectStatement<'a>),
    Insert(InsertStatement<'a>),
    Update(UpdateStatement<'a>),
    Delete(DeleteStatement<'a>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct SelectStatement<'a> {
    pub distinct: bool,
    pub items: Vec<SelectItem<'a>>,
    pub from: Vec<ClassRef<'a>>,
    pub joins: Vec<Join<'a>>,
    pub where_clause: Option<Expression<'a>>,
    pub group_by: Vec<Expression<'a>>,
    pub having: Option<Expression<'a>>,
    pub order_by: Vec<OrderByItem<'a>>,
    pub limit: Option<Expression<'a>>,
    pub offset: Option<Expression<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum SelectItem<'a> {
    /// `*` or `alias.*`
    Wildcard(Option<&'a str>),
    Expression {
        expression: Expression<'a>,
        alias: Option<&'a str>,
    },
}

/// `[ONLY] [schema.]Class [AS alias]`, or a table-valued function call
/// `[schema.]name(args) [AS alias]`
#[derive(Debug, PartialEq, Clone)]
pub struct ClassRef<'a> {
    pub only: bool,
    pub schema: Option<&'a str>,
    pub name: &'a str,
    pub function_args: Option<Vec<Expression<'a>>>,
    pub alias: Option<&'a str>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Join<'a> {
    pub kind: JoinKind,
    pub class_ref: ClassRef<'a>,
    pub on: Expression<'a>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct OrderByItem<'a> {
    pub expression: Expression<'a>,
    pub descending: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct InsertStatement<'a> {
    pub class_ref: ClassRef<'a>,
    pub properties: Vec<Vec<&'a str>>,
    pub values: Vec<Expression<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Assignment<'a> {
    pub property: Vec<&'a str>,
    pub value: Expression<'a>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct UpdateStatement<'a> {
    pub class_ref: ClassRef<'a>,
    pub assignments: Vec<Assignment<'a>>,
    pub where_clause: Option<Expression<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DeleteStatement<'a> {
    pub class_ref: ClassRef<'a>,
    pub where_clause: Option<Expression<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal<'a> {
    Integer(i64),
    Real(f64),
    /// Text between the quotes; doubled quotes are still escaped
    String(&'a str),
    /// Hex digits of an `X'..'` literal
    Blob(&'a str),
    Boolean(bool),
    Null,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Parameter<'a> {
    Positional,
    Named(&'a str),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    BitNot,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    BitAnd,
    BitOr,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOperator {
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::And => "AND",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
        }
    }
}

impl UnaryOperator {
    pub fn sql(self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT ",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::BitNot => "~",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionCall<'a> {
    pub name: &'a str,
    pub distinct: bool,
    /// `count(*)`
    pub star: bool,
    pub args: Vec<Expression<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Case<'a> {
    pub operand: Option<Box<Expression<'a>>>,
    pub when_then: Vec<(Expression<'a>, Expression<'a>)>,
    pub else_expr: Option<Box<Expression<'a>>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression<'a> {
    Literal(Literal<'a>),
    Parameter(Parameter<'a>),
    /// Dotted property path: `Prop`, `alias.Prop`, `Addr.Street`, `Parent.Id`
    Property(Vec<&'a str>),
    Unary(UnaryOperator, Box<Expression<'a>>),
    Binary(BinaryOperator, Box<Expression<'a>>, Box<Expression<'a>>),
    IsNull {
        operand: Box<Expression<'a>>,
        negated: bool,
    },
    Between {
        operand: Box<Expression<'a>>,
        low: Box<Expression<'a>>,
        high: Box<Expression<'a>>,
        negated: bool,
    },
    InList {
        operand: Box<Expression<'a>>,
        list: Vec<Expression<'a>>,
        negated: bool,
    },
    InSubquery {
        operand: Box<Expression<'a>>,
        subquery: Box<SelectStatement<'a>>,
        negated: bool,
    },
    Like {
        operand: Box<Expression<'a>>,
        pattern: Box<Expression<'a>>,
        escape: Option<Box<Expression<'a>>>,
        negated: bool,
    },
    Exists(Box<SelectStatement<'a>>),
    Subquery(Box<SelectStatement<'a>>),
    Case(Case<'a>),
    FunctionCall(FunctionCall<'a>),
}
