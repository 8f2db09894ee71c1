//! Functions ECSQL may call
//!
//! Scalar and aggregate functions pass through to SQLite unchanged; the
//! registry only decides which names are allowed and checks arity.
//! Table-valued functions (`json_each`, `json_tree`) may appear in a SELECT's
//! FROM clause and expose a fixed column list.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    TableValued,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    /// Result columns of a table-valued function
    pub columns: Vec<String>,
}

impl FunctionDef {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }
}

const SCALAR_FUNCTIONS: &[(&str, usize, Option<usize>)] = &[
    ("abs", 1, Some(1)),
    ("coalesce", 2, None),
    ("ifnull", 2, Some(2)),
    ("iif", 3, Some(3)),
    ("nullif", 2, Some(2)),
    ("instr", 2, Some(2)),
    ("length", 1, Some(1)),
    ("lower", 1, Some(1)),
    ("upper", 1, Some(1)),
    ("ltrim", 1, Some(2)),
    ("rtrim", 1, Some(2)),
    ("trim", 1, Some(2)),
    ("replace", 3, Some(3)),
    ("substr", 2, Some(3)),
    ("round", 1, Some(2)),
    ("typeof", 1, Some(1)),
    ("hex", 1, Some(1)),
    ("quote", 1, Some(1)),
    ("random", 0, Some(0)),
    ("max", 2, None),
    ("min", 2, None),
    ("printf", 1, None),
    ("julianday", 1, None),
    ("date", 1, None),
    ("datetime", 1, None),
    ("strftime", 2, None),
    ("json_extract", 2, None),
    ("json_array_length", 1, Some(2)),
    ("json_valid", 1, Some(1)),
];

const AGGREGATE_FUNCTIONS: &[(&str, usize, Option<usize>)] = &[
    ("count", 0, Some(1)),
    ("sum", 1, Some(1)),
    ("total", 1, Some(1)),
    ("avg", 1, Some(1)),
    ("group_concat", 1, Some(2)),
    // single-argument min/max aggregate; the multi-argument forms are scalar
    ("min", 1, Some(1)),
    ("max", 1, Some(1)),
];

const JSON_TABLE_COLUMNS: &[&str] = &[
    "key", "value", "type", "atom", "id", "parent", "fullkey", "path",
];

#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    scalar: HashMap<String, Vec<FunctionDef>>,
    table_valued: HashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = FunctionRegistry {
            scalar: HashMap::new(),
            table_valued: HashMap::new(),
        };
        for (name, min, max) in SCALAR_FUNCTIONS {
            registry.register(FunctionDef {
                name: name.to_string(),
                kind: FunctionKind::Scalar,
                min_args: *min,
                max_args: *max,
                columns: Vec::new(),
            });
        }
        for (name, min, max) in AGGREGATE_FUNCTIONS {
            registry.register(FunctionDef {
                name: name.to_string(),
                kind: FunctionKind::Aggregate,
                min_args: *min,
                max_args: *max,
                columns: Vec::new(),
            });
        }
        for name in ["json_each", "json_tree"] {
            registry.register(FunctionDef {
                name: name.to_string(),
                kind: FunctionKind::TableValued,
                min_args: 1,
                max_args: Some(2),
                columns: JSON_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            });
        }
        registry
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: FunctionDef) {
        let key = def.name.to_ascii_lowercase();
        match def.kind {
            FunctionKind::TableValued => {
                self.table_valued.insert(key, def);
            }
            FunctionKind::Scalar | FunctionKind::Aggregate => {
                self.scalar.entry(key).or_default().push(def);
            }
        }
    }

    /// Definition of a scalar or aggregate function accepting `arg_count` arguments
    pub fn resolve(&self, name: &str, arg_count: usize) -> Result<&FunctionDef, String> {
        let Some(overloads) = self.scalar.get(&name.to_ascii_lowercase()) else {
            return Err(format!("unknown function '{}'", name));
        };
        overloads
            .iter()
            .find(|def| def.accepts(arg_count))
            .ok_or_else(|| format!("function '{}' does not take {} argument(s)", name, arg_count))
    }

    pub fn table_valued(&self, name: &str) -> Option<&FunctionDef> {
        self.table_valued.get(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overloads_by_arity() {
        let registry = FunctionRegistry::new();
        assert_eq!(registry.resolve("MAX", 1).unwrap().kind, FunctionKind::Aggregate);
        assert_eq!(registry.resolve("max", 3).unwrap().kind, FunctionKind::Scalar);
        assert!(registry.resolve("lower", 2).is_err());
        assert!(registry.resolve("no_such_fn", 0).is_err());
    }

    #[test]
    fn test_table_valued_columns() {
        let registry = FunctionRegistry::new();
        let each = registry.table_valued("JSON_EACH").unwrap();
        assert!(each.columns.iter().any(|c| c == "value"));
        assert!(registry.table_valued("lower").is_none());
    }
}
