//! Prepare context
//!
//! Holds the stack of range-variable frames (one per SELECT scope or DML
//! target) and the diagnostics buffer of one compilation. Frames are strictly
//! LIFO; [`PrepareContext::scoped`] pairs every push with its pop even when the
//! scoped work fails. A [`nested`](PrepareContext::nested) context sees the
//! parent's frames but owns its stack and issue buffer.

use crate::ec_catalog::ClassId;
use crate::ecsql_parser::NodeId;

use super::issues::{Issue, IssueCategory};

pub type RangeId = usize;

/// A class (or table-valued function) visible under an alias
#[derive(Debug, Clone, PartialEq)]
pub struct RangeClass {
    pub id: RangeId,
    pub alias: Option<String>,
    pub class_id: Option<ClassId>,
    /// Class name as written, used when no alias is given
    pub name: String,
    pub only: bool,
    /// Set for table-valued functions instead of `class_id`
    pub function: Option<String>,
    /// Class reference that introduced the range; embedded statements have none
    pub node: Option<NodeId>,
}

impl RangeClass {
    /// Name the range is addressed by: its alias, else its class name
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

pub type Frame = Vec<RangeClass>;

#[derive(Debug, Default)]
pub struct PrepareContext<'p> {
    parent: Option<&'p PrepareContext<'p>>,
    frames: Vec<Frame>,
    issues: Vec<Issue>,
    pushes: usize,
    pops: usize,
}

impl<'p> PrepareContext<'p> {
    pub fn new() -> Self {
        PrepareContext {
            parent: None,
            frames: Vec::new(),
            issues: Vec::new(),
            pushes: 0,
            pops: 0,
        }
    }

    /// Child context reading this context's frames
    pub fn nested(&self) -> PrepareContext<'_> {
        PrepareContext {
            parent: Some(self),
            frames: Vec::new(),
            issues: Vec::new(),
            pushes: 0,
            pops: 0,
        }
    }

    pub fn push_arg(&mut self, frame: Frame) {
        self.pushes += 1;
        self.frames.push(frame);
    }

    /// Pop the innermost frame. Popping an empty stack is a compiler bug.
    pub fn pop_arg(&mut self) -> Frame {
        match self.frames.pop() {
            Some(frame) => {
                self.pops += 1;
                frame
            }
            None => panic!("pop_arg on an empty prepare context stack"),
        }
    }

    /// Run `f` with `frame` pushed; the frame is popped whatever `f` returns
    pub fn scoped<R>(&mut self, frame: Frame, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push_arg(frame);
        let depth = self.frames.len();
        let result = f(self);
        debug_assert_eq!(self.frames.len(), depth, "unbalanced frames inside a scope");
        self.pop_arg();
        result
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// (pushes, pops) so far
    pub fn balance(&self) -> (usize, usize) {
        (self.pushes, self.pops)
    }

    /// Visible frames, innermost first, continuing into the parent's frames
    pub fn frames(&self) -> Vec<&Frame> {
        let mut out: Vec<&Frame> = self.frames.iter().rev().collect();
        if let Some(parent) = self.parent {
            out.extend(parent.frames());
        }
        out
    }

    pub fn lookup_alias(&self, alias: &str) -> Option<&RangeClass> {
        self.frames().into_iter().find_map(|frame| {
            frame
                .iter()
                .find(|r| r.effective_alias().eq_ignore_ascii_case(alias))
        })
    }

    pub fn report(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn error(&mut self, category: IssueCategory, message: impl Into<String>) {
        self.report(Issue::error(category, message));
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    pub fn take_issues(&mut self) -> Vec<Issue> {
        std::mem::take(&mut self.issues)
    }

    /// Take over issues drained from a nested context
    pub fn absorb(&mut self, issues: Vec<Issue>) {
        self.issues.extend(issues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecsql_parser::parse_ecsql;

    fn range(id: RangeId, alias: &str, node: NodeId) -> RangeClass {
        RangeClass {
            id,
            alias: Some(alias.to_string()),
            class_id: Some(id as ClassId),
            name: "Foo".into(),
            only: false,
            function: None,
            node: Some(node),
        }
    }

    fn some_node() -> NodeId {
        parse_ecsql("SELECT 1 FROM ts.Foo").unwrap().root().unwrap()
    }

    #[test]
    fn test_scoped_balances_on_error() {
        let node = some_node();
        let mut ctx = PrepareContext::new();
        let result: Result<(), String> = ctx.scoped(vec![range(0, "a", node)], |ctx| {
            ctx.scoped(vec![range(1, "b", node)], |_| Err("inner failure".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.balance(), (2, 2));
    }

    #[test]
    fn test_lookup_searches_innermost_first() {
        let node = some_node();
        let mut ctx = PrepareContext::new();
        ctx.push_arg(vec![range(0, "a", node)]);
        ctx.push_arg(vec![range(1, "A", node)]);
        assert_eq!(ctx.lookup_alias("a").map(|r| r.id), Some(1));
        ctx.pop_arg();
        assert_eq!(ctx.lookup_alias("a").map(|r| r.id), Some(0));
        ctx.pop_arg();
        assert!(ctx.lookup_alias("a").is_none());
    }

    #[test]
    fn test_nested_reads_parent_frames_with_own_issues() {
        let node = some_node();
        let mut parent = PrepareContext::new();
        parent.push_arg(vec![range(0, "outer", node)]);
        let drained = {
            let mut child = parent.nested();
            assert!(child.lookup_alias("outer").is_some());
            child.error(IssueCategory::BusinessRule, "from child");
            assert_eq!(child.depth(), 0);
            child.take_issues()
        };
        assert!(parent.issues().is_empty());
        parent.absorb(drained);
        assert!(parent.has_errors());
        parent.pop_arg();
    }

    #[test]
    #[should_panic(expected = "empty prepare context stack")]
    fn test_pop_empty_panics() {
        PrepareContext::new().pop_arg();
    }
}
