use std::fmt;

use hcl::eval::Evaluate;
use hcl::expr::{Expression, ObjectKey, Operation, TemplateExpr, TraversalOperator};
use hcl::template::{Element, Template};

use super::{AttributeNode, Block, BlockId};
use crate::block::Arena;
use crate::context::ContextId;
use crate::eval::builtins::filesystem::{inline_file_calls, mentions_file_function};
use crate::error::{EvalError, ReferenceError};
use crate::range::Range;
use crate::reference::{Reference, ReferenceKey};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOption {
    IgnoreCase,
}

/// A variable or traversal found inside an expression: the root name plus
/// the operators applied to it.
#[derive(Debug, Clone)]
pub(crate) struct ScopePath {
    root: String,
    operators: Vec<TraversalOperator>,
}

impl ScopePath {
    /// Leading attribute names, up to the first index or splat.
    fn names(&self) -> Vec<&str> {
        let mut names = vec![self.root.as_str()];
        for op in &self.operators {
            match op {
                TraversalOperator::GetAttr(ident) => names.push(ident.as_str()),
                _ => break,
            }
        }
        names
    }
}

/// Collects every scope traversal in `expr`, outermost first.
pub(crate) fn scope_paths(expr: &Expression) -> Vec<ScopePath> {
    let mut out = Vec::new();
    collect_paths(expr, &mut out);
    out
}

fn collect_paths(expr: &Expression, out: &mut Vec<ScopePath>) {
    match expr {
        Expression::Variable(var) => out.push(ScopePath {
            root: var.as_str().to_string(),
            operators: Vec::new(),
        }),
        Expression::Traversal(traversal) => {
            match &traversal.expr {
                Expression::Variable(var) => out.push(ScopePath {
                    root: var.as_str().to_string(),
                    operators: traversal.operators.clone(),
                }),
                other => collect_paths(other, out),
            }
            for op in &traversal.operators {
                if let TraversalOperator::Index(index) = op {
                    collect_paths(index, out);
                }
            }
        }
        Expression::Array(items) => {
            for item in items {
                collect_paths(item, out);
            }
        }
        Expression::Object(object) => {
            for (key, value) in object {
                if let ObjectKey::Expression(key) = key {
                    collect_paths(key, out);
                }
                collect_paths(value, out);
            }
        }
        Expression::TemplateExpr(template) => {
            for part in interpolations(template) {
                collect_paths(&part, out);
            }
        }
        Expression::FuncCall(call) => {
            for arg in &call.args {
                collect_paths(arg, out);
            }
        }
        Expression::Parenthesis(inner) => collect_paths(inner, out),
        Expression::Conditional(cond) => {
            collect_paths(&cond.cond_expr, out);
            collect_paths(&cond.true_expr, out);
            collect_paths(&cond.false_expr, out);
        }
        Expression::Operation(op) => match &**op {
            Operation::Unary(unary) => collect_paths(&unary.expr, out),
            Operation::Binary(binary) => {
                collect_paths(&binary.lhs_expr, out);
                collect_paths(&binary.rhs_expr, out);
            }
        },
        Expression::ForExpr(for_expr) => {
            collect_paths(&for_expr.collection_expr, out);
            let mut inner = Vec::new();
            if let Some(key_expr) = &for_expr.key_expr {
                collect_paths(key_expr, &mut inner);
            }
            collect_paths(&for_expr.value_expr, &mut inner);
            if let Some(cond_expr) = &for_expr.cond_expr {
                collect_paths(cond_expr, &mut inner);
            }
            let key_var = for_expr.key_var.as_ref().map(|k| k.as_str());
            let value_var = for_expr.value_var.as_str();
            out.extend(inner.into_iter().filter(|path| {
                path.root != value_var && Some(path.root.as_str()) != key_var
            }));
        }
        _ => {}
    }
}

/// Interpolated expressions of a template. Directives are not descended.
fn interpolations(template: &TemplateExpr) -> Vec<Expression> {
    let Ok(template) = Template::from_expr(template) else {
        return Vec::new();
    };
    template
        .elements()
        .iter()
        .filter_map(|element| match element {
            Element::Interpolation(interpolation) => Some(interpolation.expr.clone()),
            _ => None,
        })
        .collect()
}

fn index_key(expr: &Expression, ctx: &hcl::eval::Context) -> Option<ReferenceKey> {
    match expr {
        Expression::Number(n) => n.as_i64().map(ReferenceKey::Index),
        Expression::String(s) => Some(ReferenceKey::Name(s.clone())),
        other => other
            .evaluate(ctx)
            .ok()
            .and_then(|value| ReferenceKey::from_value(&Value::from(value))),
    }
}

/// An attribute of a block, evaluated on demand in the block's scope.
///
/// Nothing is cached: every call re-evaluates the expression against the
/// current bindings, so results follow the scope as the evaluator converges.
#[derive(Clone, Copy)]
pub struct Attribute<'a> {
    arena: &'a Arena,
    block: BlockId,
    index: usize,
}

impl fmt::Debug for Attribute<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name())
            .field("expr", self.expr())
            .finish()
    }
}

impl<'a> Attribute<'a> {
    pub(crate) fn new(arena: &'a Arena, block: BlockId, index: usize) -> Self {
        Self {
            arena,
            block,
            index,
        }
    }

    fn node(&self) -> &'a AttributeNode {
        &self.arena.node(self.block).attributes[self.index]
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn range(&self) -> &'a Range {
        &self.node().range
    }

    pub fn expr(&self) -> &'a Expression {
        &self.node().expr
    }

    /// The block this attribute belongs to.
    pub fn block(&self) -> Block<'a> {
        self.arena.block(self.block)
    }

    pub fn context(&self) -> ContextId {
        self.arena.node(self.block).context
    }

    /// Evaluates the expression against the current bindings of its scope.
    pub fn evaluate(&self) -> Result<Value, EvalError> {
        let ctx = self.arena.contexts().eval_context(self.context());
        let result = if mentions_file_function(self.expr()) {
            let mut expr = self.expr().clone();
            inline_file_calls(&mut expr, &ctx, self.arena.files());
            expr.evaluate(&ctx)
        } else {
            self.expr().evaluate(&ctx)
        };
        match result {
            Ok(value) => Ok(Value::from(value)),
            Err(_) if self.depends_on_unknown() => Err(EvalError::Unknown),
            Err(err) => Err(EvalError::Expression(err.to_string())),
        }
    }

    fn depends_on_unknown(&self) -> bool {
        let contexts = self.arena.contexts();
        scope_paths(self.expr()).iter().any(|path| {
            let names = path.names();
            (1..=names.len()).any(|len| {
                contexts
                    .get(self.context(), &names[..len])
                    .is_some_and(Value::is_unknown)
            })
        })
    }

    /// Evaluated value, or [`Value::Unknown`] when evaluation fails.
    pub fn resolve(&self) -> Value {
        self.evaluate().unwrap_or(Value::Unknown)
    }

    /// Evaluated value, or [`Value::Null`] when evaluation fails.
    pub fn value(&self) -> Value {
        self.evaluate().unwrap_or_default()
    }

    pub fn type_name(&self) -> &'static str {
        self.resolve().type_name()
    }

    pub fn is_resolvable(&self) -> bool {
        self.evaluate().is_ok()
    }

    pub fn is_not_resolvable(&self) -> bool {
        !self.is_resolvable()
    }

    /// True when the expression references no variables at all.
    pub fn is_literal(&self) -> bool {
        scope_paths(self.expr()).is_empty()
    }

    pub fn is_iterable(&self) -> bool {
        self.value().is_iterable()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.value(), Value::String(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self.value(), Value::Number(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.value(), Value::Bool(_))
    }

    /// Calls `f` with each key/value pair of a collection value.
    pub fn each<F: FnMut(Value, Value)>(&self, mut f: F) {
        for (key, value) in self.value().elements() {
            f(key, value);
        }
    }

    /// String values found in the expression: list elements, literals and
    /// any sub-expression that evaluates to a string.
    pub fn value_as_strings(&self) -> Vec<String> {
        let ctx = self.arena.contexts().eval_context(self.context());
        let mut out = Vec::new();
        collect_strings(self.expr(), &ctx, &mut out);
        out
    }

    /// Root name of a plain traversal expression, e.g. `data` for
    /// `data.aws_ami.ubuntu.id`.
    fn root_name(&self) -> Option<&'a str> {
        match self.expr() {
            Expression::Variable(var) => Some(var.as_str()),
            Expression::Traversal(traversal) => match &traversal.expr {
                Expression::Variable(var) => Some(var.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_data_block_reference(&self) -> bool {
        self.root_name() == Some("data")
    }

    pub fn is_resource_block_reference(&self, resource_type: &str) -> bool {
        self.root_name() == Some(resource_type)
    }

    fn path_reference(
        &self,
        path: &ScopePath,
        ctx: &hcl::eval::Context,
    ) -> Result<Reference, ReferenceError> {
        let mut parts = vec![path.root.clone()];
        for op in &path.operators {
            match op {
                TraversalOperator::GetAttr(ident) => parts.push(ident.to_string()),
                TraversalOperator::Index(index) => {
                    if let (Some(key), Some(last)) = (index_key(index, ctx), parts.last_mut()) {
                        last.push_str(&key.to_string());
                    }
                }
                TraversalOperator::LegacyIndex(index) => {
                    if let Some(last) = parts.last_mut() {
                        last.push_str(&format!("[{index}]"));
                    }
                }
                _ => break,
            }
        }
        Reference::from_parts(&parts)
    }

    fn references_in(&self, expr: &Expression) -> Vec<Reference> {
        let ctx = self.arena.contexts().eval_context(self.context());
        scope_paths(expr)
            .iter()
            .filter_map(|path| self.path_reference(path, &ctx).ok())
            .collect()
    }

    /// The block address this attribute points at. Works for traversals
    /// (including indexed ones, with the key evaluated in scope) and for
    /// templates, where the first interpolated traversal is used.
    pub fn reference(&self) -> Result<Reference, ReferenceError> {
        match self.expr() {
            expr @ (Expression::Variable(_) | Expression::Traversal(_)) => self
                .references_in(expr)
                .into_iter()
                .next()
                .ok_or_else(|| ReferenceError::NotATraversal(expr.to_string())),
            Expression::TemplateExpr(_) => self
                .references_in_template()
                .into_iter()
                .next()
                .ok_or(ReferenceError::EmptyTemplate),
            other => Err(ReferenceError::NotATraversal(other.to_string())),
        }
    }

    fn references_in_template(&self) -> Vec<Reference> {
        match self.expr() {
            expr @ (Expression::TemplateExpr(_) | Expression::Array(_)) => {
                self.references_in(expr)
            }
            _ => Vec::new(),
        }
    }

    fn references_in_conditional(&self) -> Vec<Reference> {
        let Expression::Conditional(cond) = self.expr() else {
            return Vec::new();
        };
        let mut refs = self.references_in(&cond.true_expr);
        refs.extend(self.references_in(&cond.false_expr));
        refs.extend(self.references_in(&cond.cond_expr));
        refs
    }

    /// References from template parts and conditional branches, followed by
    /// the primary reference when there is one.
    pub fn all_references(&self) -> Vec<Reference> {
        let mut refs = self.references_in_template();
        refs.extend(self.references_in_conditional());
        if let Ok(reference) = self.reference() {
            refs.push(reference);
        }
        refs
    }

    pub fn references_block(&self, block: &Block<'_>) -> bool {
        let target = block.reference();
        self.all_references()
            .iter()
            .any(|reference| reference.refers_to(&target))
    }
}

fn collect_strings(expr: &Expression, ctx: &hcl::eval::Context, out: &mut Vec<String>) {
    match expr {
        Expression::Array(items) => {
            for item in items {
                collect_strings(item, ctx, out);
            }
        }
        Expression::String(s) => out.push(s.clone()),
        Expression::FuncCall(_)
        | Expression::Traversal(_)
        | Expression::Variable(_)
        | Expression::Conditional(_)
        | Expression::TemplateExpr(_) => {
            if let Ok(hcl::Value::String(s)) = expr.evaluate(ctx) {
                out.push(s);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::tests::arena_from;

    fn attr<'a>(arena: &'a Arena, block: BlockId, name: &str) -> Attribute<'a> {
        arena.block(block).get_attribute(name).unwrap()
    }

    #[test]
    fn value_is_null_when_unresolvable() {
        let (arena, ids) = arena_from(
            r#"
resource "aws_instance" "web" {
  ami   = "ami-${var.missing}"
  plain = "x"
}
"#,
        );
        let ami = attr(&arena, ids[0], "ami");
        assert_eq!(ami.value(), Value::Null);
        assert!(ami.evaluate().is_err());
        assert!(ami.is_not_resolvable());
        assert!(!ami.is_literal());

        let plain = attr(&arena, ids[0], "plain");
        assert!(plain.is_literal());
        assert!(plain.is_resolvable());
        assert!(plain.is_string());
    }

    #[test]
    fn unknown_bindings_are_reported_as_unknown() {
        let (mut arena, ids) = arena_from(
            r#"
resource "aws_instance" "web" {
  ami = var.pending
}
"#,
        );
        let root = arena.contexts().root(arena.block(ids[0]).context());
        arena
            .contexts_mut()
            .set_by_dot(root, Value::Unknown, "var.pending");
        let ami = attr(&arena, ids[0], "ami");
        assert_eq!(ami.evaluate(), Err(EvalError::Unknown));
        assert_eq!(ami.resolve(), Value::Unknown);
        assert_eq!(ami.value(), Value::Null);
    }

    #[test]
    fn reference_of_traversals() {
        let (mut arena, ids) = arena_from(
            r#"
resource "aws_eip" "ip" {
  instance = aws_instance.web.id
  indexed  = aws_instance.web[0].id
  keyed    = aws_instance.web["a"].id
  dynamic  = aws_instance.web[var.i].id
  data     = data.aws_ami.ubuntu.id
  literal  = "x"
  call     = upper("x")
}
"#,
        );
        let root = arena.contexts().root(arena.block(ids[0]).context());
        arena.contexts_mut().set_by_dot(root, Value::from(2i64), "var.i");

        let reference = |name: &str| attr(&arena, ids[0], name).reference();
        assert_eq!(reference("instance").unwrap().to_string(), "aws_instance.web.id");
        assert_eq!(reference("indexed").unwrap().to_string(), "aws_instance.web[0].id");
        assert_eq!(
            reference("keyed").unwrap().to_string(),
            "aws_instance.web[\"a\"].id"
        );
        assert_eq!(reference("dynamic").unwrap().to_string(), "aws_instance.web[2].id");
        assert_eq!(reference("data").unwrap().to_string(), "data.aws_ami.ubuntu.id");
        assert!(matches!(
            reference("literal"),
            Err(ReferenceError::NotATraversal(_))
        ));
        assert!(reference("call").is_err());

        assert!(attr(&arena, ids[0], "data").is_data_block_reference());
        assert!(attr(&arena, ids[0], "instance").is_resource_block_reference("aws_instance"));
    }

    #[test]
    fn template_and_conditional_references() {
        let (arena, ids) = arena_from(
            r#"
resource "aws_eip" "ip" {
  name   = "${aws_instance.web.name}-${var.env}"
  choice = var.flag ? aws_instance.a.id : aws_instance.b.id
  empty  = "no refs"
}
"#,
        );
        let name = attr(&arena, ids[0], "name");
        assert_eq!(name.reference().unwrap().to_string(), "aws_instance.web.name");
        let all: Vec<String> = name.all_references().iter().map(|r| r.to_string()).collect();
        assert!(all.contains(&"var.env".to_string()));

        let choice = attr(&arena, ids[0], "choice");
        let all: Vec<String> = choice.all_references().iter().map(|r| r.to_string()).collect();
        assert_eq!(all, vec!["aws_instance.a.id", "aws_instance.b.id", "var.flag"]);

        let empty = attr(&arena, ids[0], "empty");
        assert!(empty.reference().is_err());
    }

    #[test]
    fn references_block_matches_by_address() {
        let (arena, ids) = arena_from(
            r#"
resource "aws_instance" "web" {}
resource "aws_instance" "db" {}
resource "aws_eip" "ip" {
  instance = aws_instance.web.id
}
"#,
        );
        let instance = attr(&arena, ids[2], "instance");
        assert!(instance.references_block(&arena.block(ids[0])));
        assert!(!instance.references_block(&arena.block(ids[1])));
    }

    #[test]
    fn for_expression_variables_are_not_references() {
        let (arena, ids) = arena_from(
            r#"
locals {
  names = [for s in var.servers : upper(s.name)]
}
"#,
        );
        let names = attr(&arena, ids[0], "names");
        let all: Vec<String> = scope_paths(names.expr())
            .iter()
            .map(|p| p.root.clone())
            .collect();
        assert_eq!(all, vec!["var"]);
    }

    #[test]
    fn value_as_strings_walks_lists() {
        let (arena, ids) = arena_from(
            r#"
locals {
  zone  = "b"
  zones = ["a", "${local.zone}", upper("c"), 1]
}
"#,
        );
        let zones = attr(&arena, ids[0], "zones");
        let strings = zones.value_as_strings();
        assert_eq!(strings[0], "a");
        assert_eq!(strings.last().unwrap(), "C");
    }

    #[test]
    fn each_iterates_elements() {
        let (arena, ids) = arena_from(
            r#"
locals {
  tags = { b = "2", a = "1" }
}
"#,
        );
        let mut seen = Vec::new();
        attr(&arena, ids[0], "tags").each(|k, v| seen.push((k, v)));
        assert_eq!(
            seen,
            vec![
                (Value::from("a"), Value::from("1")),
                (Value::from("b"), Value::from("2"))
            ]
        );
    }
}
