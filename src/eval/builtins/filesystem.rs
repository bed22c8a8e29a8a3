//! `file`, `fileexists`, `filebase64` and `templatefile`.
//!
//! hcl-rs takes plain function pointers, which cannot reach the loader, so
//! calls to these functions are replaced by their result before the
//! expression is handed to hcl-rs. Contents come from a [`FileTable`] that
//! the evaluator fills through its loader: a call naming a file that has not
//! been read yet records the path and stays unresolved until the next pass.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hcl::eval::{Context, Evaluate};
use hcl::expr::{Expression, FuncCall, Operation, TemplateExpr, TraversalOperator};
use hcl::template::{Element, Template};
use hcl::Value;
use log::debug;
use path_absolutize::Absolutize;

use super::{create_context, to_plain_string};

pub const FILE_FUNCTIONS: [&str; 4] = ["file", "fileexists", "filebase64", "templatefile"];

/// File contents read for one run, keyed by absolute path. `None` marks a
/// file the loader could not read.
#[derive(Debug, Default)]
pub struct FileTable {
    base: PathBuf,
    contents: HashMap<PathBuf, Option<String>>,
    wanted: RefCell<BTreeSet<PathBuf>>,
}

impl FileTable {
    /// Relative paths are resolved against `base`, and nothing outside it
    /// is readable.
    pub fn set_base(&mut self, base: PathBuf) {
        self.base = base;
    }

    pub fn insert(&mut self, path: PathBuf, contents: Option<String>) {
        self.contents.insert(path, contents);
    }

    /// Paths asked for since the last call that are not in the table.
    pub fn take_wanted(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.wanted.borrow_mut())
            .into_iter()
            .collect()
    }

    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        let path = Path::new(raw)
            .absolutize_from(&self.base)
            .map_err(|e| e.to_string())?
            .into_owned();
        if !path.starts_with(&self.base) {
            return Err(format!("{} is outside {}", path.display(), self.base.display()));
        }
        Ok(path)
    }

    fn entry(&self, raw: &str) -> Result<Option<&str>, String> {
        let path = self.resolve(raw)?;
        match self.contents.get(&path) {
            Some(contents) => Ok(contents.as_deref()),
            None => {
                let message = format!("{} has not been read yet", path.display());
                self.wanted.borrow_mut().insert(path);
                Err(message)
            }
        }
    }

    fn read(&self, raw: &str) -> Result<&str, String> {
        self.entry(raw)?
            .ok_or_else(|| format!("no file exists at {raw}"))
    }

    fn exists(&self, raw: &str) -> Result<bool, String> {
        Ok(self.entry(raw)?.is_some())
    }
}

fn is_file_function(call: &FuncCall) -> bool {
    !call.name.is_namespaced() && FILE_FUNCTIONS.contains(&call.name.name.as_str())
}

fn template_source(template: &TemplateExpr) -> &str {
    match template {
        TemplateExpr::QuotedString(raw) => raw,
        TemplateExpr::Heredoc(heredoc) => &heredoc.template,
    }
}

fn template_mentions(template: &TemplateExpr) -> bool {
    let raw = template_source(template);
    FILE_FUNCTIONS.iter().any(|name| raw.contains(&format!("{name}(")))
}

/// Sub-expressions evaluated in the enclosing scope. `for` bodies are left
/// out since they see the loop variables.
fn children(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Array(items) => items.iter().collect(),
        Expression::Object(object) => object.values().collect(),
        Expression::FuncCall(call) => call.args.iter().collect(),
        Expression::Parenthesis(inner) => vec![&**inner],
        Expression::Conditional(cond) => vec![&cond.cond_expr, &cond.true_expr, &cond.false_expr],
        Expression::Operation(op) => match &**op {
            Operation::Unary(unary) => vec![&unary.expr],
            Operation::Binary(binary) => vec![&binary.lhs_expr, &binary.rhs_expr],
        },
        Expression::Traversal(traversal) => {
            let mut out = vec![&traversal.expr];
            for op in &traversal.operators {
                if let TraversalOperator::Index(index) = op {
                    out.push(index);
                }
            }
            out
        }
        Expression::ForExpr(for_expr) => vec![&for_expr.collection_expr],
        _ => Vec::new(),
    }
}

fn children_mut(expr: &mut Expression) -> Vec<&mut Expression> {
    match expr {
        Expression::Array(items) => items.iter_mut().collect(),
        Expression::Object(object) => object.values_mut().collect(),
        Expression::FuncCall(call) => call.args.iter_mut().collect(),
        Expression::Parenthesis(inner) => vec![&mut **inner],
        Expression::Conditional(cond) => {
            let cond = &mut **cond;
            vec![&mut cond.cond_expr, &mut cond.true_expr, &mut cond.false_expr]
        }
        Expression::Operation(op) => match &mut **op {
            Operation::Unary(unary) => vec![&mut unary.expr],
            Operation::Binary(binary) => vec![&mut binary.lhs_expr, &mut binary.rhs_expr],
        },
        Expression::Traversal(traversal) => {
            let traversal = &mut **traversal;
            let mut out = vec![&mut traversal.expr];
            for op in &mut traversal.operators {
                if let TraversalOperator::Index(index) = op {
                    out.push(index);
                }
            }
            out
        }
        Expression::ForExpr(for_expr) => vec![&mut for_expr.collection_expr],
        _ => Vec::new(),
    }
}

/// True when `expr` calls one of the file functions somewhere.
pub fn mentions_file_function(expr: &Expression) -> bool {
    match expr {
        Expression::FuncCall(call) if is_file_function(call) => true,
        Expression::TemplateExpr(template) => template_mentions(template),
        other => children(other).into_iter().any(mentions_file_function),
    }
}

/// Replaces every file function call in `expr` whose arguments are known
/// by its result. Calls that cannot be answered yet are left in place.
pub fn inline_file_calls(expr: &mut Expression, ctx: &Context<'_>, files: &FileTable) {
    match expr {
        Expression::FuncCall(call) if is_file_function(call) => {
            for arg in &mut call.args {
                inline_file_calls(arg, ctx, files);
            }
            if let Some(value) = call_file_function(call, ctx, files) {
                *expr = Expression::from(value);
            }
        }
        Expression::TemplateExpr(template) if template_mentions(template) => {
            if let Some(rendered) = render_template(template, ctx, files) {
                *expr = Expression::String(rendered);
            }
        }
        other => {
            for child in children_mut(other) {
                inline_file_calls(child, ctx, files);
            }
        }
    }
}

/// Renders a template containing file calls. Templates with directives
/// are left to hcl-rs.
fn render_template(template: &TemplateExpr, ctx: &Context<'_>, files: &FileTable) -> Option<String> {
    let template = Template::from_expr(template).ok()?;
    let mut out = String::new();
    for element in template.elements() {
        match element {
            Element::Literal(text) => out.push_str(text),
            Element::Interpolation(interpolation) => {
                let mut expr = interpolation.expr.clone();
                inline_file_calls(&mut expr, ctx, files);
                let value = expr.evaluate(ctx).ok()?;
                out.push_str(&to_plain_string(&value).ok()?);
            }
            Element::Directive(_) => return None,
        }
    }
    Some(out)
}

fn call_file_function(call: &FuncCall, ctx: &Context<'_>, files: &FileTable) -> Option<Value> {
    let args: Vec<Value> = call
        .args
        .iter()
        .map(|arg| arg.evaluate(ctx).ok())
        .collect::<Option<_>>()?;
    let name = call.name.name.as_str();
    let result = match (name, args.first().and_then(Value::as_str)) {
        ("file", Some(path)) => files.read(path).map(Value::from),
        ("fileexists", Some(path)) => files.exists(path).map(Value::from),
        ("filebase64", Some(path)) => files.read(path).map(|text| Value::from(STANDARD.encode(text))),
        ("templatefile", Some(path)) => files
            .read(path)
            .and_then(|text| render_template_file(text, args.get(1))),
        _ => Err(format!("{name}: first argument must be a string")),
    };
    result
        .map_err(|err| debug!("{name}: {err}"))
        .ok()
}

/// Renders a template file with only `vars` in scope.
fn render_template_file(text: &str, vars: Option<&Value>) -> Result<Value, String> {
    let template: Template = text.parse().map_err(|e: hcl::Error| e.to_string())?;
    let mut ctx = create_context();
    match vars {
        Some(Value::Object(vars)) => {
            for (name, value) in vars {
                ctx.declare_var(name.as_str(), value.clone());
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => return Err(format!("template variables must be an object, got {other}")),
    }
    template.evaluate(&ctx).map(Value::from).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FileTable {
        let mut files = FileTable::default();
        files.set_base(PathBuf::from("/p"));
        files.insert(PathBuf::from("/p/init.sh"), Some("echo hi".to_string()));
        files.insert(PathBuf::from("/p/user.tpl"), Some("hello ${name}".to_string()));
        files.insert(PathBuf::from("/p/gone.txt"), None);
        files
    }

    fn inline(source: &str, files: &FileTable) -> Result<hcl::Value, String> {
        let body: hcl::Body = hcl::from_str(&format!("x = {source}")).unwrap();
        let mut expr = body.attributes().next().unwrap().expr().clone();
        let mut ctx = create_context();
        ctx.declare_var("dir", "modules/..");
        assert!(mentions_file_function(&expr));
        inline_file_calls(&mut expr, &ctx, files);
        expr.evaluate(&ctx).map_err(|e| e.to_string())
    }

    #[test]
    fn file_calls_read_from_the_table() {
        let files = table();
        assert_eq!(inline("file(\"init.sh\")", &files).unwrap(), Value::from("echo hi"));
        assert_eq!(
            inline("upper(file(\"${dir}/init.sh\"))", &files).unwrap(),
            Value::from("ECHO HI")
        );
        assert_eq!(inline("fileexists(\"gone.txt\")", &files).unwrap(), Value::from(false));
        assert_eq!(
            inline("filebase64(\"init.sh\")", &files).unwrap(),
            Value::from("ZWNobyBoaQ==")
        );
        assert_eq!(
            inline("\"cmd: ${file(\"init.sh\")}\"", &files).unwrap(),
            Value::from("cmd: echo hi")
        );
        assert_eq!(
            inline("templatefile(\"user.tpl\", { name = \"ann\" })", &files).unwrap(),
            Value::from("hello ann")
        );
    }

    #[test]
    fn unread_files_are_requested() {
        let files = table();
        assert!(inline("file(\"later.txt\")", &files).is_err());
        assert!(inline("fileexists(\"other.txt\")", &files).is_err());
        assert_eq!(
            files.take_wanted(),
            vec![PathBuf::from("/p/later.txt"), PathBuf::from("/p/other.txt")]
        );
        assert!(files.take_wanted().is_empty());
    }

    #[test]
    fn paths_outside_the_base_are_refused() {
        let files = table();
        assert!(inline("file(\"../etc/passwd\")", &files).is_err());
        assert!(files.take_wanted().is_empty());
    }
}
