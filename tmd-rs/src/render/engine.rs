//! Tree-walking template renderer with block inheritance.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::filters::{apply as apply_builtin, escape_html, is_builtin};
use super::loader::Loader;
use super::parser::{parse, FilterExpr, Node, Operand, Template};
use super::TemplateRenderer;
use crate::compile::IntermediateTemplate;
use crate::error::RenderError;
use crate::filters::FilterRegistry;
use crate::script::builtins::{call_method, iter_values};
use crate::script::expr::eval_expr;
use crate::script::value::dict_get;
use crate::script::{EvalContext, Value};
use crate::var::Context;

/// Longest `extends` chain followed before giving up.
const MAX_INHERITANCE: usize = 10;
/// Deepest `include` nesting.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Zero-argument methods reachable through `{{ value.method }}`.
const ATTR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "title",
    "capitalize",
    "strip",
    "splitlines",
    "keys",
    "values",
    "items",
];

type BlockMap<'t> = HashMap<&'t str, &'t [Node]>;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// The render context plus the variables bound by enclosing `for` loops.
struct Scope<'a> {
    ctx: &'a Context,
    frames: Vec<HashMap<String, Value>>,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.get(name).cloned())
            .or_else(|| self.ctx.get(name).cloned())
    }
}

impl EvalContext for Scope<'_> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

fn attr(value: &Value, name: &str) -> Option<Value> {
    if let Value::Dict(pairs) = value {
        if let Some(v) = dict_get(pairs, &Value::Str(name.to_owned())) {
            return Some(v.clone());
        }
    }
    if let Ok(i) = name.parse::<i64>() {
        if let Ok(v) = value.index(&Value::Int(i)) {
            return Some(v);
        }
    }
    if ATTR_METHODS.contains(&name) {
        return call_method(value, name, Vec::new()).ok();
    }
    None
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Engine {
    loader: Loader,
}

impl Engine {
    pub fn new(loader: Loader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut Loader {
        &mut self.loader
    }

    /// Render template source text.
    pub fn render_source(
        &self,
        src: &str,
        ctx: &Context,
        registry: &FilterRegistry,
    ) -> Result<String, RenderError> {
        let tpl = parse(src)?;
        let mut scope = Scope {
            ctx,
            frames: Vec::new(),
        };
        Render {
            engine: self,
            registry,
        }
        .template(tpl, &mut scope, 0)
    }

    /// Load a template by name and render it.
    pub fn render_named(
        &self,
        name: &str,
        ctx: &Context,
        registry: &FilterRegistry,
    ) -> Result<String, RenderError> {
        let src = self.loader.load(name)?;
        self.render_source(&src, ctx, registry)
    }
}

impl TemplateRenderer for Engine {
    fn render(
        &self,
        template: &IntermediateTemplate,
        ctx: &Context,
        registry: &FilterRegistry,
    ) -> Result<String, RenderError> {
        self.render_source(&template.to_source(), ctx, registry)
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

struct Render<'e> {
    engine: &'e Engine,
    registry: &'e FilterRegistry,
}

impl Render<'_> {
    fn check_filters(&self, tpl: &Template) -> Result<(), RenderError> {
        let mut names: Vec<&str> = tpl
            .filter_names()
            .into_iter()
            .filter(|n| !is_builtin(n) && !self.registry.contains(n))
            .collect();
        names.sort_unstable();
        match names.first() {
            Some(name) => Err(RenderError::Syntax(format!("Invalid filter: '{name}'"))),
            None => Ok(()),
        }
    }

    /// Resolve the `extends` chain of `tpl` and render the root template
    /// with the most-derived definition of every block.
    fn template(
        &self,
        tpl: Template,
        scope: &mut Scope<'_>,
        include_depth: usize,
    ) -> Result<String, RenderError> {
        self.check_filters(&tpl)?;
        let mut chain = vec![tpl];
        let mut seen = HashSet::new();
        while let Some(parent) = chain.last().and_then(|t| t.extends.clone()) {
            let (name, _) = self.expr(&parent, scope)?;
            let name = name.to_string();
            if !seen.insert(name.clone()) {
                return Err(RenderError::Syntax(format!(
                    "template '{name}' extends itself"
                )));
            }
            if chain.len() > MAX_INHERITANCE {
                return Err(RenderError::Syntax(format!(
                    "inheritance deeper than {MAX_INHERITANCE} templates"
                )));
            }
            debug!(template = %name, "extending");
            let parent = parse(&self.engine.loader.load(&name)?)?;
            self.check_filters(&parent)?;
            chain.push(parent);
        }

        let mut blocks = BlockMap::new();
        for t in &chain {
            collect_blocks(&t.nodes, &mut blocks);
        }
        let root = chain.last().map_or(&[][..], |t| t.nodes.as_slice());
        let mut out = String::new();
        self.nodes(root, &blocks, scope, &mut out, include_depth)?;
        Ok(out)
    }

    fn nodes<'t>(
        &self,
        nodes: &'t [Node],
        blocks: &BlockMap<'t>,
        scope: &mut Scope<'_>,
        out: &mut String,
        include_depth: usize,
    ) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var(fx) => {
                    let (value, safe) = self.expr(fx, scope)?;
                    let text = value.to_string();
                    if safe {
                        out.push_str(&text);
                    } else {
                        out.push_str(&escape_html(&text));
                    }
                }
                Node::Block { name, body } => {
                    let body = blocks.get(name.as_str()).copied().unwrap_or(body.as_slice());
                    self.nodes(body, blocks, scope, out, include_depth)?;
                }
                Node::If { branches, otherwise } => {
                    let taken = branches
                        .iter()
                        .find(|(cond, _)| match eval_expr(cond, &*scope) {
                            Ok(v) => v.truthy(),
                            Err(e) => {
                                trace!(error = %e, "condition treated as false");
                                false
                            }
                        })
                        .map_or(otherwise.as_slice(), |(_, body)| body.as_slice());
                    self.nodes(taken, blocks, scope, out, include_depth)?;
                }
                Node::For {
                    targets,
                    iterable,
                    reversed,
                    body,
                    empty,
                } => {
                    let (seq, _) = self.expr(iterable, scope)?;
                    let mut items = match seq {
                        Value::None => Vec::new(),
                        other => iter_values(&other).map_err(RenderError::Evaluation)?,
                    };
                    if items.is_empty() {
                        self.nodes(empty, blocks, scope, out, include_depth)?;
                        continue;
                    }
                    if *reversed {
                        items.reverse();
                    }
                    let parent = scope.lookup("forloop").unwrap_or(Value::Dict(Vec::new()));
                    let len = items.len();
                    for (i, item) in items.into_iter().enumerate() {
                        let mut frame = unpack(targets, item)?;
                        frame.insert("forloop".to_owned(), forloop(i, len, parent.clone()));
                        scope.frames.push(frame);
                        let res = self.nodes(body, blocks, scope, out, include_depth);
                        scope.frames.pop();
                        res?;
                    }
                }
                Node::Include(fx) => {
                    if include_depth >= MAX_INCLUDE_DEPTH {
                        return Err(RenderError::Evaluation(format!(
                            "include nested deeper than {MAX_INCLUDE_DEPTH}"
                        )));
                    }
                    let (name, _) = self.expr(fx, scope)?;
                    let name = name.to_string();
                    trace!(template = %name, "including");
                    let tpl = parse(&self.engine.loader.load(&name)?)?;
                    let text = self.template(tpl, scope, include_depth + 1)?;
                    out.push_str(&text);
                }
            }
        }
        Ok(())
    }

    fn operand(&self, op: &Operand, scope: &Scope<'_>) -> (Value, bool) {
        match op {
            Operand::Literal(v) => (v.clone(), true),
            Operand::Path(path) => {
                let value = scope
                    .lookup(&path[0])
                    .and_then(|v| path[1..].iter().try_fold(v, |v, seg| attr(&v, seg)));
                (value.unwrap_or_else(|| Value::Str(String::new())), false)
            }
        }
    }

    /// Evaluate `base|filter:arg|…` to a value and its safe flag.
    fn expr(&self, fx: &FilterExpr, scope: &Scope<'_>) -> Result<(Value, bool), RenderError> {
        let (mut value, mut safe) = self.operand(&fx.base, scope);
        for (name, arg) in &fx.filters {
            let arg = arg.as_ref().map(|a| self.operand(a, scope).0);
            if let Some(func) = self.registry.get(name) {
                value = func
                    .call(vec![value, arg.unwrap_or_default()])
                    .map_err(|e| RenderError::Evaluation(format!("filter '{name}': {e}")))?;
                safe = false;
            } else if let Some(res) = apply_builtin(name, value, safe, arg) {
                (value, safe) = res.map_err(|e| RenderError::Evaluation(format!("filter '{name}': {e}")))?;
            } else {
                return Err(RenderError::Syntax(format!("Invalid filter: '{name}'")));
            }
        }
        Ok((value, safe))
    }
}

/// Every block in `nodes`, nested ones included; earlier entries win.
fn collect_blocks<'t>(nodes: &'t [Node], blocks: &mut BlockMap<'t>) {
    for node in nodes {
        match node {
            Node::Block { name, body } => {
                blocks.entry(name.as_str()).or_insert(body.as_slice());
                collect_blocks(body, blocks);
            }
            Node::If { branches, otherwise } => {
                for (_, body) in branches {
                    collect_blocks(body, blocks);
                }
                collect_blocks(otherwise, blocks);
            }
            Node::For { body, empty, .. } => {
                collect_blocks(body, blocks);
                collect_blocks(empty, blocks);
            }
            Node::Text(_) | Node::Var(_) | Node::Include(_) => {}
        }
    }
}

fn unpack(targets: &[String], item: Value) -> Result<HashMap<String, Value>, RenderError> {
    if let [single] = targets {
        return Ok(HashMap::from([(single.clone(), item)]));
    }
    let values = match item {
        Value::List(values) if values.len() == targets.len() => values,
        other => {
            let got = match &other {
                Value::List(v) => v.len(),
                _ => 1,
            };
            return Err(RenderError::Evaluation(format!(
                "Need {} values to unpack in for loop; got {got}.",
                targets.len()
            )));
        }
    };
    Ok(targets.iter().cloned().zip(values).collect())
}

fn forloop(i: usize, len: usize, parent: Value) -> Value {
    let int = |n: usize| Value::Int(n as i64);
    Value::Dict(vec![
        ("counter".into(), int(i + 1)),
        ("counter0".into(), int(i)),
        ("revcounter".into(), int(len - i)),
        ("revcounter0".into(), int(len - i - 1)),
        ("first".into(), Value::Bool(i == 0)),
        ("last".into(), Value::Bool(i + 1 == len)),
        ("parentloop".into(), parent),
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::exec_fetch;

    fn render(src: &str, ctx: &Context) -> Result<String, RenderError> {
        Engine::default().render_source(src, ctx, &FilterRegistry::new())
    }

    fn ok(src: &str, ctx: &Context) -> String {
        render(src, ctx).expect("render failed")
    }

    fn ctx() -> Context {
        let mut c = Context::new();
        c.set("name", "<World>");
        c.set("n", 3i64);
        c.set(
            "items",
            Value::List(vec!["a".into(), "b".into(), "c".into()]),
        );
        c.set(
            "user",
            Value::Dict(vec![("name".into(), "ann".into()), ("tags".into(), Value::List(vec!["x".into()]))]),
        );
        c
    }

    #[test]
    fn variables_are_escaped() {
        assert_eq!(ok("Hi {{ name }}!", &ctx()), "Hi &lt;World&gt;!");
        assert_eq!(ok("{{ name|safe }}", &ctx()), "<World>");
        assert_eq!(ok("{{ '<b>' }}", &ctx()), "<b>");
    }

    #[test]
    fn missing_and_none() {
        let mut c = Context::new();
        c.set("nothing", Value::None);
        assert_eq!(ok("[{{ missing }}]", &c), "[]");
        assert_eq!(ok("{{ nothing }}", &c), "None");
        assert_eq!(ok("{{ missing|default:'d' }}", &c), "d");
    }

    #[test]
    fn dotted_lookups() {
        let c = ctx();
        assert_eq!(ok("{{ user.name }}", &c), "ann");
        assert_eq!(ok("{{ user.name.upper }}", &c), "ANN");
        assert_eq!(ok("{{ items.1 }}", &c), "b");
        assert_eq!(ok("{{ user.tags.0 }}", &c), "x");
        assert_eq!(ok("[{{ user.nope }}]", &c), "[]");
    }

    #[test]
    fn for_loops() {
        let c = ctx();
        assert_eq!(
            ok("{% for i in items %}{{ forloop.counter }}{{ i }}{% if not forloop.last %},{% endif %}{% endfor %}", &c),
            "1a,2b,3c"
        );
        assert_eq!(ok("{% for i in items reversed %}{{ i }}{% endfor %}", &c), "cba");
        assert_eq!(ok("{% for i in missing %}x{% empty %}none{% endfor %}", &c), "none");
        assert_eq!(ok("{% for k, v in user.items %}{{ k }};{% endfor %}", &c), "name;tags;");
    }

    #[test]
    fn nested_loops_see_parentloop() {
        let mut c = Context::new();
        c.set("rows", Value::List(vec![Value::List(vec![1i64.into(), 2i64.into()])]));
        assert_eq!(
            ok("{% for r in rows %}{% for x in r %}{{ forloop.parentloop.counter }}{{ x }}{% endfor %}{% endfor %}", &c),
            "1112"
        );
    }

    #[test]
    fn unpack_mismatch_is_an_error() {
        assert!(matches!(
            render("{% for a, b in items %}{% endfor %}", &ctx()),
            Err(RenderError::Evaluation(_))
        ));
    }

    #[test]
    fn conditions() {
        let c = ctx();
        assert_eq!(ok("{% if n > 2 %}big{% else %}small{% endif %}", &c), "big");
        assert_eq!(ok("{% if n == 1 %}a{% elif user.name == 'ann' %}b{% endif %}", &c), "b");
        assert_eq!(ok("{% if 'b' in items %}yes{% endif %}", &c), "yes");
        assert_eq!(ok("{% if missing %}x{% else %}y{% endif %}", &c), "y");
    }

    #[test]
    fn inheritance_uses_most_derived_block() {
        let mut loader = Loader::new();
        loader.add("root.html", "<{% block a %}root-a{% endblock %}|{% block b %}root-b{% endblock %}>");
        loader.add("mid.html", "{% extends 'root.html' %}{% block a %}mid-a{% endblock %}{% block b %}mid-b{% endblock %}");
        let engine = Engine::new(loader);
        let out = engine
            .render_source(
                "{% extends 'mid.html' %}{% block b %}leaf-b{% endblock %}ignored",
                &Context::new(),
                &FilterRegistry::new(),
            )
            .unwrap();
        assert_eq!(out, "<mid-a|leaf-b>");
    }

    #[test]
    fn inheritance_cycles_and_missing_parents() {
        let mut loader = Loader::new();
        loader.add("a.html", "{% extends 'b.html' %}");
        loader.add("b.html", "{% extends 'a.html' %}");
        let engine = Engine::new(loader);
        let reg = FilterRegistry::new();
        assert!(engine.render_named("a.html", &Context::new(), &reg).is_err());
        assert_eq!(
            engine.render_source("{% extends 'zzz.html' %}", &Context::new(), &reg),
            Err(RenderError::NotFound("zzz.html".into()))
        );
    }

    #[test]
    fn includes_share_scope() {
        let mut loader = Loader::new();
        loader.add("part.html", "[{{ i }}]");
        let engine = Engine::new(loader);
        let out = engine
            .render_source(
                "{% for i in items %}{% include 'part.html' %}{% endfor %}",
                &ctx(),
                &FilterRegistry::new(),
            )
            .unwrap();
        assert_eq!(out, "[a][b][c]");
    }

    #[test]
    fn self_include_is_bounded() {
        let mut loader = Loader::new();
        loader.add("loop.html", "{% include 'loop.html' %}");
        let engine = Engine::new(loader);
        assert!(engine
            .render_named("loop.html", &Context::new(), &FilterRegistry::new())
            .is_err());
    }

    #[test]
    fn unknown_filters_fail_before_rendering() {
        assert_eq!(
            render("{% if False %}{{ x|bogus }}{% endif %}", &Context::new()),
            Err(RenderError::Syntax("Invalid filter: 'bogus'".into()))
        );
    }

    #[test]
    fn user_filters_are_called_and_escaped() {
        let reg = FilterRegistry::new();
        let Value::Func(f) = exec_fetch("def wrap(a, b=None): return '<' + a + '>' + str(b)", "wrap").unwrap()
        else {
            panic!("expected a function");
        };
        reg.register("wrap", f);
        let out = Engine::default()
            .render_source("{{ 'x'|wrap:1 }}", &Context::new(), &reg)
            .unwrap();
        assert_eq!(out, "&lt;x&gt;1");
    }

    #[test]
    fn failing_user_filter_is_an_evaluation_error() {
        let reg = FilterRegistry::new();
        let Value::Func(f) = exec_fetch("def bad(a, b=None): return a + 1", "bad").unwrap() else {
            panic!("expected a function");
        };
        reg.register("bad", f);
        let err = Engine::default()
            .render_source("{{ 'x'|bad }}", &Context::new(), &reg)
            .unwrap_err();
        assert!(matches!(err, RenderError::Evaluation(_)));
    }

    #[test]
    fn embedded_base_renders() {
        let engine = Engine::default();
        let mut c = Context::new();
        c.set("title", "T");
        let out = engine
            .render_source(
                "{% extends 'base/_base.html' %}{% block body %}<p>hi</p>{% endblock %}",
                &c,
                &FilterRegistry::new(),
            )
            .unwrap();
        assert!(out.contains("<title>T</title>"));
        assert!(out.contains("<p>hi</p>"));
    }
}
