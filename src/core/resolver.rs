// src/core/resolver.rs

//! The Project Resolver: a pure, deterministic function from
//! `(project, env, client context)` to an effective configuration map plus
//! its content hash.

use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use serde_json::{Map, Value};

use crate::core::errors::LivecfgError;
use crate::core::model::{Entry, ProjectDocument};
use crate::core::storage::StorageBackend;

/// The outcome of one top-level resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub data: IndexMap<String, Value>,
    pub hash_code: String,
}

/// Resolves `config_name` under `env`, with `client_context` (the pull
/// frame's `context` object, or `Value::Null` if absent) overriding variable
/// values for names it shares with the project's own `environ`.
pub async fn resolve(
    backend: &dyn StorageBackend,
    config_name: &str,
    env: &str,
    client_context: &Value,
) -> Result<ResolvedConfig, LivecfgError> {
    let root = backend.read(config_name, true).await?;
    root.validate_env(config_name, env)?;

    let mut ctx = Context {
        backend,
        env,
        client_environ: client_environ_bag(client_context),
        documents: HashMap::new(),
        resolved: HashMap::new(),
        stack: HashSet::new(),
    };
    ctx.documents.insert(config_name.to_string(), root);

    let data = ctx.resolve_project(config_name).await?;
    let hash_code = compute_hash(&data);
    Ok(ResolvedConfig { data, hash_code })
}

/// Combines `client_context.environ` with `client_context`'s own top-level
/// fields, the latter taking precedence — mirrors
/// `environ = copy(context['environ']); environ.update(context)`.
fn client_environ_bag(client_context: &Value) -> IndexMap<String, Value> {
    let mut bag = IndexMap::new();
    if let Some(environ) = client_context.get("environ").and_then(Value::as_object) {
        for (k, v) in environ {
            bag.insert(k.clone(), v.clone());
        }
    }
    if let Some(top) = client_context.as_object() {
        for (k, v) in top {
            bag.insert(k.clone(), v.clone());
        }
    }
    bag
}

struct Context<'a> {
    backend: &'a dyn StorageBackend,
    env: &'a str,
    client_environ: IndexMap<String, Value>,
    documents: HashMap<String, ProjectDocument>,
    /// Completed interpolated `env_data` per project name, for this call only.
    resolved: HashMap<String, IndexMap<String, Value>>,
    /// Project names currently on the recursion stack, for cycle detection.
    stack: HashSet<String>,
}

impl<'a> Context<'a> {
    async fn document(&mut self, name: &str) -> Result<ProjectDocument, LivecfgError> {
        if let Some(doc) = self.documents.get(name) {
            return Ok(doc.clone());
        }
        let doc = self.backend.read(name, true).await?;
        self.documents.insert(name.to_string(), doc.clone());
        Ok(doc)
    }

    fn resolve_project<'b>(
        &'b mut self,
        project: &'b str,
    ) -> BoxFuture<'b, Result<IndexMap<String, Value>, LivecfgError>> {
        Box::pin(async move {
            if let Some(cached) = self.resolved.get(project) {
                return Ok(cached.clone());
            }
            if !self.stack.insert(project.to_string()) {
                return Err(LivecfgError::ProjectCycle {
                    config_name: project.to_string(),
                    via: project.to_string(),
                });
            }

            let result = self.resolve_project_inner(project).await;
            self.stack.remove(project);
            let data = result?;
            self.resolved.insert(project.to_string(), data.clone());
            Ok(data)
        })
    }

    async fn resolve_project_inner(
        &mut self,
        project: &str,
    ) -> Result<IndexMap<String, Value>, LivecfgError> {
        let doc = self.document(project).await?;

        let mut env_data: IndexMap<String, Value> = IndexMap::new();
        let mut env_vars: IndexMap<String, Entry> = IndexMap::new();

        for parent in doc.parent.clone() {
            let parent_doc = self.document(&parent).await?;
            if self.env != "default" {
                parent_doc.validate_env(&parent, self.env)?;
            }
            let parent_env_data = self.resolve_project(&parent).await.map_err(|e| {
                if let LivecfgError::ProjectCycle { via, .. } = &e {
                    LivecfgError::ProjectCycle {
                        config_name: project.to_string(),
                        via: via.clone(),
                    }
                } else {
                    e
                }
            })?;
            for (k, v) in parent_env_data {
                env_data.insert(k, v);
            }
            for (k, entry) in &parent_doc.environ {
                env_vars.insert(k.clone(), entry.clone());
            }
        }

        merge_entries(&mut env_data, &doc.default);
        if self.env != "default"
            && let Some(named) = doc.get_env(self.env)
        {
            merge_entries(&mut env_data, named);
        }
        for (k, entry) in &doc.environ {
            env_vars.insert(k.clone(), entry.clone());
        }

        for (name, value) in &self.client_environ {
            if env_vars.contains_key(name) {
                env_vars.insert(
                    name.clone(),
                    Entry {
                        key: name.clone(),
                        desc: String::new(),
                        value: value.clone(),
                    },
                );
            }
        }

        let vars: IndexMap<String, String> = env_vars
            .iter()
            .map(|(k, entry)| (k.clone(), value_to_template_string(&entry.value)))
            .collect();

        Ok(env_data
            .into_iter()
            .map(|(k, v)| (k, interpolate_value(&v, &vars)))
            .collect())
    }
}

fn merge_entries(env_data: &mut IndexMap<String, Value>, entries: &IndexMap<String, Entry>) {
    for (key, entry) in entries {
        env_data.insert(key.clone(), entry.value.clone());
    }
}

fn value_to_template_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Recursive walk over a `serde_json::Value`: string leaves get `{name}`
/// substitution, other leaves and container shapes pass through untouched.
fn interpolate_value(value: &Value, vars: &IndexMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_string(s, vars)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate_value(v, vars)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// `{name}` substitution with `{{`/`}}` literal-brace escaping and an
/// empty-string fallback for names absent from `vars`, mirroring
/// `str.format_map(defaultdict(str, **variable))`.
fn interpolate_string(s: &str, vars: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c2);
                }
                if closed {
                    out.push_str(vars.get(name.as_str()).map(String::as_str).unwrap_or(""));
                } else {
                    out.push('{');
                    out.push_str(&name);
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }
    out
}

/// A JSON value frozen into the shape Python's `freeze()` would produce:
/// dicts become a tuple of `(key, value)` pairs sorted by key, lists become
/// a tuple of their frozen elements, and scalars pass through untouched.
/// `repr()` of this shape, encoded as UTF-8, is what gets hashed.
enum Frozen {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Frozen>),
}

fn freeze_value(value: &Value) -> Frozen {
    match value {
        Value::Null => Frozen::None,
        Value::Bool(b) => Frozen::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Frozen::Int(i)
            } else if let Some(u) = n.as_u64() {
                Frozen::Float(u as f64)
            } else {
                Frozen::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Frozen::Str(s.clone()),
        Value::Array(items) => Frozen::Tuple(items.iter().map(freeze_value).collect()),
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Frozen::Tuple(
                pairs
                    .into_iter()
                    .map(|(k, v)| Frozen::Tuple(vec![Frozen::Str(k.clone()), freeze_value(v)]))
                    .collect(),
            )
        }
    }
}

/// Python's `repr()` for a frozen value: tuples print as `(a, b)`, a
/// one-element tuple keeps its trailing comma `(a,)`, strings quote and
/// escape the way `repr(str)` does, floats always carry a decimal point.
fn python_repr(value: &Frozen) -> String {
    match value {
        Frozen::None => "None".to_string(),
        Frozen::Bool(true) => "True".to_string(),
        Frozen::Bool(false) => "False".to_string(),
        Frozen::Int(i) => i.to_string(),
        Frozen::Float(f) => python_float_repr(*f),
        Frozen::Str(s) => python_str_repr(s),
        Frozen::Tuple(items) => match items.as_slice() {
            [] => "()".to_string(),
            [only] => format!("({},)", python_repr(only)),
            many => {
                let joined: Vec<String> = many.iter().map(python_repr).collect();
                format!("({})", joined.join(", "))
            }
        },
    }
}

fn python_float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut text = format!("{f}");
    if !text.contains('.') && !text.contains('e') && !text.contains('E') {
        text.push_str(".0");
    }
    text
}

/// Mirrors CPython's `str.__repr__`: single-quoted unless the string
/// contains a `'` and no `"`, with backslash, the chosen quote, and ASCII
/// control characters escaped. Printable non-ASCII passes through as-is.
fn python_str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// MD5 over `repr(freeze([(env_data,), {}]))` encoded as UTF-8, truncated to
/// the middle 16 hex characters (`hexdigest()[8:-8]`) — byte-for-byte what
/// `to_hash(env_data)` produces for the same data.
pub fn compute_hash(data: &IndexMap<String, Value>) -> String {
    let as_object: Map<String, Value> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let frozen_env_data = freeze_value(&Value::Object(as_object));
    // freeze([sub, kw]) where sub = (env_data,) and kw = {}.
    let top = Frozen::Tuple(vec![Frozen::Tuple(vec![frozen_env_data]), Frozen::Tuple(vec![])]);
    let text = python_repr(&top);
    let digest = Md5::digest(text.as_bytes());
    let hex = hex::encode(digest);
    hex[8..24].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::FileBackend;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(key: &str, value: Value) -> Entry {
        Entry {
            key: key.to_string(),
            desc: String::new(),
            value,
        }
    }

    async fn seed(backend: &FileBackend, name: &str, doc: ProjectDocument) {
        backend.write(name, doc, false).await.unwrap();
    }

    #[test]
    fn interpolation_substitutes_and_escapes() {
        let mut vars = IndexMap::new();
        vars.insert("X".to_string(), "ctx-x".to_string());
        assert_eq!(interpolate_string("value is {X}", &vars), "value is ctx-x");
        assert_eq!(interpolate_string("literal {{X}}", &vars), "literal {X}");
        assert_eq!(interpolate_string("missing {Y}", &vars), "missing ");
    }

    #[test]
    fn hash_is_deterministic_and_key_order_independent() {
        let mut a = IndexMap::new();
        a.insert("a".to_string(), json!(1));
        a.insert("b".to_string(), json!(2));

        let mut b = IndexMap::new();
        b.insert("b".to_string(), json!(2));
        b.insert("a".to_string(), json!(1));

        let hash_a = compute_hash(&a);
        let hash_b = compute_hash(&b);
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 16);
    }

    #[test]
    fn hash_matches_the_original_repr_based_algorithm() {
        let mut single = IndexMap::new();
        single.insert("a".to_string(), json!(1));
        assert_eq!(compute_hash(&single), "e500caedf1c79b74");

        let mut mixed = IndexMap::new();
        mixed.insert("b".to_string(), json!(2));
        mixed.insert("a".to_string(), json!(1));
        mixed.insert("greeting".to_string(), json!("hello world"));
        mixed.insert(
            "nested".to_string(),
            json!({"x": [1, 2, 3], "y": null}),
        );
        mixed.insert("flag".to_string(), json!(true));
        assert_eq!(compute_hash(&mixed), "27a393a049eeecf1");
    }

    #[test]
    fn python_repr_matches_for_strings_tuples_and_scalars() {
        assert_eq!(python_str_repr("hello world"), "'hello world'");
        assert_eq!(python_str_repr("it's"), "\"it's\"");
        assert_eq!(python_str_repr("both ' and \""), "'both \\' and \"'");
        assert_eq!(python_repr(&Frozen::None), "None");
        assert_eq!(python_repr(&Frozen::Bool(true)), "True");
        assert_eq!(python_repr(&Frozen::Tuple(vec![])), "()");
        assert_eq!(
            python_repr(&Frozen::Tuple(vec![Frozen::Int(1)])),
            "(1,)"
        );
    }

    #[tokio::test]
    async fn parent_inheritance_with_client_override() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();

        let mut p = ProjectDocument::empty();
        p.default
            .insert("a".to_string(), entry("a", json!("1")));
        seed(&backend, "P", p).await;

        let mut q = ProjectDocument::with_parent("P".to_string());
        q.default
            .insert("b".to_string(), entry("b", json!("{X}")));
        q.environ
            .insert("X".to_string(), entry("X", json!("default-x")));
        seed(&backend, "Q", q).await;

        let context = json!({ "environ": { "X": "ctx-x" } });
        let resolved = resolve(&backend, "Q", "default", &context).await.unwrap();
        assert_eq!(resolved.data.get("a"), Some(&json!("1")));
        assert_eq!(resolved.data.get("b"), Some(&json!("ctx-x")));
    }

    #[tokio::test]
    async fn parent_missing_named_env_fails_with_project_env_error() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();

        // "P" never declares a "staging" environment.
        seed(&backend, "P", ProjectDocument::empty()).await;

        let mut child = ProjectDocument::with_parent("P".to_string());
        child.ensure_env("staging");
        seed(&backend, "Q", child).await;

        let err = resolve(&backend, "Q", "staging", &Value::Null)
            .await
            .unwrap_err();
        match err {
            LivecfgError::ProjectEnvError { config_name, env } => {
                assert_eq!(config_name, "P");
                assert_eq!(env, "staging");
            }
            other => panic!("expected ProjectEnvError for the parent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_self_parent_cycle_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        let doc = ProjectDocument::with_parent("Self".to_string());
        seed(&backend, "Self", doc).await;

        let err = resolve(&backend, "Self", "default", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, LivecfgError::ProjectCycle { .. }));
    }

    #[tokio::test]
    async fn indirect_cycle_across_two_projects_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        seed(
            &backend,
            "A",
            ProjectDocument::with_parent("B".to_string()),
        )
        .await;
        seed(
            &backend,
            "B",
            ProjectDocument::with_parent("A".to_string()),
        )
        .await;

        let err = resolve(&backend, "A", "default", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, LivecfgError::ProjectCycle { .. }));
    }

    #[tokio::test]
    async fn diamond_parent_graph_resolves_shared_ancestor_once() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();

        let mut base = ProjectDocument::empty();
        base.default
            .insert("shared".to_string(), entry("shared", json!("base")));
        seed(&backend, "Base", base).await;
        seed(
            &backend,
            "Left",
            ProjectDocument::with_parent("Base".to_string()),
        )
        .await;
        seed(
            &backend,
            "Right",
            ProjectDocument::with_parent("Base".to_string()),
        )
        .await;

        let mut top = ProjectDocument::empty();
        top.parent = vec!["Left".to_string(), "Right".to_string()];
        seed(&backend, "Top", top).await;

        let resolved = resolve(&backend, "Top", "default", &Value::Null)
            .await
            .unwrap();
        assert_eq!(resolved.data.get("shared"), Some(&json!("base")));
    }

    #[tokio::test]
    async fn unknown_env_fails_with_project_env_error() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        seed(&backend, "P", ProjectDocument::empty()).await;

        let err = resolve(&backend, "P", "staging", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, LivecfgError::ProjectEnvError { .. }));
    }
}
