//! Selection grammar resolution.
//!
//! Grammar: `selector := atom (',' atom)*`, `atom := '+'? body '+'?`,
//! `body := name | 'tag:' tagname`. A leading `+` pulls in the upstream
//! closure, a trailing `+` the downstream closure, atoms union, and
//! `--exclude` expressions subtract. The result is returned in the graph's
//! topological order regardless of how the atoms were listed.

use std::collections::{BTreeMap, BTreeSet};

use dft_types::Pipeline;

use crate::dag::Graph;
use crate::error::{EngineError, Result};

#[derive(Debug, PartialEq, Eq)]
struct Atom {
    upstream: bool,
    downstream: bool,
    body: Body,
}

#[derive(Debug, PartialEq, Eq)]
enum Body {
    Name(String),
    Tag(String),
}

fn parse_atom(raw: &str) -> Result<Atom> {
    let mut body = raw.trim();
    if body.is_empty() {
        return Err(EngineError::Selector("empty selector atom".into()));
    }
    let upstream = body.starts_with('+');
    if upstream {
        body = &body[1..];
    }
    let downstream = body.ends_with('+');
    if downstream {
        body = &body[..body.len() - 1];
    }
    if body.is_empty() || body.contains('+') {
        return Err(EngineError::Selector(format!(
            "malformed selector atom '{raw}'"
        )));
    }
    let body = match body.strip_prefix("tag:") {
        Some(tag) if tag.is_empty() => {
            return Err(EngineError::Selector(format!(
                "malformed selector atom '{raw}': empty tag"
            )))
        }
        Some(tag) => Body::Tag(tag.to_string()),
        None => Body::Name(body.to_string()),
    };
    Ok(Atom {
        upstream,
        downstream,
        body,
    })
}

fn resolve_atom(
    atom: &Atom,
    pipelines: &BTreeMap<String, Pipeline>,
    graph: &Graph,
) -> Result<BTreeSet<String>> {
    let mut base = BTreeSet::new();
    match &atom.body {
        Body::Name(name) => {
            if !graph.contains(name) {
                return Err(EngineError::Selector(format!("unknown pipeline '{name}'")));
            }
            base.insert(name.clone());
        }
        Body::Tag(tag) => {
            for pipeline in pipelines.values() {
                if pipeline.has_tag(tag) {
                    base.insert(pipeline.name.clone());
                }
            }
            if base.is_empty() {
                return Err(EngineError::Selector(format!("unknown tag '{tag}'")));
            }
        }
    }

    let mut resolved = base.clone();
    for name in &base {
        if atom.upstream {
            resolved.extend(graph.ancestors(name));
        }
        if atom.downstream {
            resolved.extend(graph.descendants(name));
        }
    }
    Ok(resolved)
}

fn resolve_expressions(
    expressions: &[String],
    pipelines: &BTreeMap<String, Pipeline>,
    graph: &Graph,
) -> Result<BTreeSet<String>> {
    let mut selected = BTreeSet::new();
    for expression in expressions {
        for raw in expression.split(',') {
            let atom = parse_atom(raw)?;
            selected.extend(resolve_atom(&atom, pipelines, graph)?);
        }
    }
    Ok(selected)
}

/// Resolve `--select` / `--exclude` expressions into the ordered pipeline
/// list. An empty `selects` means every pipeline.
///
/// # Errors
///
/// Returns [`EngineError::Selector`] for malformed atoms or unknown
/// names/tags, and [`EngineError::Cycle`] if ordering discovers one.
pub fn select(
    selects: &[String],
    excludes: &[String],
    pipelines: &BTreeMap<String, Pipeline>,
    graph: &Graph,
) -> Result<Vec<String>> {
    let mut included = if selects.is_empty() {
        graph.nodes().clone()
    } else {
        resolve_expressions(selects, pipelines, graph)?
    };

    if !excludes.is_empty() {
        let excluded = resolve_expressions(excludes, pipelines, graph)?;
        included.retain(|name| !excluded.contains(name));
    }

    graph.order_subset(&included)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(name: &str, tags: &[&str], depends_on: &[&str]) -> Pipeline {
        let yaml = format!(
            "pipeline_name: {name}\ntags: [{}]\ndepends_on: [{}]\nsteps:\n  - id: s\n    type: source\n    source_type: csv\n",
            tags.join(", "),
            depends_on.join(", "),
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    /// Chain a -> b -> c, with tags daily={a,b}, slow={b}.
    fn fixture() -> (BTreeMap<String, Pipeline>, Graph) {
        let pipelines: BTreeMap<String, Pipeline> = [
            pipeline("a", &["daily"], &[]),
            pipeline("b", &["daily", "slow"], &["a"]),
            pipeline("c", &[], &["b"]),
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();
        let mut graph = Graph::new();
        for p in pipelines.values() {
            graph.add_node(&p.name);
            for dep in &p.depends_on {
                graph.add_dependency(&p.name, dep);
            }
        }
        (pipelines, graph)
    }

    fn run(selects: &[&str], excludes: &[&str]) -> Result<Vec<String>> {
        let (pipelines, graph) = fixture();
        let selects: Vec<String> = selects.iter().map(|s| (*s).to_string()).collect();
        let excludes: Vec<String> = excludes.iter().map(|s| (*s).to_string()).collect();
        select(&selects, &excludes, &pipelines, &graph)
    }

    #[test]
    fn test_no_select_is_all_in_order() {
        assert_eq!(run(&[], &[]).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_name() {
        assert_eq!(run(&["b"], &[]).unwrap(), vec!["b"]);
    }

    #[test]
    fn test_upstream_closure() {
        assert_eq!(run(&["+b"], &[]).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_downstream_closure() {
        assert_eq!(run(&["b+"], &[]).unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_both_closures() {
        assert_eq!(run(&["+b+"], &[]).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_comma_union_in_topological_order() {
        // Listed out of order; output is topological.
        assert_eq!(run(&["c,a"], &[]).unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_tag_selection() {
        assert_eq!(run(&["tag:daily"], &[]).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_tag_with_exclude() {
        assert_eq!(run(&["tag:daily"], &["tag:slow"]).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_exclude_closure() {
        assert_eq!(run(&[], &["b+"]).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_unknown_name_fails() {
        let err = run(&["nope"], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Selector(_)));
        assert!(err.to_string().contains("unknown pipeline 'nope'"));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let err = run(&["tag:nope"], &[]).unwrap_err();
        assert!(err.to_string().contains("unknown tag 'nope'"));
    }

    #[test]
    fn test_malformed_atom_fails() {
        assert!(run(&["a++b"], &[]).is_err());
        assert!(run(&[""], &[]).is_err());
        assert!(run(&["tag:"], &[]).is_err());
    }

    #[test]
    fn test_parse_atom_shapes() {
        assert_eq!(
            parse_atom("+x+").unwrap(),
            Atom {
                upstream: true,
                downstream: true,
                body: Body::Name("x".into()),
            }
        );
        assert_eq!(
            parse_atom("tag:daily").unwrap(),
            Atom {
                upstream: false,
                downstream: false,
                body: Body::Tag("daily".into()),
            }
        );
    }
}
