//! Property-based tests using proptest
//!
//! These tests verify reference ordering, cycle rejection, grant merging and
//! route path parsing using randomized descriptors.

use proptest::prelude::*;
use sitestack::resource::{options, AttributeRef, ConfigValue, Options, ResourceKind};
use sitestack::resolve::resolution_order;
use sitestack::route::{Authorization, HttpMethod, RouteBinding, RoutePath};
use sitestack::{synthesize, DeployError, Descriptor, Environment};
use std::collections::{BTreeMap, BTreeSet};

fn function_id(i: usize) -> String {
    format!("fn{}", i)
}

/// `n` functions where function `from` reads `to`'s ARN through an env var
fn function_graph(n: usize, edges: &[(usize, usize)]) -> Descriptor {
    let mut d = Descriptor::new("graph", Environment::new("123456789012", "us-east-1")).unwrap();
    for i in 0..n {
        let env_vars: BTreeMap<String, ConfigValue> = edges
            .iter()
            .filter(|(from, _)| *from == i)
            .map(|(_, to)| {
                (
                    format!("DEP_{}", to),
                    ConfigValue::Ref(AttributeRef::new(&function_id(*to), "arn")),
                )
            })
            .collect();
        let mut config: Options = options([
            ("runtimeId", "nodejs20.x".into()),
            ("handlerEntry", "index.handler".into()),
            ("codeLocation", "dist/".into()),
        ]);
        if !env_vars.is_empty() {
            config.insert("envVars".into(), ConfigValue::Map(env_vars));
        }
        d.declare(&function_id(i), ResourceKind::Function, config).unwrap();
    }
    d
}

/// Reference cycle detection by depth-first search
fn has_cycle(n: usize, edges: &[(usize, usize)]) -> bool {
    fn visit(node: usize, adj: &[Vec<usize>], state: &mut [u8]) -> bool {
        state[node] = 1;
        for &next in &adj[node] {
            if state[next] == 1 || (state[next] == 0 && visit(next, adj, state)) {
                return true;
            }
        }
        state[node] = 2;
        false
    }

    let mut adj = vec![Vec::new(); n];
    for (from, to) in edges {
        adj[*from].push(*to);
    }
    let mut state = vec![0u8; n];
    (0..n).any(|i| state[i] == 0 && visit(i, &adj, &mut state))
}

fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..12)))
}

proptest! {
    /// Acyclic graphs resolve producers first; cyclic ones are rejected
    #[test]
    fn prop_resolution_matches_cycle_check((n, edges) in arb_graph()) {
        let d = function_graph(n, &edges);
        match resolution_order(&d) {
            Ok(order) => {
                prop_assert!(!has_cycle(n, &edges));
                prop_assert_eq!(order.len(), n);
                let position: BTreeMap<&str, usize> = order
                    .iter()
                    .enumerate()
                    .map(|(i, id)| (id.as_str(), i))
                    .collect();
                for (from, to) in &edges {
                    prop_assert!(position[function_id(*to).as_str()] < position[function_id(*from).as_str()]);
                }
            }
            Err(err) => {
                prop_assert!(has_cycle(n, &edges));
                let is_unresolved = matches!(err, DeployError::UnresolvedReference { .. });
                prop_assert!(is_unresolved);
            }
        }
    }

    /// Synthesis of acyclic graphs is deterministic
    #[test]
    fn prop_synthesis_deterministic((n, edges) in arb_graph()) {
        prop_assume!(!has_cycle(n, &edges));
        let first = synthesize(&function_graph(n, &edges)).unwrap();
        let second = synthesize(&function_graph(n, &edges)).unwrap();
        prop_assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
    }

    /// Any sequence of grants yields one statement per target holding the union
    #[test]
    fn prop_grants_merge_per_target(
        grants in prop::collection::vec(
            (0usize..2, prop::sample::subsequence(vec!["read", "write"], 1..=2)),
            1..10,
        )
    ) {
        let mut d = Descriptor::new("grants", Environment::new("123456789012", "us-east-1")).unwrap();
        d.declare(
            "worker",
            ResourceKind::Function,
            options([
                ("runtimeId", "python3.12".into()),
                ("handlerEntry", "app.handler".into()),
                ("codeLocation", "dist/".into()),
            ]),
        )
        .unwrap();
        let targets = ["table-a", "table-b"];
        for target in targets {
            d.declare(
                target,
                ResourceKind::Table,
                options([
                    ("partitionKeyName", "pk".into()),
                    ("partitionKeyType", "STRING".into()),
                ]),
            )
            .unwrap();
        }

        let mut expected: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for (target, actions) in &grants {
            d.grant("worker", targets[*target], actions).unwrap();
            expected
                .entry(targets[*target])
                .or_default()
                .extend(actions.iter().map(|a| a.to_string()));
        }

        let artifact = synthesize(&d).unwrap();
        prop_assert_eq!(artifact.statements.len(), expected.len());
        for statement in &artifact.statements {
            prop_assert_eq!(&statement.actions, &expected[statement.target.as_str()]);
            prop_assert_eq!(statement.resources.len(), 1);
        }
    }

    /// Valid route paths survive a parse/display cycle
    #[test]
    fn prop_route_path_display(segments in prop::collection::vec(
        prop_oneof!["[a-z][a-z0-9-]{0,10}", "\\{[a-z]{1,6}\\}"],
        0..5,
    )) {
        let text = format!("/{}", segments.join("/"));
        let path: RoutePath = text.parse().unwrap();
        prop_assert_eq!(path.to_string(), text);
        prop_assert_eq!(path.prefixes().count(), segments.len());
    }

    /// Paths without a leading slash never parse
    #[test]
    fn prop_route_path_requires_slash(text in "[a-z][a-z/]{0,20}") {
        prop_assert!(text.parse::<RoutePath>().is_err());
    }

    /// Any set of distinct paths on one gateway gets distinct method resources
    #[test]
    fn prop_distinct_paths_synthesize(paths in prop::collection::btree_set(
        prop::collection::vec("[a-zA-Z][a-zA-Z_-]{0,3}", 1..4).prop_map(|s| format!("/{}", s.join("/"))),
        1..8,
    )) {
        let mut d = Descriptor::new("paths", Environment::new("123456789012", "us-east-1")).unwrap();
        d.declare(
            "handler",
            ResourceKind::Function,
            options([
                ("runtimeId", "python3.12".into()),
                ("handlerEntry", "app.handler".into()),
                ("codeLocation", "dist/".into()),
            ]),
        )
        .unwrap();
        d.declare("api", ResourceKind::ApiGateway, Options::new()).unwrap();
        for path in &paths {
            d.bind(RouteBinding::new(
                "api",
                path.parse().unwrap(),
                HttpMethod::Get,
                "handler",
                Authorization::RequireIam,
            ))
            .unwrap();
        }

        let artifact = synthesize(&d).unwrap();
        prop_assert_eq!(
            artifact.template.resources_of_type("AWS::ApiGateway::Method").count(),
            paths.len()
        );
        for path in &paths {
            prop_assert!(artifact.method("api", path, HttpMethod::Get).is_some());
        }
    }
}
