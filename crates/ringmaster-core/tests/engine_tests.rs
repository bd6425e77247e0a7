//! End-to-end engine tests
//!
//! Exercises the assembled runtime: dispatch through the registry, retry
//! behavior, plugin discovery, and the documented boundary cases.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use ringmaster_core::{
    AgentConfig, ParamType, ResultKind, Runtime, ToolDescriptor, ToolError, ToolProvider,
};

fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn runtime() -> Runtime {
    Runtime::builder(AgentConfig::default())
        .with_plugins(false)
        .build()
        .await
        .expect("runtime builds")
}

mod dispatch_scenarios {
    use super::*;

    #[tokio::test]
    async fn arithmetic_through_the_full_stack() {
        let runtime = runtime().await;
        let result = runtime
            .dispatcher()
            .dispatch(
                "calc_calculate",
                args(&[("expression", json!("2 + 3 * 4"))]),
            )
            .await;
        assert_eq!(result.kind, ResultKind::Success);
        assert_eq!(result.payload, json!("14"));
        assert!(result.execution_time >= 0.0);
    }

    #[tokio::test]
    async fn variable_round_trip() {
        let runtime = runtime().await;
        let dispatcher = runtime.dispatcher();

        let result = dispatcher
            .dispatch(
                "calc_set_variable",
                args(&[("name", json!("x")), ("value", json!(10))]),
            )
            .await;
        assert!(result.is_success(), "{}", result.message);

        let result = dispatcher
            .dispatch("calc_calculate", args(&[("expression", json!("x * 2 + 5"))]))
            .await;
        assert_eq!(result.payload, json!("25"));

        dispatcher
            .dispatch("calc_clear_variables", Map::new())
            .await;
        let result = dispatcher
            .dispatch("calc_get_variables", Map::new())
            .await;
        assert_eq!(result.payload, json!({}));
    }

    #[tokio::test]
    async fn division_by_zero_is_reported_not_crashed() {
        let runtime = runtime().await;
        let result = runtime
            .dispatcher()
            .dispatch("calc_calculate", args(&[("expression", json!("1 / 0"))]))
            .await;
        assert_eq!(result.kind, ResultKind::Error);
        assert!(result.message.contains("Division by zero"));
    }

    #[tokio::test]
    async fn todo_creation_from_strings() {
        let runtime = runtime().await;
        let result = runtime
            .dispatcher()
            .dispatch(
                "monitor_create_todos",
                args(&[("todos", json!(["A", "B", "C"]))]),
            )
            .await;
        assert!(result.is_success());
        assert_eq!(result.payload["created"], json!(["todo_1", "todo_2", "todo_3"]));

        let listed = runtime
            .dispatcher()
            .dispatch(
                "monitor_get_current_todos",
                args(&[("include_completed", json!(true))]),
            )
            .await;
        let todos = listed.payload["todos"].as_array().unwrap();
        assert_eq!(todos.len(), 3);
        assert_eq!(todos[0]["content"], "A");
        assert!(todos.iter().all(|t| t["status"] == "pending"));
    }

    #[tokio::test]
    async fn searching_for_error_strings_stays_successful() {
        let runtime = runtime().await;
        // The query text lands in the result payload; shell-error patterns
        // must not reclassify a search result.
        let result = runtime
            .dispatcher()
            .dispatch(
                "websearch_search_web",
                args(&[("query", json!("fatal: not a git repository"))]),
            )
            .await;
        assert!(result.is_success(), "{}", result.message);
        assert!(result.output_validation.is_none());
    }

    #[tokio::test]
    async fn websearch_bounds_are_clamped() {
        let runtime = runtime().await;

        let result = runtime
            .dispatcher()
            .dispatch(
                "websearch_search_web",
                args(&[("query", json!("rust")), ("max_results", json!(100))]),
            )
            .await;
        assert!(result.is_success());
        assert!(result.payload["count"].as_u64().unwrap() <= 10);

        let result = runtime
            .dispatcher()
            .dispatch(
                "websearch_search_web",
                args(&[("query", json!("zero case")), ("max_results", json!(0))]),
            )
            .await;
        assert!(result.is_success());
        assert!(result.payload["count"].as_u64().unwrap() >= 1);
    }
}

mod reliability {
    use super::*;

    /// Fails a fixed number of times, then succeeds. Counts invocations.
    struct FlakyProvider {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Intermittent test provider"
        }

        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![
                ToolDescriptor::new("flaky", "work", "Flaky work unit")
                    .with_param("input", ParamType::String, "Input", true)
                    .with_retries(3, 0.05),
            ]
        }

        async fn call(
            &self,
            _tool: &str,
            _args: &Map<String, Value>,
        ) -> Result<Value, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ToolError::Connection("transient outage".into()))
            } else {
                Ok(json!("recovered"))
            }
        }
    }

    #[tokio::test]
    async fn two_failures_then_success() {
        let runtime = runtime().await;
        let calls = Arc::new(AtomicU32::new(0));
        runtime.registry().register_provider(Arc::new(FlakyProvider {
            failures: 2,
            calls: calls.clone(),
        }));

        let started = std::time::Instant::now();
        let result = runtime
            .dispatcher()
            .dispatch("flaky_work", args(&[("input", json!("x"))]))
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        assert_eq!(result.kind, ResultKind::Success);
        assert_eq!(result.retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff slept base_delay * 1 and base_delay * 2.
        assert!(elapsed >= 0.05 * 3.0, "elapsed {}", elapsed);
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_provider() {
        let runtime = runtime().await;
        let calls = Arc::new(AtomicU32::new(0));
        runtime.registry().register_provider(Arc::new(FlakyProvider {
            failures: 0,
            calls: calls.clone(),
        }));

        let result = runtime.dispatcher().dispatch("flaky_work", Map::new()).await;
        assert_eq!(result.kind, ResultKind::Error);
        assert!(!result.validation_errors.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_count_never_exceeds_budget() {
        let runtime = runtime().await;
        runtime.registry().register_provider(Arc::new(FlakyProvider {
            failures: 99,
            calls: Arc::new(AtomicU32::new(0)),
        }));

        let result = runtime
            .dispatcher()
            .dispatch("flaky_work", args(&[("input", json!("x"))]))
            .await;
        assert_eq!(result.kind, ResultKind::Error);
        assert!(result.retry_count <= 3);
    }
}

mod registry_invariants {
    use super::*;

    #[tokio::test]
    async fn list_and_lookup_agree() {
        let runtime = runtime().await;
        for descriptor in runtime.registry().list() {
            let entry = runtime.registry().lookup(&descriptor.name).unwrap();
            assert_eq!(entry.descriptor.name, descriptor.name);
            assert_eq!(entry.descriptor.provider, descriptor.provider);
        }
    }

    #[tokio::test]
    async fn qualified_names_carry_provider_prefix() {
        let runtime = runtime().await;
        for descriptor in runtime.registry().list() {
            assert!(
                descriptor.name.starts_with(&format!("{}_", descriptor.provider)),
                "{} lacks the {} prefix",
                descriptor.name,
                descriptor.provider
            );
        }
    }

    #[tokio::test]
    async fn stats_accumulate_across_dispatches() {
        let runtime = runtime().await;
        runtime
            .dispatcher()
            .dispatch("calc_calculate", args(&[("expression", json!("1 + 1"))]))
            .await;
        runtime
            .dispatcher()
            .dispatch("calc_calculate", args(&[("expression", json!("2 + 2"))]))
            .await;

        let snapshot = runtime.stats().snapshot();
        assert_eq!(snapshot["tool_calls"]["total"], 2);
        assert_eq!(snapshot["tool_calls"]["succeeded"], 2);
        assert_eq!(snapshot["providers"]["calc"]["calls"], 2);
    }
}

mod plugin_discovery {
    use super::*;

    const MATH_PLUGIN: &str = r#"
[provider]
name = "mathpack"
description = "Extra math tools"

[[tool]]
name = "cube"
description = "Cube of a number"
category = "mathematics"
kind = "expression"
template = "{x}**3"

[tool.params.x]
type = "number"
required = true
"#;

    #[tokio::test]
    async fn discovered_plugin_is_dispatchable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mathpack.toml"), MATH_PLUGIN).unwrap();

        let config = AgentConfig {
            plugin_discovery_paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let runtime = Runtime::builder(config).build().await.unwrap();

        let result = runtime
            .dispatcher()
            .dispatch("mathpack_cube", args(&[("x", json!(3))]))
            .await;
        assert!(result.is_success(), "{}", result.message);
        assert_eq!(result.payload, json!("27"));
    }

    #[tokio::test]
    async fn dangerous_plugin_is_rejected_and_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("evil.toml"),
            "import os\nos.system(\"rm -rf /\")\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("good.toml"), MATH_PLUGIN).unwrap();

        let config = AgentConfig {
            plugin_discovery_paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let runtime = Runtime::builder(config).build().await.unwrap();

        // Only the clean plugin registered anything.
        let counts = runtime.registry().provider_counts();
        assert_eq!(counts.get("mathpack"), Some(&1));

        let records = runtime.plugin_records();
        let rejected = records
            .iter()
            .find(|r| r.path.ends_with("evil.toml"))
            .expect("rejection is recorded");
        match &rejected.status {
            ringmaster_core::PluginStatus::Rejected(reasons) => {
                assert!(reasons.iter().any(|r| r.contains("forbidden import 'os'")));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
