//! Planner integration tests
//!
//! Plans are built against a live registry and executed through the real
//! dispatcher; only the remote-backed steps need a configured host, so the
//! executed plans here run on the monitor and dev providers.

use std::path::PathBuf;
use std::sync::Arc;

use ringmaster_core::{
    AgentConfig, RemoteProvider, Runtime, SshPool, SshSettings, TaskCategory, TaskPlanner,
};

async fn runtime() -> Runtime {
    Runtime::builder(AgentConfig::default())
        .with_plugins(false)
        .build()
        .await
        .expect("runtime builds")
}

/// A remote provider whose pool never connects; registering it is enough
/// for plan construction.
fn offline_remote_provider() -> Arc<RemoteProvider> {
    let settings = SshSettings {
        host: "staging.example.test".into(),
        port: 22,
        user: "deploy".into(),
        key_path: PathBuf::from("/tmp/test_key"),
        connect_timeout: std::time::Duration::from_secs(1),
        idle_ttl: std::time::Duration::from_secs(300),
        max_entries: 5,
    };
    Arc::new(RemoteProvider::new(Arc::new(SshPool::new(settings))))
}

#[tokio::test]
async fn deployment_plan_targets_registered_tools() {
    let runtime = runtime().await;
    runtime
        .registry()
        .register_provider(offline_remote_provider());

    let planner = TaskPlanner::new();
    let plan = planner
        .build_plan("Deploy a web application", runtime.registry())
        .expect("deployment is a complex request");

    assert_eq!(plan.category, TaskCategory::Deployment);
    assert!(plan.steps.len() >= 3);
    for step in &plan.steps {
        assert!(
            runtime.registry().lookup(&step.tool).is_some(),
            "step targets unregistered tool {}",
            step.tool
        );
    }

    let first = &plan.steps[0];
    assert_eq!(first.tool, "monitor_create_todos");
    let todos = first.params["todos"].as_array().unwrap();
    assert!(todos.len() >= 3);
    assert!(todos
        .iter()
        .any(|t| t.as_str().unwrap().to_lowercase().contains("deployment")));
}

#[tokio::test]
async fn executed_plan_completes_and_seeds_todos() {
    // Dev is disabled so the plan only touches providers that succeed in
    // any environment.
    let runtime = Arc::new(
        Runtime::builder(AgentConfig::default())
            .with_plugins(false)
            .with_dev(false)
            .build()
            .await
            .unwrap(),
    );
    let agent = runtime.agent(Arc::new(NeverLlm));

    let report = agent
        .process_query("Deploy a web application")
        .await
        .unwrap();
    assert!(report.contains("Task plan for: Deploy a web application"));
    assert!(report.contains("Completed"));

    // The first plan step seeded the monitor session.
    let listed = runtime
        .dispatcher()
        .dispatch("monitor_get_current_todos", serde_json::Map::new())
        .await;
    assert!(listed.payload["count"].as_u64().unwrap() >= 3);
}

/// Stands in for the remote provider with tools that always fail fast.
struct DownRemote;

#[async_trait::async_trait]
impl ringmaster_core::ToolProvider for DownRemote {
    fn name(&self) -> &str {
        "remote"
    }

    fn description(&self) -> &str {
        "Remote provider stub whose host is down"
    }

    fn tools(&self) -> Vec<ringmaster_core::ToolDescriptor> {
        vec![
            ringmaster_core::ToolDescriptor::new(
                "remote",
                "init_workspace",
                "Create the remote workspace directory",
            ),
            ringmaster_core::ToolDescriptor::new(
                "remote",
                "execute_command",
                "Execute a shell command on the remote host",
            )
            .with_param(
                "command",
                ringmaster_core::ParamType::String,
                "Command to run",
                true,
            ),
        ]
    }

    async fn call(
        &self,
        _tool: &str,
        _args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ringmaster_core::ToolError> {
        Err(ringmaster_core::ToolError::Validation(
            "remote host is not configured".into(),
        ))
    }
}

#[tokio::test]
async fn failing_step_marks_plan_failed_and_stops() {
    let runtime = Arc::new(runtime().await);
    // Remote steps are registered but every remote call fails, so the plan
    // stops at the first remote step.
    runtime.registry().register_provider(Arc::new(DownRemote));
    let agent = runtime.agent(Arc::new(NeverLlm));

    let report = agent
        .process_query("Deploy a web application")
        .await
        .unwrap();
    assert!(report.contains("Failed"), "report: {}", report);
    assert!(report.contains("Error:"));

    let snapshot = runtime.stats().snapshot();
    assert_eq!(snapshot["plans"]["failed"], 1);
}

#[tokio::test]
async fn simple_question_is_not_planned() {
    let runtime = runtime().await;
    let planner = TaskPlanner::new();
    assert!(planner
        .build_plan("What is 2 + 2?", runtime.registry())
        .is_none());
}

/// LLM double that fails the test if the loop consults the model.
struct NeverLlm;

#[async_trait::async_trait]
impl ringmaster_core::LlmClient for NeverLlm {
    async fn complete(
        &self,
        _messages: &[ringmaster_core::ChatMessage],
    ) -> ringmaster_core::Result<String> {
        panic!("the planner path must not call the model");
    }
}
