//! End-to-end pipeline tests: variable evaluation, actions and transport
//! working together through `RequestFactory::run`.

use super::fixture;
use request_engine::actions::{
    Action, ActionCondition, ActionContext, ActionKind, Condition, ConditionOperator,
    ConditionSource,
};
use request_engine::factory::ProcessOptions;
use request_engine::models::{HttpMethod, HttpRequest, HttpResponse, TransportMetadata};
use request_engine::modules::ModulesRegistry;
use request_engine::store::PipelineStore;

#[tokio::test]
async fn test_run_evaluates_request_and_delivers_response() {
    let fx = fixture(ModulesRegistry::new());

    let mut request = HttpRequest::new("e2e-1", HttpMethod::GET, "https://${host}/v1/users");
    request.add_header("Authorization", "Bearer ${token}");

    let response = fx
        .factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .expect("pipeline was not aborted");

    assert_eq!(response.status, 200);

    let seen = fx.transport.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "https://api.example.com/v1/users");
    assert_eq!(
        seen[0].header("Authorization"),
        Some("Bearer bearer_token_12345")
    );

    // Record is destroyed once the response is delivered.
    assert!(!fx.factory.tracker().is_active("e2e-1").unwrap());
}

#[tokio::test]
async fn test_request_action_runs_before_transport() {
    let fx = fixture(ModulesRegistry::new());

    let mut request = HttpRequest::new("e2e-2", HttpMethod::GET, "https://${host}/v1");
    request.actions.request.push(ActionCondition::unconditional(
        ActionContext::Request,
        vec![Action::new(
            ActionContext::Request,
            ActionKind::SetVariable {
                variable: "ran".to_string(),
                value: "yes".to_string(),
            },
        )],
    ));

    fx.factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let snapshot = fx.store.read_environment();
    assert!(snapshot.variables.iter().any(|v| v.name == "ran"));
    assert!(fx
        .events
        .published()
        .iter()
        .any(|(topic, _)| topic == "variable.updated"));
}

#[tokio::test]
async fn test_response_action_gated_on_status() {
    let fx = fixture(ModulesRegistry::new());

    let gated = |status: &str, variable: &str| ActionCondition {
        condition: Some(Condition {
            source: ConditionSource::Status,
            operator: ConditionOperator::Equal,
            value: status.to_string(),
            path: None,
        }),
        context: ActionContext::Response,
        actions: vec![Action::new(
            ActionContext::Response,
            ActionKind::SetVariable {
                variable: variable.to_string(),
                value: "seen".to_string(),
            },
        )],
        enabled: true,
    };

    let mut request = HttpRequest::new("e2e-3", HttpMethod::GET, "https://${host}/v1");
    request.actions.response.push(gated("200", "saw_ok"));
    request.actions.response.push(gated("500", "saw_error"));

    fx.factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let snapshot = fx.store.read_environment();
    assert!(snapshot.variables.iter().any(|v| v.name == "saw_ok"));
    assert!(snapshot.variables.iter().all(|v| v.name != "saw_error"));
}

#[tokio::test]
async fn test_failing_request_action_synthesizes_error_response() {
    let fx = fixture(ModulesRegistry::new());
    fx.store.set_fail_writes(true);

    let mut failing = Action::new(
        ActionContext::Request,
        ActionKind::SetVariable {
            variable: "a".to_string(),
            value: "1".to_string(),
        },
    );
    failing.fail_on_error = true;

    let mut request = HttpRequest::new("e2e-4", HttpMethod::GET, "https://${host}/v1");
    request.actions.request.push(ActionCondition::unconditional(
        ActionContext::Request,
        vec![failing],
    ));

    let response = fx
        .factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, 0);
    assert!(response.is_error());

    // The transport was never reached.
    assert!(fx.transport.seen().is_empty());
}

#[tokio::test]
async fn test_actions_across_groups_run_in_priority_order() {
    let fx = fixture(ModulesRegistry::new());

    let group = |priority: i32, value: &str| {
        ActionCondition::unconditional(
            ActionContext::Request,
            vec![Action::new(
                ActionContext::Request,
                ActionKind::SetVariable {
                    variable: "winner".to_string(),
                    value: value.to_string(),
                },
            )
            .with_priority(priority)],
        )
    };

    let mut request = HttpRequest::new("e2e-5", HttpMethod::GET, "https://${host}/v1");
    request.actions.request.push(group(10, "late"));
    request.actions.request.push(group(1, "early"));

    fx.factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let snapshot = fx.store.read_environment();
    let winner = snapshot
        .variables
        .iter()
        .find(|v| v.name == "winner")
        .unwrap();
    assert_eq!(winner.value, "late");
}

#[tokio::test]
async fn test_abort_between_phases_skips_response_processing() {
    let fx = fixture(ModulesRegistry::new());

    let mut request = HttpRequest::new("e2e-abort", HttpMethod::GET, "https://${host}/v1");
    request.actions.response.push(ActionCondition::unconditional(
        ActionContext::Response,
        vec![Action::new(
            ActionContext::Response,
            ActionKind::SetVariable {
                variable: "after_abort".to_string(),
                value: "ran".to_string(),
            },
        )],
    ));

    let processed = fx
        .factory
        .process_request(request, &ProcessOptions::default())
        .await
        .unwrap()
        .expect("pre-processing completes");

    // Abort lands between the two host-driven phases. The record stays
    // flagged, so post-processing must skip its steps.
    fx.factory.abort("e2e-abort").unwrap();

    fx.factory
        .process_response(
            &processed,
            &TransportMetadata::failed(),
            &HttpResponse::ok(),
            &ProcessOptions::default(),
        )
        .await
        .unwrap();

    let snapshot = fx.store.read_environment();
    assert!(snapshot.variables.iter().all(|v| v.name != "after_abort"));
    assert!(!fx.factory.tracker().is_active("e2e-abort").unwrap());
}

#[tokio::test]
async fn test_failing_response_action_still_clears_record() {
    let fx = fixture(ModulesRegistry::new());

    let mut failing = Action::new(
        ActionContext::Response,
        ActionKind::SetVariable {
            variable: "b".to_string(),
            value: "2".to_string(),
        },
    );
    failing.fail_on_error = true;

    let mut request = HttpRequest::new("e2e-leak", HttpMethod::GET, "https://${host}/v1");
    request.actions.response.push(ActionCondition::unconditional(
        ActionContext::Response,
        vec![failing],
    ));

    fx.store.set_fail_writes(true);
    let result = fx.factory.run(request, &ProcessOptions::default()).await;

    assert!(result.is_err());
    assert!(!fx.factory.tracker().is_active("e2e-leak").unwrap());
}

#[tokio::test]
async fn test_grouped_now_is_stable_within_one_run() {
    let fx = fixture(ModulesRegistry::new());

    let mut request = HttpRequest::new("e2e-6", HttpMethod::POST, "https://${host}/v1");
    request.set_payload("${now:run} ${now:run}");

    fx.factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let seen = fx.transport.seen();
    let payload = seen[0].payload.as_deref().unwrap();
    let parts: Vec<&str> = payload.split(' ').collect();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0], parts[1]);
}
