//! Request chaining: one request's response actions feed the variables and
//! cookies the next request consumes.

use super::fixture;
use request_engine::actions::{Action, ActionCondition, ActionContext, ActionKind};
use request_engine::factory::ProcessOptions;
use request_engine::models::{HttpMethod, HttpRequest, HttpResponse};
use request_engine::modules::ModulesRegistry;
use request_engine::store::PipelineStore;

fn capture_on_response(variable: &str, value: &str) -> ActionCondition {
    ActionCondition::unconditional(
        ActionContext::Response,
        vec![Action::new(
            ActionContext::Response,
            ActionKind::SetVariable {
                variable: variable.to_string(),
                value: value.to_string(),
            },
        )],
    )
}

#[tokio::test]
async fn test_variable_set_by_first_request_used_by_second() {
    let fx = fixture(ModulesRegistry::new());

    let mut login = HttpRequest::new("chain-1", HttpMethod::POST, "https://${host}/login");
    login
        .actions
        .response
        .push(capture_on_response("session_id", "sess-42"));

    fx.factory
        .run(login, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let mut profile =
        HttpRequest::new("chain-2", HttpMethod::GET, "https://${host}/me/${session_id}");
    profile.add_header("X-Session", "${session_id}");

    fx.factory
        .run(profile, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let seen = fx.transport.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].url, "https://api.example.com/me/sess-42");
    assert_eq!(seen[1].header("X-Session"), Some("sess-42"));
}

#[tokio::test]
async fn test_cookie_set_then_deleted_across_runs() {
    let fx = fixture(ModulesRegistry::new());

    let mut login = HttpRequest::new("chain-3", HttpMethod::POST, "https://${host}/login");
    login.actions.response.push(ActionCondition::unconditional(
        ActionContext::Response,
        vec![Action::new(
            ActionContext::Response,
            ActionKind::SetCookie {
                cookie: "sid".to_string(),
                value: "abc".to_string(),
                url: Some("https://${host}".to_string()),
            },
        )],
    ));

    fx.factory
        .run(login, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let cookies = fx.store.cookies();
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].name, "sid");
    assert_eq!(cookies[0].url.as_deref(), Some("https://api.example.com"));

    let mut logout = HttpRequest::new("chain-4", HttpMethod::POST, "https://${host}/logout");
    logout.actions.response.push(ActionCondition::unconditional(
        ActionContext::Response,
        vec![Action::new(
            ActionContext::Response,
            ActionKind::DeleteCookie {
                cookie: Some("sid".to_string()),
                url: None,
            },
        )],
    ));

    fx.factory
        .run(logout, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert!(fx.store.cookies().is_empty());
}

#[tokio::test]
async fn test_error_response_still_runs_gated_cleanup() {
    let fx = fixture(ModulesRegistry::new());
    fx.transport
        .set_response(HttpResponse::new(503, "Service Unavailable"));

    let mut request = HttpRequest::new("chain-5", HttpMethod::GET, "https://${host}/v1");
    request
        .actions
        .response
        .push(capture_on_response("last_status_seen", "yes"));

    let response = fx
        .factory
        .run(request, &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, 503);
    let snapshot = fx.store.read_environment();
    assert!(snapshot
        .variables
        .iter()
        .any(|v| v.name == "last_status_seen"));
}
