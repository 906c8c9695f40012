use axum::http::{StatusCode, header};
use axum_test::TestServer;
use serde_json::{Value, json};

use crate::config::AppConfig;
use crate::identity::RequireExplicit;
use crate::server::{IDENTITY_COOKIE, router};
use crate::state::{ServiceState, SharedState, shared_state};
use crate::{Assignment, assign};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ID1: &str = "bcfb3529-0fed-4b05-8414-db3e1d2b11da";
const ID2: &str = "af4a8646-effa-422b-9152-adc07b0fb625";

const CONFIG: &str = r#"
groups = 2

[[experiments]]
name = "Some Test"
groups = 3

[[experiments]]
name = "banner"
subset = 50

[[experiments]]
name = "checkout"
slices = 3
slice = 0
"#;

fn config_state(content: &str) -> SharedState {
    let config = AppConfig::parse(content).expect("invalid test config");
    shared_state(ServiceState::from_config(&config))
}

fn test_server(state: SharedState) -> TestServer {
    TestServer::new(router(state)).expect("failed to create test server")
}

fn default_server() -> TestServer {
    test_server(config_state(CONFIG))
}

async fn assignment_of(server: &TestServer, experiment: &str, identity: &str) -> Value {
    let resp = server
        .get(&format!("/experiments/{experiment}/assignment?identity={identity}"))
        .await;
    resp.assert_status_ok();
    serde_json::from_str(&resp.text()).expect("invalid JSON")
}

// ---------------------------------------------------------------------------
// /health and /experiments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let server = default_server();
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.text(), "ok");
}

#[tokio::test]
async fn experiments_lists_configured_tests() {
    let server = default_server();
    let resp = server.get("/experiments").await;
    resp.assert_status_ok();
    let body: Value = serde_json::from_str(&resp.text()).expect("invalid JSON");
    let names: Vec<&str> = body["experiments"]
        .as_array()
        .expect("experiments must be an array")
        .iter()
        .filter_map(|e| e["name"].as_str())
        .collect();
    assert_eq!(names, ["Some Test", "banner", "checkout"]);
    assert_eq!(body["experiments"][2]["slices"], 3);
    assert!(body["experiments"][0].get("subset").is_none());
}

// ---------------------------------------------------------------------------
// /experiments/{name}/assignment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assignment_uses_query_identity() {
    let server = default_server();

    let body = assignment_of(&server, "Some%20Test", ID1).await;
    assert_eq!(body["experiment"], "Some Test");
    assert_eq!(body["identity"], ID1);
    assert_eq!(body["assignment"], 1);
    assert_eq!(body["bucket"], 1);
    assert_eq!(body["control"], false);

    let body = assignment_of(&server, "Some%20Test", ID2).await;
    assert_eq!(body["assignment"], 2);
}

#[tokio::test]
async fn assignment_outside_subset_is_control() {
    let server = default_server();

    // key values 73 and 51 mod 100, both above the 50% subset
    for id in [ID1, ID2] {
        let body = assignment_of(&server, "banner", id).await;
        assert_eq!(body["assignment"], -1, "identity {id}");
        assert_eq!(body["bucket"], Value::Null);
        assert_eq!(body["control"], true);
    }

    // 49 mod 100 participates and falls back to the default two groups
    let body = assignment_of(&server, "banner", "12345").await;
    assert_eq!(body["assignment"], 1);
}

#[tokio::test]
async fn assignment_matches_library() {
    let config = AppConfig::parse(CONFIG).unwrap();
    let settings = config.settings();
    let server = default_server();

    for i in 0..50 {
        let identity = format!("user-{i}");
        for experiment in &config.experiments {
            let request = experiment.request(Some(identity.clone())).unwrap();
            let expected = assign(&request, &settings, &RequireExplicit).unwrap();
            let path = experiment.name.replace(' ', "%20");
            let body = assignment_of(&server, &path, &identity).await;
            assert_eq!(body["assignment"], expected.as_i64(), "{identity} in {path}");
        }
    }
}

#[tokio::test]
async fn assignment_reads_identity_cookie() {
    let server = default_server();
    let resp = server
        .get("/experiments/Some%20Test/assignment")
        .add_header(header::COOKIE, format!("theme=dark; {IDENTITY_COOKIE}={ID2}"))
        .await;
    resp.assert_status_ok();
    assert!(resp.headers().get(header::SET_COOKIE).is_none());

    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body["identity"], ID2);
    assert_eq!(body["assignment"], 2);
}

#[tokio::test]
async fn query_identity_wins_over_cookie() {
    let server = default_server();
    let resp = server
        .get(&format!("/experiments/Some%20Test/assignment?identity={ID1}"))
        .add_header(header::COOKIE, format!("{IDENTITY_COOKIE}={ID2}"))
        .await;
    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body["identity"], ID1);
}

#[tokio::test]
async fn missing_identity_issues_cookie() {
    let server = default_server();
    let resp = server.get("/experiments/checkout/assignment").await;
    resp.assert_status_ok();

    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("expected a set-cookie header")
        .to_owned();
    let issued = cookie
        .strip_prefix(&format!("{IDENTITY_COOKIE}="))
        .and_then(|rest| rest.split(';').next())
        .expect("unexpected cookie format");

    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body["identity"], issued);

    // the issued identity is stable once the client sends it back
    let again = server
        .get("/experiments/checkout/assignment")
        .add_header(header::COOKIE, format!("{IDENTITY_COOKIE}={issued}"))
        .await;
    assert!(again.headers().get(header::SET_COOKIE).is_none());
    let again: Value = serde_json::from_str(&again.text()).unwrap();
    assert_eq!(again["assignment"], body["assignment"]);
}

#[tokio::test]
async fn unknown_experiment_returns_404() {
    let server = default_server();
    let resp = server
        .get(&format!("/experiments/nope/assignment?identity={ID1}"))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn identical_servers_agree() {
    let server1 = default_server();
    let server2 = default_server();
    for i in 0..100 {
        let identity = format!("visitor-{i}");
        let a = assignment_of(&server1, "banner", &identity).await;
        let b = assignment_of(&server2, "banner", &identity).await;
        assert_eq!(a["assignment"], b["assignment"], "identity {identity}");
    }
}

#[tokio::test]
async fn slices_never_overlap() {
    let servers: Vec<TestServer> = (0..3)
        .map(|slice| {
            test_server(config_state(&format!(
                "groups = 2\n[hash]\nkind = \"murmur3\"\n\n\
                 [[experiments]]\nname = \"checkout\"\nslices = 3\nslice = {slice}\n"
            )))
        })
        .collect();

    for i in 0..200 {
        let identity = format!("visitor-{i}");
        let mut participating = 0;
        for server in &servers {
            let body = assignment_of(server, "checkout", &identity).await;
            if body["control"] == false {
                participating += 1;
            }
        }
        assert_eq!(participating, 1, "identity {identity}");
    }
}

// ---------------------------------------------------------------------------
// /experiments/{name}/groups/{bucket}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn membership_reports_bucket() {
    let server = default_server();

    let resp = server
        .get(&format!("/experiments/Some%20Test/groups/1?identity={ID1}"))
        .await;
    resp.assert_status_ok();
    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body["bucket"], 1);
    assert_eq!(body["member"], true);

    for bucket in [0, 2, 7] {
        let resp = server
            .get(&format!("/experiments/Some%20Test/groups/{bucket}?identity={ID1}"))
            .await;
        let body: Value = serde_json::from_str(&resp.text()).unwrap();
        assert_eq!(body["member"], false, "bucket {bucket}");
    }
}

#[tokio::test]
async fn control_is_member_of_no_bucket() {
    let server = default_server();
    for bucket in 0..2 {
        let resp = server
            .get(&format!("/experiments/banner/groups/{bucket}?identity={ID1}"))
            .await;
        let body: Value = serde_json::from_str(&resp.text()).unwrap();
        assert_eq!(body["member"], false);
    }
}

#[tokio::test]
async fn membership_rejects_non_numeric_bucket() {
    let server = default_server();
    let resp = server
        .get(&format!("/experiments/banner/groups/control?identity={ID1}"))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// /settings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settings_reports_defaults() {
    let server = default_server();
    let resp = server.get("/settings").await;
    resp.assert_status_ok();
    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body, json!({ "groups": 2, "hash": "additive" }));
}

#[tokio::test]
async fn settings_update_changes_assignments() {
    let server = default_server();

    // "12345" + "banner" has key value 221649
    let before = assignment_of(&server, "banner", "12345").await;
    assert_eq!(before["assignment"], 1);

    let resp = server
        .put("/settings")
        .json(&json!({ "groups": 3 }))
        .await;
    resp.assert_status_ok();
    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body, json!({ "groups": 3, "hash": "additive" }));

    let after = assignment_of(&server, "banner", "12345").await;
    assert_eq!(after["assignment"], 0);

    // experiments with their own group count are unaffected
    let fixed = assignment_of(&server, "Some%20Test", ID2).await;
    assert_eq!(fixed["assignment"], 2);
}

#[tokio::test]
async fn settings_update_switches_hasher() {
    let server = default_server();
    let resp = server
        .put("/settings")
        .json(&json!({ "hash": { "kind": "murmur3", "seed": 73 } }))
        .await;
    resp.assert_status_ok();
    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(body, json!({ "groups": 2, "hash": "murmur3" }));
}

#[tokio::test]
async fn settings_rejects_zero_groups() {
    let server = default_server();
    let resp = server
        .put("/settings")
        .json(&json!({ "groups": 0 }))
        .await;
    resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_str(&resp.text()).unwrap();
    assert!(body["error"].as_str().unwrap().contains("groups"));

    // previous settings stay in place
    let current: Value = serde_json::from_str(&server.get("/settings").await.text()).unwrap();
    assert_eq!(current["groups"], 2);
}

#[tokio::test]
async fn unchanged_control_after_settings_update() {
    let state = config_state(CONFIG);
    let server = test_server(state.clone());
    server
        .put("/settings")
        .json(&json!({ "groups": 5 }))
        .await
        .assert_status_ok();

    assert_eq!(state.load().settings.groups, Some(5));
    let body = assignment_of(&server, "banner", ID1).await;
    assert_eq!(body["assignment"], Assignment::Control.as_i64());
}
