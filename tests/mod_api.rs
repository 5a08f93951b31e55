use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use hospital_registry::Registry;
use hospital_registry::config::AppConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> Router {
    Registry::new(&AppConfig::default()).router()
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

fn hospital(first: &str, last: &str, email: &str) -> Value {
    json!({
        "basic": {
            "firstName": first,
            "lastName": last,
            "email": email,
            "password": "Secret#1",
            "zipCode": "10001",
            "roles": [{ "name": "agent" }]
        }
    })
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, out) = call(app, Method::POST, "/hospitals/save", Some(body), None).await;
    assert_eq!(status, StatusCode::CREATED, "{out}");
    out["result"].clone()
}

#[tokio::test]
async fn create_returns_stored_record_without_password() {
    let app = app();
    let rec = create(&app, hospital("Ann", "Lee", "Ann@Example.COM")).await;
    assert_eq!(rec["basic"]["email"], "ann@example.com");
    assert!(rec["basic"].get("password").is_none());
    assert_eq!(rec["isActive"], false);
    assert_eq!(rec["userStatus"], "Not Verified");
    assert!(rec["basic"]["profileImageURL"].as_str().is_some_and(|u| !u.is_empty()));
    assert!(rec["createdAt"].is_i64());

    let id = rec["_id"].as_str().unwrap();
    let (status, fetched) = call(&app, Method::GET, &format!("/hospitals/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["_id"], id);

    let (status, by_email) = call(&app, Method::GET, "/hospitals/by-email/ANN@example.com", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_email["_id"], id);
}

#[tokio::test]
async fn duplicate_email_is_conflict_regardless_of_case() {
    let app = app();
    create(&app, hospital("Ann", "Lee", "ann@example.com")).await;
    let (status, out) =
        call(&app, Method::POST, "/hospitals/save", Some(hospital("Other", "One", "ANN@example.com")), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(out["error"]["code"], "ALREADY_EXISTS");

    let (_, all) = call(&app, Method::GET, "/hospitals/getAll", None, None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_any_write() {
    let app = app();
    let (status, out) = call(
        &app,
        Method::POST,
        "/hospitals/save",
        Some(json!({ "basic": { "firstName": "A", "email": "not-an-email" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(out["error"]["code"], "VALIDATION_FAILED");
    let fields: Vec<&str> =
        out["error"]["details"].as_array().unwrap().iter().filter_map(|d| d["field"].as_str()).collect();
    assert!(fields.contains(&"basic.email"));
    assert!(fields.contains(&"basic.lastName"));
    assert!(fields.contains(&"basic.zipCode"));

    let (_, all) = call(&app, Method::GET, "/hospitals/getAll", None, None).await;
    assert_eq!(all, json!([]));
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let app = app();
    let (status, out) = call(&app, Method::GET, "/hospitals/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(out["error"]["code"], "NOT_FOUND");
    let (status, _) =
        call(&app, Method::PUT, "/hospitals/update/missing", Some(json!({ "programName": "x" })), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_paginates_and_counts_the_full_match() {
    let app = app();
    for i in 0..25 {
        create(&app, hospital(&format!("User{i}"), "Test", &format!("user{i}@example.com"))).await;
    }
    let (status, page) = call(&app, Method::GET, "/hospitals?pageNumber=3&limit=10", None, None).await;
    assert_eq!(status, StatusCode::OK, "{page}");
    assert_eq!(page["total"], 25);
    assert_eq!(page["pageNumber"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 5);
    assert!(page["items"][0]["fullName"].as_str().unwrap().ends_with(" Test"));
    assert!(page["items"][0]["basic"].get("password").is_none());

    let (_, default_page) = call(&app, Method::GET, "/hospitals", None, None).await;
    assert_eq!(default_page["limit"], 10);
    assert_eq!(default_page["items"].as_array().unwrap().len(), 10);

    let (_, past_end) = call(&app, Method::GET, "/hospitals?pageNumber=9&limit=10", None, None).await;
    assert_eq!(past_end["items"], json!([]));
    assert_eq!(past_end["total"], 25);

    // a bare `+` decodes to a space in a query string
    for uri in ["/hospitals?order=+1", "/hospitals?order=%2B1", "/hospitals?order=1"] {
        let (status, asc) = call(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {asc}");
        let created: Vec<i64> =
            asc["items"].as_array().unwrap().iter().map(|r| r["createdAt"].as_i64().unwrap()).collect();
        assert!(created.windows(2).all(|w| w[0] <= w[1]), "{uri}");
    }
}

#[tokio::test]
async fn listing_rejects_bad_parameters() {
    let app = app();
    for uri in [
        "/hospitals?pageNumber=0",
        "/hospitals?limit=0",
        "/hospitals?limit=101",
        "/hospitals?key=42",
        "/hospitals?pageNumber=abc",
        "/hospitals?order=up",
        "/hospitals?order=0",
    ] {
        let (status, out) = call(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(out["error"]["code"], "INVALID_PARAMETER", "{uri}");
    }
}

#[tokio::test]
async fn pattern_matches_name_or_email_literally() {
    let app = app();
    create(&app, hospital("Alice", "Smith", "a@x.org")).await;
    create(&app, hospital("Bob", "Jones", "bob@y.org")).await;
    create(&app, hospital("Carol", "Axe", "carol@z.org")).await;

    let (_, page) = call(&app, Method::GET, "/hospitals?pattern=a%40x", None, None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["basic"]["email"], "a@x.org");

    let (_, page) = call(&app, Method::GET, "/hospitals?pattern=JONES", None, None).await;
    assert_eq!(page["total"], 1);

    // regex metacharacters are literal
    let (_, page) = call(&app, Method::GET, "/hospitals?pattern=.%2A", None, None).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn update_merges_fields_and_guards_email() {
    let app = app();
    let a = create(&app, hospital("Ann", "Lee", "ann@example.com")).await;
    create(&app, hospital("Bo", "Kim", "bo@example.com")).await;
    let id = a["_id"].as_str().unwrap();

    let (status, out) = call(
        &app,
        Method::PUT,
        &format!("/hospitals/update/{id}"),
        Some(json!({ "basic": { "firstName": "Anne" }, "programName": "Gold" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{out}");
    assert_eq!(out["result"]["basic"]["firstName"], "Anne");
    assert_eq!(out["result"]["basic"]["lastName"], "Lee");
    assert_eq!(out["result"]["programName"], "Gold");

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/hospitals/update/{id}"),
        Some(json!({ "basic": { "email": "BO@example.com" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, out) =
        call(&app, Method::PUT, &format!("/hospitals/update/{id}"), Some(json!({ "_id": "other" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(out["error"]["code"], "VALIDATION_FAILED");

    let (_, avail) =
        call(&app, Method::GET, &format!("/hospitals/email-available?email=ann@example.com&id={id}"), None, None).await;
    assert_eq!(avail["available"], true);
    let (_, avail) = call(&app, Method::GET, "/hospitals/email-available?email=bo@example.com", None, None).await;
    assert_eq!(avail["available"], false);
}

#[tokio::test]
async fn status_fields_and_dotted_keys_cannot_be_patched() {
    let app = app();
    let rec = create(&app, hospital("Ann", "Lee", "ann@example.com")).await;
    let id = rec["_id"].as_str().unwrap();
    let uri = format!("/hospitals/update/{id}");

    let (status, out) = call(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "userStatus": "Verified", "isActive": true, "sessionStatus": "Active" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{out}");
    assert_eq!(out["error"]["code"], "VALIDATION_FAILED");

    let (status, _) = call(&app, Method::PUT, &uri, Some(json!({ "basic": { "isActive": true } })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, out) = call(&app, Method::PUT, &uri, Some(json!({ "basic.email": "not an email" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{out}");
    assert_eq!(out["error"]["code"], "VALIDATION_FAILED");

    let (_, now) = call(&app, Method::GET, &format!("/hospitals/{id}"), None, None).await;
    assert_eq!(now["isActive"], false);
    assert_eq!(now["basic"]["isActive"], false);
    assert_eq!(now["basic"]["email"], "ann@example.com");
    assert_ne!(now["userStatus"], "Verified");
    assert_ne!(now["sessionStatus"], "Active");
}

#[tokio::test]
async fn stats_histogram_per_owner() {
    let app = app();
    let with_roles = |email: &str, agent: &str, roles: &[&str]| {
        let mut body = hospital("X", "Y", email);
        body["basic"]["roles"] = Value::Array(roles.iter().map(|r| json!({ "name": r })).collect());
        body["agentId"] = json!(agent);
        body
    };
    create(&app, with_roles("h1@x.org", "ag1", &["admin", "agent"])).await;
    create(&app, with_roles("h2@x.org", "ag1", &["agent"])).await;
    create(&app, with_roles("h3@x.org", "ag2", &["admin"])).await;

    let (status, stats) = call(&app, Method::GET, "/hospitals/stats?agentId=ag1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats, json!({ "admin": 1, "agent": 2 }));

    let (_, none) = call(&app, Method::GET, "/hospitals/stats?brokerId=nobody", None, None).await;
    assert_eq!(none, json!({}));

    let (status, _) = call(&app, Method::GET, "/hospitals/stats", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::GET, "/hospitals/stats?agentId=a&brokerId=b", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unpaid_report_and_deactivation_sweep() {
    let app = app();
    let mut body = hospital("Pat", "Due", "pat@x.org");
    body["planId"] = json!("basic");
    body["planExpiry"] = json!(1_000);
    let rec = create(&app, body).await;
    let id = rec["_id"].as_str().unwrap();
    let (_, issued) = call(&app, Method::POST, "/generateCode", Some(json!({ "email": "pat@x.org" })), None).await;
    let (status, verified) = call(
        &app,
        Method::POST,
        "/verifyCode",
        Some(json!({ "email": "pat@x.org", "code": issued["code"] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["result"]["isActive"], true);
    // paid members never show up
    let mut paid = hospital("Pay", "Ok", "paid@x.org");
    paid["isPaidMember"] = json!(true);
    paid["planExpiry"] = json!(1_000);
    create(&app, paid).await;

    let (status, rows) = call(&app, Method::GET, "/hospitals/reports/unpaid?cutoff=2000", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        rows,
        json!([{ "id": id, "name": "Pat Due", "email": "pat@x.org", "roleName": "agent", "planId": "basic", "planExpiry": 1000 }])
    );
    let (_, before_expiry) = call(&app, Method::GET, "/hospitals/reports/unpaid?cutoff=500", None, None).await;
    assert_eq!(before_expiry, json!([]));

    let (_, first) = call(&app, Method::POST, "/hospitals/deactivate-expired?cutoff=2000", None, None).await;
    assert_eq!(first, json!({ "matched": 1, "modified": 1 }));
    let (_, second) = call(&app, Method::POST, "/hospitals/deactivate-expired?cutoff=2000", None, None).await;
    assert_eq!(second, json!({ "matched": 0, "modified": 0 }));

    let (_, after) = call(&app, Method::GET, &format!("/hospitals/{id}"), None, None).await;
    assert_eq!(after["isActive"], false);
}

#[tokio::test]
async fn roles_resolve_on_read() {
    let app = app();
    let (status, role) =
        call(&app, Method::POST, "/roles", Some(json!({ "name": "admin", "permissions": ["all"] })), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = role["result"]["_id"].as_str().unwrap().to_string();

    let mut body = hospital("R", "S", "r@x.org");
    body["basic"]["roles"] = json!([{ "name": "admin", "roleRef": role_id }, { "name": "ghost", "roleRef": "gone" }]);
    let rec = create(&app, body).await;
    assert_eq!(rec["basic"]["roles"][0]["resolved"]["permissions"], json!(["all"]));
    assert!(rec["basic"]["roles"][1].get("resolved").is_none());

    let (_, roles) = call(&app, Method::GET, "/roles", None, None).await;
    assert_eq!(roles.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn login_logout_and_change_password() {
    let app = app();
    create(&app, hospital("Ann", "Lee", "ann@example.com")).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/login",
        Some(json!({ "email": "ann@example.com", "password": "wrong" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, out) = call(
        &app,
        Method::POST,
        "/login",
        Some(json!({ "email": "ANN@example.com", "password": "Secret#1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{out}");
    let token = out["token"].as_str().unwrap().to_string();
    assert_eq!(out["user"]["sessionStatus"], "Active");
    assert!(out["user"]["basic"].get("password").is_none());

    let (status, _) = call(
        &app,
        Method::PUT,
        "/changePassword",
        Some(json!({ "oldPassword": "Secret#1", "newPassword": "Fresh#2", "confirmPassword": "Nope" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/changePassword",
        Some(json!({ "oldPassword": "Secret#1", "newPassword": "Fresh#2", "confirmPassword": "Fresh#2" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // the auth scheme is matched case-insensitively
    let req = Request::builder()
        .method(Method::GET)
        .uri("/logout")
        .header(header::AUTHORIZATION, format!("bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let out: Value = serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(out, json!({ "loggedOut": true }));
    let (status, _) = call(&app, Method::GET, "/logout", None, Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/logout", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let req = Request::builder()
        .uri("/logout")
        .header(header::AUTHORIZATION, format!("Basic {token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::POST,
        "/login",
        Some(json!({ "email": "ann@example.com", "password": "Fresh#2" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn verification_code_marks_record_verified_once() {
    let app = app();
    create(&app, hospital("Ann", "Lee", "ann@example.com")).await;

    let (status, _) = call(&app, Method::POST, "/generateCode", Some(json!({ "email": "no@example.com" })), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, issued) =
        call(&app, Method::POST, "/generateCode", Some(json!({ "email": "ann@example.com" })), None).await;
    assert_eq!(status, StatusCode::OK);
    let code = issued["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, _) = call(
        &app,
        Method::POST,
        "/verifyCode",
        Some(json!({ "email": "ann@example.com", "code": wrong })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, out) = call(
        &app,
        Method::POST,
        "/verifyCode",
        Some(json!({ "email": "ann@example.com", "code": code })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{out}");
    assert_eq!(out["result"]["userStatus"], "Verified");

    let (status, _) = call(
        &app,
        Method::POST,
        "/verifyCode",
        Some(json!({ "email": "ann@example.com", "code": code })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
