use cafe_backoffice::{
    AppConfig, AppState, MemoryRepository, create_router,
    error::ErrorBody,
    models::{Attendance, Branch, DashboardStats, NewUser, Role, User},
    password,
    repository::{Repository, RepositoryState},
};
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// --- Test Harness ---

struct TestApp {
    address: String,
    repo: Arc<MemoryRepository>,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed")
    }

    /// Seeds an account through the repository and logs it in over HTTP.
    async fn signed_in(&self, role: Role, branch_id: Option<Uuid>) -> (User, String) {
        let email = format!("{}@brew.test", Uuid::new_v4());
        let user = self
            .repo
            .create_user(NewUser {
                name: format!("{role} {}", &email[..8]),
                email: email.clone(),
                password_hash: password::hash_password("espresso-shot").unwrap(),
                role,
                branch_id,
            })
            .await
            .unwrap();

        let response = self.login(&email, "espresso-shot").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        (user, body["token"].as_str().unwrap().to_string())
    }
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        client: reqwest::Client::new(),
    }
}

async fn create_branch(app: &TestApp, token: &str, name: &str) -> Branch {
    let response = app
        .client
        .post(app.url("/admin/branches"))
        .bearer_auth(token)
        .json(&json!({ "name": name, "address": "1 Roastery Lane", "phone": "555-0100" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

// --- Login ---

#[tokio::test]
async fn test_login_returns_token_and_hides_secrets() {
    let app = spawn_app().await;
    let (user, token) = app.signed_in(Role::Owner, None).await;

    assert_eq!(token.len(), password::TOKEN_LEN);

    // Email lookup ignores case.
    let response = app.login(&user.email.to_uppercase(), "espresso-shot").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user"]["id"], user.id.to_string());
    assert_eq!(body["user"]["role"], "Owner");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["user"].get("remember_token").is_none());
}

#[tokio::test]
async fn test_login_rejections() {
    let app = spawn_app().await;
    let (user, _) = app.signed_in(Role::Owner, None).await;

    let response = app.login(&user.email, "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.message, "Invalid email or password");

    let response = app.login("nobody@brew.test", "espresso-shot").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.message, "Invalid email or password");

    let response = app.login("  ", "").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- Users ---

#[tokio::test]
async fn test_user_lifecycle() {
    let app = spawn_app().await;
    let (owner, token) = app.signed_in(Role::Owner, None).await;
    let branch = create_branch(&app, &token, "Canal Side").await;

    // Create
    let response = app
        .client
        .post(app.url("/admin/users"))
        .bearer_auth(&token)
        .json(&json!({
            "name": "Ada Barista",
            "email": "ada@brew.test",
            "password": "steamed-milk",
            "role": "Barista",
            "branch_id": branch.id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: User = response.json().await.unwrap();
    assert_eq!(created.role, Role::Barista);
    assert_eq!(created.branch_id, Some(branch.id));

    // The new account can log in with the password it was given.
    assert_eq!(
        app.login("ada@brew.test", "steamed-milk").await.status(),
        StatusCode::OK
    );

    // Read
    let response = app
        .client
        .get(app.url(&format!("/admin/users/{}", created.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let users: Vec<User> = app
        .client
        .get(app.url("/admin/users"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(users.len(), 2);

    // Update: promote to Owner, no branch needed.
    let response = app
        .client
        .put(app.url(&format!("/admin/users/{}", created.id)))
        .bearer_auth(&token)
        .json(&json!({ "name": "Ada Lead", "role": "Owner" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: User = response.json().await.unwrap();
    assert_eq!(updated.name, "Ada Lead");
    assert_eq!(updated.role, Role::Owner);
    assert_eq!(updated.email, "ada@brew.test");

    // Delete
    let response = app
        .client
        .delete(app.url(&format!("/admin/users/{}", created.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .client
        .get(app.url(&format!("/admin/users/{}", created.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Self-deletion is refused.
    let response = app
        .client
        .delete(app.url(&format!("/admin/users/{}", owner.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_user_validation() {
    let app = spawn_app().await;
    let (owner, token) = app.signed_in(Role::Owner, None).await;
    let branch = create_branch(&app, &token, "Market Square").await;

    let base = json!({
        "name": "Sam Cashier",
        "email": "sam@brew.test",
        "password": "flat-white",
        "role": "Cashier",
        "branch_id": branch.id
    });

    let cases = [
        ("name", json!("   ")),
        ("email", json!("not-an-email")),
        ("password", json!("short")),
        ("branch_id", json!(null)),
        ("branch_id", json!(Uuid::new_v4())),
    ];

    for (field, value) in cases {
        let mut payload = base.clone();
        payload[field] = value;
        let response = app
            .client
            .post(app.url("/admin/users"))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "{field} should be rejected"
        );
    }

    // Duplicate email, regardless of case.
    let mut payload = base.clone();
    payload["email"] = json!(owner.email.to_uppercase());
    let response = app
        .client
        .post(app.url("/admin/users"))
        .bearer_auth(&token)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_demoting_to_branch_role_requires_branch() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in(Role::Owner, None).await;
    let (other_owner, _) = app.signed_in(Role::Owner, None).await;

    let response = app
        .client
        .put(app.url(&format!("/admin/users/{}", other_owner.id)))
        .bearer_auth(&token)
        .json(&json!({ "role": "Cashier" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .client
        .put(app.url(&format!("/admin/users/{}", Uuid::new_v4())))
        .bearer_auth(&token)
        .json(&json!({ "name": "Ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Branches ---

#[tokio::test]
async fn test_branch_lifecycle() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in(Role::SuperAdmin, None).await;

    let branch = create_branch(&app, &token, "Old Town").await;
    assert_eq!(branch.phone.as_deref(), Some("555-0100"));

    let response = app
        .client
        .put(app.url(&format!("/admin/branches/{}", branch.id)))
        .bearer_auth(&token)
        .json(&json!({ "name": "Old Town Roastery" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Branch = response.json().await.unwrap();
    assert_eq!(updated.name, "Old Town Roastery");
    assert_eq!(updated.address, branch.address);

    // A branch with assigned staff cannot be deleted.
    app.signed_in(Role::Cashier, Some(branch.id)).await;
    let response = app
        .client
        .delete(app.url(&format!("/admin/branches/{}", branch.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let empty = create_branch(&app, &token, "Pop-up").await;
    let response = app
        .client
        .delete(app.url(&format!("/admin/branches/{}", empty.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .client
        .get(app.url(&format!("/admin/branches/{}", empty.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let branches: Vec<Branch> = app
        .client
        .get(app.url("/admin/branches"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(branches.len(), 1);
}

#[tokio::test]
async fn test_update_branch_normalizes_phone() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in(Role::Owner, None).await;
    let branch = create_branch(&app, &token, "Dockside").await;

    let update_phone = |phone: &'static str| {
        app.client
            .put(app.url(&format!("/admin/branches/{}", branch.id)))
            .bearer_auth(&token)
            .json(&json!({ "phone": phone }))
            .send()
    };

    // Blank input is never stored.
    let response = update_phone("   ").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Branch = response.json().await.unwrap();
    assert_eq!(updated.phone.as_deref(), Some("555-0100"));

    let response = update_phone("  555-0199 ").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Branch = response.json().await.unwrap();
    assert_eq!(updated.phone.as_deref(), Some("555-0199"));
}

#[tokio::test]
async fn test_create_branch_requires_name_and_address() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in(Role::Owner, None).await;

    for payload in [
        json!({ "name": "", "address": "2 Bean Road" }),
        json!({ "name": "Bean Road", "address": "  " }),
    ] {
        let response = app
            .client
            .post(app.url("/admin/branches"))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

// --- Attendance ---

#[tokio::test]
async fn test_clock_in_and_out() {
    let app = spawn_app().await;
    let (_, admin_token) = app.signed_in(Role::Owner, None).await;
    let branch = create_branch(&app, &admin_token, "Riverside").await;
    let (barista, token) = app.signed_in(Role::Barista, Some(branch.id)).await;

    let clock_in = || {
        app.client
            .post(app.url("/attendance/clock-in"))
            .bearer_auth(&token)
            .send()
    };
    let clock_out = || {
        app.client
            .post(app.url("/attendance/clock-out"))
            .bearer_auth(&token)
            .send()
    };

    let response = clock_in().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let opened: Attendance = response.json().await.unwrap();
    assert_eq!(opened.user_id, barista.id);
    assert_eq!(opened.branch_id, branch.id);
    assert!(opened.clock_out.is_none());

    assert_eq!(clock_in().await.unwrap().status(), StatusCode::CONFLICT);

    let stats: DashboardStats = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        stats,
        DashboardStats {
            total_users: 2,
            total_branches: 1,
            staff_on_shift: 1,
            attendance_today: 1,
        }
    );

    let response = clock_out().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let closed: Attendance = response.json().await.unwrap();
    assert_eq!(closed.id, opened.id);
    assert!(closed.clock_out.is_some());

    assert_eq!(clock_out().await.unwrap().status(), StatusCode::NOT_FOUND);

    // A second shift the same day; history is newest first.
    assert_eq!(clock_in().await.unwrap().status(), StatusCode::CREATED);
    let history: Vec<Attendance> = app
        .client
        .get(app.url("/attendance"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].clock_in >= history[1].clock_in);
    assert!(history[0].clock_out.is_none());
}

// --- Branch Manager ---

#[tokio::test]
async fn test_manager_views_are_scoped_to_own_branch() {
    let app = spawn_app().await;
    let (_, admin_token) = app.signed_in(Role::Owner, None).await;
    let home = create_branch(&app, &admin_token, "Home").await;
    let away = create_branch(&app, &admin_token, "Away").await;

    let (manager, manager_token) = app.signed_in(Role::BranchManager, Some(home.id)).await;
    let (cashier, cashier_token) = app.signed_in(Role::Cashier, Some(home.id)).await;
    let (_, away_token) = app.signed_in(Role::Cashier, Some(away.id)).await;

    for token in [&cashier_token, &away_token] {
        let response = app
            .client
            .post(app.url("/attendance/clock-in"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let staff: Vec<User> = app
        .client
        .get(app.url("/manager/staff"))
        .bearer_auth(&manager_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = staff.iter().map(|u| u.id).collect();
    ids.sort();
    let mut expected = vec![manager.id, cashier.id];
    expected.sort();
    assert_eq!(ids, expected);

    let attendance: Vec<Attendance> = app
        .client
        .get(app.url("/manager/attendance"))
        .bearer_auth(&manager_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(attendance.len(), 1);
    assert_eq!(attendance[0].user_id, cashier.id);

    let today = Utc::now().date_naive();
    let filtered: Vec<Attendance> = app
        .client
        .get(app.url(&format!("/manager/attendance?date={today}")))
        .bearer_auth(&manager_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);

    let past: Vec<Attendance> = app
        .client
        .get(app.url("/manager/attendance?date=2001-01-01"))
        .bearer_auth(&manager_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(past.is_empty());
}
