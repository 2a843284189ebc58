use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use stagebill_auth::{JwtClaims, Role};
use stagebill_core::{AggregateId, OrganizationId, UserId};
use stagebill_infra::{BillingConfig, BillingService};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let billing = Arc::new(BillingService::new(BillingConfig::default()));
        let app = stagebill_api::app::build_app(SECRET.to_string(), billing);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt_with(organization_id: OrganizationId, role: &'static str, ttl: ChronoDuration) -> String {
    let issued_at = Utc::now() - ChronoDuration::minutes(1);
    let claims = JwtClaims {
        sub: UserId::new(),
        organization_id,
        roles: vec![Role::new(role)],
        issued_at,
        expires_at: issued_at + ttl,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn mint_jwt(organization_id: OrganizationId, role: &'static str) -> String {
    mint_jwt_with(organization_id, role, ChronoDuration::minutes(10))
}

fn dec(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn invoice_body(phase_id: Option<AggregateId>) -> Value {
    json!({
        "project_id": AggregateId::new().to_string(),
        "phase_id": phase_id.map(|p| p.to_string()),
        "client_id": AggregateId::new().to_string(),
        "tax_rate": "10",
        "items": [
            {"description": "Design", "item_type": "fixed_fee", "quantity": "2", "unit_price": "100"},
            {"description": "Travel", "item_type": "expense", "quantity": "1", "unit_price": "50"},
        ],
    })
}

async fn create_invoice(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    body: &Value,
) -> Value {
    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt_with(OrganizationId::new(), "admin", ChronoDuration::seconds(30));

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn organization_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let token = mint_jwt(org, "accountant");

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["organization_id"].as_str().unwrap(), org.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "accountant"));
}

#[tokio::test]
async fn viewers_cannot_create_invoices() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(OrganizationId::new(), "viewer");

    let res = reqwest::Client::new()
        .post(srv.url("/invoices"))
        .bearer_auth(token)
        .json(&invoice_body(None))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn invoice_lifecycle_create_send_pay_report() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(OrganizationId::new(), "accountant");

    let created = create_invoice(&client, &srv, &token, &invoice_body(None)).await;
    assert_eq!(created["status"], "draft");
    assert_eq!(created["invoice_number"], "INV-00001");
    assert_eq!(dec(&created["subtotal"]), Decimal::from(250));
    assert_eq!(dec(&created["tax_amount"]), Decimal::from(25));
    assert_eq!(dec(&created["total_amount"]), Decimal::from(275));
    let id = created["id"].as_str().unwrap().to_string();

    // No body: nothing to email, still sent.
    let res = client
        .post(srv.url(&format!("/invoices/{id}/send")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let sent: Value = res.json().await.unwrap();
    assert_eq!(sent["invoice"]["status"], "sent");
    assert_eq!(sent["email"]["status"], "skipped");

    let today = Utc::now().date_naive().to_string();
    let res = client
        .post(srv.url(&format!("/invoices/{id}/payments")))
        .bearer_auth(&token)
        .json(&json!({"amount": "274", "payment_date": today}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "amount_mismatch");

    let res = client
        .post(srv.url(&format!("/invoices/{id}/payments")))
        .bearer_auth(&token)
        .json(&json!({"amount": "275", "payment_date": today}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let paid: Value = res.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
    assert_eq!(dec(&paid["balance_amount"]), Decimal::ZERO);

    let res = client
        .get(srv.url("/reports/overall"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let overall: Value = res.json().await.unwrap();
    assert_eq!(dec(&overall["total_paid"]), Decimal::from(275));
    assert_eq!(dec(&overall["collection_rate"]), Decimal::from(100));
    assert_eq!(overall["count"], 1);
}

#[tokio::test]
async fn draft_edits_recompute_totals_and_sent_invoices_are_locked() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(OrganizationId::new(), "accountant");

    let created = create_invoice(&client, &srv, &token, &invoice_body(None)).await;
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .delete(srv.url(&format!("/invoices/{id}/items/2")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let edited: Value = res.json().await.unwrap();
    assert_eq!(dec(&edited["total_amount"]), Decimal::from(220));

    let res = client
        .put(srv.url(&format!("/invoices/{id}/tax-rate")))
        .bearer_auth(&token)
        .json(&json!({"tax_rate": "0"}))
        .send()
        .await
        .unwrap();
    let edited: Value = res.json().await.unwrap();
    assert_eq!(dec(&edited["total_amount"]), Decimal::from(200));

    client
        .post(srv.url(&format!("/invoices/{id}/send")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let res = client
        .post(srv.url(&format!("/invoices/{id}/items")))
        .bearer_auth(&token)
        .json(&json!({"description": "Extra", "item_type": "other", "quantity": "1", "unit_price": "5"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn incomplete_phase_blocks_invoicing_until_every_deliverable_is_done() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let org = OrganizationId::new();
    let manager = mint_jwt(org, "manager");
    let accountant = mint_jwt(org, "accountant");
    let phase = AggregateId::new();

    let res = client
        .post(srv.url(&format!("/phases/{phase}/deliverables")))
        .bearer_auth(&manager)
        .json(&json!({"names": ["Wireframes", "Build", "Launch"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let adopted: Value = res.json().await.unwrap();
    let ids: Vec<String> = adopted["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 3);

    for id in &ids[..2] {
        let res = client
            .post(srv.url(&format!("/phases/{phase}/deliverables/{id}/toggle")))
            .bearer_auth(&manager)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(&accountant)
        .json(&invoice_body(Some(phase)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");

    client
        .post(srv.url(&format!("/phases/{phase}/deliverables/{}/toggle", ids[2])))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();

    let res = client
        .get(srv.url(&format!("/phases/{phase}/summary")))
        .bearer_auth(&accountant)
        .send()
        .await
        .unwrap();
    let summary: Value = res.json().await.unwrap();
    assert_eq!(summary["can_invoice"], true);
    assert_eq!(summary["summary"]["complete"], 3);

    create_invoice(&client, &srv, &accountant, &invoice_body(Some(phase))).await;
}

#[tokio::test]
async fn past_due_invoices_read_back_as_overdue() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(OrganizationId::new(), "accountant");

    let today = Utc::now().date_naive();
    let mut body = invoice_body(None);
    body["issue_date"] = json!((today - ChronoDuration::days(30)).to_string());
    body["due_date"] = json!((today - ChronoDuration::days(1)).to_string());
    let created = create_invoice(&client, &srv, &token, &body).await;
    let id = created["id"].as_str().unwrap().to_string();

    client
        .post(srv.url(&format!("/invoices/{id}/send")))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    let res = client
        .get(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let invoice: Value = res.json().await.unwrap();
    assert_eq!(invoice["status"], "overdue");

    let res = client
        .get(srv.url(&format!("/invoices/{id}/document")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[reqwest::header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(res.text().await.unwrap().contains("INV-00001"));
}

#[tokio::test]
async fn invoices_are_invisible_to_other_organizations() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = mint_jwt(OrganizationId::new(), "accountant");
    let stranger = mint_jwt(OrganizationId::new(), "admin");

    let created = create_invoice(&client, &srv, &owner, &invoice_body(None)).await;
    let id = created["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/invoices"))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    let list: Value = res.json().await.unwrap();
    assert!(list["items"].as_array().unwrap().is_empty());
}
