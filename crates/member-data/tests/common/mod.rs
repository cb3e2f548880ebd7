//! In-memory CRM for integration tests.
//!
//! Responses are scripted per method, path and page. A script plays its
//! responses in order and keeps repeating the last one. Unscripted requests
//! get a 404.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use member_data::api::{ApiClient, ApiError, ApiRequest, RawResponse, Transport};
use member_data::backoff::RetryPolicy;
use member_data::neon::NeonClient;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

type RouteKey = (Method, String, Option<u32>);

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<RouteKey, VecDeque<RawResponse>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts a single-resource GET.
    pub fn get(&self, path: &str, responses: Vec<RawResponse>) {
        self.script(Method::GET, path, None, responses);
    }

    /// Scripts one page of a paginated collection.
    pub fn page(&self, method: Method, path: &str, page: u32, responses: Vec<RawResponse>) {
        self.script(method, path, Some(page), responses);
    }

    pub fn script(
        &self,
        method: Method,
        path: &str,
        page: Option<u32>,
        responses: Vec<RawResponse>,
    ) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string(), page), responses.into());
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    /// Pages requested for `path`, in request order.
    pub fn pages_requested(&self, path: &str) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .filter_map(page_of)
            .collect()
    }
}

fn page_of(request: &ApiRequest) -> Option<u32> {
    if let Some(body) = &request.body
        && let Some(page) = body["pagination"]["currentPage"].as_u64()
    {
        return Some(page as u32);
    }
    request
        .query
        .iter()
        .find(|(key, _)| key == "currentPage")
        .and_then(|(_, value)| value.parse().ok())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        self.calls.lock().unwrap().push(request.clone());

        let key = (request.method.clone(), request.path.clone(), page_of(request));
        let mut routes = self.routes.lock().unwrap();
        let response = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| RawResponse::new(StatusCode::NOT_FOUND, "")))
    }
}

pub fn ok(body: Value) -> RawResponse {
    RawResponse::new(StatusCode::OK, body.to_string())
}

pub fn status(code: u16) -> RawResponse {
    RawResponse::new(StatusCode::from_u16(code).unwrap(), "")
}

pub fn api_client(transport: &Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::new(transport.clone(), RetryPolicy::default())
}

pub fn neon_client(transport: &Arc<ScriptedTransport>, page_size: u32) -> NeonClient {
    NeonClient::new(api_client(transport), page_size)
}

/// A collection page envelope.
pub fn page_body(results_key: &str, current_page: u32, total_pages: u32, items: Value) -> Value {
    let mut body = json!({
        "pagination": {
            "currentPage": current_page,
            "pageSize": 2,
            "totalPages": total_pages,
            "totalResults": total_pages * 2,
        },
    });
    body[results_key] = items;
    body
}

pub fn account_detail(first_name: &str, discourse_id: Option<&str>) -> Value {
    let mut custom = vec![json!({
        "id": "85",
        "name": "WaiverDate",
        "value": "3/14/2022",
    })];
    if let Some(id) = discourse_id {
        custom.push(json!({ "id": "178", "name": "DiscourseID", "value": id }));
    }
    json!({
        "individualAccount": {
            "accountId": "1001",
            "primaryContact": {
                "firstName": first_name,
                "lastName": "Maker",
                "email1": "maker@example.com",
                "gender": { "code": "F", "name": "Female" },
                "dob": { "day": "9", "month": "6", "year": "1990" },
                "addresses": [{
                    "isPrimaryAddress": true,
                    "addressLine1": "9701 Dessau Rd",
                    "city": "Austin",
                    "stateProvince": { "code": "TX", "name": "Texas" },
                    "zipCode": "78754",
                }],
            },
            "accountCustomFields": custom,
        }
    })
}

pub fn company_detail() -> Value {
    json!({ "companyAccount": { "accountId": "2002", "name": "Widgets Inc" } })
}

pub fn membership_row(fee: f64, start: &str, end: &str, unit: &str, status: &str) -> Value {
    json!({
        "id": 1,
        "fee": fee,
        "termStartDate": start,
        "termEndDate": end,
        "termUnit": unit,
        "status": status,
    })
}

pub fn registration_row(event_id: &str, when: &str, amount: f64, status: &str) -> Value {
    json!({
        "id": "r1",
        "eventId": event_id,
        "registrationDateTime": when,
        "registrationAmount": amount,
        "tickets": [{ "attendees": [{ "registrationStatus": status }] }],
    })
}

pub fn event_body(name: &str, date: &str, category: &str) -> Value {
    json!({
        "id": "e1",
        "name": name,
        "eventDates": { "startDate": date, "endDate": date },
        "category": { "id": "7", "name": category },
    })
}

/// Scripts detail, membership and registration endpoints for one account.
pub fn script_account(
    transport: &ScriptedTransport,
    id: &str,
    detail: Value,
    memberships: Value,
    registrations: Value,
) {
    transport.get(&format!("/v2/accounts/{id}"), vec![ok(detail)]);
    transport.page(
        Method::GET,
        &format!("/v2/accounts/{id}/memberships"),
        0,
        vec![ok(page_body("memberships", 0, 1, memberships))],
    );
    transport.page(
        Method::GET,
        &format!("/v2/accounts/{id}/eventRegistrations"),
        0,
        vec![ok(page_body("eventRegistrations", 0, 1, registrations))],
    );
}
