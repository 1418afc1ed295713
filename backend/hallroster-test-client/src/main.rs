// src/main.rs

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::error::Error;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    token_type: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeReport {
    employee_name: String,
    working_days: usize,
    car_days: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = env::var("HALLROSTER_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let client = Client::new();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health);

    // Test 2: Protected route without a session
    println!("\n🔍 Testing that /api requires a session...");
    let unauthorized = client
        .get(format!("{}/api/employees", base_url))
        .send()
        .await?;
    println!("Status without token: {}", unauthorized.status());
    if unauthorized.status() != StatusCode::UNAUTHORIZED {
        return Err("expected 401 without a session token".into());
    }

    // Test 3: Sign up (a 409 means the smoke user already exists) and log in
    println!("\n🔍 Signing up and logging in...");
    let signup = client
        .post(format!("{}/api/session/signup", base_url))
        .json(&json!({
            "fullName": "Smoke Test",
            "email": "smoke@example.com",
            "password": "smoke-pass",
            "confirmPassword": "smoke-pass",
            "phone": "0500000000",
        }))
        .send()
        .await?;
    println!("Signup status: {}", signup.status());

    let login = client
        .post(format!("{}/api/session/login", base_url))
        .json(&json!({ "email": "smoke@example.com", "password": "smoke-pass" }))
        .send()
        .await?
        .error_for_status()?
        .json::<LoginResponse>()
        .await?;
    println!("Logged in, token type {}", login.token_type);

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", login.token))?,
    );
    let api = Client::builder().default_headers(headers).build()?;

    // Test 4: Create a hall and an employee
    println!("\n🔍 Creating a hall and an employee...");
    let hall = api
        .post(format!("{}/api/halls", base_url))
        .json(&json!({ "name": "Smoke Hall", "location": "Test Street 1" }))
        .send()
        .await?
        .error_for_status()?
        .json::<Created>()
        .await?;
    let employee_name = format!("Smoke Employee {}", hall.id);
    let employee = api
        .post(format!("{}/api/employees", base_url))
        .json(&json!({ "name": employee_name, "assignedHall": hall.id }))
        .send()
        .await?
        .error_for_status()?
        .json::<Created>()
        .await?;
    println!("Hall {} and employee {} created", hall.id, employee.id);

    // Test 5: Toggle attendance, car, and assign the day's hall
    let day = "2024-05-01";
    println!("\n🔍 Toggling attendance and car on {}...", day);
    for kind in ["attendance", "car"] {
        let outcome = api
            .post(format!(
                "{}/api/employees/{}/{}/{}/toggle",
                base_url, employee.id, kind, day
            ))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        println!("{} toggle -> {}", kind, outcome["employee"]["workingDays"]);
    }

    println!("\n🔍 Assigning the hall for {}...", day);
    let outcome = api
        .put(format!(
            "{}/api/employees/{}/halls/{}",
            base_url, employee.id, day
        ))
        .json(&json!({ "hallId": hall.id }))
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;
    println!("Hall after assignment: {}", outcome["halls"][0]);

    // Test 6: Range report
    println!("\n🔍 Fetching the May range report...");
    let report = api
        .get(format!(
            "{}/api/employees/{}/days?start=2024-05-01&end=2024-05-31",
            base_url, employee.id
        ))
        .send()
        .await?
        .error_for_status()?
        .json::<RangeReport>()
        .await?;
    println!(
        "{}: {} working day(s), {} with car",
        report.employee_name, report.working_days, report.car_days
    );
    if report.working_days != 1 || report.car_days != 1 {
        return Err("range report does not match the toggles".into());
    }

    // Test 7: Audit
    println!("\n🔍 Running the audit...");
    let audit = api
        .get(format!("{}/api/audit", base_url))
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;
    println!("Audit consistent: {}", audit["consistent"]);

    // Clean up so the next run starts from the same state
    api.delete(format!("{}/api/employees/{}", base_url, employee.id))
        .send()
        .await?;
    api.delete(format!("{}/api/halls/{}", base_url, hall.id))
        .send()
        .await?;

    println!("\n✅ Smoke test finished");
    Ok(())
}
