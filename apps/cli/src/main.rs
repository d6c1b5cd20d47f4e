mod cli;
mod setup;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use dotenvy::dotenv;
use serde_json::Value;
use shopdesk_client::{ApiRequest, ClientError, RouteTable, ShopdeskClient};
use shopdesk_types::IdentityClaims;
use tracing::{debug, info};

use crate::cli::{Args, Commands, OtpAction};
use crate::setup::{build_client, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing()?;

    let args = Args::parse();
    let client = build_client(&args)?;

    info!(portal = args.portal.as_str(), "Shopdesk client ready");

    match args.command {
        Commands::Login { username, password } => {
            let claims = client
                .login(&username, &password)
                .await
                .context("login failed")?;
            print_claims(&claims)?;
        }
        Commands::Otp { action } => match action {
            OtpAction::Request { phone } => {
                client.request_otp(&phone).await.context("could not send code")?;
                println!("Code sent to {phone}");
            }
            OtpAction::Verify { phone, code } => {
                let claims = client
                    .verify_otp(&phone, &code)
                    .await
                    .context("code verification failed")?;
                print_claims(&claims)?;
            }
        },
        Commands::Whoami => match client.claims() {
            Some(claims) => print_claims(&claims)?,
            None => bail!("not logged in"),
        },
        Commands::Logout => {
            client.logout().await;
            println!("Logged out");
        }
        Commands::Call {
            method,
            path,
            data,
            query,
        } => call(&client, &method, path, data, query).await?,
        Commands::CanVisit { path, routes } => {
            let guard = client.guard(Arc::new(load_routes(&routes)?));
            let allowed = guard.can_visit(&path);
            println!("{}", if allowed { "allowed" } else { "denied" });
            if !allowed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn call(
    client: &ShopdeskClient,
    method: &str,
    path: String,
    data: Option<String>,
    query: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let method = method
        .to_uppercase()
        .parse()
        .with_context(|| format!("invalid HTTP method `{method}`"))?;

    let mut request = ApiRequest::new(method, path);
    for (key, value) in query {
        request = request.query(key, value);
    }
    if let Some(data) = data {
        let body: Value = serde_json::from_str(&data).context("--data is not valid JSON")?;
        request = request.json_value(body);
    }

    debug!(request_id = %request.id(), "Calling API");

    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(ClientError::AuthExpired) => bail!("session expired, log in again"),
        Err(e) => {
            let kind = e.kind();
            return Err(anyhow::Error::new(e).context(format!("request failed ({kind})")));
        }
    };

    match response.json::<Value>() {
        Ok(Value::Null) => {}
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", response.text()),
    }

    Ok(())
}

fn print_claims(claims: &IdentityClaims) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(claims)?);
    Ok(())
}

fn load_routes(path: &Path) -> anyhow::Result<RouteTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read route table {}", path.display()))?;
    RouteTable::from_json(&raw).context("invalid route table")
}
