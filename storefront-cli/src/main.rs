use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use storefront_session::host::MemoryHost;
use storefront_session::{ApiRequest, Credentials, SessionClient, SessionConfig};

/// Where the CLI pretends to be; account pages require a session.
const START_PATH: &str = "/account";

struct Settings {
    url: String,
    email: String,
    password: String,
}

fn load_settings() -> Result<Settings, String> {
    let var = |name: &str| env::var(name).map_err(|_| format!("{} is not set", name));
    Ok(Settings {
        url: var("STOREFRONT_URL")?,
        email: var("STOREFRONT_EMAIL")?,
        password: var("STOREFRONT_PASSWORD")?,
    })
}

fn init_logger() {
    let level = env::var("STOREFRONT_LOG")
        .ok()
        .and_then(|raw| LevelFilter::from_str(&raw).ok())
        .unwrap_or(LevelFilter::Info);
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logger: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_logger();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let host = Arc::new(MemoryHost::at(START_PATH));
    let client = match SessionClient::builder()
        .url(settings.url)
        .host(host.clone())
        .config(SessionConfig::default())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let credentials = Credentials::new(settings.email, settings.password);
    let user = match client.login(&credentials).await {
        Ok(user) => user,
        Err(e) => {
            eprintln!("Login failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let name = user
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or("unknown user");
    println!("Logged in as {}", name);

    for path in env::args().skip(1) {
        match client.send(ApiRequest::get(&path)).await {
            Ok(response) => {
                println!(
                    "GET {} -> {} ({} bytes)",
                    path,
                    response.status(),
                    response.text().len()
                );
            }
            Err(e) if e.silent => {
                println!("GET {} -> {:?}", path, e.status_code());
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    for notice in host.notices() {
        println!("{}", notice);
    }

    if let Err(e) = client.logout().await {
        log::debug!("server did not acknowledge logout: {}", e);
    }

    ExitCode::SUCCESS
}
