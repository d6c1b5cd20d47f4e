use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use shopdesk_client::{ADMIN_ENV, ClientConfig, LogNavigator, OWNER_ENV, ShopdeskClient};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Args, Portal};

const DEFAULT_LOG_FILTER: &str = "shopdesk_client=info,shopdesk_cli=info";
const LOG_FILE_ENV: &str = "SHOPDESK_LOG_FILE";
const SESSION_DIR: &str = ".shopdesk";

pub fn init_tracing() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    // Console (human-friendly, on stderr so command output stays clean)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .pretty();

    // File (structured JSON), only when asked for
    let json_layer = match std::env::var(LOG_FILE_ENV) {
        Ok(path) if !path.is_empty() => {
            let file = File::create(&path)
                .with_context(|| format!("cannot create log file {path}"))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(true)
                    .with_span_list(true),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}

/// Client for the selected portal, with its session persisted to disk.
pub fn build_client(args: &Args) -> anyhow::Result<ShopdeskClient> {
    let keys = match args.portal {
        Portal::Admin => &ADMIN_ENV,
        Portal::Owner => &OWNER_ENV,
    };

    let mut config = ClientConfig::from_env_keys(keys)
        .with_context(|| format!("failed to load {} portal configuration", args.portal.as_str()))?;

    if let Some(path) = &args.session_file {
        config = config.with_credential_file(path);
    } else if config.credential_file.is_none() {
        config = config.with_credential_file(default_session_file(args.portal));
    }

    Ok(ShopdeskClient::from_config(config, Arc::new(LogNavigator))?)
}

fn default_session_file(portal: Portal) -> PathBuf {
    PathBuf::from(SESSION_DIR).join(format!("{}-session.json", portal.as_str()))
}
