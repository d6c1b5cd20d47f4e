use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about = "Shopdesk API command line", long_about = None)]
pub struct Args {
    /// Which backend portal to talk to
    #[arg(long, value_enum, default_value_t = Portal::Admin, env = "SHOPDESK_PORTAL")]
    pub portal: Portal,

    /// Where the session is persisted (defaults to .shopdesk/<portal>-session.json)
    #[arg(long)]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Portal {
    /// Retail admin console (SHOPDESK_* variables)
    Admin,
    /// Owner portal (SHOPDESK_OWNER_* variables)
    Owner,
}

impl Portal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Portal::Admin => "admin",
            Portal::Owner => "owner",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with username and password
    Login {
        #[arg(short, long)]
        username: String,

        /// Read from SHOPDESK_PASSWORD when omitted
        #[arg(short, long, env = "SHOPDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// One-time code login
    Otp {
        #[command(subcommand)]
        action: OtpAction,
    },

    /// Show the identity of the current session
    Whoami,

    /// End the current session
    Logout,

    /// Call an API endpoint with the current session
    Call {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the API origin, e.g. /api/orders
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Query parameter as key=value; repeatable
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Check whether the current session may open a console route
    CanVisit {
        path: String,

        /// JSON route table: {"public": [...], "roles": {"<role>": [...]}}
        #[arg(long)]
        routes: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum OtpAction {
    /// Send a one-time code to a phone number
    Request { phone: String },

    /// Exchange a one-time code for a session
    Verify { phone: String, code: String },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}
