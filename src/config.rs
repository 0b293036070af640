use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password, Select};
use std::io::{IsTerminal, Write};

use crate::auth::{
    CredentialBundle, DEFAULT_PORT, DEFAULT_SERVER_PATH, PUBLIC_APIGEE_SERVER,
};
use crate::http_client::HttpOptions;

/// Apigee management API client
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Management user (Basic or OAuth authentication)
    #[arg(short = 'u', long, env = "APIGEE_USERNAME")]
    pub username: Option<String>,

    /// Management user's password
    #[arg(short = 'p', long, env = "APIGEE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Pre-issued bearer token (conflicts with username/password)
    #[arg(short = 't', long, env = "APIGEE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Management server host
    #[arg(long, env = "APIGEE_SERVER", default_value = PUBLIC_APIGEE_SERVER)]
    pub server: String,

    /// Path prefix on the management server
    #[arg(long, env = "APIGEE_SERVER_PATH", default_value = DEFAULT_SERVER_PATH)]
    pub server_path: String,

    /// Management server port
    #[arg(long, env = "APIGEE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// OAuth login server; enables the OAuth password grant
    #[arg(long, env = "APIGEE_OAUTH_SERVER")]
    pub oauth_server: Option<String>,

    /// Token endpoint path on the OAuth server
    #[arg(long, env = "APIGEE_OAUTH_SERVER_PATH")]
    pub oauth_server_path: Option<String>,

    /// OAuth server port
    #[arg(long, env = "APIGEE_OAUTH_PORT", default_value_t = DEFAULT_PORT)]
    pub oauth_port: u16,

    /// Apigee organization
    #[arg(short = 'o', long, env = "APIGEE_ORGANIZATION")]
    pub organization: Option<String>,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "APIGEE_CONNECT_TIMEOUT", default_value = "30")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "APIGEE_REQUEST_TIMEOUT", default_value = "300")]
    pub request_timeout: u64,

    /// Idle connections kept per host
    #[arg(long, env = "APIGEE_MAX_CONNECTIONS", default_value = "20")]
    pub max_connections: usize,

    /// Refresh OAuth tokens this many seconds before they expire
    #[arg(
        long,
        env = "APIGEE_TOKEN_SKEW",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(0..=86400)
    )]
    pub token_skew: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP method
    #[arg(default_value = "GET")]
    pub method: String,

    /// Request path, e.g. /o/{organization}/apis
    #[arg(default_value = "/o/{organization}")]
    pub path: String,

    /// JSON request body
    #[arg(short = 'd', long)]
    pub data: Option<String>,
}

/// Single call issued by the command line tool
#[derive(Clone, Debug)]
pub struct CliRequest {
    pub method: String,
    pub path: String,
    pub data: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Credentials and endpoints
    pub bundle: CredentialBundle,

    // HTTP client
    pub http: HttpOptions,

    // Logging
    pub log_level: String,

    pub request: CliRequest,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut args = CliArgs::parse();

        if needs_interactive_setup(&args) {
            let answers = run_interactive_setup(has_credentials(&args))?;
            answers.apply(&mut args);
        }

        Ok(Self::from_args(args))
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Self {
        let bundle = CredentialBundle {
            username: args.username.unwrap_or_default(),
            password: args.password.unwrap_or_default(),
            access_token: args.access_token.unwrap_or_default(),
            server: args.server,
            server_path: args.server_path,
            port: args.port,
            oauth_server: args.oauth_server.unwrap_or_default(),
            oauth_server_path: args.oauth_server_path.unwrap_or_default(),
            oauth_port: args.oauth_port,
            organization: args.organization.unwrap_or_default(),
        };

        Config {
            bundle,
            http: HttpOptions {
                max_connections: args.max_connections,
                connect_timeout: args.connect_timeout,
                request_timeout: args.request_timeout,
                token_refresh_skew: args.token_skew,
            },
            log_level: args.log_level,
            request: CliRequest {
                method: args.method.to_uppercase(),
                path: args.path,
                data: args.data,
            },
        }
    }

    /// Validate settings the credential resolver does not cover
    pub fn validate(&self) -> Result<()> {
        if self.bundle.organization.trim().is_empty() {
            anyhow::bail!(
                "APIGEE_ORGANIZATION is required (use -o or set APIGEE_ORGANIZATION env var)"
            );
        }

        if self.bundle.server.trim().is_empty() {
            anyhow::bail!("APIGEE_SERVER must not be empty");
        }

        if let Some(ref data) = self.request.data {
            serde_json::from_str::<serde_json::Value>(data)
                .context("--data must be valid JSON")?;
        }

        Ok(())
    }
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file, a terminal, and no organization or credentials)
pub fn needs_interactive_setup(args: &CliArgs) -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let has_organization = args.organization.as_deref().is_some_and(|o| !o.is_empty());

    !env_file_exists
        && std::io::stdin().is_terminal()
        && (!has_organization || !has_credentials(args))
}

/// Whether any credential was given on the command line or in the environment
fn has_credentials(args: &CliArgs) -> bool {
    args.access_token.is_some() || args.username.is_some() || args.password.is_some()
}

/// Answers collected from interactive setup
#[derive(Clone)]
pub struct InteractiveConfig {
    pub organization: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub oauth_server: Option<String>,
}

impl InteractiveConfig {
    /// Fill the arguments that are still unset with the collected answers
    pub fn apply(self, args: &mut CliArgs) {
        if args.organization.as_deref().map_or(true, str::is_empty) {
            args.organization = Some(self.organization);
        }
        args.username = args.username.take().or(self.username);
        args.password = args.password.take().or(self.password);
        args.access_token = args.access_token.take().or(self.access_token);
        args.oauth_server = args.oauth_server.take().or(self.oauth_server);
    }
}

/// Run interactive setup to collect the organization and, unless already given, credentials
pub fn run_interactive_setup(skip_credentials: bool) -> Result<InteractiveConfig> {
    println!();
    println!("No Apigee configuration found. Let's set up the client.");
    println!();

    let organization: String = Input::new()
        .with_prompt("Apigee organization (APIGEE_ORGANIZATION)")
        .interact_text()
        .context("Failed to read APIGEE_ORGANIZATION")?;

    if organization.trim().is_empty() {
        anyhow::bail!("APIGEE_ORGANIZATION cannot be empty");
    }

    let mut config = InteractiveConfig {
        organization,
        username: None,
        password: None,
        access_token: None,
        oauth_server: None,
    };

    if !skip_credentials {
        collect_credentials(&mut config)?;
    }

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!("Configuration saved to .env file");
    }

    println!();
    Ok(config)
}

/// Prompt for an authentication method and its credentials
fn collect_credentials(config: &mut InteractiveConfig) -> Result<()> {
    let methods = vec![
        "OAuth (username/password exchanged at the login server)",
        "Basic (username/password)",
        "Access token",
    ];
    let method = Select::new()
        .with_prompt("Authentication method")
        .items(&methods)
        .default(0)
        .interact()
        .context("Failed to read authentication method")?;

    if method == 2 {
        let token: String = Password::new()
            .with_prompt("Access token (APIGEE_ACCESS_TOKEN)")
            .interact()
            .context("Failed to read APIGEE_ACCESS_TOKEN")?;
        config.access_token = Some(token);
    } else {
        let username: String = Input::new()
            .with_prompt("Username (APIGEE_USERNAME)")
            .interact_text()
            .context("Failed to read APIGEE_USERNAME")?;
        let password: String = Password::new()
            .with_prompt("Password (APIGEE_PASSWORD)")
            .interact()
            .context("Failed to read APIGEE_PASSWORD")?;
        config.username = Some(username);
        config.password = Some(password);

        if method == 0 {
            let oauth_server: String = Input::new()
                .with_prompt("OAuth server (APIGEE_OAUTH_SERVER)")
                .default("login.apigee.com".to_string())
                .interact_text()
                .context("Failed to read APIGEE_OAUTH_SERVER")?;
            config.oauth_server = Some(oauth_server);
        }
    }

    Ok(())
}

/// Render the .env contents for the collected answers
fn render_env_file(config: &InteractiveConfig) -> String {
    let mut content = String::from("# Apigee client configuration\n# Generated by interactive setup\n\n");
    content.push_str(&format!("APIGEE_ORGANIZATION={}\n", config.organization));

    let entries = [
        ("APIGEE_USERNAME", &config.username),
        ("APIGEE_PASSWORD", &config.password),
        ("APIGEE_ACCESS_TOKEN", &config.access_token),
        ("APIGEE_OAUTH_SERVER", &config.oauth_server),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            content.push_str(&format!("{}={}\n", key, value));
        }
    }

    content.push_str("\n# Logging (trace, debug, info, warn, error)\nLOG_LEVEL=info\n");
    content
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(render_env_file(config).as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["apigee-client"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(parse(&["-o", "org1", "-t", "T"]));

        assert_eq!(config.bundle.server, "api.enterprise.apigee.com");
        assert_eq!(config.bundle.server_path, "v1");
        assert_eq!(config.bundle.port, 443);
        assert_eq!(config.bundle.oauth_port, 443);
        assert_eq!(config.bundle.oauth_server, "");
        assert_eq!(config.bundle.organization, "org1");
        assert_eq!(config.http.token_refresh_skew, 60);
        assert_eq!(config.request.method, "GET");
        assert_eq!(config.request.path, "/o/{organization}");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::from_args(parse(&[
            "-u",
            "u",
            "-p",
            "p",
            "--oauth-server",
            "login.example.com",
            "--oauth-server-path",
            "oauth/token",
            "--oauth-port",
            "8443",
            "--server",
            "api.example.com",
            "--port",
            "9443",
            "-o",
            "org1",
            "post",
            "/o/{organization}/apis",
            "-d",
            "{\"name\":\"demo\"}",
        ]));

        assert_eq!(config.bundle.username, "u");
        assert_eq!(config.bundle.oauth_server, "login.example.com");
        assert_eq!(config.bundle.oauth_port, 8443);
        assert_eq!(config.bundle.port, 9443);
        assert_eq!(config.request.method, "POST");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_out_of_range_rejected() {
        let result = CliArgs::try_parse_from(["apigee-client", "-o", "org1", "--port", "65536"]);
        assert!(result.is_err());

        let result =
            CliArgs::try_parse_from(["apigee-client", "-o", "org1", "--oauth-port", "-1"]);
        assert!(result.is_err());

        let result = CliArgs::try_parse_from(["apigee-client", "-o", "org1", "--port", "0"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_organization() {
        let mut args = parse(&["-t", "T"]);
        args.organization = None;
        let config = Config::from_args(args);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_data_rejected() {
        let config = Config::from_args(parse(&["-o", "org1", "-t", "T", "-d", "{not json"]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interactive_answers_apply() {
        let mut args = parse(&[]);
        InteractiveConfig {
            organization: "org9".to_string(),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            access_token: None,
            oauth_server: Some("login.apigee.com".to_string()),
        }
        .apply(&mut args);

        let config = Config::from_args(args);
        assert_eq!(config.bundle.organization, "org9");
        assert_eq!(config.bundle.oauth_server, "login.apigee.com");
    }

    #[test]
    fn test_interactive_answers_keep_given_credentials() {
        let mut args = parse(&["-u", "cli-user", "-p", "cli-pass"]);
        InteractiveConfig {
            organization: "org9".to_string(),
            username: None,
            password: None,
            access_token: Some("T".to_string()),
            oauth_server: None,
        }
        .apply(&mut args);

        let config = Config::from_args(args);
        assert_eq!(config.bundle.organization, "org9");
        assert_eq!(config.bundle.username, "cli-user");
        assert_eq!(config.bundle.password, "cli-pass");

        let mut args = parse(&["-o", "org1", "-t", "cli-token"]);
        InteractiveConfig {
            organization: "other".to_string(),
            username: None,
            password: None,
            access_token: Some("prompted".to_string()),
            oauth_server: None,
        }
        .apply(&mut args);

        let config = Config::from_args(args);
        assert_eq!(config.bundle.organization, "org1");
        assert_eq!(config.bundle.access_token, "cli-token");
    }

    #[test]
    fn test_token_skew_bounded() {
        assert!(CliArgs::try_parse_from(["apigee-client", "--token-skew", "86400"]).is_ok());
        assert!(CliArgs::try_parse_from(["apigee-client", "--token-skew", "86401"]).is_err());
        assert!(
            CliArgs::try_parse_from(["apigee-client", "--token-skew", "10000000000000000"])
                .is_err()
        );
    }

    #[test]
    fn test_render_env_file_skips_unset() {
        let content = render_env_file(&InteractiveConfig {
            organization: "org1".to_string(),
            username: None,
            password: None,
            access_token: Some("T".to_string()),
            oauth_server: None,
        });

        assert!(content.contains("APIGEE_ORGANIZATION=org1\n"));
        assert!(content.contains("APIGEE_ACCESS_TOKEN=T\n"));
        assert!(!content.contains("APIGEE_USERNAME"));
    }
}
