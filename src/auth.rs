use std::fs;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Args, Subcommand};
use dialoguer::{Confirm, Input};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener as TokioTcpListener;

use crate::config::AppPaths;
use crate::ui::{print_command_status, CommandStatus};

const ORG_TOKEN_PREFIX: &str = "organization-token-";
const AUTH_SCOPE: &str = "https://www.googleapis.com/auth/adwords";
const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Args)]
pub struct SetupArgs {}

#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AuthSubcommand {
    /// Build an organization token to hand out to operators
    CreateToken,
    /// Remove all stored secrets
    Reset,
}

/// Shared organization-level secrets, distributed to operators as one opaque
/// token string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgAuth {
    pub client_id: String,
    pub client_secret: String,
    pub developer_token: String,
    pub login_customer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserAuth {
    refresh_token: String,
}

/// Fully-resolved credentials for gateway construction.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub org: OrgAuth,
    pub refresh_token: String,
}

/// Why an organization token string was rejected, stage by stage.
#[derive(Debug, Error)]
pub enum OrgTokenError {
    #[error("prefix")]
    Prefix,
    #[error("base64")]
    Base64(#[from] base64::DecodeError),
    #[error("utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("json")]
    Json(#[from] serde_json::Error),
    #[error("validation/{0}")]
    Field(&'static str),
}

pub fn decode_organization_token(token: &str) -> Result<OrgAuth, OrgTokenError> {
    let stripped = token
        .strip_prefix(ORG_TOKEN_PREFIX)
        .ok_or(OrgTokenError::Prefix)?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(stripped)?;
    let json = String::from_utf8(decoded)?;
    let org: OrgAuth = serde_json::from_str(&json)?;

    for (field, value) in [
        ("client_id", &org.client_id),
        ("client_secret", &org.client_secret),
        ("developer_token", &org.developer_token),
        ("login_customer_id", &org.login_customer_id),
    ] {
        if value.is_empty() {
            return Err(OrgTokenError::Field(field));
        }
    }
    Ok(org)
}

pub fn encode_organization_token(org: &OrgAuth) -> Result<String> {
    let json = serde_json::to_vec(org).context("failed to serialize organization token")?;
    Ok(format!(
        "{ORG_TOKEN_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(json)
    ))
}

/// Resolve org and user credentials, running the interactive first-run flows
/// for whichever pieces are missing.
pub async fn load_credentials(paths: &AppPaths) -> Result<Credentials> {
    let org = match read_json_file::<OrgAuth>(&paths.org_auth_file())? {
        Some(org) => org,
        None => organization_token_flow(paths)?,
    };
    let refresh_token = match read_json_file::<UserAuth>(&paths.user_auth_file())? {
        Some(user) => user.refresh_token,
        None => oauth_flow(paths, &org).await?,
    };
    Ok(Credentials { org, refresh_token })
}

pub async fn run_setup(paths: &AppPaths) -> Result<()> {
    load_credentials(paths).await?;
    println!("All set up!");
    Ok(())
}

pub async fn run(args: AuthArgs, paths: &AppPaths) -> Result<()> {
    match args.command {
        AuthSubcommand::CreateToken => run_create_token(),
        AuthSubcommand::Reset => run_reset(paths),
    }
}

fn run_create_token() -> Result<()> {
    let org = OrgAuth {
        login_customer_id: prompt_field("login customer id")?,
        developer_token: prompt_field("developer token")?,
        client_id: prompt_field("client id")?,
        client_secret: prompt_field("client secret")?,
    };
    println!();
    println!("Your token is:");
    println!("{}", encode_organization_token(&org)?);
    Ok(())
}

fn prompt_field(name: &str) -> Result<String> {
    let value: String = Input::new().with_prompt(name).interact_text()?;
    Ok(value.trim().to_string())
}

fn run_reset(paths: &AppPaths) -> Result<()> {
    let secrets: Vec<_> = [paths.org_auth_file(), paths.user_auth_file()]
        .into_iter()
        .filter(|path| path.exists())
        .collect();

    if secrets.is_empty() {
        println!("No secrets were found! Nothing to do.");
        return Ok(());
    }

    let confirmed = Confirm::new()
        .with_prompt("Are you sure to remove all stored secrets?")
        .default(false)
        .interact()?;
    if !confirmed {
        println!("Secrets were not removed.");
        return Ok(());
    }

    for path in secrets {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
        println!("removed {}", path.display());
    }
    print_command_status(CommandStatus::Success, "all secrets removed");
    Ok(())
}

fn organization_token_flow(paths: &AppPaths) -> Result<OrgAuth> {
    println!("It looks like you don't have the organization token set up.");
    println!("Please obtain the token from your organization and paste it below,");
    println!("then hit enter. It should start with \"{ORG_TOKEN_PREFIX}\"");
    println!();

    let org = loop {
        let token: String = Input::new()
            .with_prompt("Organization token")
            .interact_text()?;
        match decode_organization_token(token.trim()) {
            Ok(org) => break org,
            Err(err) => {
                print_command_status(
                    CommandStatus::Error,
                    &format!("That token looks invalid ({err}), try again?"),
                );
                println!();
            }
        }
    };

    println!("That token seems legit, storing it for future use");
    println!();
    write_json_file(&paths.org_auth_file(), &org)?;
    Ok(org)
}

/// Installed-app OAuth flow: send the operator to the consent screen, catch
/// the authorization code on a loopback listener, trade it for a refresh
/// token and persist that.
async fn oauth_flow(paths: &AppPaths, org: &OrgAuth) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to bind loopback listener")?;
    let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());

    let consent_url = format!(
        "{AUTH_ENDPOINT}?response_type=code&access_type=offline&prompt=consent\
         &client_id={}&redirect_uri={}&scope={}",
        urlencoding::encode(&org.client_id),
        urlencoding::encode(&redirect_uri),
        urlencoding::encode(AUTH_SCOPE),
    );

    println!("Opening your browser for Google sign-in.");
    println!("If nothing happens, visit:");
    println!("{consent_url}");
    let _ = open::that(&consent_url);

    let code = receive_callback(listener).await?;
    let token = exchange_code_for_token(org, &code, &redirect_uri).await?;
    let refresh_token = token
        .refresh_token
        .context("authorization response carried no refresh token")?;

    write_json_file(
        &paths.user_auth_file(),
        &UserAuth {
            refresh_token: refresh_token.clone(),
        },
    )?;
    print_command_status(CommandStatus::Success, "signed in, refresh token stored");
    Ok(refresh_token)
}

async fn receive_callback(listener: TcpListener) -> Result<String> {
    listener.set_nonblocking(true)?;
    let listener = TokioTcpListener::from_std(listener)?;

    let (mut stream, _) = listener.accept().await?;

    let mut buffer = vec![0u8; 4096];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    let code = parse_code_from_request(&request)
        .context("failed to parse authorization code from callback")?;

    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authentication successful!</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>";
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    Ok(code)
}

fn parse_code_from_request(request: &str) -> Option<String> {
    // Parse GET /?code=... HTTP/1.1
    let first_line = request.lines().next()?;
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }

    let path = parts[1];
    let query = &path[path.find('?')? + 1..];
    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            if key == "code" {
                return Some(urlencoding::decode(value).ok()?.into_owned());
            }
        }
    }
    None
}

#[derive(Debug, Serialize)]
struct CodeTokenRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn exchange_code_for_token(
    org: &OrgAuth,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let params = CodeTokenRequest {
        grant_type: "authorization_code",
        code,
        redirect_uri,
        client_id: &org.client_id,
        client_secret: &org.client_secret,
    };
    post_token_request(&params, "code exchange").await
}

/// Trade the stored refresh token for a short-lived bearer token the gateway
/// sends with every request.
pub async fn fetch_access_token(credentials: &Credentials) -> Result<String> {
    let params = RefreshTokenRequest {
        grant_type: "refresh_token",
        refresh_token: &credentials.refresh_token,
        client_id: &credentials.org.client_id,
        client_secret: &credentials.org.client_secret,
    };
    let token: TokenResponse = post_token_request(&params, "token refresh").await?;
    Ok(token.access_token)
}

async fn post_token_request<B: Serialize>(params: &B, what: &str) -> Result<TokenResponse> {
    let client = reqwest::Client::new();
    let response = client
        .post(TOKEN_ENDPOINT)
        .form(params)
        .send()
        .await
        .with_context(|| format!("{what} request failed"))?;

    if !response.status().is_success() {
        bail!(
            "{what} failed ({}): {}",
            response.status(),
            response.text().await.unwrap_or_default()
        );
    }

    response
        .json::<TokenResponse>()
        .await
        .with_context(|| format!("failed to parse {what} response"))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };
    let value = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_vec(value).context("failed to serialize")?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrgAuth {
        OrgAuth {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            developer_token: "devtok".to_string(),
            login_customer_id: "1234567890".to_string(),
        }
    }

    #[test]
    fn organization_token_round_trips() {
        let token = encode_organization_token(&org()).unwrap();
        assert!(token.starts_with(ORG_TOKEN_PREFIX));
        let decoded = decode_organization_token(&token).unwrap();
        assert_eq!(decoded.client_id, "client");
        assert_eq!(decoded.login_customer_id, "1234567890");
    }

    #[test]
    fn decode_rejects_missing_prefix() {
        assert!(matches!(
            decode_organization_token("nope"),
            Err(OrgTokenError::Prefix)
        ));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let token = format!("{ORG_TOKEN_PREFIX}!!!not-base64!!!");
        assert!(matches!(
            decode_organization_token(&token),
            Err(OrgTokenError::Base64(_))
        ));
    }

    #[test]
    fn decode_rejects_non_json_payload() {
        let token = format!(
            "{ORG_TOKEN_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode("not json")
        );
        assert!(matches!(
            decode_organization_token(&token),
            Err(OrgTokenError::Json(_))
        ));
    }

    #[test]
    fn decode_rejects_empty_fields() {
        let mut broken = org();
        broken.developer_token.clear();
        let token = encode_organization_token(&broken).unwrap();
        assert!(matches!(
            decode_organization_token(&token),
            Err(OrgTokenError::Field("developer_token"))
        ));
    }

    #[test]
    fn parse_code_from_callback_request() {
        let request = "GET /?code=4%2FauthCode123&scope=adwords HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(
            parse_code_from_request(request),
            Some("4/authCode123".to_string())
        );
    }

    #[test]
    fn parse_code_missing_is_none() {
        assert_eq!(
            parse_code_from_request("GET /?error=access_denied HTTP/1.1\r\n"),
            None
        );
        assert_eq!(parse_code_from_request("POST / HTTP/1.1\r\n"), None);
    }
}
