use std::io::{self, Write};

use anyhow::Context;
use reqwest::Method;
use serde_json::{json, Value};
use tidal_client::{ApiRequest, Batching, ClientError, SessionClient, StreamOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli_args::*;

pub(crate) async fn handle_command(command: Command, client: &SessionClient) -> anyhow::Result<()> {
    match command {
        Command::Login(args) => handle_login(args, client).await?,
        Command::Logout => handle_logout(client).await?,
        Command::Stream(args) => handle_stream(args, client).await?,
        Command::Request(args) => handle_request(args, client).await?,
        Command::Config(args) => match args.command {
            ConfigCommand::Show => print!("{}", serde_yaml::to_string(client.config())?),
        },
        Command::Token(args) => handle_token(args, client)?,
    }
    Ok(())
}

async fn handle_login(args: LoginArgs, client: &SessionClient) -> anyhow::Result<()> {
    let password = resolve_password(args.password, || prompt_password("Password: "))?;
    client
        .login(json!({ "username": args.username, "password": password }))
        .await?;
    println!("Logged in as {}", args.username);
    Ok(())
}

async fn handle_logout(client: &SessionClient) -> anyhow::Result<()> {
    if !client.is_authenticated()? {
        client.tokens().clear();
        println!("Not logged in");
        return Ok(());
    }
    client.logout().await?;
    println!("Logged out");
    Ok(())
}

async fn handle_stream(args: StreamArgs, client: &SessionClient) -> anyhow::Result<()> {
    let payload = parse_json(&args.data)?;
    let cancel = CancellationToken::new();
    let mut options = StreamOptions::default().with_cancel(cancel.clone());
    if args.per_frame {
        options = options.with_batching(Batching::PerFrame);
    }
    if args.public {
        options = options.public();
    }

    let (mut batches, handle) = client.streams().open_channel(&args.path, payload, options);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(batch) = batches.recv().await {
        for event in batch {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    interrupt.abort();

    match handle.await? {
        Ok(summary) => {
            info!(
                event = "stream_finished",
                events = summary.events,
                batches = summary.batches,
                refreshed = summary.refreshed
            );
            Ok(())
        }
        Err(ClientError::Aborted) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn handle_request(args: RequestArgs, client: &SessionClient) -> anyhow::Result<()> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method: {}", args.method))?;
    let mut request = ApiRequest::new(method, args.path);
    if let Some(data) = args.data.as_deref() {
        request = request.with_body(parse_json(data)?);
    }
    if args.public {
        request = request.public();
    }
    let body = client.requests().send(request).await?;
    if !body.is_null() {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(())
}

fn handle_token(args: TokenArgs, client: &SessionClient) -> anyhow::Result<()> {
    let tokens = client.tokens();
    match args.command {
        TokenCommand::Set(args) => {
            tokens.store_access_token(&args.access)?;
            if let Some(refresh) = args.refresh.as_deref() {
                tokens.store_refresh_token(refresh)?;
            }
            println!("Tokens stored for {}", client.config().token_domain);
        }
        TokenCommand::Clear => {
            tokens.clear();
            println!("Tokens cleared for {}", client.config().token_domain);
        }
        TokenCommand::Status => {
            let presence = |found: bool| if found { "present" } else { "missing" };
            println!("domain: {}", client.config().token_domain);
            println!("access token: {}", presence(tokens.access_token()?.is_some()));
            println!("refresh token: {}", presence(tokens.refresh_token()?.is_some()));
        }
    }
    Ok(())
}

fn parse_json(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--data is not valid JSON: {raw}"))
}

fn resolve_password<F>(given: Option<String>, prompt: F) -> anyhow::Result<String>
where
    F: FnOnce() -> anyhow::Result<String>,
{
    let password = match given {
        Some(password) => password,
        None => prompt()?,
    };
    if password.trim().is_empty() {
        anyhow::bail!("password is required");
    }
    Ok(password)
}

/// Reads a password from the terminal without echoing it. The prompt goes to
/// stderr so stdout stays machine-readable.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    Ok(rpassword::read_password()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_password_skips_the_prompt() {
        let password = resolve_password(Some("hunter2".to_string()), || {
            panic!("prompt must not run when a password was given")
        })
        .expect("password");
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn missing_password_is_prompted_for() {
        let mut prompted = false;
        let password = resolve_password(None, || {
            prompted = true;
            Ok("from-terminal".to_string())
        })
        .expect("password");
        assert!(prompted);
        assert_eq!(password, "from-terminal");
    }

    #[test]
    fn blank_password_is_rejected() {
        let err = resolve_password(None, || Ok("   ".to_string())).expect_err("blank");
        assert!(err.to_string().contains("password is required"));
        assert!(resolve_password(Some(String::new()), || unreachable!()).is_err());
    }

    #[test]
    fn data_must_be_json() {
        assert_eq!(parse_json(r#"{"a":1}"#).expect("json"), json!({"a": 1}));
        let err = parse_json("{oops").expect_err("invalid");
        assert!(err.to_string().contains("--data is not valid JSON"));
    }
}
