use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chatline_client::{ApiClient, ClientConfig, FileTokenStore, SessionContext};
use chatline_core::{
    ChatEvent, Role, SendOptions, ServiceSelector, SessionState, StartOutcome,
    StreamSessionController,
};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "chatline", version, about = "Terminal client for the chat service")]
struct Args {
    /// Read settings from this file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL.
    #[arg(long, global = true, env = "CHATLINE_API_BASE_URL")]
    api_base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the session token.
    Login {
        email: String,
        #[arg(long, env = "CHATLINE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session token.
    Logout,
    Signup {
        name: String,
        email: String,
        #[arg(long, env = "CHATLINE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Ask for a one-time code to reset the password.
    ForgotPassword { email: String },
    /// Set a new password using the emailed one-time code.
    ResetPassword {
        email: String,
        otp: String,
        #[arg(long)]
        new_password: Option<String>,
    },
    ChangePassword {
        #[arg(long)]
        old_password: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
    },
    /// Show who the stored token belongs to.
    Whoami,
    /// List conversations, most recent first.
    List,
    /// Print the transcript of a conversation.
    Show { id: String },
    /// Send a prompt and stream the reply. Ctrl-C stops generation.
    Send {
        /// Continue this conversation instead of starting a new one.
        #[arg(long, short)]
        conversation: Option<String>,
        /// chat, web-search, thinking, image-search or news-search.
        #[arg(long, short, default_value = "chat")]
        service: ServiceSelector,
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    Rename { id: String, title: String },
    Delete { id: String },
    /// Delete every conversation.
    DeleteAll {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with streamed text.
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let client = build_client(&args)?;
    run(client, args.command).await
}

/// `RUST_LOG` when set and valid, otherwise warnings only.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn build_client(args: &Args) -> Result<ApiClient> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::load().context("Failed to load config")?,
    };
    if let Some(url) = &args.api_base_url {
        config.api_base_url = url.clone();
    }
    debug!(api_base_url = %config.api_base_url, "Using API");

    let tokens = FileTokenStore::new().context("Failed to locate the session file")?;
    let session = Arc::new(SessionContext::new(Arc::new(tokens)));
    ApiClient::new(config, session).context("Failed to build HTTP client")
}

async fn run(client: ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = secret_or_prompt(password, "Password")?;
            let user = client.login(&email, &password).await.context("Login failed")?;
            match user {
                Some(user) => println!("Signed in as {}", user.name),
                None => println!("Signed in"),
            }
        }
        Command::Logout => {
            client.logout().context("Failed to clear session")?;
            println!("Signed out");
        }
        Command::Signup {
            name,
            email,
            password,
        } => {
            let password = secret_or_prompt(password, "Password")?;
            client
                .signup(&name, &email, &password)
                .await
                .context("Sign-up failed")?;
            println!("Account created. Sign in with `chatline login {}`", email);
        }
        Command::ForgotPassword { email } => {
            client
                .forgot_password(&email)
                .await
                .context("Failed to request a reset code")?;
            println!("A reset code was sent to {}", email);
        }
        Command::ResetPassword {
            email,
            otp,
            new_password,
        } => {
            let (password, confirmation) = new_password_or_prompt(new_password)?;
            client
                .reset_password(&email, &otp, &password, &confirmation)
                .await
                .context("Password reset failed")?;
            println!("Password updated");
        }
        Command::ChangePassword {
            old_password,
            new_password,
        } => {
            require_login(&client)?;
            let old_password = secret_or_prompt(old_password, "Current password")?;
            let (password, confirmation) = new_password_or_prompt(new_password)?;
            client
                .change_password(&old_password, &password, &confirmation)
                .await
                .context("Password change failed")?;
            println!("Password changed");
        }
        Command::Whoami => match client.session().current_user() {
            Some(user) if client.session().is_authenticated() => match user.email {
                Some(email) => println!("{} <{}>", user.name, email),
                None => println!("{}", user.name),
            },
            Some(user) => println!("{} (session expired)", user.name),
            None => println!("Not signed in"),
        },
        Command::List => {
            require_login(&client)?;
            let controller = StreamSessionController::from_client(client);
            let conversations = controller
                .refresh_conversations()
                .await
                .context("Failed to list conversations")?;
            if conversations.is_empty() {
                println!("No conversations yet");
            }
            for conv in conversations {
                let updated = conv
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{:>8}  {:16}  {}", conv.id, updated, conv.title);
            }
        }
        Command::Show { id } => {
            require_login(&client)?;
            let controller = StreamSessionController::from_client(client);
            controller
                .load_conversation(&id)
                .await
                .with_context(|| format!("Failed to load conversation {}", id))?;
            for message in controller.snapshot().messages {
                let who = match message.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                println!("[{}]\n{}\n", who, message.content);
            }
        }
        Command::Send {
            conversation,
            service,
            prompt,
        } => {
            require_login(&client)?;
            let controller = StreamSessionController::from_client(client);
            if let Some(id) = &conversation {
                controller
                    .load_conversation(id)
                    .await
                    .with_context(|| format!("Failed to open conversation {}", id))?;
            }
            stream_reply(&controller, &prompt.join(" "), SendOptions::with_service(service))
                .await?;
        }
        Command::Rename { id, title } => {
            require_login(&client)?;
            let controller = StreamSessionController::from_client(client);
            let title = controller
                .rename_conversation(&id, &title)
                .await
                .with_context(|| format!("Failed to rename conversation {}", id))?;
            println!("Renamed to \"{}\"", title);
        }
        Command::Delete { id } => {
            require_login(&client)?;
            let controller = StreamSessionController::from_client(client);
            controller
                .delete_conversation(&id)
                .await
                .with_context(|| format!("Failed to delete conversation {}", id))?;
            println!("Deleted conversation {}", id);
        }
        Command::DeleteAll { yes } => {
            if !yes {
                bail!("Refusing to delete every conversation without --yes");
            }
            require_login(&client)?;
            let controller = StreamSessionController::from_client(client);
            controller
                .delete_all_conversations()
                .await
                .context("Failed to delete conversations")?;
            println!("Deleted all conversations");
        }
    }
    Ok(())
}

/// Print the reply as it grows. Ctrl-C stops the session and keeps the
/// partial text.
async fn stream_reply(
    controller: &StreamSessionController,
    prompt: &str,
    options: SendOptions,
) -> Result<()> {
    let mut events = controller.subscribe();
    let task = match controller.send(prompt, options) {
        StartOutcome::Started(task) => task,
        StartOutcome::Rejected(reason) => bail!("Prompt not sent: {:?}", reason),
    };

    let mut stdout = io::stdout();
    let mut target: Option<String> = None;
    let mut printed = 0usize;

    let done = task.join();
    tokio::pin!(done);
    loop {
        tokio::select! {
            _ = &mut done => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping generation");
                controller.stop();
            }
            event = events.recv() => match event {
                Ok(ChatEvent::MessageAppended { message }) if message.is_streaming => {
                    target = Some(message.id);
                }
                Ok(ChatEvent::MessageUpdated { id, content, .. }) if target.as_ref() == Some(&id) => {
                    print_tail(&mut stdout, &content, &mut printed)?;
                }
                Ok(ChatEvent::StreamErrorReported { detail }) => {
                    eprintln!("\n[server] {}", detail);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event feed lagged, catching up from snapshot");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    // Whatever the feed did not deliver is in the final transcript.
    let snapshot = controller.snapshot();
    if let Some(reply) = target
        .as_ref()
        .and_then(|id| snapshot.messages.iter().find(|m| &m.id == id))
    {
        print_tail(&mut stdout, &reply.content, &mut printed)?;
    }
    writeln!(stdout)?;

    if let Some(id) = &snapshot.conversation_id {
        eprintln!("conversation: {}", id);
    }
    if snapshot.state == SessionState::Errored {
        let notice = snapshot
            .messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        bail!(
            "{} ({})",
            notice,
            snapshot.last_error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

fn print_tail(out: &mut impl Write, content: &str, printed: &mut usize) -> io::Result<()> {
    if let Some(tail) = content.get(*printed..) {
        out.write_all(tail.as_bytes())?;
        out.flush()?;
        *printed = content.len();
    }
    Ok(())
}

fn require_login(client: &ApiClient) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("Not signed in. Run `chatline login <email>` first.");
    }
    Ok(())
}

fn secret_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    eprint!("{}: ", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn new_password_or_prompt(value: Option<String>) -> Result<(String, String)> {
    match value {
        Some(password) => Ok((password.clone(), password)),
        None => {
            let password = secret_or_prompt(None, "New password")?;
            let confirmation = secret_or_prompt(None, "Confirm new password")?;
            Ok((password, confirmation))
        }
    }
}
