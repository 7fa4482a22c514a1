use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tidal")]
#[command(about = "Streaming API client with automatic session refresh")]
pub struct Cli {
    #[arg(long, env = "TIDAL_BASE_URL")]
    pub base_url: Option<String>,
    #[arg(long, env = "TIDAL_CONFIG", help = "Config file (default ~/.tidal/config.yaml)")]
    pub config: Option<String>,
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Login(LoginArgs),
    Logout,
    #[command(about = "Open a streaming endpoint and print each event as a JSON line")]
    Stream(StreamArgs),
    #[command(about = "Send a JSON request and print the response body")]
    Request(RequestArgs),
    Config(ConfigArgs),
    Token(TokenArgs),
}

#[derive(Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long, env = "TIDAL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct StreamArgs {
    pub path: String,
    #[arg(long, help = "JSON request body", default_value = "{}")]
    pub data: String,
    #[arg(long, help = "Deliver one batch per frame instead of per chunk")]
    pub per_frame: bool,
    #[arg(long, help = "Treat the endpoint as public")]
    pub public: bool,
}

#[derive(Args)]
pub struct RequestArgs {
    pub method: String,
    pub path: String,
    #[arg(long, help = "JSON request body")]
    pub data: Option<String>,
    #[arg(long)]
    pub public: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Print the effective configuration")]
    Show,
}

#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand)]
pub enum TokenCommand {
    #[command(about = "Store tokens obtained elsewhere")]
    Set(TokenSetArgs),
    Clear,
    #[command(about = "Show whether a session is stored")]
    Status,
}

#[derive(Args)]
pub struct TokenSetArgs {
    #[arg(long)]
    pub access: String,
    #[arg(long)]
    pub refresh: Option<String>,
}
