use agentstream::config::{self, DEFAULT_BASE_URL};
use agentstream::logging::{self, DEFAULT_FILTER};
use agentstream::protocol::{GuardrailBlock, SourceList, ToolApproval};
use agentstream::{
    AgentClient, ChatRequest, ClientConfig, EventStream, ResumeRequest, StreamEvent, StreamSlot,
};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "agentstream", about = "Stream replies from an agent chat backend")]
struct Cli {
    #[arg(long, env = "AGENTSTREAM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Bearer token; falls back to ~/.agentstream/token.
    #[arg(long, env = "AGENTSTREAM_TOKEN")]
    token: Option<String>,

    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message and stream the reply.
    Chat(ChatArgs),
    /// Answer a pending tool approval and stream the rest of the reply.
    Resume(ResumeArgs),
}

#[derive(Args)]
struct ChatArgs {
    #[arg(long, short)]
    message: String,
    #[arg(long)]
    conversation_id: Option<String>,
    #[arg(long)]
    organization_id: Option<String>,
    #[arg(long)]
    team_id: Option<String>,
    #[arg(long = "media-id")]
    media_ids: Vec<String>,
}

#[derive(Args)]
struct ResumeArgs {
    #[arg(long)]
    conversation_id: String,
    #[arg(long)]
    organization_id: String,
    #[arg(long)]
    team_id: Option<String>,
    #[arg(long, conflicts_with = "deny", required_unless_present = "deny")]
    approve: bool,
    #[arg(long)]
    deny: bool,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_tracing(DEFAULT_FILTER, cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> CliResult<ExitCode> {
    let token = config::resolve_token(cli.token)?;
    let client = AgentClient::new(ClientConfig::new(cli.base_url).with_token(token))?;

    let slot = Arc::new(StreamSlot::new());
    let ctrl_c_slot = Arc::clone(&slot);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_slot.cancel();
        }
    });

    let (events, lease) = match cli.command {
        Command::Chat(args) => {
            let lease = slot.begin(args.conversation_id.as_deref());
            let mut request = ChatRequest::new(args.message).media(args.media_ids);
            request.conversation_id = args.conversation_id;
            request.organization_id = args.organization_id;
            request.team_id = args.team_id;
            let stream = client.chat_stream(&request, Some(lease.token.clone())).await?;
            (stream, lease)
        }
        Command::Resume(args) => {
            let lease = slot.begin(Some(args.conversation_id.as_str()));
            let mut request =
                ResumeRequest::new(args.conversation_id, args.organization_id, args.approve);
            request.team_id = args.team_id;
            let stream = client
                .resume_stream(&request, Some(lease.token.clone()))
                .await?;
            (stream, lease)
        }
    };

    let code = print_events(events).await?;
    slot.finish(&lease);
    Ok(code)
}

async fn print_events(mut events: EventStream) -> CliResult<ExitCode> {
    let mut stdout = std::io::stdout();
    let mut mid_reply = false;

    while let Some(event) = events.next().await {
        let event = event?;
        if mid_reply && !matches!(event, StreamEvent::Token(_)) {
            writeln!(stdout)?;
            mid_reply = false;
        }

        match event {
            StreamEvent::Token(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
                mid_reply = true;
            }
            StreamEvent::Title(title) => {
                println!("[title] {} ({})", title.title, title.conversation_id);
            }
            StreamEvent::Sources(SourceList { sources, .. }) => {
                for source in sources {
                    match source.score {
                        Some(score) => println!("[source] {} ({score:.2})", source.source),
                        None => println!("[source] {}", source.source),
                    }
                }
            }
            StreamEvent::ToolApproval(approval) => print_approval(&approval),
            StreamEvent::GuardrailBlock(GuardrailBlock { message, .. }) => {
                println!("[blocked] {message}");
            }
            StreamEvent::Error(message) => {
                eprintln!("[error] {message}");
                return Ok(ExitCode::FAILURE);
            }
            StreamEvent::Done(done) => {
                println!("[done] {}", done.conversation_id);
            }
        }
    }

    if mid_reply {
        writeln!(stdout)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn print_approval(approval: &ToolApproval) {
    println!("[approval needed] {}", approval.tool_name);
    if !approval.tool_description.is_empty() {
        println!("  {}", approval.tool_description);
    }
    let args = serde_json::to_string_pretty(&approval.tool_args).unwrap_or_default();
    for line in args.lines() {
        println!("  {line}");
    }
    println!(
        "  resume with: agentstream resume --conversation-id {} --organization-id <ORG> --approve|--deny",
        approval.conversation_id
    );
}
