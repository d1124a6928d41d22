#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use convo_store::config::Config;
use convo_store::history::ConversationStore;
use convo_store::infra::create_sweeper;
use std::fmt::Write as _;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Process-local conversation history cache for chat assistants.
#[derive(Parser, Debug)]
#[command(name = "convo-store")]
#[command(version)]
#[command(about = "Time-expiring conversation history cache.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an interactive session against an in-memory store
    #[command(long_about = "\
Run an interactive session against an in-memory store.

Reads one command per line from stdin:
  say <user> <discussion> <text>   append a user turn and an echo reply
  show <user> <discussion>         print the live thread, if any
  clear <user> <discussion>        drop a conversation
  keys                             list cached conversation keys
  stats                            print count and size estimate
  info                             print detailed cache info as JSON
  sweep                            remove stale conversations now
  quit                             exit

Examples:
  convo-store run
  convo-store run --ttl-minutes 1 --sweep-secs 10")]
    Run {
        /// Override history.ttl_minutes
        #[arg(long)]
        ttl_minutes: Option<u64>,

        /// Override history.sweep_interval_secs
        #[arg(long)]
        sweep_secs: Option<u64>,

        /// Disable the background sweeper (expire lazily on lookup only)
        #[arg(long)]
        no_sweeper: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration as TOML
    Show,
}

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    Say {
        user: String,
        discussion: String,
        text: String,
    },
    Show {
        user: String,
        discussion: String,
    },
    Clear {
        user: String,
        discussion: String,
    },
    Keys,
    Stats,
    Info,
    Sweep,
    Quit,
}

fn parse_session_command(line: &str) -> Result<SessionCommand> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim_start();

    let ids = |rest: &str| -> Result<(String, String)> {
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(discussion), None) => Ok((user.to_string(), discussion.to_string())),
            _ => bail!("expected: {verb} <user> <discussion>"),
        }
    };

    match verb {
        "say" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let user = parts.next().unwrap_or_default();
            let discussion = parts.next().unwrap_or_default();
            let text = parts.next().unwrap_or_default().trim();
            if user.is_empty() || discussion.is_empty() || text.is_empty() {
                bail!("expected: say <user> <discussion> <text>");
            }
            Ok(SessionCommand::Say {
                user: user.to_string(),
                discussion: discussion.to_string(),
                text: text.to_string(),
            })
        }
        "show" => {
            let (user, discussion) = ids(rest)?;
            Ok(SessionCommand::Show { user, discussion })
        }
        "clear" => {
            let (user, discussion) = ids(rest)?;
            Ok(SessionCommand::Clear { user, discussion })
        }
        "keys" => Ok(SessionCommand::Keys),
        "stats" => Ok(SessionCommand::Stats),
        "info" => Ok(SessionCommand::Info),
        "sweep" => Ok(SessionCommand::Sweep),
        "quit" | "exit" => Ok(SessionCommand::Quit),
        "" => bail!("empty command"),
        other => bail!("unknown command: {other}"),
    }
}

/// Run one command against the store and render its output.
///
/// `say` follows the request-handler flow: fetch (or mint) the thread, let
/// the agent layer append turns outside the store lock, then write it back.
fn execute(store: &ConversationStore, command: SessionCommand) -> Result<String> {
    let mut out = String::new();
    match command {
        SessionCommand::Say {
            user,
            discussion,
            text,
        } => {
            let thread = store.get_or_create(&user, &discussion);
            thread.add_user_message(text.as_str());
            thread.add_assistant_message(format!("echo: {text}"));
            if store.update(&user, &discussion, thread.clone()) {
                writeln!(out, "[{} turns] echo: {text}", thread.turn_count())?;
            } else {
                writeln!(out, "conversation expired mid-request; reply discarded")?;
            }
        }
        SessionCommand::Show { user, discussion } => match store.peek(&user, &discussion) {
            Some(thread) => {
                for turn in thread.turns() {
                    writeln!(out, "{:?}: {}", turn.role, turn.content)?;
                }
                if thread.turn_count() == 0 {
                    writeln!(out, "(empty)")?;
                }
            }
            None => writeln!(out, "no live conversation")?,
        },
        SessionCommand::Clear { user, discussion } => {
            let removed = store.clear(&user, &discussion);
            writeln!(out, "{}", if removed { "cleared" } else { "not found" })?;
        }
        SessionCommand::Keys => {
            for key in store.list_keys() {
                writeln!(out, "{key}")?;
            }
        }
        SessionCommand::Stats => {
            let stats = store.stats();
            writeln!(
                out,
                "histories: {}  size estimate: {} bytes",
                stats.total_histories, stats.memory_usage_estimate
            )?;
        }
        SessionCommand::Info => {
            let info = store.detailed_info();
            writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        SessionCommand::Sweep => {
            writeln!(out, "removed {}", store.sweep_expired())?;
        }
        SessionCommand::Quit => {}
    }
    Ok(out)
}

async fn run_session(config: Config) -> Result<()> {
    let store = ConversationStore::from_config(&config.history);
    let sweeper = create_sweeper(&store, &config.history);
    info!(
        ttl_secs = store.ttl().as_secs(),
        sweeper = sweeper.is_some(),
        "Conversation store ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_session_command(&line) {
            Ok(SessionCommand::Quit) => break,
            Ok(command) => print!("{}", execute(&store, command)?),
            Err(error) => eprintln!("{error}"),
        }
        std::io::stdout().flush()?;
    }

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }
    let stats = store.stats();
    info!(
        histories = stats.total_histories,
        size_estimate = stats.memory_usage_estimate,
        "Session ended"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("CONVO_STORE_CONFIG_DIR", config_dir);
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    let mut config = Config::load_or_init().await?;

    // Initialize logging - RUST_LOG wins, then observability.log_level
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    info!(path = %config.config_path.display(), "Config loaded");

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Run {
            ttl_minutes,
            sweep_secs,
            no_sweeper,
        } => {
            if let Some(minutes) = ttl_minutes {
                config.history.ttl_minutes = minutes;
            }
            if let Some(secs) = sweep_secs {
                config.history.sweep_interval_secs = secs;
            }
            if no_sweeper {
                config.history.sweeper_enabled = false;
            }
            config.validate()?;
            run_session(config).await
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        },
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "convo-store",
            "run",
            "--ttl-minutes",
            "5",
            "--no-sweeper",
        ])
        .expect("run invocation should parse");
        match cli.command {
            Commands::Run {
                ttl_minutes,
                sweep_secs,
                no_sweeper,
            } => {
                assert_eq!(ttl_minutes, Some(5));
                assert_eq!(sweep_secs, None);
                assert!(no_sweeper);
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["convo-store", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(script.contains("convo-store"));
    }

    #[test]
    fn say_keeps_free_text_intact() {
        let command = parse_session_command("say alice d1   hello there,  world ").unwrap();
        assert_eq!(
            command,
            SessionCommand::Say {
                user: "alice".into(),
                discussion: "d1".into(),
                text: "hello there,  world".into(),
            }
        );
    }

    #[test]
    fn malformed_commands_are_rejected() {
        assert!(parse_session_command("say alice d1").is_err());
        assert!(parse_session_command("show alice").is_err());
        assert!(parse_session_command("clear alice d1 extra").is_err());
        assert!(parse_session_command("dance").is_err());
        assert!(parse_session_command("   ").is_err());
    }

    #[test]
    fn simple_verbs_parse() {
        assert_eq!(parse_session_command("keys").unwrap(), SessionCommand::Keys);
        assert_eq!(parse_session_command(" stats ").unwrap(), SessionCommand::Stats);
        assert_eq!(parse_session_command("info").unwrap(), SessionCommand::Info);
        assert_eq!(parse_session_command("sweep").unwrap(), SessionCommand::Sweep);
        assert_eq!(parse_session_command("exit").unwrap(), SessionCommand::Quit);
    }

    #[test]
    fn say_accumulates_turns_across_requests() {
        let store = ConversationStore::new(Duration::from_secs(60));
        let say = |text: &str| SessionCommand::Say {
            user: "alice".into(),
            discussion: "d1".into(),
            text: text.into(),
        };

        let first = execute(&store, say("hi")).unwrap();
        assert!(first.starts_with("[2 turns]"));
        let second = execute(&store, say("again")).unwrap();
        assert!(second.starts_with("[4 turns]"));

        let shown = execute(
            &store,
            SessionCommand::Show {
                user: "alice".into(),
                discussion: "d1".into(),
            },
        )
        .unwrap();
        assert!(shown.contains("User: hi"));
        assert!(shown.contains("Assistant: echo: again"));
    }

    #[test]
    fn clear_and_stats_report_store_state() {
        let store = ConversationStore::new(Duration::from_secs(60));
        store.get_or_create("alice", "d1");

        let stats = execute(&store, SessionCommand::Stats).unwrap();
        assert!(stats.starts_with("histories: 1"));

        let clear = |store: &ConversationStore| {
            execute(
                store,
                SessionCommand::Clear {
                    user: "alice".into(),
                    discussion: "d1".into(),
                },
            )
            .unwrap()
        };
        assert_eq!(clear(&store), "cleared\n");
        assert_eq!(clear(&store), "not found\n");
        assert!(store.is_empty());
    }
}
