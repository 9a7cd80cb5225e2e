use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use crm_shared::TaskPriority;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::entity::{EntityKind, EntityRef};
use crate::feed::TimeRange;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "crm",
    version,
    about = "CRM client: deals, activity feed, meetings, notes and tasks",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "crmrc", global = true)]
    pub crmrc: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show a date or timestamp in Peru time
    Date {
        /// YYYY-MM-DD, RFC 3339 timestamp, or "now"
        input: String,
    },

    /// Print a month grid
    Calendar {
        /// Month to show, YYYY-MM
        #[arg(long)]
        month: Option<String>,

        /// Highlighted day, YYYY-MM-DD
        #[arg(long)]
        selected: Option<String>,
    },

    /// Show a deal and its activity feed
    Deal {
        id: u64,

        #[arg(long)]
        search: Option<String>,

        /// Activity type filter; repeatable
        #[arg(long = "kind", action = ArgAction::Append)]
        kinds: Vec<String>,

        #[arg(
            long,
            default_value = "all",
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<TimeRange>())
        )]
        range: TimeRange,
    },

    /// Log a meeting
    Meeting(CreateArgs),

    /// Add a note
    Note(CreateArgs),

    /// Create a task
    Task(TaskArgs),

    /// Replace a deal's description
    Describe {
        deal_id: u64,

        #[arg(long)]
        html: String,
    },

    /// Stage company, contact or deal links on a deal
    Associate {
        deal_id: u64,

        #[arg(
            long,
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<EntityKind>())
        )]
        kind: EntityKind,

        #[arg(long)]
        search: Option<String>,

        #[arg(long, action = ArgAction::Append)]
        add: Vec<u64>,

        #[arg(long, action = ArgAction::Append)]
        remove: Vec<u64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Record to attach to, KIND:ID (e.g. deal:42)
    #[arg(
        long,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<EntityRef>())
    )]
    pub on: EntityRef,

    #[arg(long)]
    pub title: String,

    /// Description as HTML or plain text
    #[arg(long)]
    pub description: Option<String>,

    /// Due date, YYYY-MM-DD
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TaskArgs {
    #[command(flatten)]
    pub base: CreateArgs,

    #[arg(
        long,
        default_value = "medium",
        value_parser = clap::builder::ValueParser::new(parse_priority)
    )]
    pub priority: TaskPriority,
}

pub fn parse_priority(s: &str) -> anyhow::Result<TaskPriority> {
    match s.trim().to_ascii_lowercase().as_str() {
        "low" => Ok(TaskPriority::Low),
        "medium" => Ok(TaskPriority::Medium),
        "high" => Ok(TaskPriority::High),
        "urgent" => Ok(TaskPriority::Urgent),
        other => Err(anyhow!(
            "unknown priority: {other} (expected low, medium, high or urgent)"
        )),
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` (or
/// `rc.KEY:VALUE`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));

            if let Some((k, v)) = parsed {
                let key = format!("rc.{k}");
                if key == "rc.api.token" {
                    debug!(key = %key, "captured positional rc override");
                } else {
                    debug!(key = %key, value = %v, "captured positional rc override");
                }
                overrides.push((key, v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "crm",
            "rc.api.url=http://crm.local/api",
            "date",
            "rc.color:off",
            "2024-03-05",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["crm", "date", "2024-03-05"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.api.url".to_string(), "http://crm.local/api".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_create_subcommands() {
        let cli = GlobalCli::try_parse_from([
            "crm",
            "-v",
            "task",
            "--on",
            "deal:7",
            "--title",
            "Enviar contrato",
            "--priority",
            "high",
            "--due",
            "2024-03-08",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 1);
        let Command::Task(task) = cli.command else {
            panic!("expected task subcommand");
        };
        assert_eq!(task.base.on, EntityRef::deal(7));
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.base.due.as_deref(), Some("2024-03-08"));
    }

    #[test]
    fn rejects_unknown_range() {
        assert!(
            GlobalCli::try_parse_from(["crm", "deal", "3", "--range", "ayer"]).is_err()
        );
    }
}
