//! discipline-ctl - command-line client for disciplined

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use discipline_api::{
    BlockMode, Command, EventPayload, GroupDocument, PolicyDocument, ResponsePayload, RunSummary,
    ScheduleType, SettingsUpdate,
};
use discipline_ipc::IpcClient;
use discipline_util::{GroupId, PolicyId, default_socket_path, format_datetime_full};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// discipline-ctl - manage app restriction policies
#[derive(Parser, Debug)]
#[command(name = "discipline-ctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the daemon socket
    #[arg(short, long, env = "DISCIPLINE_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Print raw JSON payloads
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the daemon answers
    Ping,

    /// Daemon health and the last run
    Status,

    // === Policies ===
    /// List policies
    #[command(alias = "ls")]
    Policies,

    /// Create a policy
    AddPolicy(AddPolicyArgs),

    /// Create or replace a policy from a JSON document
    ImportPolicy {
        /// Path to the JSON document ("-" for stdin)
        file: PathBuf,
    },

    /// Delete a policy
    DeletePolicy { id: String },

    // === Groups ===
    /// List groups
    Groups,

    /// Create a group
    AddGroup {
        name: String,

        /// Member packages
        #[arg(required = true)]
        packages: Vec<String>,

        /// ARGB display colour
        #[arg(long, default_value_t = 0)]
        color: i64,
    },

    /// Delete a group
    DeleteGroup { id: String },

    // === Enforcement ===
    /// Run a reconciliation now and print its summary
    Reconcile,

    /// Packages the current policies want disabled
    Restricted,

    /// Installed packages with their restriction state
    Packages,

    /// Global override settings
    Settings,

    /// Change global override settings
    SetSettings {
        /// Unlocks allowed per day
        #[arg(long)]
        unlock_limit: Option<u32>,

        /// Seconds before force mode takes effect
        #[arg(long)]
        force_mode_delay: Option<u64>,

        /// Seconds before an unlock takes effect
        #[arg(long)]
        force_unlock_delay: Option<u64>,
    },

    /// Switch force mode on or off (off at most once per day)
    ForceMode {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Spend one of today's unlocks
    Unlock,

    /// Stream daemon events until interrupted
    Watch,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Switch {
    On,
    Off,
}

#[derive(clap::Args, Debug)]
struct AddPolicyArgs {
    label: String,

    /// Window start, HH:mm
    start: String,

    /// Window end, HH:mm (earlier than start wraps past midnight)
    end: String,

    /// Target packages
    #[arg(short, long = "package")]
    packages: Vec<String>,

    /// Referenced group ids
    #[arg(short, long = "group")]
    groups: Vec<String>,

    /// Weekdays, 1 = Sunday .. 7 = Saturday (default: every day)
    #[arg(short, long, value_delimiter = ',', conflicts_with_all = ["daily", "dates"])]
    days: Vec<i64>,

    /// Every day, ignoring weekdays
    #[arg(long)]
    daily: bool,

    /// Specific dates, yyyy-MM-dd
    #[arg(long, value_delimiter = ',')]
    dates: Vec<String>,

    /// Apps are available only inside the window
    #[arg(long)]
    show_during: bool,

    /// Restrict regardless of the schedule
    #[arg(long)]
    force: bool,

    /// Store the policy switched off
    #[arg(long)]
    disabled: bool,
}

impl AddPolicyArgs {
    fn into_document(self) -> PolicyDocument {
        let mut doc = PolicyDocument::new(self.label, &self.start, &self.end);
        doc.packages = self.packages;
        doc.group_ids = self.groups;
        if !self.days.is_empty() {
            doc.days_of_week = self.days;
        }
        if self.daily {
            doc.schedule_type = ScheduleType::Daily;
        } else if !self.dates.is_empty() {
            doc.schedule_type = ScheduleType::SpecificDates;
            doc.specific_dates = self.dates;
        }
        if self.show_during {
            doc.block_mode = BlockMode::ShowDuring;
        }
        doc.is_force_mode = self.force;
        doc.is_enabled = !self.disabled;
        doc
    }
}

fn read_document(file: &PathBuf) -> Result<PolicyDocument> {
    let content = if file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?
    };
    serde_json::from_str(&content).context("Invalid policy document")
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{:?} at {}: inspected {}, restricted {}, changed {}, failed {}",
        summary.status,
        format_datetime_full(&summary.finished_at),
        summary.inspected,
        summary.desired_restricted,
        summary.changed(),
        summary.failed.len()
    );
    for package in &summary.disabled {
        println!("  disabled {}", package);
    }
    for package in &summary.enabled {
        println!("  enabled  {}", package);
    }
    for package in &summary.failed {
        println!("  FAILED   {}", package);
    }
    if let Some(message) = &summary.message {
        println!("  {}", message);
    }
}

fn print_payload(payload: &ResponsePayload) {
    match payload {
        ResponsePayload::Pong => println!("pong"),
        ResponsePayload::Health(health) => {
            println!("executor ready: {}", health.executor_ready);
            println!("store ok:       {}", health.store_ok);
            println!("policies:       {}", health.policy_count);
            match &health.last_run {
                Some(summary) => print_summary(summary),
                None => println!("no run yet"),
            }
        }
        ResponsePayload::Policies(policies) => {
            for p in policies {
                let state = if p.is_enabled { "on " } else { "off" };
                let force = if p.is_force_mode { " [force]" } else { "" };
                println!(
                    "{} {} {:<20} {}~{} {:?} {:?}{} packages={} groups={}",
                    state,
                    p.id,
                    p.label,
                    p.start_time,
                    p.end_time,
                    p.schedule_type,
                    p.block_mode,
                    force,
                    p.packages.len(),
                    p.group_ids.len()
                );
            }
        }
        ResponsePayload::PolicySaved { policy_id } => println!("saved policy {}", policy_id),
        ResponsePayload::PolicyDeleted { existed } | ResponsePayload::GroupDeleted { existed } => {
            println!("{}", if *existed { "deleted" } else { "not found" })
        }
        ResponsePayload::Groups(groups) => {
            for g in groups {
                println!("{} {:<20} {}", g.id, g.name, g.packages.join(", "));
            }
        }
        ResponsePayload::GroupSaved { group_id } => println!("saved group {}", group_id),
        ResponsePayload::ReconcileFinished(summary) => print_summary(summary),
        ResponsePayload::Restricted(packages) => {
            for package in packages {
                println!("{}", package);
            }
        }
        ResponsePayload::Packages(packages) => {
            for p in packages {
                let state = if p.enabled { "enabled " } else { "disabled" };
                match (&p.blocked_by, &p.block_schedule) {
                    (Some(label), Some(window)) => {
                        println!("{} {} ({} {})", state, p.package, label, window)
                    }
                    _ => println!("{} {}", state, p.package),
                }
            }
        }
        ResponsePayload::Settings(s) => {
            println!("force mode:      {}", s.force_mode_enabled);
            println!("unlocks:         {}/{} used", s.unlocks_used_today, s.unlock_limit);
            println!("remaining:       {}", s.remaining_unlocks);
            println!("can disable:     {}", s.can_disable_force_mode);
            println!("force delay:     {}s", s.force_mode_delay_secs);
            println!("unlock delay:    {}s", s.force_unlock_delay_secs);
        }
        ResponsePayload::ForceModeLocked => {
            println!("force mode was already switched off today")
        }
        ResponsePayload::UnlockGranted { remaining } => {
            println!("unlock granted, {} left today", remaining)
        }
        ResponsePayload::UnlockDenied => println!("no unlocks left today"),
        ResponsePayload::Subscribed { client_id } => println!("subscribed as {}", client_id),
        ResponsePayload::Unsubscribed => println!("unsubscribed"),
    }
}

fn to_command(command: Commands) -> Result<Command> {
    Ok(match command {
        Commands::Ping => Command::Ping,
        Commands::Status => Command::GetHealth,
        Commands::Policies => Command::ListPolicies,
        Commands::AddPolicy(args) => Command::SavePolicy {
            policy: args.into_document(),
        },
        Commands::ImportPolicy { file } => Command::SavePolicy {
            policy: read_document(&file)?,
        },
        Commands::DeletePolicy { id } => Command::DeletePolicy {
            policy_id: PolicyId::new(id),
        },
        Commands::Groups => Command::ListGroups,
        Commands::AddGroup {
            name,
            packages,
            color,
        } => Command::SaveGroup {
            group: GroupDocument {
                id: String::new(),
                name,
                packages,
                color,
            },
        },
        Commands::DeleteGroup { id } => Command::DeleteGroup {
            group_id: GroupId::new(id),
        },
        Commands::Reconcile => Command::ReconcileNow,
        Commands::Restricted => Command::GetRestricted,
        Commands::Packages => Command::ListPackages,
        Commands::Settings => Command::GetSettings,
        Commands::SetSettings {
            unlock_limit,
            force_mode_delay,
            force_unlock_delay,
        } => {
            let update = SettingsUpdate {
                unlock_limit,
                force_mode_delay_secs: force_mode_delay,
                force_unlock_delay_secs: force_unlock_delay,
            };
            if update.is_empty() {
                bail!("nothing to change");
            }
            Command::UpdateSettings { update }
        }
        Commands::ForceMode { state } => Command::SetForceMode {
            enabled: state == Switch::On,
        },
        Commands::Unlock => Command::UseUnlock,
        Commands::Watch => bail!("watch is not a single request"),
    })
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await.context("Failed to subscribe")?;
    loop {
        let event = events.next().await.context("Event stream ended")?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        let time = event.timestamp.format("%H:%M:%S");
        match event.payload {
            EventPayload::PoliciesChanged { policy_count } => {
                println!("{} policies changed ({} total)", time, policy_count)
            }
            EventPayload::GroupsChanged { group_count } => {
                println!("{} groups changed ({} total)", time, group_count)
            }
            EventPayload::ReconcileFinished(summary) => {
                print!("{} ", time);
                print_summary(&summary);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut client = IpcClient::connect(&cli.socket)
        .await
        .with_context(|| format!("Failed to connect to disciplined at {:?}", cli.socket))?;
    debug!(socket = %cli.socket.display(), "Connected");

    if matches!(cli.command, Commands::Watch) {
        return watch(client, cli.json).await;
    }

    let payload = client.request(to_command(cli.command)?).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_payload(&payload);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("discipline-ctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn add_policy_builds_weekly_document() {
        let cli = parse(&[
            "add-policy",
            "Homework",
            "16:00",
            "18:00",
            "-p",
            "com.example.game",
            "-p",
            "com.example.video",
            "--days",
            "2,3,4,5,6",
        ]);
        let Commands::AddPolicy(args) = cli.command else {
            panic!("expected add-policy");
        };
        let doc = args.into_document();

        assert!(doc.id.is_empty());
        assert_eq!(doc.packages.len(), 2);
        assert_eq!(doc.days_of_week, vec![2, 3, 4, 5, 6]);
        assert_eq!(doc.schedule_type, ScheduleType::Weekly);
        assert_eq!(doc.block_mode, BlockMode::HideDuring);
        assert!(doc.is_enabled);
    }

    #[test]
    fn add_policy_specific_dates_show_during() {
        let cli = parse(&[
            "add-policy",
            "Exams",
            "08:00",
            "12:00",
            "--dates",
            "2025-06-01,2025-06-02",
            "--show-during",
            "--force",
        ]);
        let Commands::AddPolicy(args) = cli.command else {
            panic!("expected add-policy");
        };
        let doc = args.into_document();

        assert_eq!(doc.schedule_type, ScheduleType::SpecificDates);
        assert_eq!(doc.specific_dates.len(), 2);
        assert_eq!(doc.block_mode, BlockMode::ShowDuring);
        assert!(doc.is_force_mode);
    }

    #[test]
    fn days_conflict_with_daily() {
        let result = Cli::try_parse_from([
            "discipline-ctl",
            "add-policy",
            "x",
            "09:00",
            "10:00",
            "--days",
            "1",
            "--daily",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn commands_map_to_requests() {
        let cli = parse(&["delete-group", "g1"]);
        match to_command(cli.command).unwrap() {
            Command::DeleteGroup { group_id } => assert_eq!(group_id.as_str(), "g1"),
            other => panic!("unexpected {:?}", other),
        }

        let cli = parse(&["add-group", "Social", "com.a.b", "com.c.d"]);
        match to_command(cli.command).unwrap() {
            Command::SaveGroup { group } => {
                assert!(group.id.is_empty());
                assert_eq!(group.packages, vec!["com.a.b", "com.c.d"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(to_command(parse(&["watch"]).command).is_err());
    }

    #[test]
    fn settings_commands() {
        let cli = parse(&["set-settings", "--unlock-limit", "2"]);
        match to_command(cli.command).unwrap() {
            Command::UpdateSettings { update } => {
                assert_eq!(update.unlock_limit, Some(2));
                assert!(update.force_mode_delay_secs.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(to_command(parse(&["set-settings"]).command).is_err());

        let cli = parse(&["force-mode", "off"]);
        assert!(matches!(
            to_command(cli.command).unwrap(),
            Command::SetForceMode { enabled: false }
        ));
    }
}
