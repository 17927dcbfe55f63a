use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use pmm_console::{
    ApiClient, Config, Console,
    api::{
        alert_rules::{AlertRule, CreateAlertRule, Filter, RuleParam, Severity},
        channels::{ChannelDraft, ChannelKind, PagerDutyKey},
        dbcluster::DbCluster,
    },
    dbaas::{ClusterList, DbClusterSource, DbClusterWatcher, KubernetesSource},
    fanout::FailurePolicy,
    poller::TickPolicy,
};
use regex::Regex;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

static FILTER_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^=\s]+)=(.*)$").expect("filter pattern is valid"));

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Manage integrated alerting and DBaaS clusters")]
struct Args {
    /// Config file (defaults to ~/.config/pmm-console/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More logging, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Alert rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Alert rule templates
    #[command(subcommand)]
    Templates(TemplatesCommand),

    /// Notification channels
    #[command(subcommand)]
    Channels(ChannelsCommand),

    /// Kubernetes clusters registered for DBaaS
    Kubernetes,

    /// Database clusters
    #[command(subcommand)]
    Clusters(ClustersCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum RulesCommand {
    List,
    Toggle { rule_id: String },
    Delete { rule_id: String },
    Copy { rule_id: String },
    Create {
        #[arg(long)]
        template: String,
        #[arg(long)]
        summary: String,
        /// Value for the template's threshold parameter
        #[arg(long)]
        threshold: Option<f64>,
        /// Seconds the condition has to hold
        #[arg(long)]
        duration: Option<u64>,
        #[arg(long, value_enum)]
        severity: Option<SeverityArg>,
        /// key=value, may be repeated
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Notification channel id, may be repeated
        #[arg(long = "channel")]
        channels: Vec<String>,
        #[arg(long)]
        disabled: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeverityArg {
    Critical,
    High,
    Warning,
    Notice,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Critical => Severity::Critical,
            SeverityArg::High => Severity::Error,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Notice => Severity::Notice,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum TemplatesCommand {
    List,
    /// Upload a new template from a YAML file
    Create { file: PathBuf },
    /// Replace a template from a YAML file
    Update { file: PathBuf },
    Delete { name: String },
}

#[derive(Debug, Clone, Subcommand)]
enum ChannelsCommand {
    List,
    Add {
        /// Also notify when the alert resolves
        #[arg(long)]
        send_resolved: bool,
        #[command(subcommand)]
        channel: ChannelArgs,
    },
    /// Replace the settings of an existing channel
    Change {
        channel_id: String,
        /// Also notify when the alert resolves
        #[arg(long)]
        send_resolved: bool,
        #[command(subcommand)]
        channel: ChannelArgs,
    },
    Remove {
        channel_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum ChannelArgs {
    Email {
        #[arg(long)]
        summary: String,
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,
    },
    Slack {
        #[arg(long)]
        summary: String,
        #[arg(long)]
        channel: String,
    },
    Pagerduty {
        #[arg(long)]
        summary: String,
        #[arg(
            long,
            conflicts_with = "service_key",
            required_unless_present = "service_key"
        )]
        routing_key: Option<String>,
        #[arg(long)]
        service_key: Option<String>,
    },
}

impl ChannelArgs {
    fn into_draft(self, send_resolved: bool) -> ChannelDraft {
        let (summary, kind) = match self {
            ChannelArgs::Email { summary, to } => (summary, ChannelKind::Email { emails: to }),
            ChannelArgs::Slack { summary, channel } => (summary, ChannelKind::Slack { channel }),
            ChannelArgs::Pagerduty {
                summary,
                routing_key,
                service_key,
            } => {
                let kind = match (routing_key, service_key) {
                    (Some(key), _) => ChannelKind::pager_duty(PagerDutyKey::Routing, key),
                    (None, key) => {
                        ChannelKind::pager_duty(PagerDutyKey::Service, key.unwrap_or_default())
                    }
                };
                (summary, kind)
            }
        };

        ChannelDraft {
            summary,
            send_resolved,
            kind,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum ClustersCommand {
    /// List clusters once
    List {
        /// Show which Kubernetes clusters could not be queried
        #[arg(long)]
        report_failures: bool,
    },
    /// Keep listing clusters on an interval
    Watch {
        /// Seconds between refreshes (overrides the config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
        /// Do not wait for a slow refresh before starting the next one
        #[arg(long)]
        overlap: bool,
    },
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![("pmm_console", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = Config::load(args.config.as_deref())?;
    debug!("using server {}", config.server_url);

    let client = ApiClient::new(&config).context("failed to set up API client")?;
    let console = Console::new(client);

    match args.command {
        Command::Rules(cmd) => rules(&console, cmd).await,
        Command::Templates(cmd) => templates(&console, cmd).await,
        Command::Channels(cmd) => channels(&console, cmd).await,
        Command::Kubernetes => kubernetes(&console).await,
        Command::Clusters(cmd) => clusters(&console, &config, cmd).await,
    }
}

async fn rule_by_id(console: &Console, rule_id: &str) -> Result<AlertRule> {
    console
        .find_alert_rule(rule_id)
        .await?
        .ok_or_else(|| anyhow!("no alert rule with id {rule_id}"))
}

fn parse_filter(raw: &str) -> Result<Filter> {
    let caps = FILTER_ARG
        .captures(raw)
        .ok_or_else(|| anyhow!("invalid filter {raw:?}, expected key=value"))?;
    Ok(Filter::equal(&caps[1], &caps[2]))
}

async fn rules(console: &Console, cmd: RulesCommand) -> Result<()> {
    let notice = match cmd {
        RulesCommand::List => {
            let rules = console.alert_rules().await?;
            if rules.is_empty() {
                println!("No alert rules");
            }
            for rule in rules {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    rule.rule_id,
                    rule.summary,
                    rule.threshold,
                    rule.duration,
                    rule.severity,
                    rule.filters.join(", "),
                    rule.created_at,
                    if rule.disabled { "disabled" } else { "enabled" },
                );
            }
            return Ok(());
        }
        RulesCommand::Toggle { rule_id } => {
            let rule = rule_by_id(console, &rule_id).await?;
            console.toggle_alert_rule(&rule).await?
        }
        RulesCommand::Delete { rule_id } => {
            let rule = rule_by_id(console, &rule_id).await?;
            console.delete_alert_rule(&rule).await?
        }
        RulesCommand::Copy { rule_id } => {
            let rule = rule_by_id(console, &rule_id).await?;
            console.copy_alert_rule(&rule).await?
        }
        RulesCommand::Create {
            template,
            summary,
            threshold,
            duration,
            severity,
            filters,
            channels,
            disabled,
        } => {
            let filters = filters
                .iter()
                .map(|f| parse_filter(f))
                .collect::<Result<Vec<_>>>()?;
            let rule = CreateAlertRule {
                template_name: template,
                summary,
                disabled,
                params: threshold
                    .map(|value| vec![RuleParam::float("threshold", value)])
                    .unwrap_or_default(),
                duration: duration.map(|secs| format!("{secs}s")),
                severity: severity.map(Severity::from),
                custom_labels: None,
                filters,
                channel_ids: channels,
            };
            console.create_alert_rule(&rule).await?
        }
    };

    info!("{notice}");
    println!("{notice}");
    Ok(())
}

async fn templates(console: &Console, cmd: TemplatesCommand) -> Result<()> {
    let read = |file: &PathBuf| {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read template file {}", file.display()))
    };

    let notice = match cmd {
        TemplatesCommand::List => {
            for template in console.templates().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    template.name,
                    template.summary,
                    template.severity.map(|s| s.label()).unwrap_or("-"),
                    template.duration.as_deref().unwrap_or("-"),
                );
            }
            return Ok(());
        }
        TemplatesCommand::Create { file } => console.create_template(&read(&file)?).await?,
        TemplatesCommand::Update { file } => console.update_template(&read(&file)?).await?,
        TemplatesCommand::Delete { name } => console.delete_template(&name).await?,
    };

    println!("{notice}");
    Ok(())
}

async fn channels(console: &Console, cmd: ChannelsCommand) -> Result<()> {
    let notice = match cmd {
        ChannelsCommand::List => {
            for channel in console.channels().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    channel.channel_id,
                    channel.summary,
                    channel.kind.type_label(),
                    channel.kind.target(),
                );
            }
            return Ok(());
        }
        ChannelsCommand::Add {
            send_resolved,
            channel,
        } => console.add_channel(&channel.into_draft(send_resolved)).await?,
        ChannelsCommand::Change {
            channel_id,
            send_resolved,
            channel,
        } => {
            console
                .change_channel(&channel_id, &channel.into_draft(send_resolved))
                .await?
        }
        ChannelsCommand::Remove { channel_id } => {
            let channel = console
                .channels()
                .await?
                .into_iter()
                .find(|c| c.channel_id == channel_id)
                .ok_or_else(|| anyhow!("no notification channel with id {channel_id}"))?;
            console.remove_channel(&channel).await?
        }
    };

    println!("{notice}");
    Ok(())
}

async fn kubernetes(console: &Console) -> Result<()> {
    for cluster in console.kubernetes().await? {
        println!(
            "{}\t{:?}\txtradb={:?}\tpsmdb={:?}",
            cluster.kubernetes_cluster_name,
            cluster.status,
            cluster.operators.xtradb.status,
            cluster.operators.psmdb.status,
        );
    }
    Ok(())
}

fn print_clusters(clusters: &[DbCluster]) {
    if clusters.is_empty() {
        println!("No database clusters");
    }
    for cluster in clusters {
        let progress = match (cluster.finished_steps, cluster.total_steps) {
            (Some(done), Some(total)) => format!(" ({done}/{total})"),
            _ => String::new(),
        };
        println!(
            "{}\t{}\t{}\t{}{}\t{} nodes\t{:.1} CPU\t{:.1} GB RAM\t{:.1} GB disk",
            cluster.cluster_name,
            cluster.database_type,
            cluster.kubernetes_cluster_name,
            cluster.status.label(),
            progress,
            cluster.cluster_size,
            cluster.cpu,
            cluster.memory,
            cluster.disk,
        );
    }
}

fn print_failures(list: &ClusterList) {
    for failure in &list.failures {
        eprintln!(
            "could not list {} clusters on {}: {}",
            failure.database_type, failure.kubernetes_cluster_name, failure.error
        );
    }
}

async fn clusters(console: &Console, config: &Config, cmd: ClustersCommand) -> Result<()> {
    match cmd {
        ClustersCommand::List { report_failures } => {
            let policy = if report_failures {
                FailurePolicy::Report
            } else {
                config.failure_policy
            };
            let kubernetes = console.kubernetes().await?;
            let source = DbClusterSource::new(
                console.client().clone(),
                KubernetesSource::Fixed(kubernetes.clone()),
                policy,
            );

            let list = source.list_on(&kubernetes).await;
            print_clusters(&list.clusters);
            print_failures(&list);
            Ok(())
        }
        ClustersCommand::Watch { interval, overlap } => {
            let mut config = config.clone();
            if let Some(secs) = interval {
                config.poll_interval_secs = secs;
            }
            if overlap {
                config.tick_policy = TickPolicy::Overlap;
            }

            let source = DbClusterSource::new(
                console.client().clone(),
                KubernetesSource::Server,
                config.failure_policy,
            );
            let watcher = DbClusterWatcher::spawn(source, &config)?;
            let mut events = watcher.subscribe();

            info!(
                "watching database clusters every {:?}",
                Duration::from_secs(config.poll_interval_secs)
            );

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => match &event.outcome {
                            Ok(list) => {
                                println!(
                                    "-- refresh {} at {}",
                                    event.seq,
                                    event.settled_at.to_rfc3339()
                                );
                                print_clusters(&list.clusters);
                                print_failures(list);
                            }
                            Err(e) => error!("refresh {} failed: {e}", event.seq),
                        },
                        Err(e) => {
                            warn!("missed refresh results: {e}");
                        }
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("stopping");
                        break;
                    }
                }
            }

            watcher.shutdown().await
        }
    }
}
