use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use lead_tracker::broadcast::Broadcaster;
use lead_tracker::cache::ViewCache;
use lead_tracker::cms::CmsClient;
use lead_tracker::config::AppConfig;
use lead_tracker::dashboard::DashboardSummary;
use lead_tracker::db::Database;
use lead_tracker::error::TrackerError;
use lead_tracker::logging::{init_logging, OperationTimer};
use lead_tracker::mailer::SmtpMailer;
use lead_tracker::models::{
    CompanyUpdate, NewCompany, NewContactEntry, NewProject, ProjectStatus, ReferenceKind, DEFAULT_CONTACT_STATUS,
};
use lead_tracker::render;
use lead_tracker::repository::LeadRepository;
use lead_tracker::service::MailService;
use lead_tracker::slack::{ChatSender, SlackClient};
use lead_tracker::validation::InputValidator;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage companies
    #[command(subcommand)]
    Companies(CompanyCommand),
    /// Manage contact history
    #[command(subcommand)]
    Contacts(ContactCommand),
    /// Manage projects
    #[command(subcommand)]
    Projects(ProjectCommand),
    /// Manage reference lists
    #[command(subcommand)]
    Reference(ReferenceCommand),
    /// Show stale leads, totals and charts
    Dashboard,
    /// Newsletters from the CMS
    #[command(subcommand)]
    Mails(MailCommand),
    /// Slack announcements
    #[command(subcommand)]
    Slack(SlackCommand),
}

#[derive(Subcommand)]
enum CompanyCommand {
    /// List companies by name
    List,
    /// Show a company with its contacts and projects
    Show { id: String },
    /// Add a company
    Add(CompanyArgs),
    /// Update fields of a company
    Update {
        id: String,
        #[command(flatten)]
        fields: CompanyUpdateArgs,
    },
}

#[derive(Args)]
struct CompanyArgs {
    #[arg(long)]
    name: String,
    /// Email address, phone number or handle
    #[arg(long)]
    contact: String,
    /// Communication channel, e.g. "mail"
    #[arg(long)]
    channel: String,
    #[arg(long)]
    reach_method: String,
    #[arg(long)]
    business_type: Option<i64>,
    #[arg(long)]
    lead_status: Option<i64>,
    #[arg(long)]
    person_in_charge: Option<String>,
}

#[derive(Args)]
struct CompanyUpdateArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    channel: Option<String>,
    #[arg(long)]
    reach_method: Option<String>,
    #[arg(long)]
    business_type: Option<i64>,
    #[arg(long)]
    lead_status: Option<i64>,
    #[arg(long)]
    person_in_charge: Option<String>,
}

#[derive(Subcommand)]
enum ContactCommand {
    /// List all contacts, newest first
    List,
    /// Log a contact with a company
    Add {
        #[arg(long)]
        company: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = DEFAULT_CONTACT_STATUS)]
        status: String,
        /// Contact date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// List all projects, latest billing first
    List,
    /// Add a project
    Add {
        #[arg(long)]
        company: String,
        /// Price in yen
        #[arg(long)]
        price: i64,
        /// Billing date (YYYY-MM-DD)
        #[arg(long)]
        billing_date: String,
        /// Payment date (YYYY-MM-DD)
        #[arg(long)]
        payment_date: Option<String>,
        /// One of 調整中, 見積済, 請求済, 納品済, 入金済, キャンセル
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    BusinessType,
    CommunicationChannel,
    ReachMethod,
    LeadStatus,
}

impl From<KindArg> for ReferenceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::BusinessType => Self::BusinessType,
            KindArg::CommunicationChannel => Self::CommunicationChannel,
            KindArg::ReachMethod => Self::ReachMethod,
            KindArg::LeadStatus => Self::LeadStatus,
        }
    }
}

#[derive(Subcommand)]
enum ReferenceCommand {
    /// List a reference list by name
    List {
        #[arg(long, value_enum)]
        kind: KindArg,
    },
    /// Append an entry to a reference list
    Add {
        #[arg(long, value_enum)]
        kind: KindArg,
        name: String,
    },
}

#[derive(Subcommand)]
enum MailCommand {
    /// List CMS mails with their sent flag
    List,
    /// Show a mail with its send record or segmentation options
    Show { id: String },
    /// Send a newsletter to companies of the given business types
    Send {
        id: String,
        /// Business type id to include (repeatable)
        #[arg(long = "business-type", required = true)]
        business_types: Vec<i64>,
        /// Company id to leave out (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Print the recipients without sending
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum SlackCommand {
    /// Announce a mail in a Slack channel
    Send {
        mail_id: String,
        /// Channel id or name, defaults to slack.default_channel
        #[arg(long)]
        channel: Option<String>,
        /// Message text, defaults to the mail title and description
        #[arg(long)]
        text: Option<String>,
    },
}

/// Stand-in used when no Slack token is configured
struct UnconfiguredChat;

#[async_trait]
impl ChatSender for UnconfiguredChat {
    async fn post_message(&self, _channel: &str, _text: &str) -> lead_tracker::Result<String> {
        Err(TrackerError::InvalidConfig("slack.token is not set".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Held until exit so buffered file logs are flushed
    let _log_guard = init_logging(&config.logging, cli.log_level.as_deref())?;

    info!("Starting lead-tracker");

    let mut database_config = config.database.clone();
    database_config.url = config.get_database_url();
    let db = Database::from_config(&database_config).context("Failed to open lead database")?;

    match cli.command {
        Commands::Companies(command) => run_companies(&db, command)?,
        Commands::Contacts(command) => run_contacts(&db, command)?,
        Commands::Projects(command) => run_projects(&db, command)?,
        Commands::Reference(command) => run_reference(&db, command)?,
        Commands::Dashboard => run_dashboard(&config, &db)?,
        Commands::Mails(command) => run_mails(&config, db, command).await?,
        Commands::Slack(command) => run_slack(&config, db, command).await?,
    }

    Ok(())
}

fn run_companies(db: &Database, command: CompanyCommand) -> Result<()> {
    match command {
        CompanyCommand::List => {
            let companies = db.list_companies()?;
            let business_types = db.reference_map(ReferenceKind::BusinessType)?;
            let lead_statuses = db.reference_map(ReferenceKind::LeadStatus)?;
            print!("{}", render::companies(&companies, &business_types, &lead_statuses));
        },
        CompanyCommand::Show { id } => {
            let company = db.get_company(&id)?.ok_or_else(|| TrackerError::not_found("company", &id))?;
            let contacts = db.contacts_for_company(&id)?;
            let projects = db.projects_for_company(&id)?;
            let business_types = db.reference_map(ReferenceKind::BusinessType)?;
            let lead_statuses = db.reference_map(ReferenceKind::LeadStatus)?;
            print!(
                "{}",
                render::company_detail(&company, &contacts, &projects, &business_types, &lead_statuses)
            );
        },
        CompanyCommand::Add(args) => {
            let company = db.add_company(NewCompany {
                name: args.name,
                contact: args.contact,
                communication_channel: args.channel,
                reach_method: args.reach_method,
                business_type_id: args.business_type,
                lead_status_id: args.lead_status,
                person_in_charge: args.person_in_charge,
            })?;
            info!(company_id = %company.id, "Company added");
            println!("{}", company.id);
        },
        CompanyCommand::Update { id, fields } => {
            let update = CompanyUpdate {
                name: fields.name,
                contact: fields.contact,
                communication_channel: fields.channel,
                reach_method: fields.reach_method,
                business_type_id: fields.business_type,
                lead_status_id: fields.lead_status,
                person_in_charge: fields.person_in_charge,
            };
            if update.is_empty() {
                warn!(company_id = %id, "Nothing to update");
                return Ok(());
            }
            let company = db.update_company(&id, update)?;
            println!("Updated {} ({})", company.name, company.id);
        },
    }
    Ok(())
}

fn run_contacts(db: &Database, command: ContactCommand) -> Result<()> {
    match command {
        ContactCommand::List => print!("{}", render::contacts(&db.list_contacts()?)),
        ContactCommand::Add {
            company,
            content,
            status,
            date,
        } => {
            let contact_date = match date {
                Some(date) => InputValidator::parse_date(&date)?,
                None => Local::now().date_naive(),
            };
            let entry = db.add_contact(NewContactEntry {
                company_id: company,
                content,
                status,
                contact_date,
            })?;
            println!("{}", entry.id);
        },
    }
    Ok(())
}

fn run_projects(db: &Database, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::List => print!("{}", render::projects(&db.list_projects()?)),
        ProjectCommand::Add {
            company,
            price,
            billing_date,
            payment_date,
            status,
        } => {
            let project = db.add_project(NewProject {
                company_id: company,
                price,
                billing_date: InputValidator::parse_date(&billing_date)?,
                payment_date: payment_date.as_deref().map(InputValidator::parse_date).transpose()?,
                status: status.as_deref().map(str::parse::<ProjectStatus>).transpose()?,
            })?;
            println!("{}", project.id);
        },
    }
    Ok(())
}

fn run_reference(db: &Database, command: ReferenceCommand) -> Result<()> {
    match command {
        ReferenceCommand::List { kind } => {
            let kind = ReferenceKind::from(kind);
            print!("{}", render::references(kind, &db.list_references(kind)?));
        },
        ReferenceCommand::Add { kind, name } => {
            let item = db.add_reference(kind.into(), &name)?;
            println!("[{}] {}", item.id, item.name);
        },
    }
    Ok(())
}

fn run_dashboard(config: &AppConfig, db: &Database) -> Result<()> {
    let timer = OperationTimer::new("dashboard");
    let summary = DashboardSummary::build(
        &db.list_companies()?,
        &db.list_contacts()?,
        &db.list_projects()?,
        &db.list_references(ReferenceKind::CommunicationChannel)?,
        Utc::now().naive_utc(),
        Duration::days(config.dashboard.stale_after_days),
        config.dashboard.recent_items,
    );
    timer.finish();
    print!("{}", render::dashboard(&summary));
    Ok(())
}

fn mail_service(config: &AppConfig, db: Database) -> Result<MailService> {
    let repo: Arc<dyn LeadRepository> = Arc::new(db);
    let cms = CmsClient::new(&config.cms).context("CMS is not configured")?;
    let mailer = SmtpMailer::new(&config.mail).context("Failed to set up SMTP transport")?;
    let chat: Arc<dyn ChatSender> = match SlackClient::new(&config.slack) {
        Ok(client) => Arc::new(client),
        Err(_) => Arc::new(UnconfiguredChat),
    };

    let cache = if config.cache.enabled {
        let cache = ViewCache::open(&config.cache.directory)
            .context("Failed to open view cache")?
            .with_ttl(std::time::Duration::from_secs(config.cache.ttl_secs));
        Some(Arc::new(cache))
    } else {
        None
    };

    let mut broadcaster = Broadcaster::new(Arc::clone(&repo), Arc::new(mailer), chat);
    if let Some(cache) = &cache {
        broadcaster = broadcaster.with_cache(Arc::clone(cache));
    }
    let mut service = MailService::new(Arc::new(cms), repo, broadcaster)
        .with_default_slack_channel(config.slack.default_channel.clone());
    if let Some(cache) = cache {
        service = service.with_cache(cache);
    }
    Ok(service)
}

async fn run_mails(config: &AppConfig, db: Database, command: MailCommand) -> Result<()> {
    let service = mail_service(config, db)?;
    match command {
        MailCommand::List => print!("{}", service.render_mail_list().await?),
        MailCommand::Show { id } => print!("{}", service.render_mail_detail(&id).await?),
        MailCommand::Send {
            id,
            business_types,
            exclude,
            dry_run,
        } => {
            if dry_run {
                let targets = service.preview_targets(&business_types, &exclude).await?;
                print!("{}", render::targets(&targets));
                return Ok(());
            }
            let report = service
                .send_newsletter(&id, &business_types, &exclude)
                .await
                .with_context(|| format!("Newsletter {id} was not completed"))?;
            print!("{}", render::broadcast_report(&report));
        },
    }
    Ok(())
}

async fn run_slack(config: &AppConfig, db: Database, command: SlackCommand) -> Result<()> {
    let service = mail_service(config, db)?;
    match command {
        SlackCommand::Send {
            mail_id,
            channel,
            text,
        } => {
            let report = service
                .send_slack(&mail_id, channel.as_deref(), text.as_deref())
                .await
                .with_context(|| format!("Slack announcement for {mail_id} failed"))?;
            print!("{}", render::chat_report(&report));
        },
    }
    Ok(())
}
