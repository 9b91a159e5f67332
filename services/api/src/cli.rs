use crate::infra::{open_store, session_policy};
use crate::server;
use clap::{Args, Parser, Subcommand};
use registrar::config::AppConfig;
use registrar::error::AppError;
use registrar::workflows::registration::{
    AdminSessions, RegistrationStore, Status, StatusCatalog, StatusCode,
};

#[derive(Parser, Debug)]
#[command(
    name = "Registrar",
    about = "Run the student registration service and manage its catalog from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the status catalog in display order, or retire and restore a status
    Statuses(StatusesArgs),
    /// Manage admin operators
    Operator {
        #[command(subcommand)]
        command: OperatorCommand,
    },
}

#[derive(Subcommand, Debug)]
enum OperatorCommand {
    /// Create an operator account
    Create(CreateOperatorArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct StatusesArgs {
    /// Include retired statuses
    #[arg(long)]
    pub(crate) all: bool,
    #[command(subcommand)]
    pub(crate) action: Option<StatusAction>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum StatusAction {
    /// Hide a status from intake and the active listing
    Retire { code: String },
    /// Make a retired status available again
    Restore { code: String },
}

#[derive(Args, Debug)]
pub(crate) struct CreateOperatorArgs {
    #[arg(long)]
    pub(crate) email: String,
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long)]
    pub(crate) password: String,
    /// Role label stored with the account (defaults to admin)
    #[arg(long)]
    pub(crate) role: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Statuses(StatusesArgs {
            action: Some(action),
            ..
        }) => change_status(action),
        Command::Statuses(args) => print_statuses(args),
        Command::Operator {
            command: OperatorCommand::Create(args),
        } => create_operator(args),
    }
}

fn print_statuses(args: StatusesArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = StatusCatalog::new(open_store(&config.storage)?);

    for status in catalog.list(!args.all)? {
        let marker = if status.active { "" } else { " (retired)" };
        println!(
            "{:>2}  {:<12} {:<20} {}{}",
            status.order,
            status.code.as_str(),
            status.label,
            status.color,
            marker
        );
    }
    Ok(())
}

fn change_status(action: StatusAction) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = StatusCatalog::new(open_store(&config.storage)?);
    let status = apply_status_action(&catalog, &action)?;
    let verb = if status.active { "Restored" } else { "Retired" };
    println!("{verb} status {} ({})", status.code.as_str(), status.label);
    Ok(())
}

pub(crate) fn apply_status_action<S: RegistrationStore>(
    catalog: &StatusCatalog<S>,
    action: &StatusAction,
) -> Result<Status, AppError> {
    let (code, active) = match action {
        StatusAction::Retire { code } => (code, false),
        StatusAction::Restore { code } => (code, true),
    };
    let code = StatusCode::new(code.trim().to_ascii_uppercase());
    catalog.set_active(&code, active)?;
    Ok(catalog.resolve(&code)?)
}

fn create_operator(args: CreateOperatorArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let sessions = AdminSessions::new(open_store(&config.storage)?, session_policy(&config.admin));

    let operator = sessions.create_operator(
        &args.email,
        &args.password,
        &args.name,
        args.role.as_deref(),
    )?;
    println!(
        "Created operator #{} {} <{}> ({})",
        operator.id.0, operator.display_name, operator.email, operator.role
    );
    Ok(())
}
