use crate::server;
use clap::{Args, Parser, Subcommand, ValueEnum};
use recruitment::access::{group_catalog, PolicyTable};
use recruitment::documents::{DocumentKind, DocumentValidator, StoragePathBuilder, Verdict};
use recruitment::error::AppError;
use serde_json::json;
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Recruitment Service",
    about = "Run the recruitment API and inspect its access and upload rules",
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
    /// Print the role groups, their permissions and the operation policy
    Groups,
    /// Screen a document the way candidate uploads are screened
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Handle of the elevated operator account created at startup
    #[arg(long, default_value = "operator")]
    pub(crate) operator: String,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            operator: "operator".to_string(),
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct ValidateArgs {
    /// File to screen
    path: PathBuf,
    /// Application slot the file would fill
    #[arg(long, value_enum, default_value_t = KindArg::Cv)]
    kind: KindArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Cv,
    CoverLetter,
}

impl From<KindArg> for DocumentKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Cv => DocumentKind::Cv,
            KindArg::CoverLetter => DocumentKind::CoverLetter,
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Groups => print_groups(),
        Command::Validate(args) => validate_file(args),
    }
}

fn print_groups() -> Result<(), AppError> {
    let groups: Vec<_> = group_catalog()
        .into_iter()
        .map(|(group, grants)| {
            json!({
                "group": group.name(),
                "permissions": grants.iter().map(|grant| grant.codename()).collect::<Vec<_>>(),
            })
        })
        .collect();
    let policy: Vec<_> = PolicyTable::standard()
        .entries()
        .map(|(operation, roles)| {
            json!({
                "operation": operation.label(),
                "roles": roles.iter().map(|role| role.label()).collect::<Vec<_>>(),
            })
        })
        .collect();

    print_json(&json!({ "groups": groups, "policy": policy }));
    Ok(())
}

fn validate_file(args: ValidateArgs) -> Result<(), AppError> {
    let filename = args
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut file = File::open(&args.path)?;
    let declared_size = file.metadata()?.len();

    let verdict = DocumentValidator::new().validate(&filename, &mut file, Some(declared_size));
    let guessed = mime_guess::from_path(&args.path).first_or_octet_stream();
    let report = match verdict {
        Verdict::Accepted => json!({
            "file": filename,
            "verdict": "accepted",
            "guessed_type": guessed.essence_str(),
            "storage_key": StoragePathBuilder::default().derive(None, args.kind.into(), &filename),
        }),
        Verdict::Rejected(reason) => json!({
            "file": filename,
            "verdict": "rejected",
            "code": reason.code(),
            "message": reason.message(),
            "guessed_type": guessed.essence_str(),
        }),
    };

    print_json(&report);
    Ok(())
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{value}"),
    }
}
