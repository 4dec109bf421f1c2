use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use gregor_client::config::ClientConfig;
use gregor_client::logging::init_tracing;
use gregor_client::session::SystemClock;
use gregor_client::{
    ApiGateway, AuthClient, Console, GatewayError, PasswordChange, ReqwestTransport, Session,
};
use gregor_core::export::{export_rows, ExportFormat};
use gregor_core::grid::{PageSize, Search, SortDirection, SortSpec, TableView};
use gregor_core::schema::SchemaRegistry;
use gregor_core::traits::TracingNotifier;
use gregor_core::types::{display_value, Record, SubmitMode};
use gregor_core::TableKind;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gregor")]
#[command(about = "GREGoR metadata console")]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and optionally remember the session.
    Login {
        username: String,
        #[arg(long, env = "GREGOR_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value_t = false)]
        remember: bool,
    },
    /// Sign out and forget the remembered session.
    Logout,
    /// List the known tables and their identifier fields.
    Tables,
    /// Print one page of a table.
    List {
        table: String,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value = "10")]
        page_size: PageSize,
    },
    /// Show one record with its family and related rows.
    Show { table: String, id: String },
    /// Export the filtered rows of a table.
    Export {
        table: String,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "tsv")]
        format: ExportFormat,
        /// Output file; defaults to `table_data.<ext>`. Use `-` for stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Create or update a record from a JSON object file.
    Submit {
        table: String,
        #[arg(long, value_enum)]
        mode: ModeArg,
        #[arg(long)]
        data: PathBuf,
    },
    /// Change the signed-in user's password.
    ChangePassword {
        #[arg(long, env = "GREGOR_OLD_PASSWORD", hide_env_values = true)]
        old_password: String,
        #[arg(long, env = "GREGOR_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
}

#[derive(clap::Args)]
struct ViewArgs {
    /// Global search text.
    #[arg(long, default_value = "")]
    search: String,
    /// Treat the search text as a regular expression.
    #[arg(long, default_value_t = false)]
    regex: bool,
    /// Column filter as `field=text`; repeatable.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long, default_value_t = false)]
    desc: bool,
    /// Hide a column; repeatable.
    #[arg(long = "hide")]
    hidden: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Create,
    Update,
}

impl From<ModeArg> for SubmitMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => SubmitMode::Create,
            ModeArg::Update => SubmitMode::Update,
        }
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(field, text)| (field.trim().to_string(), text.to_string()))
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| format!("expected field=text, got {raw:?}"))
}

impl ViewArgs {
    fn apply(&self, view: &mut TableView) {
        view.state.search = if self.regex {
            Search::regex(&self.search)
        } else {
            Search::substring(&self.search)
        };
        for (field, text) in &self.filters {
            view.state.filters.set(field, text);
        }
        view.state.sort = self.sort.as_ref().map(|column| SortSpec {
            column: column.clone(),
            direction: if self.desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            },
        });
        for column in &self.hidden {
            view.state.visibility.hide(column);
        }
    }
}

struct App {
    config: ClientConfig,
    session: Arc<Session>,
    transport: Arc<ReqwestTransport>,
}

impl App {
    fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let session = Arc::new(Session::with_clock(Box::new(SystemClock), config.expiry_skew()));
        match session.load(&config.session_file) {
            Ok(true) => info!(path = %config.session_file.display(), "restored session"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable session file"),
        }
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Ok(Self {
            config,
            session,
            transport,
        })
    }

    fn auth(&self) -> AuthClient {
        AuthClient::new(self.config.auth_base(), self.session.clone(), self.transport.clone())
    }

    fn console(&self) -> anyhow::Result<Console> {
        let schemas = match &self.config.schemas {
            Some(path) => SchemaRegistry::from_path(path)
                .with_context(|| format!("loading schemas from {}", path.display()))?,
            None => SchemaRegistry::new(),
        };
        let gateway = ApiGateway::new(self.config.api_base(), self.session.clone(), self.transport.clone());
        Ok(Console::new(gateway, Arc::new(schemas), Arc::new(TracingNotifier)))
    }

    async fn loaded_console(&self, table: &str) -> anyhow::Result<(Console, TableKind)> {
        let kind = TableKind::resolve(table)
            .ok_or_else(|| GatewayError::InvalidTableType(table.to_string()))?;
        let console = self.console()?;
        if !console.schemas().contains(kind) {
            bail!("no schema loaded for {kind}; set GREGOR_SCHEMAS");
        }
        console.refresh().await?;
        Ok((console, kind))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();
    cli.config.fill_from_legacy_env(|name| std::env::var(name).ok());
    init_tracing(cli.config.log_format)?;
    let app = App::new(cli.config)?;

    match cli.command {
        Commands::Login {
            username,
            password,
            remember,
        } => {
            let credentials = app.auth().login(&username, &password).await?;
            if remember {
                app.session.save(&app.config.session_file)?;
            }
            let who = credentials
                .claims()
                .username
                .clone()
                .unwrap_or(username);
            println!("Signed in as {who}");
        }
        Commands::Logout => {
            if let Err(e) = app.auth().logout().await {
                warn!(error = %e, "server-side logout failed");
            }
            Session::forget(&app.config.session_file)?;
            println!("Signed out");
        }
        Commands::Tables => {
            for kind in TableKind::ALL {
                println!("{}\t{}\t{}", kind, kind.identifier_field(), kind.display_name());
            }
        }
        Commands::List {
            table,
            view: args,
            page,
            page_size,
        } => {
            let (console, kind) = app.loaded_console(&table).await?;
            let mut view = console.view(kind);
            args.apply(&mut view);
            view.state.page = page;
            view.state.page_size = page_size;

            let store = console.store();
            let rendered = view.render(store.rows(kind));
            if let Some(err) = &rendered.search_error {
                bail!("{err}");
            }
            let header: Vec<&str> = rendered.columns.iter().map(|c| c.title.as_str()).collect();
            println!("{}", header.join("\t"));
            for row in &rendered.rows {
                println!("{}", rendered.cells(row).join("\t"));
            }
            println!(
                "page {} of {} ({} rows)",
                rendered.page, rendered.page_count, rendered.total
            );
        }
        Commands::Show { table, id } => {
            let (console, kind) = app.loaded_console(&table).await?;
            let store = console.store();
            let Some(record) = store.find(kind, &id) else {
                bail!("{kind} {id} not found");
            };
            println!("{}", serde_json::to_string_pretty(record)?);
            if kind == TableKind::Participants {
                for member in store.family_members(record) {
                    println!("family member: {}", member_label(member));
                }
                for related in TableKind::ALL {
                    if related == TableKind::Participants {
                        continue;
                    }
                    let rows = store.related_by_participant(related, &id);
                    if !rows.is_empty() {
                        println!("{related}: {} row(s)", rows.len());
                    }
                }
            }
        }
        Commands::Export {
            table,
            view: args,
            format,
            out,
        } => {
            let (console, kind) = app.loaded_console(&table).await?;
            let mut view = console.view(kind);
            args.apply(&mut view);

            let store = console.store();
            let filtered = view.filter(store.rows(kind));
            if let Some(err) = filtered.search_error {
                bail!("{err}");
            }
            let mut rows = filtered.rows;
            view.sort(&mut rows);
            let text = export_rows(&view.visible_columns(), &rows, format)?;

            let out = out.unwrap_or_else(|| PathBuf::from(format.default_filename()));
            if out.as_os_str() == "-" {
                println!("{text}");
            } else {
                tokio::fs::write(&out, text)
                    .await
                    .with_context(|| format!("writing {}", out.display()))?;
                info!(path = %out.display(), rows = rows.len(), "exported");
            }
        }
        Commands::Submit { table, mode, data } => {
            let raw = tokio::fs::read_to_string(&data)
                .await
                .with_context(|| format!("reading {}", data.display()))?;
            let payload: Record = serde_json::from_str(&raw)
                .with_context(|| format!("{} must hold a JSON object", data.display()))?;
            let console = app.console()?;
            let outcome = console.submit(&table, mode.into(), payload).await?;
            println!("{outcome:?}");
        }
        Commands::ChangePassword {
            old_password,
            new_password,
        } => {
            let change = PasswordChange {
                old_password,
                confirm_new_password: new_password.clone(),
                new_password,
            };
            app.auth().change_password(&change).await?;
            println!("Password changed successfully");
        }
    }
    Ok(())
}

fn member_label(record: &Record) -> String {
    record
        .get("participant_id")
        .map(display_value)
        .unwrap_or_default()
}
