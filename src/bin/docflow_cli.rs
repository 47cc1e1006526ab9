use std::{env, process, sync::Arc};

use docflow_wizards::{
    api::{HttpClient, MemoryBackend},
    cli::{self, output, CliError, DialoguerInteraction, FlowKind},
    config::{Config, ConfigManager},
    domain::EntityId,
    init,
};

struct Args {
    kind: FlowKind,
    offline: bool,
    plain: bool,
}

#[tokio::main]
async fn main() {
    init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            if let Some(message) = message {
                eprintln!("Error: {message}");
            }
            print_usage();
            process::exit(2);
        }
    };

    output::set_preferences(output::OutputPreferences {
        plain: args.plain,
        quiet: false,
    });

    match run(args).await {
        Ok(true) => {}
        Ok(false) => output::info("Cancelled, nothing was saved"),
        Err(err) => {
            output::error(&err);
            process::exit(1);
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, Option<String>> {
    let mut name = None;
    let mut offline = false;
    let mut plain = false;
    let mut document_id: EntityId = 1;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--offline" => offline = true,
            "--plain" => plain = true,
            "--document" => {
                let raw = args
                    .next()
                    .ok_or_else(|| Some("--document needs an id".to_string()))?;
                document_id = raw
                    .parse()
                    .map_err(|_| Some(format!("invalid document id '{raw}'")))?;
            }
            "-h" | "--help" => return Err(None),
            other if other.starts_with('-') => {
                return Err(Some(format!("unknown option '{other}'")))
            }
            other if name.is_none() => name = Some(other.to_string()),
            other => return Err(Some(format!("unexpected argument '{other}'"))),
        }
    }

    let name = name.ok_or(None)?;
    let kind = FlowKind::parse(&name, document_id)
        .ok_or_else(|| Some(format!("unknown wizard '{name}'")))?;
    Ok(Args {
        kind,
        offline,
        plain,
    })
}

async fn run(args: Args) -> Result<bool, CliError> {
    let config = load_config()?;
    let mut interaction = DialoguerInteraction::new();
    if args.offline {
        output::warning("Offline mode: changes are kept in memory only");
        let backend = Arc::new(MemoryBackend::seeded());
        cli::launch(args.kind, backend, &config, &mut interaction).await
    } else {
        let backend = Arc::new(HttpClient::new(&config)?);
        output::info(format!("Using API at {}", backend.base_url()));
        cli::launch(args.kind, backend, &config, &mut interaction).await
    }
}

fn load_config() -> Result<Config, CliError> {
    let manager = ConfigManager::new()?;
    Ok(manager.load()?)
}

fn print_usage() {
    eprintln!(
        "Usage: docflow_cli <wizard> [--offline] [--plain] [--document <id>]\n\
         Wizards:\n  {}\n\
         Options:\n  \
         --offline        use built-in demo data instead of the API\n  \
         --plain          disable colors\n  \
         --document <id>  document receiving the line (ligne wizard, default 1)\n\
         Environment: DOCFLOW_API_URL, DOCFLOW_API_TOKEN",
        FlowKind::NAMES.join("\n  ")
    );
}
