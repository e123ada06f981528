use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use owo_colors::OwoColorize;
use record_transfer::{
    cli,
    config::{PluginSelection, TransferJob},
    registry::Registry,
};

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Transfer records from an input plugin to an output plugin
#[derive(Parser)]
#[command(name = "transfer", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source plugin selections and credentials from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one transfer
    Run {
        /// Transfer manager name, e.g. DEFAULT_TRANSFER_MANAGER
        #[arg(short = 't', long = "type")]
        manager: Option<String>,

        /// Transfer manager parameters
        #[arg(long = "tp")]
        manager_parameters: Option<String>,

        /// Input plugin name, e.g. CSV_INPUT_PLUGIN
        #[arg(short, long)]
        input: Option<String>,

        /// Input plugin parameters, e.g. "filepath=in.csv|separator=;|hasheader=true"
        #[arg(long = "ip")]
        input_parameters: Option<String>,

        /// Output plugin name, e.g. SQLITE_OUTPUT_PLUGIN
        #[arg(short, long)]
        output: Option<String>,

        /// Output plugin parameters
        #[arg(long = "op")]
        output_parameters: Option<String>,

        /// YAML job file with manager, input and output selections
        #[arg(short, long)]
        job: Option<String>,

        /// Save the effective selections as a YAML job file
        #[arg(long)]
        save_job: Option<String>,

        /// Print the effective selections before running
        #[arg(short, long)]
        verbose: bool,
    },

    /// List registered plugins
    List,

    /// Show the parameters a plugin accepts
    Describe {
        /// Plugin name, e.g. CSV_INPUT_PLUGIN
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_loaded = dotenvy::from_filename(&cli.env);

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    match env_loaded {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) => log::debug!("No environment loaded from {}: {}", cli.env, e),
    }

    let registry = Registry::builtin();
    match cli.command {
        Commands::Run {
            manager,
            manager_parameters,
            input,
            input_parameters,
            output,
            output_parameters,
            job,
            save_job,
            verbose,
        } => {
            let flags = TransferJob::new(
                PluginSelection::new(manager.unwrap_or_default(), manager_parameters.unwrap_or_default()),
                PluginSelection::new(input.unwrap_or_default(), input_parameters.unwrap_or_default()),
                PluginSelection::new(output.unwrap_or_default(), output_parameters.unwrap_or_default()),
            );
            let job = cli::resolve_job(flags, job.as_deref())?;

            if verbose {
                println!(
                    "Current arguments:\n  -t {} --tp {}\n  -i {} --ip {}\n  -o {} --op {}",
                    job.manager.name.cyan(),
                    job.manager.parameters.bright_black(),
                    job.input.name.cyan(),
                    job.input.parameters.bright_black(),
                    job.output.name.cyan(),
                    job.output.parameters.bright_black(),
                );
            }
            if let Some(path) = save_job {
                cli::save_job(&job, &path)?;
            }

            match cli::run_transfer(registry, &job).await {
                Ok(result) => {
                    println!("{}", result);
                    let code = cli::exit_code(&result);
                    if code != 0 {
                        std::process::exit(code);
                    }
                }
                Err(e) => {
                    log::error!("{:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::List => {
            print!("{}", cli::plugin_overview(registry));
        }
        Commands::Describe { name } => {
            println!("{}", cli::describe_plugin(registry, &name)?);
        }
    }

    Ok(())
}
