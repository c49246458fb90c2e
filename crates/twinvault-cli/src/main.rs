//! Twinvault command-line interface: browse, create, and manage digital twins
//! stored on the key/value contract.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::warn;
use rpassword::prompt_password;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use twinvault_chain::{CastKvClient, CastSigner};
use twinvault_core::{
    codec::{preview, InterestCodec, PlaceholderCodec, Transform},
    config::DEFAULT_CONFIG_PATH,
    dashboard::DashboardStats,
    keyfile::{checksum, decode_key_bytes, generate_key, write_key_file},
    logging, AuthProof, InterestCategory, InterestProfile, Signer, TwinRecord, TwinRepository,
    TwinStatus, TwinvaultConfig,
};
use zeroize::Zeroizing;

mod tui;

type CastRepository = TwinRepository<CastKvClient>;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "twinvault",
    version,
    about = "Manage digital twin profiles stored on a key/value contract."
)]
struct Cli {
    /// Path to the twinvault configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every indexed twin, newest first.
    List {
        /// Only show twins whose id or owner contains this text (any case).
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show one twin with its encoded interests.
    Show { id: String },

    /// Print dashboard statistics.
    Stats,

    /// Create a twin owned by the configured wallet.
    Create(InterestArgs),

    /// Mark a twin active (owner only).
    Activate { id: String },

    /// Mark a twin inactive (owner only).
    Deactivate { id: String },

    /// Flip a twin between active and inactive (owner only).
    Toggle { id: String },

    /// Sign the decryption challenge and show a twin's interests in clear.
    Decrypt {
        id: String,

        /// Sign without asking for confirmation.
        #[arg(long)]
        yes: bool,
    },

    /// Apply a transform to one encoded interest without storing it.
    Compute {
        id: String,

        /// Interest category (entertainment, technology, fashion, sports, finance).
        category: String,

        /// increase10%, decrease10%, or double. Anything else leaves the value unchanged.
        operation: String,
    },

    /// Encode a plain value the way interests are stored.
    Encode { value: f64 },

    /// Decode a stored interest value.
    Decode { text: String },

    /// Manage the wallet key file used for signing.
    #[command(subcommand)]
    Key(KeyCommand),

    /// Validate a configuration file or emit the config schema.
    Validate {
        /// Path to the configuration file to validate.
        #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },

    /// Launch the interactive dashboard.
    Tui,
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Generate a fresh random private key.
    Generate {
        #[arg(short, long)]
        output: PathBuf,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Store a private key typed at a hidden prompt.
    Import {
        #[arg(short, long)]
        output: PathBuf,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Interest sliders for `create`; omitted categories default to 50.
#[derive(Args, Debug)]
struct InterestArgs {
    #[arg(long)]
    entertainment: Option<i64>,
    #[arg(long)]
    technology: Option<i64>,
    #[arg(long)]
    fashion: Option<i64>,
    #[arg(long)]
    sports: Option<i64>,
    #[arg(long)]
    finance: Option<i64>,
}

impl InterestArgs {
    fn profile(&self) -> Result<InterestProfile> {
        let values = [
            (InterestCategory::Entertainment, self.entertainment),
            (InterestCategory::Technology, self.technology),
            (InterestCategory::Fashion, self.fashion),
            (InterestCategory::Sports, self.sports),
            (InterestCategory::Finance, self.finance),
        ];
        let mut profile = InterestProfile::default();
        for (category, value) in values {
            if let Some(value) = value {
                profile.set(category, value)?;
            }
        }
        Ok(profile)
    }
}

/// Entry point: parse arguments and surface errors with an exit code.
fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();
    let config_path = cli.config.clone();

    match cli.command {
        Commands::List { filter } => {
            let repo = read_repository(&config_path)?;
            let mut twins = repo.list();
            if let Some(term) = filter.as_deref() {
                twins.retain(|twin| twin.matches(term));
            }
            print_twin_table(&twins);
        }
        Commands::Show { id } => {
            let repo = read_repository(&config_path)?;
            let twin = repo.get(&id)?;
            print_twin(&twin)?;
        }
        Commands::Stats => {
            let repo = read_repository(&config_path)?;
            let stats = DashboardStats::from_records(&repo.list());
            println!("Total twins:    {}", stats.total);
            println!("Active:         {}", stats.active);
            println!("Inactive:       {}", stats.inactive);
            println!("Total earnings: {:.4} ETH", stats.total_earnings);
        }
        Commands::Create(args) => {
            let profile = args.profile()?;
            let (repo, signer) = signing_repository(&config_path)?;
            let owner = signer.address()?;
            let twin = repo.create(&owner, &profile)?;
            println!("Digital twin {} created for {}.", twin.id, twin.owner);
            for (category, value) in profile.iter() {
                println!("  {:<14} {value}", category.label());
            }
        }
        Commands::Activate { id } => {
            set_status(&config_path, &id, Some(TwinStatus::Active))?;
        }
        Commands::Deactivate { id } => {
            set_status(&config_path, &id, Some(TwinStatus::Inactive))?;
        }
        Commands::Toggle { id } => {
            set_status(&config_path, &id, None)?;
        }
        Commands::Decrypt { id, yes } => {
            let (repo, signer) = signing_repository(&config_path)?;
            let twin = repo.get(&id)?;
            let challenge = repo.challenge()?;

            if !yes {
                println!("Sign the following message to reveal the interests of {id}:");
                println!();
                println!("{challenge}");
                println!();
                if !confirm("Sign with the configured wallet? [y/N] ")? {
                    println!("Decryption cancelled.");
                    return Ok(());
                }
            }

            let proof = AuthProof::sign(&signer, &challenge)?;
            let values = repo.decrypt_interests(&twin.encoded_interests, &proof, &challenge)?;
            print_decrypted(&values);
        }
        Commands::Compute {
            id,
            category,
            operation,
        } => {
            let category: InterestCategory = category
                .parse()
                .map_err(|_| anyhow!("unknown interest category `{category}`"))?;
            let (op, recognised) = parse_operation(&operation);
            if !recognised {
                warn!("operation `{operation}` not recognised; value is left unchanged");
            }
            let repo = read_repository(&config_path)?;
            let result = repo.compute(&id, category, op)?;
            println!("{} of {} ({}):", op, category.label(), id);
            println!("  {result}");
        }
        Commands::Encode { value } => {
            println!("{}", PlaceholderCodec.encode(value));
        }
        Commands::Decode { text } => {
            let value = PlaceholderCodec.decode(&text);
            if value.is_nan() {
                bail!("`{text}` is not an encoded interest value");
            }
            println!("{value}");
        }
        Commands::Key(command) => run_key_command(command)?,
        Commands::Validate { file, schema } => {
            if schema {
                let schema = schema_for!(TwinvaultConfig);
                println!("{}", to_string_pretty(&schema)?);
                return Ok(());
            }

            let cfg = TwinvaultConfig::load(&file)
                .with_context(|| format!("failed to load configuration from {}", file.display()))?;

            let issues = cfg.validate();
            if issues.is_empty() {
                println!(
                    "Configuration valid (contract {} on chain {}).",
                    cfg.contract.address, cfg.contract.chain_id
                );
            } else {
                eprintln!("Configuration validation failed:");
                for issue in issues {
                    eprintln!("  - {issue}");
                }
                std::process::exit(1);
            }
        }
        Commands::Tui => {
            let config = load_config(&config_path)?;
            let client = if config.wallet.key_hex_path.is_some() {
                CastKvClient::signing_from_config(&config)?
            } else {
                CastKvClient::from_config(&config)?
            };
            let signer = client.signer().ok();
            let repo = TwinRepository::new(config, client);
            tui::launch(repo, signer)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Arc<TwinvaultConfig>> {
    let config = TwinvaultConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    Ok(Arc::new(config))
}

fn read_repository(path: &Path) -> Result<CastRepository> {
    let config = load_config(path)?;
    let client = CastKvClient::from_config(&config)?;
    Ok(TwinRepository::new(config, client))
}

fn signing_repository(path: &Path) -> Result<(CastRepository, CastSigner)> {
    let config = load_config(path)?;
    let client = CastKvClient::signing_from_config(&config)
        .context("signing commands need wallet.key_hex_path")?;
    let signer = client.signer()?;
    Ok((TwinRepository::new(config, client), signer))
}

/// Write `status`, or the opposite of the current one when `None`.
fn set_status(config_path: &Path, id: &str, status: Option<TwinStatus>) -> Result<()> {
    let (repo, signer) = signing_repository(config_path)?;
    let caller = signer.address()?;
    let twin = match status {
        Some(status) => repo.set_status(id, &caller, status)?,
        None => repo.toggle_status(id, &caller)?,
    };
    println!("Twin {} is now {}.", twin.id, twin.status);
    Ok(())
}

fn run_key_command(command: KeyCommand) -> Result<()> {
    let (output, force, key) = match command {
        KeyCommand::Generate { output, force } => (output, force, generate_key()),
        KeyCommand::Import { output, force } => {
            let entered = Zeroizing::new(prompt_password("Private key (hex): ")?);
            let key = decode_key_bytes(Path::new("<prompt>"), entered.trim().as_bytes())?;
            (output, force, key)
        }
    };

    if output.exists() && !force {
        bail!(
            "{} already exists; pass --force to replace it",
            output.display()
        );
    }
    write_key_file(&output, &key)
        .with_context(|| format!("failed to write key file {}", output.display()))?;

    println!(
        "Wallet key written to {} (permissions set to 0400).",
        output.display()
    );
    println!("Add to your configuration:");
    println!("  [wallet]");
    println!("  key_hex_path = \"{}\"", output.display());
    println!("  expected_sha256 = \"{}\"", checksum(&key));
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Render a unix timestamp in UTC, or the raw number when out of range.
fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Resolve an operation name; unknown names fall back to identity and are
/// reported as unrecognised.
fn parse_operation(name: &str) -> (Transform, bool) {
    let op: Transform = name.parse().unwrap_or(Transform::Identity);
    let recognised = op != Transform::Identity || name.trim() == "identity";
    (op, recognised)
}

fn print_twin_table(twins: &[TwinRecord]) {
    if twins.is_empty() {
        println!("No digital twins found.");
        return;
    }
    println!(
        "{:<24} {:<44} {:<9} {:>10} {}",
        "ID", "OWNER", "STATUS", "EARNINGS", "CREATED"
    );
    for twin in twins {
        println!(
            "{:<24} {:<44} {:<9} {:>10} {}",
            twin.id,
            twin.owner,
            twin.status.as_str(),
            twin.earnings,
            format_timestamp(twin.created_at)
        );
    }
}

fn print_twin(twin: &TwinRecord) -> Result<()> {
    println!("Twin {}", twin.id);
    println!("  owner:    {}", twin.owner);
    println!("  status:   {}", twin.status);
    println!("  earnings: {} ETH", twin.earnings);
    println!("  created:  {}", format_timestamp(twin.created_at));
    println!("  interests (encoded):");
    let encoded: BTreeMap<String, String> = twin.encoded_map()?;
    for (category, value) in encoded {
        println!("    {:<14} {}", category, preview(&value, 24));
    }
    Ok(())
}

fn print_decrypted(values: &BTreeMap<String, f64>) {
    println!("Decrypted interests:");
    for (category, value) in values {
        if value.is_finite() {
            println!("  {:<14} {value}", category);
        } else {
            println!("  {:<14} <unreadable>", category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_identity_is_recognised() {
        assert_eq!(parse_operation("identity"), (Transform::Identity, true));
        assert_eq!(parse_operation(" identity "), (Transform::Identity, true));
        assert_eq!(parse_operation("double"), (Transform::Double, true));
        assert_eq!(parse_operation("cube"), (Transform::Identity, false));
    }
}
