use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ca_ops::{
    authority::AuthorityClient,
    cache::RedisCache,
    config::{AuthorityConfig, Config},
    domain::{AccountId, RevocationParams, RevocationReason, Revoker, Serial},
    ocsp::{Backfill, BackfillOptions, IssuerRegistry, OcspWriter, ParsedResponse},
    revocation::{AuditLog, DryRunRevoker, RevocationOrchestrator, TracingAuditLog},
    serials::{SerialResolver, read_serials_file},
    store::SqlStore,
    telemetry,
};
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, OptionExt, bail, eyre};
use tracing::{info, warn};

/// Administrative tooling for bulk revocation and OCSP cache distribution.
#[derive(Debug, Parser)]
#[command(name = "ca-ops", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Revoke every certificate named by exactly one serial source.
    RevokeCert(RevokeCertArgs),
    /// Store and inspect OCSP responses in the distributed cache.
    #[command(subcommand)]
    Ocsp(OcspCommand),
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["serial", "incident_table", "serials_file", "private_key", "reg_id"]),
))]
struct RevokeCertArgs {
    /// A single certificate serial.
    #[arg(long)]
    serial: Option<String>,
    /// Incident table holding the serials to revoke.
    #[arg(long)]
    incident_table: Option<String>,
    /// File with one serial per line.
    #[arg(long)]
    serials_file: Option<PathBuf>,
    /// Compromised private key; revokes every unexpired certificate for it.
    #[arg(long)]
    private_key: Option<PathBuf>,
    /// Account id; revokes every unexpired certificate issued to it.
    #[arg(long)]
    reg_id: Option<i64>,
    /// CRLReason code.
    #[arg(long, default_value_t = 0)]
    reason: i64,
    /// Do not block the key from future issuance (key compromise only).
    #[arg(long)]
    skip_block_key: bool,
    /// The certificate cannot be parsed; only valid with --serial.
    #[arg(long, requires = "serial")]
    malformed: bool,
    /// Log what would be revoked without calling the authority.
    #[arg(long)]
    dry_run: bool,
    /// Concurrent revoke calls; defaults to the configured value.
    #[arg(long)]
    parallelism: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum OcspCommand {
    /// Store DER-encoded OCSP response files.
    Store {
        /// Requested cache lifetime in seconds, capped by each response's nextUpdate.
        #[arg(long)]
        ttl: Option<u64>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Sign and store responses for every live row of the status table.
    LoadFromDb {
        #[arg(long)]
        start_from_id: Option<i64>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Print a cached response.
    Get {
        #[arg(long)]
        issuer_id: u32,
        serial: String,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    tokio::select! {
        result = run(cli, config) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; abandoning in-flight operations");
            Err(eyre!("interrupted"))
        }
    }
}

async fn run(cli: Cli, config: Config) -> color_eyre::Result<()> {
    match cli.command {
        Command::RevokeCert(args) => revoke_cert(args, &config).await,
        Command::Ocsp(command) => ocsp(command, &config).await,
    }
}

async fn revoke_cert(args: RevokeCertArgs, config: &Config) -> color_eyre::Result<()> {
    let reason = RevocationReason::try_from(args.reason)?;
    let params = RevocationParams::new(reason)
        .with_skip_block_key(args.skip_block_key)
        .with_malformed(args.malformed);

    let serials = resolve_serials(&args, config).await?;
    info!("Resolved {} serials to revoke", serials.len());

    let log: Arc<dyn AuditLog> = Arc::new(TracingAuditLog);
    let revoker: Arc<dyn Revoker> = if args.dry_run {
        Arc::new(DryRunRevoker::new(Arc::clone(&log)))
    } else {
        Arc::new(AuthorityClient::new(authority_config(config)?)?)
    };

    let parallelism = args.parallelism.unwrap_or(config.revocation.parallelism);
    let summary = RevocationOrchestrator::new(revoker, log)
        .revoke_serials(serials, params, parallelism)
        .await?;

    if summary.failed > 0 {
        bail!(
            "{} of {} serials failed to revoke",
            summary.failed,
            summary.total()
        );
    }
    Ok(())
}

async fn resolve_serials(
    args: &RevokeCertArgs,
    config: &Config,
) -> color_eyre::Result<Vec<Serial>> {
    if let Some(serial) = &args.serial {
        return Ok(vec![Serial::new(serial)]);
    }
    if let Some(path) = &args.serials_file {
        return Ok(read_serials_file(path).await?);
    }

    let resolver = SerialResolver::from_store(connect_store(config).await?);
    let serials = if let Some(table) = &args.incident_table {
        resolver.from_incident_table(table).await?
    } else if let Some(path) = &args.private_key {
        resolver.from_private_key(path).await?
    } else if let Some(reg_id) = args.reg_id {
        resolver.from_account(AccountId(reg_id)).await?
    } else {
        bail!("no serial source given");
    };
    Ok(serials)
}

async fn ocsp(command: OcspCommand, config: &Config) -> color_eyre::Result<()> {
    let writer = connect_writer(config).await?;
    match command {
        OcspCommand::Store { ttl, files } => {
            let ttl = ttl.map(Duration::from_secs);
            for file in files {
                let der = tokio::fs::read(&file)
                    .await
                    .wrap_err_with(|| format!("reading {}", file.display()))?;
                let stored = writer
                    .store_response(&der, ttl)
                    .await
                    .wrap_err_with(|| format!("storing {}", file.display()))?;
                info!(
                    key = %stored.key,
                    ttl_secs = stored.ttl.as_secs(),
                    "Stored OCSP response from {}",
                    file.display()
                );
            }
        }
        OcspCommand::LoadFromDb {
            start_from_id,
            max_rows,
        } => {
            let store = Arc::new(connect_store(config).await?);
            let signer = Arc::new(AuthorityClient::new(authority_config(config)?)?);
            let options = BackfillOptions {
                batch_size: config.backfill.batch_size,
                parallelism: config.backfill.parallelism,
                ttl: config.backfill.ttl_secs.map(Duration::from_secs),
                start_from_id,
                max_rows,
            };
            let summary = Backfill::new(store, signer, writer, options)
                .run(Utc::now())
                .await?;
            if summary.failed > 0 {
                bail!("{} of {} rows failed", summary.failed, summary.scanned);
            }
        }
        OcspCommand::Get { issuer_id, serial } => {
            let serial = Serial::new(serial);
            let der = writer
                .load_response(issuer_id, &serial)
                .await?
                .ok_or_eyre(format!("no cached response for {serial} under issuer {issuer_id}"))?;
            let parsed = ParsedResponse::from_der(&der)?;
            println!("serial:      {}", parsed.serial);
            println!("issuer:      {}", parsed.issuer);
            println!("this update: {}", parsed.this_update);
            match parsed.next_update {
                Some(next_update) => println!("next update: {next_update}"),
                None => println!("next update: none"),
            }
            println!("{}", hex::encode(&der));
        }
    }
    Ok(())
}

fn authority_config(config: &Config) -> color_eyre::Result<&AuthorityConfig> {
    config
        .authority
        .as_ref()
        .ok_or_eyre("authority is not configured (APP_AUTHORITY__URL)")
}

async fn connect_store(config: &Config) -> color_eyre::Result<SqlStore> {
    let database = config
        .database
        .as_ref()
        .ok_or_eyre("database is not configured (APP_DATABASE__URL)")?;
    Ok(SqlStore::connect(&database.url, database.max_connections).await?)
}

async fn connect_writer(config: &Config) -> color_eyre::Result<OcspWriter> {
    let redis = config
        .redis
        .as_ref()
        .ok_or_eyre("redis is not configured (APP_REDIS__URI)")?;
    let issuers = IssuerRegistry::load(&config.issuers)?;
    let conn = redis.start().await.wrap_err("connecting to redis")?;
    Ok(OcspWriter::new(
        Arc::new(RedisCache::new(conn)),
        Arc::new(issuers),
    ))
}
