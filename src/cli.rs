use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pix_contact_gate::config::{Config, CorsOrigins};
use pix_contact_gate::poller::{HttpGateway, Poller, PollerConfig, PollerState};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pix-contact-gate")]
#[command(about = "PIX contact gate - charge, reconcile and unlock seller contacts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Follow a payment from a running server until it settles
    Watch(WatchArgs),
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Reconcile one payment against the processor
    Reconcile {
        /// Processor payment id
        #[arg(value_name = "PAYMENT_ID")]
        payment_id: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Base URL of a running server
    #[arg(long, default_value = "http://localhost:3000")]
    pub api_url: String,

    /// Buyer profile id; opens a new charge
    #[arg(long, conflicts_with = "payment_id")]
    pub buyer: Option<String>,

    /// Seller whose contact is revealed once the payment is approved
    #[arg(long)]
    pub seller: String,

    /// Follow an existing charge instead of opening one
    #[arg(long, required_unless_present = "buyer")]
    pub payment_id: Option<String>,

    #[arg(long, default_value_t = 5)]
    pub interval_secs: u64,

    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

pub async fn handle_tx_reconcile(config: &Config, payment_id: &str) -> anyhow::Result<()> {
    let pool = pix_contact_gate::db::create_pool(config).await?;
    let state = pix_contact_gate::build_state(config, pool);

    let reconciliation = state
        .reconciler
        .check_status(payment_id)
        .await
        .with_context(|| format!("failed to reconcile payment {}", payment_id))?;

    tracing::info!(
        payment_id = %payment_id,
        status = %reconciliation.report.status,
        source = ?reconciliation.source,
        "Payment reconciled"
    );
    println!("✓ Payment {} is {}", payment_id, reconciliation.report.status);
    println!("  Source: {:?}", reconciliation.source);
    println!("  Message: {}", reconciliation.report.message);
    if reconciliation.report.fallback {
        println!("  ⚠️  Processor unreachable, local status reported");
    }

    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = pix_contact_gate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    pix_contact_gate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Processor URL: {}", config.processor_base_url);
    println!("  Processor Token: {}", mask_secret(&config.processor_access_token));
    println!("  Notification URL: {}", config.notification_url);
    println!("  Contact Fee: {}", config.contact_fee);
    println!("  Charge Expiration: {} min", config.charge_expiration_minutes);
    match &config.cors_allowed_origins {
        CorsOrigins::Any => println!("  CORS Origins: *"),
        CorsOrigins::List(origins) => println!("  CORS Origins: {}", origins.join(", ")),
    }
    println!("  Log Format: {}", if config.log_json { "json" } else { "text" });

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

pub async fn handle_watch(args: WatchArgs) -> anyhow::Result<()> {
    let gateway = HttpGateway::new(args.api_url.clone(), Duration::from_secs(10));
    let poller = Poller::new(
        Arc::new(gateway),
        PollerConfig {
            interval: Duration::from_secs(args.interval_secs),
            timeout: Duration::from_secs(args.timeout_secs),
            ..PollerConfig::default()
        },
    );

    let handle = match (&args.buyer, &args.payment_id) {
        (Some(buyer), _) => poller.start(buyer, &args.seller),
        (None, Some(payment_id)) => poller.resume(payment_id, &args.seller),
        (None, None) => anyhow::bail!("pass --buyer or --payment-id"),
    };

    let mut states = handle.subscribe();
    loop {
        let state = states.borrow_and_update().clone();
        print_state(&state);
        if state.is_terminal() {
            break;
        }
        if states.changed().await.is_err() {
            break;
        }
    }

    match handle.state() {
        PollerState::Approved { .. } => Ok(()),
        other => anyhow::bail!("payment did not complete: {}", other.label()),
    }
}

fn print_state(state: &PollerState) {
    match state {
        PollerState::Idle => {}
        PollerState::Creating => println!("Creating charge..."),
        PollerState::Waiting {
            payment_id,
            charge,
        } => {
            println!("Waiting for payment {}", payment_id);
            if let Some(charge) = charge {
                println!("  Amount: {}", charge.amount);
                println!("  PIX copy-paste: {}", charge.qr_code);
                if let Some(url) = &charge.ticket_url {
                    println!("  Ticket: {}", url);
                }
            }
        }
        PollerState::Approved {
            payment_id,
            contact,
        } => {
            println!("✓ Payment {} approved", payment_id);
            match contact {
                Some(contact) => {
                    println!("  WhatsApp: {}", contact.whatsapp);
                    println!("  Chat: {}", contact.whatsapp_url);
                }
                None => println!("  Contact not available yet, request it again via /contact-access"),
            }
        }
        PollerState::Expired { payment_id } => {
            println!("⏱  Payment {} expired, request a new charge to retry", payment_id)
        }
        PollerState::Failed { reason } => println!("❌ Payment failed: {}", reason),
    }
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}
