//! Vault Agent CLI
//!
//! Command-line interface for running decision cycles and exercising the
//! policy guardrails.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vault_agent::clock::{Clock, SystemClock};
use vault_agent::config::{env_vars, process_env};
use vault_agent::decision::{DecisionSource, LlmDecisionSource, ScriptedDecisionSource};
use vault_agent::market::AggregatorMarketFeed;
use vault_agent::policy::stress::{self, StressScenario};
use vault_agent::ptb::{CetusAggregator, FixedRateRouter, RouteFinder};
use vault_agent::units::{coin_types, sui_to_mist, ActionKind};
use vault_agent::vault::InMemoryLedger;
use vault_agent::wallet::{SecureWallet, Signers, TransactionSigner};
use vault_agent::{
    check_policy, parse_decision, AgentRunner, Config, CycleRequest, Error, Policy, Result, RunLog,
    Vault,
};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Decisions replayed by the demo when no live provider is requested
const DEMO_SCRIPT: [&str; 4] = [
    r#"{"action":"swap_sui_to_usdc","reasoning":"Tight spread and healthy depth; take a small position.","confidence":0.78,"params":{"amount":"0.5","slippage":"0.01"}}"#,
    r#"{"action":"swap_sui_to_usdc","reasoning":"Momentum is unclear.","confidence":0.42,"params":{"amount":"0.5"}}"#,
    r#"```json
{"action":"swap_usdc_to_sui","reasoning":"Rebalance toward SUI.","confidence":0.66,"params":{"amount":"0.25"}}
```"#,
    r#"{"action":"hold","reasoning":"Budget mostly used; wait.","confidence":0.9}"#,
];

#[derive(Parser)]
#[command(name = "vault-agent")]
#[command(about = "Policy-gated agent spending from a custodial Sui vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RouterKind {
    /// Fixed SUI price, no network access
    Fixed,
    /// Live route aggregator for the configured network
    Aggregator,
}

#[derive(Subcommand)]
enum Commands {
    /// Run decision cycles against a seeded in-memory vault
    Demo {
        /// Number of cycles
        #[arg(short = 'n', long, default_value_t = 3)]
        cycles: usize,

        /// Delay between cycles in milliseconds (defaults to the config interval)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Ask the configured LLM provider instead of replaying a script
        #[arg(long)]
        live: bool,

        /// Owner strategy directive passed to the decision source
        #[arg(long)]
        strategy: Option<String>,

        /// Route finder used for swaps and market data
        #[arg(long, value_enum, default_value_t = RouterKind::Fixed)]
        router: RouterKind,

        /// SUI price in USDC for the fixed router
        #[arg(long, default_value_t = 1.5)]
        price: f64,

        /// SUI deposited into the demo vault
        #[arg(long, default_value = "20")]
        deposit: String,

        /// Cooldown between spends in milliseconds
        #[arg(long, default_value_t = 0)]
        cooldown_ms: u64,

        /// Submit without a fee sponsor
        #[arg(long)]
        no_sponsor: bool,
    },

    /// Check a proposed spend against a vault snapshot
    CheckPolicy {
        /// Vault snapshot (JSON)
        #[arg(long)]
        vault: PathBuf,

        /// Amount in SUI
        #[arg(long)]
        amount: String,

        /// Action kind code (0 swap, 1 stable mint, 2 stable burn, 3 stable claim)
        #[arg(long, default_value_t = 0)]
        action: u8,

        /// Evaluate at this time instead of now (ms since epoch)
        #[arg(long)]
        now_ms: Option<u64>,
    },

    /// Parse decision text (from --text or stdin)
    ParseDecision {
        #[arg(long)]
        text: Option<String>,
    },

    /// Run guardrail stress scenarios against a vault snapshot
    StressTest {
        /// Vault snapshot (JSON)
        #[arg(long)]
        vault: PathBuf,

        /// Capability id to test for the unauthorized-agent scenario
        #[arg(long)]
        cap_id: Option<String>,

        /// Run only this scenario
        #[arg(long)]
        scenario: Option<StressScenario>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .apply_env(process_env)?;

    match cli.command {
        Commands::Demo {
            cycles,
            interval_ms,
            live,
            strategy,
            router,
            price,
            deposit,
            cooldown_ms,
            no_sponsor,
        } => {
            let options = DemoOptions {
                cycles,
                interval: Duration::from_millis(interval_ms.unwrap_or(config.check_interval_ms)),
                live,
                strategy,
                router,
                price,
                deposit,
                cooldown_ms,
                no_sponsor,
            };
            run_demo(config, options).await?;
        }
        Commands::CheckPolicy {
            vault,
            amount,
            action,
            now_ms,
        } => {
            let vault = load_vault(&vault)?;
            let kind = ActionKind::from_code(action).ok_or_else(|| {
                Error::InvalidArgument(format!("Unknown action kind code: {}", action))
            })?;
            let amount = sui_to_mist(&amount)?;
            let now = now_ms.unwrap_or_else(|| SystemClock.now_ms());
            print_json(&check_policy(&vault, amount, kind, now))?;
        }
        Commands::ParseDecision { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .map_err(|e| Error::InvalidArgument(format!("Failed to read stdin: {}", e)))?;
                    buf
                }
            };
            let decision = parse_decision(&text)?;
            print_json(&serde_json::json!({
                "decision": decision,
                "gated": decision.clone().gated(),
            }))?;
        }
        Commands::StressTest {
            vault,
            cap_id,
            scenario,
        } => {
            let vault = load_vault(&vault)?;
            let now = SystemClock.now_ms();
            let results = match scenario {
                Some(scenario) => vec![stress::run_scenario(&vault, scenario, cap_id.as_deref(), now)],
                None => stress::run_all(&vault, cap_id.as_deref(), now),
            };
            print_json(&results)?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_vault(path: &Path) -> Result<Vault> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidArgument(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

struct DemoOptions {
    cycles: usize,
    interval: Duration,
    live: bool,
    strategy: Option<String>,
    router: RouterKind,
    price: f64,
    deposit: String,
    cooldown_ms: u64,
    no_sponsor: bool,
}

async fn run_demo(config: Config, options: DemoOptions) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(InMemoryLedger::new(&config, clock.clone()));

    let agent = match SecureWallet::optional_from_env(env_vars::AGENT_PRIVATE_KEY)? {
        Some(wallet) => wallet,
        None => {
            tracing::warn!("No {} set - using a throwaway agent key", env_vars::AGENT_PRIVATE_KEY);
            SecureWallet::random()
        }
    };
    let sponsor = if options.no_sponsor {
        None
    } else {
        Some(SecureWallet::optional_from_env(env_vars::SPONSOR_PRIVATE_KEY)?.unwrap_or_else(SecureWallet::random))
    };
    let owner = SecureWallet::random().address();

    // Seed the ledger: owner funds, fee balances, one vault, one capability
    let deposit = sui_to_mist(&options.deposit)?;
    let fee_float = sui_to_mist("1")?;
    ledger.fund(&owner, coin_types::SUI, deposit).await;
    ledger.fund(&agent.address(), coin_types::SUI, fee_float).await;
    if let Some(sponsor) = &sponsor {
        ledger.fund(&sponsor.address(), coin_types::SUI, fee_float).await;
    }

    let policy = Policy {
        max_budget: sui_to_mist("10")?,
        max_per_tx: sui_to_mist("2")?,
        allowed_actions: ActionKind::ALL.iter().map(ActionKind::code).collect(),
        cooldown_ms: options.cooldown_ms,
        expires_at: clock.now_ms() + 7 * DAY_MS,
    };
    let (vault_id, owner_cap) = ledger.create_vault(&owner, deposit, policy).await?;
    let agent_cap_id = ledger
        .create_agent_cap(&vault_id, &owner_cap, &agent.address())
        .await?;

    let router: Arc<dyn RouteFinder> = match options.router {
        RouterKind::Fixed => Arc::new(FixedRateRouter::new(&config.coins.usdc, options.price)),
        RouterKind::Aggregator => Arc::new(CetusAggregator::new(&config.router.endpoint)?),
    };
    let market = Arc::new(
        AggregatorMarketFeed::new(router.clone(), &config.coins.sui, &config.coins.usdc)
            .with_clock(clock.clone()),
    );
    let decisions: Arc<dyn DecisionSource> = if options.live {
        Arc::new(LlmDecisionSource::from_config(&config, process_env)?)
    } else {
        Arc::new(ScriptedDecisionSource::new(
            DEMO_SCRIPT.iter().map(|s| s.to_string()).collect(),
        ))
    };

    tracing::info!(
        network = %config.network,
        vault_id = %vault_id,
        agent = %agent.address(),
        sponsored = sponsor.is_some(),
        decision_source = decisions.name(),
        router = router.name(),
        "Starting demo"
    );

    let runner = AgentRunner::new(&config, ledger.clone(), market, decisions, router)
        .with_clock(clock);
    let request = CycleRequest {
        vault_id,
        agent_cap_id,
        agent_address: agent.address(),
        owner_address: owner,
        strategy: options.strategy,
    };
    let signers = Signers::new(
        &agent,
        sponsor.as_ref().map(|s| s as &dyn TransactionSigner),
    );

    let mut log = RunLog::new(config.run_log_capacity);
    for cycle in 0..options.cycles {
        if cycle > 0 {
            tokio::time::sleep(options.interval).await;
        }
        let result = runner.run_cycle(&request, signers).await?;
        print_json(&result)?;
        log.push(result);
    }

    let executed = log.iter().filter(|r| r.tx_digest.is_some()).count();
    let denied = log.iter().filter(|r| !r.policy_check.allowed).count();
    let failed = log.iter().filter(|r| r.error.is_some()).count();
    if let Some(last) = log.latest() {
        tracing::info!(
            cycles = log.len(),
            executed,
            denied,
            failed,
            balance = %last.vault.balance,
            total_spent = %last.vault.total_spent,
            "Demo finished"
        );
    }

    Ok(())
}
