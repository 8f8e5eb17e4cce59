use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use corestake_crypto::signatures::{account_of, generate_keypair, sign_request, SigningKey};
use corestake_types::fixed::{pow10, BTC_DECIMALS, CORE_DECIMALS, SHARE_DECIMALS, USD_DECIMALS};
use corestake_types::{AssetAmount, AssetKind, EngineOperation, SignedPayload, ValidatorId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "CoreStake CLI: query and operate a CoreStake node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://localhost:3000")]
    node_url: String,
    /// Key that signs submitted requests.
    #[arg(short, long, default_value = "wallet.json")]
    wallet_path: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new signing key
    Init,
    /// Show the wallet's account
    Show,
    /// Pool totals and share price
    Pool,
    /// Registered validators with APY and risk
    Validators,
    /// Optimal allocation weights
    Distribution,
    /// Whether a rebalance is due
    RebalanceCheck,
    /// Share balance and token balances of an account
    Account {
        #[arg(long)]
        address: String,
    },
    /// Status of a withdrawal request
    Withdrawal {
        #[arg(long)]
        id: u64,
    },
    /// Tier a CORE + BTC deposit would land in
    Classify {
        #[arg(long)]
        core: String,
        #[arg(long)]
        btc: String,
    },
    /// Oracle prices
    Prices,
    /// Report a USD price (price reporters)
    SetPrice {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        price: String,
    },
    /// Deposit CORE and/or BTC for shares
    Deposit {
        #[arg(long)]
        core: Option<String>,
        #[arg(long)]
        btc: Option<String>,
    },
    /// Tiered dual-asset deposit
    DepositDual {
        #[arg(long)]
        core: String,
        #[arg(long)]
        btc: String,
    },
    /// Instant redemption from the liquid buffer
    Redeem {
        #[arg(long)]
        shares: String,
    },
    /// Queue a withdrawal through unbonding
    Withdraw {
        #[arg(long)]
        shares: String,
    },
    /// Claim an unlocked withdrawal
    Claim {
        #[arg(long)]
        id: u64,
    },
    /// Register a validator (operators)
    AddValidator {
        #[arg(long)]
        id: String,
        #[arg(long)]
        commission_bps: u16,
        #[arg(long)]
        hybrid_score: u16,
    },
    /// Move stake onto the optimal allocation (operators)
    AutoRebalance,
    /// Delegate liquid CORE above the reserve (operators)
    Compound,
    /// Submit any operation from a JSON file
    Submit {
        #[arg(long)]
        file: PathBuf,
    },
}

/// Parses a decimal string such as `"1.25"` into base units.
fn parse_units(raw: &str, decimals: u8) -> Result<u128> {
    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
    if frac.len() > decimals as usize {
        bail!("{} has more than {} decimals", raw, decimals);
    }
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse()? };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        frac.parse::<u128>()? * pow10(decimals - frac.len() as u8)
    };
    whole
        .checked_mul(pow10(decimals))
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| anyhow!("{} overflows", raw))
}

#[derive(Serialize, Deserialize)]
struct Wallet {
    secret_key: String,
    account: String,
}

impl Wallet {
    fn load(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading wallet {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn to_keypair(&self) -> Result<SigningKey> {
        let secret = hex::decode(&self.secret_key)?;
        Ok(SigningKey::from_bytes(secret.as_slice().try_into()?))
    }
}

#[derive(Deserialize)]
struct AccountNonce {
    next_nonce: u64,
}

async fn get(client: &Client, cli: &Cli, path: &str) -> Result<()> {
    let res = client.get(format!("{}{}", cli.node_url, path)).send().await?;
    let status = res.status();
    let body = res.text().await?;
    if status.is_success() {
        println!("{}", body);
        Ok(())
    } else {
        Err(anyhow!("{}: {}", status, body))
    }
}

/// Signs `payload` with the wallet key at the account's next nonce.
async fn submit(client: &Client, cli: &Cli, path: &str, payload: SignedPayload) -> Result<()> {
    let key = Wallet::load(&cli.wallet_path)?.to_keypair()?;
    let account = account_of(&key);
    let nonce: AccountNonce = client
        .get(format!("{}/accounts/{}", cli.node_url, account))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let request = sign_request(&key, nonce.next_nonce, payload)?;

    let res = client.post(format!("{}{}", cli.node_url, path)).json(&request).send().await?;
    let status = res.status();
    let text = res.text().await?;
    if status.is_success() {
        println!("Outcome: {}", text);
        Ok(())
    } else {
        Err(anyhow!("rejected ({}): {}", status, text))
    }
}

async fn submit_op(client: &Client, cli: &Cli, operation: EngineOperation) -> Result<()> {
    submit(client, cli, "/op", SignedPayload::Operation(operation)).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match &cli.command {
        Commands::Init => {
            let key = generate_keypair();
            let wallet = Wallet {
                secret_key: hex::encode(key.to_bytes()),
                account: account_of(&key).to_string(),
            };
            wallet.save(&cli.wallet_path)?;
            println!("Wallet initialized at {:?}", cli.wallet_path);
            println!("Account: {}", wallet.account);
        }
        Commands::Show => {
            let wallet = Wallet::load(&cli.wallet_path)?;
            println!("Wallet: {:?}", cli.wallet_path);
            println!("Account: {}", account_of(&wallet.to_keypair()?));
        }
        Commands::Pool => get(&client, &cli, "/pool").await?,
        Commands::Validators => get(&client, &cli, "/validators").await?,
        Commands::Distribution => get(&client, &cli, "/distribution").await?,
        Commands::RebalanceCheck => get(&client, &cli, "/rebalance/check").await?,
        Commands::Account { address } => get(&client, &cli, &format!("/accounts/{}", address)).await?,
        Commands::Withdrawal { id } => get(&client, &cli, &format!("/withdrawals/{}", id)).await?,
        Commands::Classify { core, btc } => {
            let core = parse_units(core, CORE_DECIMALS)?;
            let btc = parse_units(btc, BTC_DECIMALS)?;
            get(&client, &cli, &format!("/classify?core={}&btc={}", core, btc)).await?
        }
        Commands::Prices => get(&client, &cli, "/prices").await?,
        Commands::SetPrice { symbol, price } => {
            let payload = SignedPayload::ReportPrice {
                symbol: symbol.clone(),
                price: parse_units(price, USD_DECIMALS)?,
            };
            submit(&client, &cli, "/prices", payload).await?
        }
        Commands::Deposit { core, btc } => {
            let mut assets = Vec::new();
            if let Some(core) = core {
                assets.push(AssetAmount::new(AssetKind::Core, parse_units(core, CORE_DECIMALS)?));
            }
            if let Some(btc) = btc {
                assets.push(AssetAmount::new(AssetKind::Btc, parse_units(btc, BTC_DECIMALS)?));
            }
            if assets.is_empty() {
                bail!("pass --core and/or --btc");
            }
            submit_op(&client, &cli, EngineOperation::Deposit { assets }).await?
        }
        Commands::DepositDual { core, btc } => {
            let operation = EngineOperation::DepositDual {
                core_amount: parse_units(core, CORE_DECIMALS)?,
                btc_amount: parse_units(btc, BTC_DECIMALS)?,
            };
            submit_op(&client, &cli, operation).await?
        }
        Commands::Redeem { shares } => {
            let shares = parse_units(shares, SHARE_DECIMALS)?;
            submit_op(&client, &cli, EngineOperation::Redeem { shares }).await?
        }
        Commands::Withdraw { shares } => {
            let shares = parse_units(shares, SHARE_DECIMALS)?;
            submit_op(&client, &cli, EngineOperation::RequestWithdrawal { shares }).await?
        }
        Commands::Claim { id } => submit_op(&client, &cli, EngineOperation::ClaimWithdrawal { request_id: *id }).await?,
        Commands::AddValidator {
            id,
            commission_bps,
            hybrid_score,
        } => {
            let validator: ValidatorId = id.parse().map_err(|e| anyhow!("invalid validator: {}", e))?;
            let operation = EngineOperation::AddValidator {
                validator,
                commission_bps: *commission_bps,
                hybrid_score: *hybrid_score,
            };
            submit_op(&client, &cli, operation).await?
        }
        Commands::AutoRebalance => submit_op(&client, &cli, EngineOperation::AutoRebalance).await?,
        Commands::Compound => submit_op(&client, &cli, EngineOperation::Compound).await?,
        Commands::Submit { file } => {
            let raw = std::fs::read_to_string(file)?;
            let operation: EngineOperation = serde_json::from_str(&raw)?;
            submit_op(&client, &cli, operation).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_amounts() {
        assert_eq!(parse_units("1", 8).unwrap(), 100_000_000);
        assert_eq!(parse_units("0.001", 8).unwrap(), 100_000);
        assert_eq!(parse_units(".5", 2).unwrap(), 50);
        assert_eq!(parse_units("12.", 2).unwrap(), 1_200);
        assert!(parse_units("0.123", 2).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("", 18).is_err());
    }

    #[test]
    fn wallet_round_trips_its_key() {
        let dir = std::env::temp_dir().join(format!("corestake-wallet-{}", std::process::id()));
        let key = SigningKey::from_bytes(&[5; 32]);
        let wallet = Wallet {
            secret_key: hex::encode(key.to_bytes()),
            account: account_of(&key).to_string(),
        };
        wallet.save(&dir).unwrap();
        let loaded = Wallet::load(&dir).unwrap();
        assert_eq!(account_of(&loaded.to_keypair().unwrap()), account_of(&key));
        fs::remove_file(&dir).unwrap();
    }
}
