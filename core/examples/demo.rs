//! Interactive CLI demo of the full TIDE vault lifecycle.
//!
//! Walks through asset and strategy registration, minting, buffer-driven
//! allocation, yield accrual, rebasing, and an exit through the
//! asynchronous withdrawal queue. The output uses ANSI escape codes for
//! colored, storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::collections::HashMap;

use anyhow::Result;

use tide_core::asset::{AssetConfig, AssetId};
use tide_core::config::PRICE_SCALE;
use tide_core::logging::{init_logging, LogFormat};
use tide_core::oracle::InMemoryOracle;
use tide_core::strategy::{Strategy, StrategyError};
use tide_core::vault::{RedeemMode, VaultConfig, VaultCore};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!("{BG_BLUE}{BOLD}{WHITE}                                                        {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    TIDE VAULT  --  Accounting Core Lifecycle Demo      {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  elastic supply, honest books      {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}                                                        {RESET}");
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]========================================================{RESET}");
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!("{CYAN}----------------------------------------------------------------------{RESET}");
}

fn line(label: &str, value: impl std::fmt::Display) {
    println!("  {DIM}{label:<28}{RESET}{GREEN}{value}{RESET}");
}

fn tokens(units: u64) -> String {
    format!("{}.{:08}", units / 100_000_000, units % 100_000_000)
}

fn usdc(units: u64) -> String {
    format!("{}.{:06} USDC", units / 1_000_000, units % 1_000_000)
}

// ---------------------------------------------------------------------------
// A lending-market stand-in for the demo
// ---------------------------------------------------------------------------

struct DemoStrategy {
    balances: HashMap<AssetId, u64>,
}

impl Strategy for DemoStrategy {
    fn deposit(&mut self, asset: &AssetId, amount: u64) -> Result<(), StrategyError> {
        *self.balances.entry(*asset).or_insert(0) += amount;
        Ok(())
    }

    fn withdraw(
        &mut self,
        _recipient: &String,
        asset: &AssetId,
        amount: u64,
    ) -> Result<u64, StrategyError> {
        let held = self.balances.entry(*asset).or_insert(0);
        let taken = amount.min(*held);
        *held -= taken;
        Ok(taken)
    }

    fn withdraw_all(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError> {
        Ok(self.balances.drain().collect())
    }

    fn check_balance(&self, asset: &AssetId) -> u64 {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    fn supports_asset(&self, _asset: &AssetId) -> bool {
        true
    }

    fn collect_rewards(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// The walkthrough
// ---------------------------------------------------------------------------

const GOVERNOR: &str = "tide:governor";
const ALICE: &str = "tide:alice";

fn main() -> Result<()> {
    init_logging("warn", LogFormat::Pretty);
    banner();

    // -- 1. Bootstrap -------------------------------------------------------
    section(1, "Bootstrap: asset, oracle, strategy");
    let asset = AssetConfig::new("USDC", 6, "tide:circle");
    let asset_id = asset.id;

    let mut oracle = InMemoryOracle::new();
    oracle.set_price(asset_id, PRICE_SCALE);

    let mut config = VaultConfig::new(GOVERNOR, asset_id);
    config.claim_delay = std::time::Duration::ZERO;
    config.buffer_bps = 5_000;
    config.redeem_mode = RedeemMode::ProRata;
    let mut vault = VaultCore::new(config, Box::new(oracle));
    vault.support_asset(GOVERNOR, asset)?;

    let strategy_id = vault.register_strategy(
        GOVERNOR,
        Box::new(DemoStrategy {
            balances: HashMap::new(),
        }),
        100,
    )?;
    vault.set_default_strategy(GOVERNOR, &asset_id, Some(strategy_id))?;
    line("asset", asset_id);
    line("strategy", strategy_id);

    // -- 2. Mint ------------------------------------------------------------
    section(2, "Alice deposits 100 USDC at the peg");
    let minted = vault.mint(ALICE, &asset_id, 100_000_000, 0)?;
    line("minted (receipt tokens)", tokens(minted));
    line("vault cash", usdc(vault.cash_balance(&asset_id)));
    line(
        "strategy custody",
        usdc(vault.strategy_balance(&strategy_id, &asset_id)?),
    );
    line("total value", tokens(vault.check_total_value()?));

    // -- 3. Yield + rebase --------------------------------------------------
    section(3, "The strategy earns 10 USDC; rebase distributes it");
    vault.deposit_yield(&asset_id, 10_000_000)?;
    let outcome = vault.rebase()?;
    line("supply before", tokens(outcome.supply_before));
    line("supply after", tokens(outcome.supply_after));
    line("alice balance", tokens(vault.balance_of(ALICE)));

    // -- 4. Queue an exit ---------------------------------------------------
    section(4, "Alice exits in full; liquidity is partial, so she queues");
    let balance = vault.balance_of(ALICE);
    let id = vault.request_withdrawal(ALICE, balance)?;
    let claimable = vault.add_withdrawal_queue_liquidity();
    line("request id", id);
    line("queued", tokens(vault.queue_totals().queued));
    line("claimable so far", tokens(claimable));

    // -- 5. Refill and claim ------------------------------------------------
    section(5, "The vault recalls strategy funds and Alice claims");
    vault.withdraw_all_from(GOVERNOR, &strategy_id)?;
    let receipt = vault.claim_withdrawal(ALICE, id)?;
    line("paid out", usdc(receipt.amount_native));
    line("queue claimed", tokens(vault.queue_totals().claimed));
    line("remaining supply", tokens(vault.total_supply()));

    println!();
    println!("{BOLD}{GREEN}  Lifecycle complete: every claim settled, books balanced.{RESET}");
    println!();
    Ok(())
}
