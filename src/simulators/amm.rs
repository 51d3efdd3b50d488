// src/simulators/amm.rs

//! Constant-product market maker: x * y = k.
//!
//! Every swap runs inside one critical section on the pool mutex. The agent's
//! wallet is borrowed mutably by the caller for the duration of the call, so
//! the reserve update and the balance update commit together or not at all.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, info};

use super::market_trait::Marketable;
use super::pool_state::{INVARIANT_EPSILON, PoolState};
use crate::config::MarketConfig;
use crate::error::{Result, SimError};
use crate::types::{AgentId, Direction, SwapReceipt, Timestamp, Transaction, TxStatus, Wallet};

/// A swap may leave at most this fraction of the output reserve behind.
pub const MIN_RESERVE_FRACTION: f64 = 0.01;

/// Pure result of the pricing formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapQuote {
    pub input_amount: f64,
    pub output_amount: f64,
    pub fee: f64,
    /// SOL per token actually paid or received.
    pub effective_price: f64,
    pub price_before: f64,
    pub price_impact: f64,
}

/// A rejected swap together with its `Failed` transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRejected {
    pub error: SimError,
    pub transaction: Transaction,
}

impl From<SwapRejected> for SimError {
    fn from(r: SwapRejected) -> Self {
        r.error
    }
}

/// Output of a constant-product swap with the fee taken from the input.
pub fn compute_swap(
    pool: &PoolState,
    input_amount: f64,
    direction: Direction,
) -> Result<SwapQuote> {
    if !(input_amount > 0.0) || !input_amount.is_finite() {
        return Err(SimError::InvalidConfiguration(format!(
            "swap input must be positive, got {input_amount}"
        )));
    }
    let (reserve_in, reserve_out) = pool.reserves_for(direction.is_buy());
    let fee = input_amount * pool.fee_rate;
    let effective_in = input_amount - fee;
    let output_amount = reserve_out - (reserve_in * reserve_out) / (reserve_in + effective_in);

    if output_amount >= reserve_out || reserve_out - output_amount < reserve_out * MIN_RESERVE_FRACTION
    {
        return Err(SimError::InsufficientLiquidity {
            requested: output_amount,
            available: reserve_out,
        });
    }
    if !(output_amount > 0.0) {
        return Err(SimError::InsufficientLiquidity {
            requested: output_amount,
            available: reserve_out,
        });
    }

    let price_before = pool.price();
    let effective_price = match direction {
        Direction::SolToToken => input_amount / output_amount,
        Direction::TokenToSol => output_amount / input_amount,
    };
    let price_impact = (price_before - effective_price).abs() / price_before;

    Ok(SwapQuote {
        input_amount,
        output_amount,
        fee,
        effective_price,
        price_before,
        price_impact,
    })
}

pub struct MarketMaker {
    pool: Mutex<PoolState>,
    halted: AtomicBool,
    next_tx_id: AtomicU64,
}

impl MarketMaker {
    /// A pool bootstrapped from the configured price and liquidity.
    pub fn new(market: &MarketConfig) -> Result<Self> {
        let state = bootstrap_state(
            market.initial_price,
            market.initial_liquidity_sol,
            market.fee_rate,
            Utc::now(),
        )?;
        Ok(Self::from_parts(state))
    }

    /// Resume from a stored snapshot. `k` is rebuilt from the reserves.
    pub fn from_state(state: PoolState) -> Result<Self> {
        Ok(Self::from_parts(state.rehydrated()?))
    }

    fn from_parts(state: PoolState) -> Self {
        Self {
            pool: Mutex::new(state),
            halted: AtomicBool::new(false),
            next_tx_id: AtomicU64::new(1),
        }
    }

    /// Re-seed reserves so that the spot price is `initial_price`.
    /// Not on the trading hot path; also clears a halt.
    pub fn bootstrap_pool(&self, initial_price: f64, initial_liquidity_sol: f64) -> Result<PoolState> {
        let mut pool = self.pool.lock();
        let mut fresh = bootstrap_state(initial_price, initial_liquidity_sol, pool.fee_rate, Utc::now())?;
        fresh.version = pool.version + 1;
        *pool = fresh;
        self.halted.store(false, Ordering::SeqCst);
        info!(
            price = initial_price,
            sol = pool.sol_reserve,
            token = pool.token_reserve,
            "pool bootstrapped"
        );
        Ok(pool.clone())
    }

    /// Swap in a stored snapshot. Rejected snapshots leave the pool alone.
    pub fn restore(&self, state: PoolState) -> Result<PoolState> {
        let state = state.rehydrated()?;
        let mut pool = self.pool.lock();
        *pool = state;
        self.halted.store(false, Ordering::SeqCst);
        Ok(pool.clone())
    }

    /// Read-only copy of the pool; the lock is held only for the clone.
    pub fn pool_state(&self) -> PoolState {
        self.pool.lock().clone()
    }

    pub fn fee_rate(&self) -> f64 {
        self.pool.lock().fee_rate
    }

    /// Fee for swaps from now on. Must be in [0, 1).
    pub fn set_fee_rate(&self, fee_rate: f64) -> Result<()> {
        if !(0.0..1.0).contains(&fee_rate) {
            return Err(SimError::InvalidConfiguration(format!(
                "fee rate must be in [0, 1), got {fee_rate}"
            )));
        }
        let mut pool = self.pool.lock();
        pool.fee_rate = fee_rate;
        pool.version += 1;
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Manual reset after an invariant violation was investigated.
    pub fn reset_halt(&self) -> Result<()> {
        let mut pool = self.pool.lock();
        let repaired = pool.clone().rehydrated()?;
        *pool = repaired;
        self.halted.store(false, Ordering::SeqCst);
        info!("market maker halt cleared");
        Ok(())
    }

    /// Preview a swap without touching the pool.
    pub fn quote(&self, input_amount: f64, direction: Direction) -> Result<SwapQuote> {
        compute_swap(&self.pool.lock(), input_amount, direction)
    }

    pub fn swap(
        &self,
        agent_id: AgentId,
        wallet: &mut Wallet,
        input_amount: f64,
        direction: Direction,
        max_slippage: f64,
    ) -> std::result::Result<SwapReceipt, SwapRejected> {
        self.swap_at(agent_id, wallet, input_amount, direction, max_slippage, Utc::now())
    }

    pub fn swap_at(
        &self,
        agent_id: AgentId,
        wallet: &mut Wallet,
        input_amount: f64,
        direction: Direction,
        max_slippage: f64,
        now: Timestamp,
    ) -> std::result::Result<SwapReceipt, SwapRejected> {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        let mut pool = self.pool.lock();
        let price_before = pool.price();

        let reject = |error: SimError| {
            debug!(agent_id, ?direction, input_amount, %error, "swap rejected");
            SwapRejected {
                transaction: Transaction {
                    id: tx_id,
                    agent_id,
                    direction,
                    input_amount,
                    output_amount: 0.0,
                    effective_price: 0.0,
                    fee: 0.0,
                    price_before,
                    price_after: price_before,
                    status: TxStatus::Failed,
                    failure_reason: Some(error.to_string()),
                    timestamp: now,
                },
                error,
            }
        };

        if self.halted.load(Ordering::SeqCst) {
            return Err(reject(SimError::InvariantViolation(
                "market maker is halted".into(),
            )));
        }

        let available = wallet.input_balance(direction);
        if available < input_amount {
            return Err(reject(SimError::InsufficientBalance {
                needed: input_amount,
                available,
            }));
        }

        let quote = match compute_swap(&pool, input_amount, direction) {
            Ok(q) => q,
            Err(e) => return Err(reject(e)),
        };
        if quote.price_impact > max_slippage {
            return Err(reject(SimError::SlippageExceeded {
                impact: quote.price_impact,
                max: max_slippage,
            }));
        }

        // Work on a copy; commit only after the invariant holds.
        let mut next = pool.clone();
        let (reserve_in, reserve_out) = next.reserves_for(direction.is_buy());
        let k_before = reserve_in * reserve_out;
        let new_reserve_out = reserve_out - quote.output_amount;
        let fee_adjusted_in = reserve_in + (input_amount - quote.fee);
        let drift = (fee_adjusted_in * new_reserve_out - k_before).abs();
        if drift > INVARIANT_EPSILON * k_before {
            return Err(reject(self.halt(format!(
                "swap would move k by {drift:e} (k={k_before})"
            ))));
        }

        match direction {
            Direction::SolToToken => {
                next.sol_reserve += input_amount;
                next.token_reserve = new_reserve_out;
            }
            Direction::TokenToSol => {
                next.token_reserve += input_amount;
                next.sol_reserve = new_reserve_out;
            }
        }
        let sol_volume = match direction {
            Direction::SolToToken => input_amount,
            Direction::TokenToSol => quote.output_amount,
        };
        // The drift check above is the invariant guard; fees grow k here.
        next.record_trade(now, sol_volume);

        if let Err(e) = wallet.settle(direction, input_amount, quote.output_amount) {
            return Err(reject(e));
        }
        let price_after = next.price();
        *pool = next;
        drop(pool);

        let transaction = Transaction {
            id: tx_id,
            agent_id,
            direction,
            input_amount,
            output_amount: quote.output_amount,
            effective_price: quote.effective_price,
            fee: quote.fee,
            price_before,
            price_after,
            status: TxStatus::Confirmed,
            failure_reason: None,
            timestamp: now,
        };
        debug!(
            agent_id,
            ?direction,
            input_amount,
            output = quote.output_amount,
            price_after,
            "swap settled"
        );
        Ok(SwapReceipt {
            output_amount: quote.output_amount,
            effective_price: quote.effective_price,
            fee_charged: quote.fee,
            price_impact: quote.price_impact,
            transaction,
        })
    }

    fn halt(&self, reason: String) -> SimError {
        self.halted.store(true, Ordering::SeqCst);
        error!(%reason, "INVARIANT VIOLATION: market maker halted");
        SimError::InvariantViolation(reason)
    }

    /// Reconcile the 24h window fields against the wall clock.
    pub fn sync_market_data(&self) -> PoolState {
        self.sync_market_data_at(Utc::now())
    }

    pub fn sync_market_data_at(&self, now: Timestamp) -> PoolState {
        let mut pool = self.pool.lock();
        pool.sync_window(now);
        pool.clone()
    }

    #[cfg(test)]
    pub(crate) fn force_halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

impl Marketable for MarketMaker {
    fn current_price(&self) -> f64 {
        self.pool.lock().price()
    }

    fn recent_prices(&self, n: usize) -> Vec<f64> {
        self.pool.lock().recent_prices(n)
    }
}

fn bootstrap_state(
    initial_price: f64,
    initial_liquidity_sol: f64,
    fee_rate: f64,
    now: Timestamp,
) -> Result<PoolState> {
    if !(initial_price > 0.0 && initial_price.is_finite()) {
        return Err(SimError::InvalidConfiguration(format!(
            "initial price must be positive, got {initial_price}"
        )));
    }
    if !(initial_liquidity_sol > 0.0 && initial_liquidity_sol.is_finite()) {
        return Err(SimError::InvalidConfiguration(format!(
            "initial liquidity must be positive, got {initial_liquidity_sol}"
        )));
    }
    if !(0.0..1.0).contains(&fee_rate) {
        return Err(SimError::InvalidConfiguration(format!(
            "fee rate must be in [0, 1), got {fee_rate}"
        )));
    }
    let state = PoolState::new(
        initial_liquidity_sol,
        initial_liquidity_sol / initial_price,
        fee_rate,
        now,
    );
    state.check_invariant()?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maker(sol: f64, token: f64, fee: f64) -> MarketMaker {
        MarketMaker::from_state(PoolState::new(sol, token, fee, Utc::now())).unwrap()
    }

    #[test]
    fn scenario_a_slippage_gate() {
        // Arrange: 1000 SOL / 1,000,000 tokens, 0.5% fee
        let amm = maker(1_000.0, 1_000_000.0, 0.005);
        let mut wallet = Wallet::new(100.0, 0.0);

        // Act: 0.5% tolerance is too tight for a 1% of reserve trade
        let rejected = amm
            .swap(1, &mut wallet, 10.0, Direction::SolToToken, 0.005)
            .unwrap_err();

        // Assert
        assert!(matches!(rejected.error, SimError::SlippageExceeded { .. }));
        assert_eq!(rejected.transaction.status, TxStatus::Failed);
        assert_eq!(wallet, Wallet::new(100.0, 0.0));
        assert_eq!(amm.pool_state().sol_reserve, 1_000.0);

        let receipt = amm
            .swap(1, &mut wallet, 10.0, Direction::SolToToken, 0.02)
            .unwrap();
        let expected_out = 1_000_000.0 - 1e9 / (1_000.0 + 10.0 * 0.995);
        assert!((receipt.output_amount - expected_out).abs() < 1e-6);
        assert!((receipt.output_amount - 9_851.98).abs() < 0.1);
        assert!((receipt.effective_price - 0.001015).abs() < 1e-6);
        assert!(receipt.price_impact > 0.005 && receipt.price_impact < 0.02);
        assert!((receipt.fee_charged - 0.05).abs() < 1e-12);
        assert_eq!(wallet.sol, 90.0);
        assert!((wallet.token - expected_out).abs() < 1e-6);
    }

    #[test]
    fn scenario_b_insufficient_balance_leaves_pool_alone() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let before = amm.pool_state();
        let mut wallet = Wallet::new(1.0, 0.0);

        let rejected = amm
            .swap(9, &mut wallet, 2.0, Direction::SolToToken, 0.5)
            .unwrap_err();

        assert!(matches!(
            rejected.error,
            SimError::InsufficientBalance { needed, available } if needed == 2.0 && available == 1.0
        ));
        assert_eq!(amm.pool_state(), before);
        assert_eq!(wallet.sol, 1.0);
    }

    #[test]
    fn invariant_holds_after_swaps_in_both_directions() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let mut wallet = Wallet::new(50.0, 50_000.0);
        for i in 0..40 {
            let dir = if i % 2 == 0 {
                Direction::SolToToken
            } else {
                Direction::TokenToSol
            };
            let amount = if dir.is_buy() { 0.5 } else { 400.0 };
            let before = amm.pool_state();
            let receipt = amm.swap(1, &mut wallet, amount, dir, 0.05).unwrap();
            let after = amm.pool_state();

            let (r_in, r_out) = before.reserves_for(dir.is_buy());
            let (_, new_out) = after.reserves_for(dir.is_buy());
            let k_prev = r_in * r_out;
            let fee_adjusted = (r_in + amount - receipt.fee_charged) * new_out;
            assert!((fee_adjusted - k_prev).abs() <= INVARIANT_EPSILON * k_prev);
            assert!(after.check_invariant().is_ok());
        }
        assert!(wallet.sol >= 0.0 && wallet.token >= 0.0);
    }

    #[test]
    fn buy_and_sell_move_reserves_monotonically() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let mut wallet = Wallet::new(10.0, 10_000.0);

        let s0 = amm.pool_state();
        amm.swap(1, &mut wallet, 1.0, Direction::SolToToken, 0.05)
            .unwrap();
        let s1 = amm.pool_state();
        assert!(s1.sol_reserve > s0.sol_reserve);
        assert!(s1.token_reserve < s0.token_reserve);
        assert!(s1.price() > s0.price());

        amm.swap(1, &mut wallet, 1_000.0, Direction::TokenToSol, 0.05)
            .unwrap();
        let s2 = amm.pool_state();
        assert!(s2.token_reserve > s1.token_reserve);
        assert!(s2.sol_reserve < s1.sol_reserve);
    }

    #[test]
    fn fee_stays_in_pool_so_k_grows() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let mut wallet = Wallet::new(10.0, 0.0);
        let k0 = amm.pool_state().k;
        amm.swap(1, &mut wallet, 1.0, Direction::SolToToken, 0.05)
            .unwrap();
        assert!(amm.pool_state().k > k0);
    }

    #[test]
    fn large_fee_grows_k_without_halting() {
        // Arrange: half of every input stays in the pool
        let amm = maker(1_000.0, 1_000_000.0, 0.5);
        let mut wallet = Wallet::new(100.0, 0.0);
        let k0 = amm.pool_state().k;

        // Act
        let receipt = amm
            .swap(1, &mut wallet, 20.0, Direction::SolToToken, 5.0)
            .unwrap();

        // Assert
        let after = amm.pool_state();
        assert!(!amm.is_halted());
        assert!((receipt.fee_charged - 10.0).abs() < 1e-12);
        assert!((after.k - after.sol_reserve * after.token_reserve).abs() < 1e-6 * after.k);
        assert!(after.k > k0 * 1.009, "fee share of k: {}", after.k / k0);
        assert!(after.check_invariant().is_ok());
    }

    #[test]
    fn draining_a_side_is_insufficient_liquidity() {
        let amm = maker(10.0, 10_000.0, 0.0);
        let mut wallet = Wallet::new(1e9, 0.0);
        let rejected = amm
            .swap(1, &mut wallet, 1e9, Direction::SolToToken, 1.0)
            .unwrap_err();
        assert!(matches!(
            rejected.error,
            SimError::InsufficientLiquidity { .. }
        ));
    }

    #[test]
    fn zero_input_is_rejected() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let mut wallet = Wallet::new(10.0, 0.0);
        assert!(amm
            .swap(1, &mut wallet, 0.0, Direction::SolToToken, 0.5)
            .is_err());
    }

    #[test]
    fn halted_maker_refuses_swaps_until_reset() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let mut wallet = Wallet::new(10.0, 0.0);
        amm.force_halt();

        let rejected = amm
            .swap(1, &mut wallet, 1.0, Direction::SolToToken, 0.05)
            .unwrap_err();
        assert!(rejected.error.is_fatal());

        amm.reset_halt().unwrap();
        assert!(amm
            .swap(1, &mut wallet, 1.0, Direction::SolToToken, 0.05)
            .is_ok());
    }

    #[test]
    fn bootstrap_sets_price_and_bumps_version() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let v0 = amm.pool_state().version;
        let state = amm.bootstrap_pool(0.002, 500.0).unwrap();
        assert!((state.price() - 0.002).abs() < 1e-15);
        assert_eq!(state.sol_reserve, 500.0);
        assert!(state.version > v0);
        assert!(amm.bootstrap_pool(0.0, 500.0).is_err());
    }

    #[test]
    fn transaction_ids_are_unique_per_attempt() {
        let amm = maker(1_000.0, 1_000_000.0, 0.003);
        let mut wallet = Wallet::new(1.0, 0.0);
        let a = amm
            .swap(1, &mut wallet, 0.1, Direction::SolToToken, 0.05)
            .unwrap()
            .transaction;
        let b = amm
            .swap(1, &mut wallet, 5.0, Direction::SolToToken, 0.05)
            .unwrap_err()
            .transaction;
        assert_ne!(a.id, b.id);
        assert!(a.is_confirmed());
        assert!(!b.is_confirmed());
    }
}
