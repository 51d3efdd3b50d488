// src/agents/decision.rs

//! The per-agent decision function. Pure over agent state, market context
//! and the supplied rng; applying the decision is the pool's job.

use rand::Rng;
use rand::distributions::Distribution;
use rand_distr::Normal;

use super::agent::Agent;
use super::config::{
    LABEL_JITTER_BASE, LABEL_JITTER_VOL, MAX_REACTIONS_PER_TICK, MAX_RISK_FRACTION,
    MIN_TRADE_SOL, OUTLOOK_JITTER_BASE, OUTLOOK_JITTER_VOL, OUTLOOK_MEMORY, REACTION_LOOKBACK,
    SENTIMENT_WEIGHT,
};
use crate::analysis::MarketSignal;
use crate::engine::phase::Phase;
use crate::types::{Direction, Message, MessageId, ReactionType, Sender, SentimentLabel};

/// What every agent sees during one tick. Built once at tick start.
#[derive(Debug, Clone, Default)]
pub struct MarketContext {
    pub tick: u64,
    /// Pool spot price, SOL per token.
    pub price: f64,
    pub signal: MarketSignal,
    /// Bullish minus bearish share, in [-1, 1].
    pub sentiment_score: f64,
    pub default_slippage: f64,
    /// Newest last.
    pub recent_messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold,
    Reassess {
        outlook: f64,
    },
    Socialize {
        post: Option<SentimentLabel>,
        reactions: Vec<(MessageId, ReactionType)>,
    },
    Trade {
        direction: Direction,
        amount: f64,
        max_slippage: f64,
    },
}

pub fn decide<R: Rng + ?Sized>(
    phase: Phase,
    agent: &Agent,
    ctx: &MarketContext,
    rng: &mut R,
) -> Decision {
    match phase {
        Phase::MarketAnalysis => Decision::Reassess {
            outlook: analyze(agent, ctx, rng),
        },
        Phase::Social => socialize(agent, ctx, rng),
        Phase::Trade => trade(agent, ctx, rng),
    }
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    Normal::new(0.0, std_dev)
        .map(|n| n.sample(rng))
        .unwrap_or(0.0)
}

/// New outlook from momentum, personality lean, crowd mood and noise.
pub fn analyze<R: Rng + ?Sized>(agent: &Agent, ctx: &MarketContext, rng: &mut R) -> f64 {
    let profile = agent.personality.profile();
    let p = &agent.params;

    let mut momentum = ctx.signal.momentum * profile.momentum_gain;
    if rng.gen_bool(p.contrary_opinion_rate) {
        momentum = -momentum;
    }
    let social = ctx.sentiment_score * SENTIMENT_WEIGHT * p.social_influence;
    let noise = gaussian(
        rng,
        OUTLOOK_JITTER_BASE + OUTLOOK_JITTER_VOL * p.emotional_volatility,
    );

    let fresh = momentum + profile.outlook_bias + social + noise;
    let blended = OUTLOOK_MEMORY * agent.outlook + (1.0 - OUTLOOK_MEMORY) * fresh;
    if blended.is_finite() {
        blended.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn reaction_for(outlook: f64, message: SentimentLabel) -> ReactionType {
    match (SentimentLabel::from_score(outlook), message) {
        (_, SentimentLabel::Neutral) => ReactionType::Laugh,
        (mine, theirs) if mine == theirs => ReactionType::Like,
        _ => ReactionType::Dislike,
    }
}

fn socialize<R: Rng + ?Sized>(agent: &Agent, ctx: &MarketContext, rng: &mut R) -> Decision {
    let p = &agent.params;

    let post = rng.gen_bool(p.message_frequency).then(|| {
        let jitter = gaussian(rng, LABEL_JITTER_BASE + LABEL_JITTER_VOL * p.emotional_volatility);
        SentimentLabel::from_score(agent.outlook + jitter)
    });

    let mut reactions = Vec::new();
    for msg in ctx.recent_messages.iter().rev().take(REACTION_LOOKBACK) {
        if reactions.len() >= MAX_REACTIONS_PER_TICK {
            break;
        }
        if msg.sender == Sender::Agent(agent.id) {
            continue;
        }
        if rng.gen_bool(p.social_influence) {
            reactions.push((msg.id, reaction_for(agent.outlook, msg.sentiment)));
        }
    }

    if post.is_none() && reactions.is_empty() {
        Decision::Hold
    } else {
        Decision::Socialize { post, reactions }
    }
}

fn trade<R: Rng + ?Sized>(agent: &Agent, ctx: &MarketContext, rng: &mut R) -> Decision {
    let p = &agent.params;
    let probability = (p.trade_frequency * (1.0 + agent.outlook.abs())).min(1.0);
    if !rng.gen_bool(probability) {
        return Decision::Hold;
    }

    let direction = if agent.outlook > 0.0 {
        Direction::SolToToken
    } else if agent.outlook < 0.0 {
        Direction::TokenToSol
    } else {
        return Decision::Hold;
    };

    let balance = agent.wallet.input_balance(direction);
    let amount = (agent.max_position_size * balance).min(p.risk_tolerance * MAX_RISK_FRACTION * balance);
    let value_sol = match direction {
        Direction::SolToToken => amount,
        Direction::TokenToSol => amount * ctx.price,
    };
    if !(amount > 0.0) || value_sol < MIN_TRADE_SOL || !agent.wallet.can_cover(direction, amount) {
        return Decision::Hold;
    }

    Decision::Trade {
        direction,
        amount,
        max_slippage: ctx.default_slippage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::personality::PersonalityType;
    use crate::types::{Visibility, Wallet};
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ctx() -> MarketContext {
        MarketContext {
            tick: 1,
            price: 0.001,
            default_slippage: 0.005,
            ..Default::default()
        }
    }

    fn agent_with(f: impl FnOnce(&mut Agent)) -> Agent {
        let mut a = Agent::with_profile(1, PersonalityType::Balanced, Wallet::new(10.0, 10_000.0));
        f(&mut a);
        a
    }

    fn msg(id: MessageId, sender: Sender, sentiment: SentimentLabel) -> Message {
        Message {
            id,
            sender,
            content: String::new(),
            sentiment,
            visibility: Visibility::Public,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn positive_outlook_buys_sized_by_risk() {
        // Arrange
        let agent = agent_with(|a| {
            a.params.trade_frequency = 1.0;
            a.params.risk_tolerance = 0.4;
            a.max_position_size = 0.5;
            a.outlook = 0.6;
        });
        let mut rng = StdRng::seed_from_u64(1);

        // Act
        let d = decide(Phase::Trade, &agent, &ctx(), &mut rng);

        // Assert: min(0.5 * 10, 0.4 * 0.25 * 10) = 1.0
        assert_eq!(
            d,
            Decision::Trade {
                direction: Direction::SolToToken,
                amount: 1.0,
                max_slippage: 0.005
            }
        );
    }

    #[test]
    fn negative_outlook_sells_tokens() {
        let agent = agent_with(|a| {
            a.params.trade_frequency = 1.0;
            a.outlook = -0.2;
        });
        let mut rng = StdRng::seed_from_u64(2);
        match decide(Phase::Trade, &agent, &ctx(), &mut rng) {
            Decision::Trade { direction, amount, .. } => {
                assert_eq!(direction, Direction::TokenToSol);
                assert!(amount > 0.0 && amount <= 10_000.0);
            }
            other => panic!("expected a sell, got {other:?}"),
        }
    }

    #[test]
    fn zero_outlook_holds() {
        let agent = agent_with(|a| {
            a.params.trade_frequency = 1.0;
            a.outlook = 0.0;
        });
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(decide(Phase::Trade, &agent, &ctx(), &mut rng), Decision::Hold);
    }

    #[test]
    fn dust_trades_are_skipped() {
        let agent = agent_with(|a| {
            a.params.trade_frequency = 1.0;
            a.outlook = 0.9;
            a.wallet = Wallet::new(0.002, 0.0);
        });
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(decide(Phase::Trade, &agent, &ctx(), &mut rng), Decision::Hold);
    }

    #[test]
    fn never_trades_with_zero_frequency() {
        let agent = agent_with(|a| {
            a.params.trade_frequency = 0.0;
            a.outlook = 1.0;
        });
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            assert_eq!(decide(Phase::Trade, &agent, &ctx(), &mut rng), Decision::Hold);
        }
    }

    #[test]
    fn certain_contrarian_fades_momentum() {
        let agent = agent_with(|a| {
            a.personality = PersonalityType::Contrarian;
            a.params.contrary_opinion_rate = 1.0;
            a.params.emotional_volatility = 0.0;
            a.params.social_influence = 0.0;
        });
        let mut c = ctx();
        c.signal.momentum = 1.0;
        let mut rng = StdRng::seed_from_u64(6);
        let outlook = analyze(&agent, &c, &mut rng);
        assert!(outlook < -0.4, "outlook was {outlook}");
    }

    #[test]
    fn trend_follower_amplifies_momentum() {
        let follower = agent_with(|a| {
            a.personality = PersonalityType::TrendFollower;
            a.params.contrary_opinion_rate = 0.0;
            a.params.emotional_volatility = 0.0;
            a.params.social_influence = 0.0;
        });
        let cautious = agent_with(|a| {
            a.personality = PersonalityType::Cautious;
            a.params.contrary_opinion_rate = 0.0;
            a.params.emotional_volatility = 0.0;
            a.params.social_influence = 0.0;
        });
        let mut c = ctx();
        c.signal.momentum = 0.5;
        let mut rng = StdRng::seed_from_u64(7);
        let f = analyze(&follower, &c, &mut rng);
        let k = analyze(&cautious, &c, &mut rng);
        assert!(f > k, "follower {f} vs cautious {k}");
    }

    #[test]
    fn outlook_stays_in_bounds() {
        let agent = agent_with(|a| a.params.emotional_volatility = 1.0);
        let mut c = ctx();
        c.signal.momentum = 1.0;
        c.sentiment_score = 1.0;
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..500 {
            let o = analyze(&agent, &c, &mut rng);
            assert!((-1.0..=1.0).contains(&o));
        }
    }

    #[test]
    fn quiet_agent_holds_in_social_phase() {
        let agent = agent_with(|a| {
            a.params.message_frequency = 0.0;
            a.params.social_influence = 0.0;
        });
        let mut c = ctx();
        c.recent_messages = vec![msg(1, Sender::Agent(2), SentimentLabel::Positive)];
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(decide(Phase::Social, &agent, &c, &mut rng), Decision::Hold);
    }

    #[test]
    fn chatty_agent_posts_its_mood_and_caps_reactions() {
        let agent = agent_with(|a| {
            a.params.message_frequency = 1.0;
            a.params.social_influence = 1.0;
            a.params.emotional_volatility = 0.0;
            a.outlook = 1.0;
        });
        let mut c = ctx();
        c.recent_messages = (1..=8)
            .map(|i| msg(i, Sender::Agent(100 + i), SentimentLabel::Positive))
            .chain([msg(9, Sender::Agent(1), SentimentLabel::Negative)])
            .collect();
        let mut rng = StdRng::seed_from_u64(10);

        let Decision::Socialize { post, reactions } = decide(Phase::Social, &agent, &c, &mut rng)
        else {
            panic!("expected a social decision");
        };

        assert_eq!(post, Some(SentimentLabel::Positive));
        assert_eq!(reactions.len(), MAX_REACTIONS_PER_TICK);
        assert!(reactions.iter().all(|(id, _)| *id != 9), "reacted to own message");
        assert!(reactions.iter().all(|(_, r)| *r == ReactionType::Like));
    }
}
