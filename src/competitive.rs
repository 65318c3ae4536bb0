//! # Competitive Scorer
//! Normalizes the raw market signals of a candidate against the niche's
//! caps and blends them into a single competitiveness score.
//!
//! Volume is log-normalized so one high-volume outlier cannot dominate a
//! batch; competition is inverted so that lower competition scores higher,
//! matching the polarity of the other signals.

use serde::{Deserialize, Serialize};

use crate::keyword::{clamp01, Keyword, SignalBand};
use crate::niche::{MarketProfile, NicheConfig};

/// Breakdown of one competitive evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveScore {
    pub volume_norm: f64,
    pub cpc_norm: f64,
    /// `1 - normalized competition`; higher is better.
    pub competition_inverted: f64,
    pub score: f64,
    pub band: SignalBand,
}

/// Stateless scorer; all niche specifics come in through the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompetitiveScorer;

impl CompetitiveScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, keyword: &Keyword, cfg: &NicheConfig) -> CompetitiveScore {
        let market = &cfg.market;

        let volume_norm = log_normalize(keyword.volume, market.volume_cap);
        let cpc_norm = clamp01(keyword.cpc / market.cpc_cap);
        let competition_norm = clamp01(keyword.competition / market.competition_cap);
        let competition_inverted = 1.0 - competition_norm;

        let score = blend(market, volume_norm, cpc_norm, competition_inverted);
        let band = band_for(market, score);

        CompetitiveScore {
            volume_norm,
            cpc_norm,
            competition_inverted,
            score,
            band,
        }
    }
}

/// `min(1, log(1+v) / log(1+cap))`.
fn log_normalize(volume: u64, cap: u64) -> f64 {
    let cap = cap.max(1);
    let denom = (1.0 + cap as f64).ln();
    if denom <= 0.0 {
        return 0.0;
    }
    clamp01((1.0 + volume as f64).ln() / denom)
}

/// Weighted blend with weights renormalized to sum 1.
fn blend(market: &MarketProfile, volume: f64, cpc: f64, competition_inv: f64) -> f64 {
    let sum = market.w_volume + market.w_cpc + market.w_competition;
    if sum <= 0.0 {
        return 0.0;
    }
    clamp01((market.w_volume * volume + market.w_cpc * cpc + market.w_competition * competition_inv) / sum)
}

fn band_for(market: &MarketProfile, score: f64) -> SignalBand {
    let b = market.bands;
    if score < b.low {
        SignalBand::Low
    } else if score < b.medium {
        SignalBand::Medium
    } else if score < b.high {
        SignalBand::High
    } else {
        SignalBand::VeryHigh
    }
}
